// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 原型掩码重建: sigmoid(嵌入 · 原型) → 1/4分辨率 → 去填充 → 双线性放大。
// 输出保持[0,1]连续值, 是否按0.5二值化由消费方决定。

use anyhow::{anyhow, bail, Result};
use image::{imageops, ImageBuffer, Luma};
use ndarray::Array;

use crate::letterbox::Letterbox;
use crate::tensor::Tensor;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// 为n个实例重建原图分辨率掩码。
///
/// embeddings: n行32列; protos形状(32, in_h/4, in_w/4)。
/// 裁剪窗口按整数半填充在1/4尺度计算, 与框坐标的还原公式保持同一套偏移。
pub fn decode_masks(
    embeddings: &[Vec<f32>],
    protos: &Tensor,
    lb: &Letterbox,
) -> Result<Vec<Vec<f32>>> {
    if embeddings.is_empty() {
        return Ok(Vec::new());
    }
    let nm = protos.channels();
    let mh = protos.height();
    let mw = protos.width();
    for e in embeddings {
        if e.len() != nm {
            bail!("掩码嵌入维度{}与原型通道数{}不一致", e.len(), nm);
        }
    }

    let n = embeddings.len();
    let coefs = Array::from_shape_vec(
        (n, nm),
        embeddings.iter().flatten().copied().collect::<Vec<f32>>(),
    )?;
    let proto = protos
        .data()
        .to_shape((nm, mh * mw))
        .map_err(|e| anyhow!("原型张量reshape失败: {e}"))?
        .to_owned();
    let masks = coefs.dot(&proto); // (n, mh*mw)

    // 1/4尺度的去填充窗口
    let x0 = (lb.wpad / 2) / 4;
    let x1 = (lb.input_w() - lb.wpad / 2) / 4;
    let y0 = (lb.hpad / 2) / 4;
    let y1 = (lb.input_h() - lb.hpad / 2) / 4;
    if x1 <= x0 || y1 <= y0 {
        bail!("掩码裁剪窗口为空: x[{x0},{x1}) y[{y0},{y1})");
    }

    let mut results = Vec::with_capacity(n);
    for i in 0..n {
        let row: Vec<f32> = masks.row(i).iter().map(|&v| sigmoid(v)).collect();
        let mask_im: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(mw as u32, mh as u32, row)
                .ok_or_else(|| anyhow!("掩码平面尺寸与原型特征图不符"))?;
        let cropped = imageops::crop_imm(&mask_im, x0, y0, x1 - x0, y1 - y0).to_image();
        let resized = imageops::resize(
            &cropped,
            lb.orig_w,
            lb.orig_h,
            imageops::FilterType::Triangle,
        );
        results.push(resized.into_raw());
    }
    Ok(results)
}

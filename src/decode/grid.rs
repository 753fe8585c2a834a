// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// anchor-free网格解码(DFL框回归)。
// 两种头部布局: 统一输出(各stride行主序拼接, 每行[DFL|类别logits|掩码嵌入]),
// 以及按stride分离的cls/dis双张量输出。

use anyhow::{bail, Result};

use crate::ops::{dfl_expectation, fast_sigmoid, softmax};
use crate::tensor::Tensor;
use crate::{DetectedObject, Rect};

/// 一个网格单元: 网格坐标 + 所属stride
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub grid_x: u32,
    pub grid_y: u32,
    pub stride: u32,
}

/// 按stride从小到大、每个stride内行主序生成全部网格单元。
/// 单元顺序与统一输出张量的行序一一对应。
pub fn make_grid_cells(input_w: u32, input_h: u32, strides: &[u32]) -> Vec<GridCell> {
    let mut cells = Vec::new();
    for &stride in strides {
        let num_grid_w = input_w / stride;
        let num_grid_h = input_h / stride;
        for g1 in 0..num_grid_h {
            for g0 in 0..num_grid_w {
                cells.push(GridCell {
                    grid_x: g0,
                    grid_y: g1,
                    stride,
                });
            }
        }
    }
    cells
}

/// 统一输出头的解码参数
#[derive(Debug, Clone, Copy)]
pub struct UnifiedHead {
    /// DFL每边bin数(reg_max + 1)
    pub reg_bins: usize,
    pub num_class: usize,
    /// 行尾掩码嵌入宽度, 非分割模型为0
    pub seg_channels: usize,
}

impl UnifiedHead {
    pub fn row_len(&self) -> usize {
        4 * self.reg_bins + self.num_class + self.seg_channels
    }
}

/// 统一输出解码: 每个网格单元取类别logit最大值过fast sigmoid,
/// 达到阈值才做DFL期望解码。框坐标在(含填充的)网络输入坐标系。
pub fn decode_unified(
    cells: &[GridCell],
    pred: &Tensor,
    head: &UnifiedHead,
    prob_threshold: f32,
) -> Result<Vec<DetectedObject>> {
    if pred.rows() != cells.len() || pred.cols() < head.row_len() {
        bail!(
            "检测头输出形状不匹配: 期望({}, >={}), 实际({}, {})",
            cells.len(),
            head.row_len(),
            pred.rows(),
            pred.cols()
        );
    }
    let mut objects = Vec::new();
    for (i, cell) in cells.iter().enumerate() {
        let row = pred.row(i)?;
        let mut label = 0usize;
        let mut score = f32::NEG_INFINITY;
        for (k, &confidence) in row
            .iter()
            .skip(4 * head.reg_bins)
            .take(head.num_class)
            .enumerate()
        {
            if confidence > score {
                label = k;
                score = confidence;
            }
        }
        let box_prob = fast_sigmoid(score);
        if box_prob < prob_threshold {
            continue;
        }

        // 四条边各reg_bins个bin, softmax后求期望再乘stride
        let mut pred_ltrb = [0f32; 4];
        for (k, edge) in pred_ltrb.iter_mut().enumerate() {
            let bins = row
                .slice(ndarray::s![k * head.reg_bins..(k + 1) * head.reg_bins])
                .to_vec();
            *edge = dfl_expectation(&softmax(&bins)) * cell.stride as f32;
        }

        let pb_cx = (cell.grid_x as f32 + 0.5) * cell.stride as f32;
        let pb_cy = (cell.grid_y as f32 + 0.5) * cell.stride as f32;
        let x0 = pb_cx - pred_ltrb[0];
        let y0 = pb_cy - pred_ltrb[1];
        let x1 = pb_cx + pred_ltrb[2];
        let y1 = pb_cy + pred_ltrb[3];

        let mask_embedding = if head.seg_channels > 0 {
            let start = 4 * head.reg_bins + head.num_class;
            Some(
                row.slice(ndarray::s![start..start + head.seg_channels])
                    .to_vec(),
            )
        } else {
            None
        };

        objects.push(DetectedObject {
            rect: Rect::new(x0, y0, x1 - x0, y1 - y0),
            label,
            score: box_prob,
            mask_embedding,
            ..Default::default()
        });
    }
    Ok(objects)
}

/// 分离头解码: cls张量给出已激活的类别分数, dis张量给出DFL分布。
/// 中心距离在[0, target]内裁剪后按两轴比例直接换算回原图坐标。
#[allow(clippy::too_many_arguments)]
pub fn decode_split(
    cls_pred: &Tensor,
    dis_pred: &Tensor,
    stride: u32,
    target: u32,
    reg_bins: usize,
    prob_threshold: f32,
    width_ratio: f32,
    height_ratio: f32,
) -> Result<Vec<DetectedObject>> {
    let feature_w = (target / stride) as usize;
    let feature_h = (target / stride) as usize;
    if cls_pred.rows() != feature_h * feature_w || dis_pred.rows() != feature_h * feature_w {
        bail!(
            "stride {} 头部行数不匹配: cls {} dis {} 期望 {}",
            stride,
            cls_pred.rows(),
            dis_pred.rows(),
            feature_h * feature_w
        );
    }
    if dis_pred.cols() < 4 * reg_bins {
        bail!("DFL列数不足: {} < {}", dis_pred.cols(), 4 * reg_bins);
    }
    let num_class = cls_pred.cols();
    let mut objects = Vec::new();
    for idx in 0..feature_h * feature_w {
        let scores = cls_pred.row(idx)?;
        let row = idx / feature_w;
        let col = idx % feature_w;
        let mut score = 0f32;
        let mut label = 0usize;
        for k in 0..num_class {
            if scores[k] > score {
                score = scores[k];
                label = k;
            }
        }
        if score <= prob_threshold {
            continue;
        }
        let ct_x = (col as f32 + 0.5) * stride as f32;
        let ct_y = (row as f32 + 0.5) * stride as f32;
        let dis = dis_pred.row(idx)?;
        let mut dis_pred4 = [0f32; 4];
        for (k, edge) in dis_pred4.iter_mut().enumerate() {
            let bins = dis
                .slice(ndarray::s![k * reg_bins..(k + 1) * reg_bins])
                .to_vec();
            *edge = dfl_expectation(&softmax(&bins)) * stride as f32;
        }
        let xmin = (ct_x - dis_pred4[0]).max(0.) * width_ratio;
        let ymin = (ct_y - dis_pred4[1]).max(0.) * height_ratio;
        let xmax = (ct_x + dis_pred4[2]).min(target as f32) * width_ratio;
        let ymax = (ct_y + dis_pred4[3]).min(target as f32) * height_ratio;
        objects.push(DetectedObject {
            rect: Rect::new(xmin, ymin, xmax - xmin, ymax - ymin),
            label,
            score,
            ..Default::default()
        });
    }
    Ok(objects)
}

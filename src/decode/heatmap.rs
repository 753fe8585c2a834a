// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 热力图中心点解码(人脸检测头)。
// 候选筛选只看hm阈值; 框由tlrb四通道在行cy-1处回归, stride固定为4。
// 本解码器自带一套NMS: 候选按得分升序, 截断阈值取1-nms_threshold,
// IoU用含端点(+1)面积 — 三者都是既有行为, 不要对齐到通用NMS。

use anyhow::Result;

use crate::ops::hybrid_exp;
use crate::tensor::Tensor;
use crate::FacePoint;

const STRIDE: f32 = 4.0;

/// 热力图候选中心
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterCandidate {
    pub score: f32,
    pub idx: usize,
    pub idy: usize,
}

/// (x1,y1,x2,y2)形式的中心回归框, 网络输入坐标系
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CenterBox {
    pub x: f32,
    pub y: f32,
    pub r: f32,
    pub b: f32,
}

/// 中心解码结果
#[derive(Debug, Clone, Default)]
pub struct CenterObject {
    pub score: f32,
    pub rect: CenterBox,
    pub keypoints: Vec<FacePoint>,
}

/// 扫描热力图生成候选中心。
/// pool_hm只参与差值比较, 候选与否仅由阈值决定(沿用既有筛选逻辑)。
pub fn gen_ids(hm: &Tensor, pool_hm: &Tensor, thresh: f32) -> Vec<CenterCandidate> {
    let w = hm.width();
    let total = hm.height() * w;
    let mut ids = Vec::new();
    for i in 0..total {
        let v = hm.channel_flat(0, i).unwrap_or(0.);
        let pooled = pool_hm.channel_flat(0, i).unwrap_or(0.);
        let _is_local_peak = (v - pooled) < 0.01;
        if v > thresh {
            ids.push(CenterCandidate {
                score: v,
                idx: i % w,
                idy: i / w,
            });
        }
    }
    ids
}

/// 候选中心 → 回归框(+可选5点关键点)。
/// tlrb/landmark通道在行cy-1处读取; 越界候选直接丢弃。
pub fn decode_centers(
    ids: &[CenterCandidate],
    tlrb: &Tensor,
    landmark: Option<&Tensor>,
) -> Result<Vec<CenterObject>> {
    let h = tlrb.height();
    let w = tlrb.width();
    let mut objs = Vec::new();
    for id in ids {
        let cx = id.idx;
        let cy = id.idy;
        if cy == 0 || cy > h || cx >= w {
            continue;
        }
        let flat = w * (cy - 1) + cx;
        let mut edges = [0f32; 4];
        let mut valid = true;
        for (j, e) in edges.iter_mut().enumerate() {
            match tlrb.channel_flat(j, flat) {
                Some(v) => *e = v,
                None => {
                    valid = false;
                    break;
                }
            }
        }
        if !valid {
            continue;
        }
        let mut obj = CenterObject {
            score: id.score,
            rect: CenterBox {
                x: (cx as f32 - edges[0]) * STRIDE,
                y: (cy as f32 - edges[1]) * STRIDE,
                r: (cx as f32 + edges[2]) * STRIDE,
                b: (cy as f32 + edges[3]) * STRIDE,
            },
            keypoints: Vec::new(),
        };
        if let Some(landmark) = landmark {
            // 前5通道是x, 后5通道是y, 偏移走混合指数放大4倍。
            // 十个通道先整体读出, 任一缺失丢弃整个候选, 与tlrb同策略
            let mut raws = [0f32; 10];
            let mut complete = true;
            for (j, raw) in raws.iter_mut().enumerate() {
                match landmark.channel_flat(j, flat) {
                    Some(v) => *raw = v,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }
            for j in 0..5usize {
                obj.keypoints.push(FacePoint {
                    x: (hybrid_exp(raws[j] * 4.) + cx as f32) * STRIDE,
                    y: (hybrid_exp(raws[j + 5] * 4.) + cy as f32) * STRIDE,
                    confidence: 1.0,
                    part: j,
                });
            }
        }
        objs.push(obj);
    }
    Ok(objs)
}

/// 含端点面积的IoU(像素格计数, 各边+1)
fn iou_inclusive(a: &CenterBox, b: &CenterBox) -> f32 {
    let a_area = (a.r - a.x + 1.) * (a.b - a.y + 1.);
    let b_area = (b.r - b.x + 1.) * (b.b - b.y + 1.);
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.r.min(b.r);
    let y2 = a.b.min(b.b);
    let w = (x2 - x1 + 1.).max(0.);
    let h = (y2 - y1 + 1.).max(0.);
    let area = w * h;
    area / (a_area + b_area - area)
}

/// 升序贪心抑制, cutoff = 1 - nms_threshold由调用方换算
pub fn heatmap_nms(mut objs: Vec<CenterObject>, cutoff: f32) -> Vec<CenterObject> {
    if objs.is_empty() {
        return objs;
    }
    objs.sort_by(|a, b| a.score.total_cmp(&b.score));
    let mut flag = vec![false; objs.len()];
    let mut keep = Vec::new();
    for i in 0..objs.len() {
        if flag[i] {
            continue;
        }
        for j in i + 1..objs.len() {
            if !flag[j] && iou_inclusive(&objs[i].rect, &objs[j].rect) > cutoff {
                flag[j] = true;
            }
        }
        keep.push(objs[i].clone());
    }
    keep
}

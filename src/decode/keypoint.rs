// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 关键点解码: 姿态热力图argmax与106点人脸回归。

use anyhow::{bail, Result};

use crate::tensor::Tensor;
use crate::{FacePoint, Point2};

/// 106点模型的回归网格边长
pub const LANDMARK_GRID: u32 = 112;

/// 姿态热力图解码: 跳过前5个面部通道, 其余每通道取最大响应,
/// 坐标按ROI尺寸线性还原并加上ROI偏移。
/// min_prob为None时不过滤, 分数原样带回。
pub fn pose_from_heatmaps(
    out: &Tensor,
    roi_w: f32,
    roi_h: f32,
    x1: f32,
    y1: f32,
    min_prob: Option<f32>,
) -> Vec<Point2> {
    let out_h = out.height();
    let out_w = out.width();
    let mut keypoints = Vec::new();
    for p in 0..out.channels() {
        if p < 5 {
            continue;
        }
        let mut max_prob = 0f32;
        let mut max_x = 0usize;
        let mut max_y = 0usize;
        for y in 0..out_h {
            for x in 0..out_w {
                let prob = out.get3(p, y, x).unwrap_or(0.);
                if prob > max_prob {
                    max_prob = prob;
                    max_x = x;
                    max_y = y;
                }
            }
        }
        if let Some(threshold) = min_prob {
            if max_prob < threshold {
                continue;
            }
        }
        keypoints.push(Point2::new(
            max_x as f32 * roi_w / out_w as f32 + x1,
            max_y as f32 * roi_h / out_h as f32 + y1,
            max_prob,
        ));
    }
    keypoints
}

fn landmark_part(i: usize) -> usize {
    match i {
        0..=31 => 0,  // 轮廓
        32..=51 => 1, // 眉毛
        52..=71 => 2, // 鼻子
        72..=95 => 3, // 眼睛
        _ => 4,       // 嘴巴
    }
}

/// 106点回归解码: 输出为212个归一化坐标(x,y交错),
/// 先放大到回归网格再按ROI比例还原, 最后加ROI偏移。
pub fn landmarks_106(out: &Tensor, roi_w: f32, roi_h: f32, x1: f32, y1: f32) -> Result<Vec<FacePoint>> {
    let values = match out.as_flat() {
        Some(v) => v,
        None => bail!("关键点回归输出不是连续内存"),
    };
    if values.len() < 212 {
        bail!("关键点回归输出长度不足: {} < 212", values.len());
    }
    let sw = roi_w / LANDMARK_GRID as f32;
    let sh = roi_h / LANDMARK_GRID as f32;
    let mut keypoints = Vec::with_capacity(106);
    for i in 0..106usize {
        let px = values[i * 2] * LANDMARK_GRID as f32 * sw + x1;
        let py = values[i * 2 + 1] * LANDMARK_GRID as f32 * sh + y1;
        keypoints.push(FacePoint {
            x: px,
            y: py,
            confidence: 1.0,
            part: landmark_part(i),
        });
    }
    Ok(keypoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_skips_face_channels() {
        // 7通道4x4热力图: 前5通道被跳过, 只产出2个关键点
        let mut data = vec![0f32; 7 * 16];
        data[5 * 16 + 5] = 0.8; // 通道5峰值在(1,1)
        data[6 * 16 + 10] = 0.6; // 通道6峰值在(2,2)
        let out = Tensor::from_shape_vec(&[7, 4, 4], data).unwrap();
        let kps = pose_from_heatmaps(&out, 40., 40., 100., 200., None);
        assert_eq!(kps.len(), 2);
        // (1,1)*40/4 + 偏移
        assert_eq!((kps[0].x, kps[0].y), (110., 210.));
        assert!((kps[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!((kps[1].x, kps[1].y), (120., 220.));
    }

    #[test]
    fn test_pose_confidence_filter() {
        let mut data = vec![0f32; 6 * 16];
        data[5 * 16 + 5] = 0.2;
        let out = Tensor::from_shape_vec(&[6, 4, 4], data).unwrap();
        // 无阈值: 原样带回
        assert_eq!(pose_from_heatmaps(&out, 40., 40., 0., 0., None).len(), 1);
        // 有阈值: 低分丢弃
        assert!(pose_from_heatmaps(&out, 40., 40., 0., 0., Some(0.45)).is_empty());
    }

    #[test]
    fn test_landmarks_scale_and_offset() {
        // 所有点归一化坐标0.5 → 网格中心 → ROI中心 + 偏移
        let out = Tensor::from_shape_vec(&[212], vec![0.5; 212]).unwrap();
        let kps = landmarks_106(&out, 224., 112., 10., 20.).unwrap();
        assert_eq!(kps.len(), 106);
        assert_eq!((kps[0].x, kps[0].y), (122., 76.));
    }

    #[test]
    fn test_landmark_part_ranges() {
        let out = Tensor::from_shape_vec(&[212], vec![0.0; 212]).unwrap();
        let kps = landmarks_106(&out, 112., 112., 0., 0.).unwrap();
        assert_eq!(kps[0].part, 0);
        assert_eq!(kps[31].part, 0);
        assert_eq!(kps[32].part, 1);
        assert_eq!(kps[51].part, 1);
        assert_eq!(kps[52].part, 2);
        assert_eq!(kps[71].part, 2);
        assert_eq!(kps[72].part, 3);
        assert_eq!(kps[95].part, 3);
        assert_eq!(kps[96].part, 4);
        assert_eq!(kps[105].part, 4);
    }

    #[test]
    fn test_landmarks_short_output_is_error() {
        let out = Tensor::from_shape_vec(&[100], vec![0.0; 100]).unwrap();
        assert!(landmarks_106(&out, 112., 112., 0., 0.).is_err());
    }
}

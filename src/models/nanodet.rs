// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// NanoDet家族: 按stride分离的cls/dis双头, reg_max=7,
// 输入为无填充拉伸缩放, 解码时直接按两轴比例还原。

use anyhow::Result;
use image::DynamicImage;

use crate::decode::grid::decode_split;
use crate::non_max_suppression;
use crate::tensor::Engine;
use crate::DetectedObject;

const REG_BINS: usize = 8; // reg_max + 1
const STRIDES: [u32; 3] = [8, 16, 32];

pub struct NanoDetDetector {
    engine: Box<dyn Engine>,
    target_size: u32,
}

impl NanoDetDetector {
    pub fn new(engine: Box<dyn Engine>, target_size: u32) -> Self {
        Self {
            engine,
            target_size,
        }
    }

    pub fn detect(
        &mut self,
        image: &DynamicImage,
        prob_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectedObject>> {
        let width = image.width();
        let height = image.height();
        // 无填充: 直接拉伸到target x target
        let outputs = self
            .engine
            .infer(image, self.target_size, self.target_size)?;

        let width_ratio = width as f32 / self.target_size as f32;
        let height_ratio = height as f32 / self.target_size as f32;
        let mut proposals = Vec::new();
        for stride in STRIDES {
            let cls_pred = outputs.get(&format!("cls_pred_stride_{stride}"))?;
            let dis_pred = outputs.get(&format!("dis_pred_stride_{stride}"))?;
            proposals.extend(decode_split(
                cls_pred,
                dis_pred,
                stride,
                self.target_size,
                REG_BINS,
                prob_threshold,
                width_ratio,
                height_ratio,
            )?);
        }

        // 候选按头部顺序进入抑制, 不做全局排序(沿用既有行为)
        non_max_suppression(&mut proposals, nms_threshold, |a: &DetectedObject, b| {
            a.rect.iou(&b.rect)
        });
        Ok(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Tensor, TensorMap};

    struct FakeNanoEngine {
        target: u32,
        hits: Vec<(u32, usize, usize, f32)>, // (stride, row, col, score)
    }

    impl Engine for FakeNanoEngine {
        fn infer(&mut self, _image: &DynamicImage, _w: u32, _h: u32) -> Result<TensorMap> {
            let mut map = TensorMap::new();
            for stride in STRIDES {
                let feature = (self.target / stride) as usize;
                let mut cls = vec![0f32; feature * feature * 80];
                let dis = vec![0f32; feature * feature * 32];
                for &(s, row, col, score) in &self.hits {
                    if s == stride {
                        cls[(row * feature + col) * 80] = score;
                    }
                }
                map.insert(
                    format!("cls_pred_stride_{stride}"),
                    Tensor::from_shape_vec(&[feature * feature, 80], cls)?,
                );
                map.insert(
                    format!("dis_pred_stride_{stride}"),
                    Tensor::from_shape_vec(&[feature * feature, 32], dis)?,
                );
            }
            Ok(map)
        }
    }

    #[test]
    fn test_nanodet_plain_resize_remap() {
        // 640x320原图, 320输入 → x比例2.0, y比例1.0
        let engine = FakeNanoEngine {
            target: 320,
            hits: vec![(32, 5, 5, 0.9)],
        };
        let mut det = NanoDetDetector::new(Box::new(engine), 320);
        let image = DynamicImage::new_rgb8(640, 320);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 1);
        let obj = &objects[0];
        assert_eq!(obj.label, 0);
        // DFL均匀分布 → 每边3.5格 → 112像素; 中心(176,176)
        // x: (176-112)*2=128, 宽224*2=448; y: 64, 高224
        assert!((obj.rect.x - 128.).abs() < 1.0);
        assert!((obj.rect.y - 64.).abs() < 1.0);
        assert!((obj.rect.width - 448.).abs() < 2.0);
        assert!((obj.rect.height - 224.).abs() < 2.0);
    }

    #[test]
    fn test_nanodet_overlapping_suppressed() {
        let engine = FakeNanoEngine {
            target: 320,
            hits: vec![(32, 5, 5, 0.9), (32, 5, 6, 0.8)],
        };
        let mut det = NanoDetDetector::new(Box::new(engine), 320);
        let image = DynamicImage::new_rgb8(320, 320);
        let objects = det.detect(&image, 0.45, 0.3).unwrap();
        assert_eq!(objects.len(), 1);
    }
}

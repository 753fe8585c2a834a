// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// SimplePose家族: 人体检测行输出 → 每人扩展ROI → 姿态热力图argmax。
// 检测行不做阈值过滤, 分数与标签原样带回。

use anyhow::Result;
use image::DynamicImage;

use crate::decode::keypoint::pose_from_heatmaps;
use crate::letterbox::Letterbox;
use crate::tensor::Engine;
use crate::{DetectedObject, Rect};

pub const POSE_INPUT_W: u32 = 192;
pub const POSE_INPUT_H: u32 = 256;

pub struct SimplePoseDetector {
    person: Box<dyn Engine>,
    pose: Box<dyn Engine>,
    target_size: u32,
}

impl SimplePoseDetector {
    pub fn new(person: Box<dyn Engine>, pose: Box<dyn Engine>, target_size: u32) -> Self {
        Self {
            person,
            pose,
            target_size,
        }
    }

    pub fn detect(
        &mut self,
        image: &DynamicImage,
        _prob_threshold: f32,
        _nms_threshold: f32,
    ) -> Result<Vec<DetectedObject>> {
        let width = image.width() as f32;
        let height = image.height() as f32;
        let lb = Letterbox::compute(image.width(), image.height(), self.target_size);
        let outputs = self.person.infer(image, lb.input_w(), lb.input_h())?;
        let rows = outputs.get("output")?;

        let mut objects = Vec::new();
        for i in 0..rows.rows() {
            let values = rows.row(i)?;
            if values.len() < 6 {
                continue;
            }
            // 行输出坐标归一化到含填充输入
            let x1 = values[2] * lb.input_w() as f32;
            let y1 = values[3] * lb.input_h() as f32;
            let x2 = values[4] * lb.input_w() as f32;
            let y2 = values[5] * lb.input_h() as f32;
            // 人体框本身不做边界裁剪
            let x1 = (x1 - (lb.wpad / 2) as f32) / lb.scale;
            let y1 = (y1 - (lb.hpad / 2) as f32) / lb.scale;
            let x2 = (x2 - (lb.wpad / 2) as f32) / lb.scale;
            let y2 = (y2 - (lb.hpad / 2) as f32) / lb.scale;

            let mut obj = DetectedObject {
                rect: Rect::new(x1, y1, x2 - x1, y2 - y1),
                label: values[0] as usize,
                score: values[1],
                ..Default::default()
            };

            // ROI按中心扩展0.7宽/0.6高后裁剪到原图
            let pw = x2 - x1;
            let ph = y2 - y1;
            let cx = x1 + 0.5 * pw;
            let cy = y1 + 0.5 * ph;
            let ex1 = (cx - 0.7 * pw).clamp(0., width - 1.);
            let ey1 = (cy - 0.6 * ph).clamp(0., height - 1.);
            let ex2 = (cx + 0.7 * pw).clamp(0., width - 1.);
            let ey2 = (cy + 0.6 * ph).clamp(0., height - 1.);
            let roi_w = ex2 - ex1;
            let roi_h = ey2 - ey1;
            if roi_w > 0. && roi_h > 0. {
                let roi = image.crop_imm(ex1 as u32, ey1 as u32, roi_w as u32, roi_h as u32);
                let pose_out = self.pose.infer(&roi, POSE_INPUT_W, POSE_INPUT_H)?;
                let heatmaps = pose_out.get("heatmaps")?;
                obj.pose_keypoints =
                    pose_from_heatmaps(heatmaps, roi_w, roi_h, ex1, ey1, None);
            }
            objects.push(obj);
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Tensor, TensorMap};

    struct FakePersonEngine {
        rows: Vec<[f32; 6]>,
    }

    impl Engine for FakePersonEngine {
        fn infer(&mut self, _image: &DynamicImage, _w: u32, _h: u32) -> Result<TensorMap> {
            let mut map = TensorMap::new();
            let flat: Vec<f32> = self.rows.iter().flatten().copied().collect();
            map.insert(
                "output",
                Tensor::from_shape_vec(&[self.rows.len(), 6], flat)?,
            );
            Ok(map)
        }
    }

    struct FakePoseEngine;

    impl Engine for FakePoseEngine {
        fn infer(&mut self, _image: &DynamicImage, _w: u32, _h: u32) -> Result<TensorMap> {
            // 17通道8x8热力图, 每个身体通道峰值在(4,4)
            let mut data = vec![0f32; 17 * 64];
            for p in 5..17 {
                data[p * 64 + 4 * 8 + 4] = 0.7;
            }
            let mut map = TensorMap::new();
            map.insert("heatmaps", Tensor::from_shape_vec(&[17, 8, 8], data)?);
            Ok(map)
        }
    }

    #[test]
    fn test_rows_carried_without_filtering() {
        // 低分行也保留, 标签原样
        let person = FakePersonEngine {
            rows: vec![
                [0., 0.9, 0.25, 0.25, 0.75, 0.75],
                [1., 0.05, 0.1, 0.1, 0.2, 0.2],
            ],
        };
        let mut det = SimplePoseDetector::new(Box::new(person), Box::new(FakePoseEngine), 320);
        let image = DynamicImage::new_rgb8(320, 320);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 2);
        assert!((objects[1].score - 0.05).abs() < 1e-6);
        assert_eq!(objects[1].label, 1);
    }

    #[test]
    fn test_pose_keypoints_attached_with_roi_offset() {
        let person = FakePersonEngine {
            rows: vec![[0., 0.9, 0.25, 0.25, 0.75, 0.75]],
        };
        let mut det = SimplePoseDetector::new(Box::new(person), Box::new(FakePoseEngine), 320);
        let image = DynamicImage::new_rgb8(320, 320);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 1);
        let kps = &objects[0].pose_keypoints;
        assert_eq!(kps.len(), 12);
        // 框(80,80)-(240,240), 扩展后(48,64)-(272,256); 峰值(4,4)/8x8
        for kp in kps {
            assert!((kp.confidence - 0.7).abs() < 1e-6);
            assert!(kp.x > 48. && kp.x < 272.);
            assert!(kp.y > 64. && kp.y < 256.);
        }
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 人脸+106关键点家族: 拉伸缩放的人脸检测行输出,
// 框不对称外扩后达到最小边长才跑关键点回归。

use anyhow::Result;
use image::DynamicImage;

use crate::decode::keypoint::landmarks_106;
use crate::tensor::Engine;
use crate::{DetectedObject, Rect};

pub const DETECTOR_INPUT_W: u32 = 320;
pub const DETECTOR_INPUT_H: u32 = 256;
pub const LANDMARK_INPUT: u32 = 112;

/// 关键点回归的最小ROI边长(像素), 更小的脸回归不稳定
const MIN_ROI_SIDE: f32 = 66.;

pub struct FaceLandmarkDetector {
    face: Box<dyn Engine>,
    landmark: Box<dyn Engine>,
}

impl FaceLandmarkDetector {
    pub fn new(face: Box<dyn Engine>, landmark: Box<dyn Engine>) -> Self {
        Self { face, landmark }
    }

    pub fn detect(
        &mut self,
        image: &DynamicImage,
        _prob_threshold: f32,
        _nms_threshold: f32,
    ) -> Result<Vec<DetectedObject>> {
        let width = image.width() as f32;
        let height = image.height() as f32;
        let outputs = self
            .face
            .infer(image, DETECTOR_INPUT_W, DETECTOR_INPUT_H)?;
        let rows = outputs.get("output")?;

        let mut objects = Vec::new();
        for i in 0..rows.rows() {
            let values = rows.row(i)?;
            if values.len() < 6 {
                continue;
            }
            // 行输出归一化到原图(检测输入是拉伸缩放, 比例在归一化里消掉)
            let x1 = values[2] * width;
            let y1 = values[3] * height;
            let x2 = values[4] * width;
            let y2 = values[5] * height;

            let pw = x2 - x1;
            let ph = y2 - y1;
            let cx = x1 + 0.5 * pw;
            let cy = y1 + 0.5 * ph;
            // 不对称外扩: 下巴方向多留
            let x1 = (cx - 0.55 * pw).clamp(0., width - 1.);
            let y1 = (cy - 0.35 * ph).clamp(0., height - 1.);
            let x2 = (cx + 0.55 * pw).clamp(0., width - 1.);
            let y2 = (cy + 0.55 * ph).clamp(0., height - 1.);

            let mut obj = DetectedObject {
                rect: Rect::new(x1, y1, x2 - x1, y2 - y1),
                label: 0,
                score: values[1],
                ..Default::default()
            };

            if x2 - x1 > MIN_ROI_SIDE && y2 - y1 > MIN_ROI_SIDE {
                let roi = image.crop_imm(x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32);
                let lm_out = self.landmark.infer(&roi, LANDMARK_INPUT, LANDMARK_INPUT)?;
                let landmarks = lm_out.get("landmarks")?;
                obj.face_landmarks = landmarks_106(landmarks, x2 - x1, y2 - y1, x1, y1)?;
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

    struct FakeFaceRows {
        rows: Vec<[f32; 6]>,
    }

    impl Engine for FakeFaceRows {
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

    struct FakeLandmarkEngine;

    impl Engine for FakeLandmarkEngine {
        fn infer(&mut self, _image: &DynamicImage, _w: u32, _h: u32) -> Result<TensorMap> {
            let mut map = TensorMap::new();
            map.insert(
                "landmarks",
                Tensor::from_shape_vec(&[212], vec![0.5; 212])?,
            );
            Ok(map)
        }
    }

    #[test]
    fn test_small_face_skips_landmarks() {
        // 40像素的脸低于66像素门限
        let face = FakeFaceRows {
            rows: vec![[0., 0.9, 0.4, 0.4, 0.5, 0.5]],
        };
        let mut det = FaceLandmarkDetector::new(Box::new(face), Box::new(FakeLandmarkEngine));
        let image = DynamicImage::new_rgb8(400, 400);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects[0].face_landmarks.is_empty());
    }

    #[test]
    fn test_large_face_gets_106_landmarks() {
        let face = FakeFaceRows {
            rows: vec![[0., 0.9, 0.2, 0.2, 0.7, 0.7]],
        };
        let mut det = FaceLandmarkDetector::new(Box::new(face), Box::new(FakeLandmarkEngine));
        let image = DynamicImage::new_rgb8(400, 400);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 1);
        let obj = &objects[0];
        assert_eq!(obj.face_landmarks.len(), 106);
        // 所有点都落在ROI内部
        for kp in &obj.face_landmarks {
            assert!(kp.x >= obj.rect.x && kp.x <= obj.rect.xmax());
            assert!(kp.y >= obj.rect.y && kp.y <= obj.rect.ymax());
        }
    }

    #[test]
    fn test_asymmetric_expansion() {
        let face = FakeFaceRows {
            rows: vec![[0., 0.9, 0.25, 0.25, 0.5, 0.5]],
        };
        let mut det = FaceLandmarkDetector::new(Box::new(face), Box::new(FakeLandmarkEngine));
        let image = DynamicImage::new_rgb8(400, 400);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        let r = &objects[0].rect;
        // 原框(100,100)-(200,200), 中心(150,150), pw=ph=100
        assert!((r.x - 95.).abs() < 1e-4); // 150-55
        assert!((r.y - 115.).abs() < 1e-4); // 150-35
        assert!((r.xmax() - 205.).abs() < 1e-4); // 150+55
        assert!((r.ymax() - 205.).abs() < 1e-4); // 150+55
    }
}

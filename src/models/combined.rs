// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 组合家族: 人体检测 → 扩展ROI姿态 → 独立人脸热力图, 合并为一张列表。
// 标签0=人体, 1=人脸; 人体条目带固定0.8置信度(行输出分数只参与过滤)。

use anyhow::Result;
use image::DynamicImage;

use crate::decode::heatmap::{decode_centers, gen_ids, heatmap_nms};
use crate::decode::keypoint::pose_from_heatmaps;
use crate::letterbox::Letterbox;
use crate::models::simple_pose::{POSE_INPUT_H, POSE_INPUT_W};
use crate::tensor::Engine;
use crate::{DetectedObject, Rect};

pub struct CombinedDetector {
    person: Box<dyn Engine>,
    pose: Box<dyn Engine>,
    face: Box<dyn Engine>,
    target_size: u32,
}

impl CombinedDetector {
    pub fn new(
        person: Box<dyn Engine>,
        pose: Box<dyn Engine>,
        face: Box<dyn Engine>,
        target_size: u32,
    ) -> Self {
        Self {
            person,
            pose,
            face,
            target_size,
        }
    }

    /// 人体检测: 行输出按阈值过滤, 框还原并裁剪到原图
    fn detect_persons(
        &mut self,
        image: &DynamicImage,
        prob_threshold: f32,
    ) -> Result<Vec<Rect>> {
        let width = image.width() as f32;
        let height = image.height() as f32;
        let lb = Letterbox::compute(image.width(), image.height(), self.target_size);
        let outputs = self.person.infer(image, lb.input_w(), lb.input_h())?;
        let rows = outputs.get("output")?;

        let mut boxes = Vec::new();
        for i in 0..rows.rows() {
            let values = rows.row(i)?;
            if values.len() < 6 {
                continue;
            }
            let score = values[1];
            if score < prob_threshold {
                continue;
            }
            let x1 = lb.unmap_x(values[2] * lb.input_w() as f32).min(width - 1.);
            let y1 = lb.unmap_y(values[3] * lb.input_h() as f32).min(height - 1.);
            let x2 = lb.unmap_x(values[4] * lb.input_w() as f32).min(width - 1.);
            let y2 = lb.unmap_y(values[5] * lb.input_h() as f32).min(height - 1.);
            boxes.push(Rect::new(x1, y1, x2 - x1, y2 - y1));
        }
        Ok(boxes)
    }

    /// 全帧独立人脸热力图解码(无关键点通道)
    fn detect_faces(
        &mut self,
        image: &DynamicImage,
        prob_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectedObject>> {
        let lb = Letterbox::compute(image.width(), image.height(), self.target_size);
        let outputs = self.face.infer(image, lb.input_w(), lb.input_h())?;
        let hm = outputs.get("hm")?;
        let pool_hm = outputs.get("pool_hm")?;
        let tlrb = outputs.get("tlrb")?;

        let ids = gen_ids(hm, pool_hm, prob_threshold);
        let candidates = decode_centers(&ids, tlrb, None)?;
        let kept = heatmap_nms(candidates, 1. - nms_threshold);

        let mut faces = Vec::with_capacity(kept.len());
        for obj in kept {
            let (x0, y0, x1, y1) = lb.unmap_box(obj.rect.x, obj.rect.y, obj.rect.r, obj.rect.b);
            faces.push(DetectedObject {
                rect: Rect::new(x0, y0, x1 - x0, y1 - y0),
                label: 1,
                score: obj.score,
                ..Default::default()
            });
        }
        Ok(faces)
    }

    pub fn detect(
        &mut self,
        image: &DynamicImage,
        prob_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectedObject>> {
        let width = image.width() as f32;
        let height = image.height() as f32;
        let person_boxes = self.detect_persons(image, prob_threshold)?;
        let faces = self.detect_faces(image, prob_threshold, nms_threshold)?;

        let mut objects = Vec::new();
        for person_box in person_boxes {
            let mut obj = DetectedObject {
                rect: person_box,
                label: 0,
                score: 0.8,
                ..Default::default()
            };

            let pw = person_box.width;
            let ph = person_box.height;
            let cx = person_box.x + 0.5 * pw;
            let cy = person_box.y + 0.5 * ph;
            let ex = (cx - 0.7 * pw).max(0.);
            let ey = (cy - 0.6 * ph).max(0.);
            let ew = (1.4 * pw).min(width - ex);
            let eh = (1.2 * ph).min(height - ey);

            // 退化ROI跳过姿态, 人体框仍然保留
            if ew > 0. && eh > 0. {
                let roi = image.crop_imm(ex as u32, ey as u32, ew as u32, eh as u32);
                let pose_out = self.pose.infer(&roi, POSE_INPUT_W, POSE_INPUT_H)?;
                let heatmaps = pose_out.get("heatmaps")?;
                obj.pose_keypoints =
                    pose_from_heatmaps(heatmaps, ew, eh, ex, ey, Some(prob_threshold));
            }
            objects.push(obj);
        }
        objects.extend(faces);
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

    struct FakePoseEngine {
        peak: f32,
    }

    impl Engine for FakePoseEngine {
        fn infer(&mut self, _image: &DynamicImage, _w: u32, _h: u32) -> Result<TensorMap> {
            let mut data = vec![0f32; 17 * 64];
            for p in 5..17 {
                data[p * 64 + 9] = self.peak;
            }
            let mut map = TensorMap::new();
            map.insert("heatmaps", Tensor::from_shape_vec(&[17, 8, 8], data)?);
            Ok(map)
        }
    }

    struct FakeFaceEngine {
        with_face: bool,
    }

    impl Engine for FakeFaceEngine {
        fn infer(&mut self, _image: &DynamicImage, w: u32, h: u32) -> Result<TensorMap> {
            let fh = (h / 4) as usize;
            let fw = (w / 4) as usize;
            let mut hm = vec![0f32; fh * fw];
            if self.with_face {
                hm[20 * fw + 20] = 0.9;
            }
            let mut map = TensorMap::new();
            map.insert("hm", Tensor::from_shape_vec(&[1, fh, fw], hm)?);
            map.insert(
                "pool_hm",
                Tensor::from_shape_vec(&[1, fh, fw], vec![0.; fh * fw])?,
            );
            map.insert(
                "tlrb",
                Tensor::from_shape_vec(&[4, fh, fw], vec![1.5; 4 * fh * fw])?,
            );
            Ok(map)
        }
    }

    fn make_detector(rows: Vec<[f32; 6]>, pose_peak: f32, with_face: bool) -> CombinedDetector {
        CombinedDetector::new(
            Box::new(FakePersonEngine { rows }),
            Box::new(FakePoseEngine { peak: pose_peak }),
            Box::new(FakeFaceEngine { with_face }),
            320,
        )
    }

    #[test]
    fn test_merged_labels_and_fixed_person_score() {
        let mut det = make_detector(vec![[0., 0.9, 0.25, 0.25, 0.75, 0.75]], 0.7, true);
        let image = DynamicImage::new_rgb8(320, 320);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].label, 0);
        assert!((objects[0].score - 0.8).abs() < 1e-6);
        assert_eq!(objects[1].label, 1);
        assert!((objects[1].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_low_score_person_filtered() {
        let mut det = make_detector(vec![[0., 0.2, 0.25, 0.25, 0.75, 0.75]], 0.7, false);
        let image = DynamicImage::new_rgb8(320, 320);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn test_pose_keypoints_threshold_filtered() {
        // 峰值低于阈值 → 人体保留但关键点为空
        let mut det = make_detector(vec![[0., 0.9, 0.25, 0.25, 0.75, 0.75]], 0.2, false);
        let image = DynamicImage::new_rgb8(320, 320);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects[0].pose_keypoints.is_empty());
    }

    #[test]
    fn test_degenerate_crop_keeps_person_box() {
        // 右下角外的退化框: 扩展后宽度被裁为0, 姿态跳过
        let mut det = make_detector(vec![[0., 0.9, 0.999, 0.999, 1.0, 1.0]], 0.7, false);
        let image = DynamicImage::new_rgb8(320, 320);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects[0].pose_keypoints.is_empty());
    }
}

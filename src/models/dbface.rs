// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// DbFace家族: 热力图中心解码 + 5点关键点, 专用升序NMS。

use anyhow::Result;
use image::DynamicImage;

use crate::decode::heatmap::{decode_centers, gen_ids, heatmap_nms};
use crate::letterbox::Letterbox;
use crate::tensor::Engine;
use crate::{DetectedObject, Rect};

pub struct DbFaceDetector {
    engine: Box<dyn Engine>,
    target_size: u32,
}

impl DbFaceDetector {
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
        let lb = Letterbox::compute(image.width(), image.height(), self.target_size);
        let outputs = self.engine.infer(image, lb.input_w(), lb.input_h())?;
        let hm = outputs.get("hm")?;
        let pool_hm = outputs.get("pool_hm")?;
        let tlrb = outputs.get("tlrb")?;
        let landmark = outputs.get("landmark")?;

        let ids = gen_ids(hm, pool_hm, prob_threshold);
        let candidates = decode_centers(&ids, tlrb, Some(landmark))?;
        let kept = heatmap_nms(candidates, 1. - nms_threshold);

        let mut objects = Vec::with_capacity(kept.len());
        for obj in kept {
            let (x0, y0, x1, y1) = lb.unmap_box(obj.rect.x, obj.rect.y, obj.rect.r, obj.rect.b);
            let mut face = DetectedObject {
                rect: Rect::new(x0, y0, x1 - x0, y1 - y0),
                label: 0,
                score: obj.score,
                ..Default::default()
            };
            // 关键点与框走同一套还原和裁剪
            face.face_landmarks = obj
                .keypoints
                .into_iter()
                .map(|mut kp| {
                    kp.x = lb.unmap_x(kp.x);
                    kp.y = lb.unmap_y(kp.y);
                    kp
                })
                .collect();
            objects.push(face);
        }
        Ok(objects)
    }
}

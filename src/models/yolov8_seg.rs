// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8实例分割家族: 检测头带32维掩码嵌入,
// NMS后只为保留的实例重建原型掩码。

use anyhow::Result;
use image::DynamicImage;

use crate::decode::grid::{decode_unified, make_grid_cells, UnifiedHead};
use crate::decode::mask::decode_masks;
use crate::letterbox::Letterbox;
use crate::models::yolov8::STRIDES;
use crate::non_max_suppression;
use crate::tensor::Engine;
use crate::{DetectedObject, Rect};

const HEAD: UnifiedHead = UnifiedHead {
    reg_bins: 16,
    num_class: 80,
    seg_channels: 32,
};

pub struct YoloSegDetector {
    engine: Box<dyn Engine>,
    target_size: u32,
}

impl YoloSegDetector {
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
        let lb = Letterbox::compute(width, height, self.target_size);
        let outputs = self.engine.infer(image, lb.input_w(), lb.input_h())?;
        let pred = outputs.get("output")?;
        let protos = outputs.get("seg")?;

        let cells = make_grid_cells(lb.input_w(), lb.input_h(), &STRIDES);
        let mut proposals = decode_unified(&cells, pred, &HEAD, prob_threshold)?;

        proposals.sort_by(|a, b| b.score.total_cmp(&a.score));
        non_max_suppression(&mut proposals, nms_threshold, |a: &DetectedObject, b| {
            a.rect.iou(&b.rect)
        });

        // 掩码重建只对NMS幸存者做, 嵌入在解码时已随行带出
        let embeddings: Vec<Vec<f32>> = proposals
            .iter()
            .map(|o| o.mask_embedding.clone().unwrap_or_default())
            .collect();
        let masks = decode_masks(&embeddings, protos, &lb)?;

        for (obj, mut mask) in proposals.iter_mut().zip(masks) {
            let (x0, y0, x1, y1) =
                lb.unmap_box(obj.rect.x, obj.rect.y, obj.rect.xmax(), obj.rect.ymax());
            obj.rect = Rect::new(x0, y0, x1 - x0, y1 - y0);

            // 自己框外的掩码响应清零
            for y in 0..height as usize {
                for x in 0..width as usize {
                    if (x as f32) < obj.rect.x
                        || x as f32 > obj.rect.xmax()
                        || (y as f32) < obj.rect.y
                        || y as f32 > obj.rect.ymax()
                    {
                        mask[y * width as usize + x] = 0.;
                    }
                }
            }
            obj.mask = Some(mask);
        }
        Ok(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Tensor, TensorMap};

    struct FakeSegEngine {
        pred: Vec<f32>,
        rows: usize,
    }

    impl Engine for FakeSegEngine {
        fn infer(&mut self, _image: &DynamicImage, w: u32, h: u32) -> Result<TensorMap> {
            let mut map = TensorMap::new();
            map.insert(
                "output",
                Tensor::from_shape_vec(&[self.rows, 176], self.pred.clone())?,
            );
            let mh = (h / 4) as usize;
            let mw = (w / 4) as usize;
            // 原型全正: sigmoid后处处大于0.5
            map.insert("seg", Tensor::from_shape_vec(&[32, mh, mw], vec![0.2; 32 * mh * mw])?);
            Ok(map)
        }
    }

    #[test]
    fn test_seg_mask_zeroed_outside_box() {
        let rows: usize = STRIDES
            .iter()
            .map(|s| ((320 / s) * (320 / s)) as usize)
            .sum();
        let mut pred = vec![-20.0f32; rows * 176];
        // stride-32层中部一格命中(类别0), 嵌入全1
        let s32_offset: usize = (40 * 40 + 20 * 20) as usize;
        let cell = s32_offset + 5 * 10 + 5; // 网格(5,5), stride 32
        let base = cell * 176;
        pred[base + 64] = 8.0;
        // 四边DFL尖峰在bin 1 → 每边距离32, 框(144,144)-(208,208)
        for k in 0..4 {
            pred[base + k * 16 + 1] = 50.0;
        }
        for k in 0..32 {
            pred[base + 64 + 80 + k] = 1.0;
        }
        let engine = FakeSegEngine { pred, rows };
        let mut det = YoloSegDetector::new(Box::new(engine), 320);
        let image = DynamicImage::new_rgb8(320, 320);
        let objects = det.detect(&image, 0.45, 0.65).unwrap();
        assert_eq!(objects.len(), 1);
        let obj = &objects[0];
        let mask = obj.mask.as_ref().unwrap();
        assert_eq!(mask.len(), 320 * 320);
        // 框内中心响应为正, 框外角落为零
        let cx = (obj.rect.x + obj.rect.width / 2.) as usize;
        let cy = (obj.rect.y + obj.rect.height / 2.) as usize;
        assert!(mask[cy * 320 + cx] > 0.5);
        assert_eq!(mask[0], 0.);
        assert_eq!(mask[320 * 320 - 1], 0.);
    }
}

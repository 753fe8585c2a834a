// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8检测家族: 统一输出头 + letterbox坐标还原。

use anyhow::Result;
use image::DynamicImage;

use crate::decode::grid::{decode_unified, make_grid_cells, UnifiedHead};
use crate::letterbox::Letterbox;
use crate::non_max_suppression;
use crate::tensor::Engine;
use crate::{DetectedObject, Rect};

pub const STRIDES: [u32; 3] = [8, 16, 32];

const HEAD: UnifiedHead = UnifiedHead {
    reg_bins: 16,
    num_class: 80,
    seg_channels: 0,
};

pub struct YoloDetector {
    engine: Box<dyn Engine>,
    target_size: u32,
}

impl YoloDetector {
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
        let pred = outputs.get("output")?;

        let cells = make_grid_cells(lb.input_w(), lb.input_h(), &STRIDES);
        let mut proposals = decode_unified(&cells, pred, &HEAD, prob_threshold)?;

        proposals.sort_by(|a, b| b.score.total_cmp(&a.score));
        non_max_suppression(&mut proposals, nms_threshold, |a: &DetectedObject, b| {
            a.rect.iou(&b.rect)
        });

        for obj in proposals.iter_mut() {
            let (x0, y0, x1, y1) =
                lb.unmap_box(obj.rect.x, obj.rect.y, obj.rect.xmax(), obj.rect.ymax());
            obj.rect = Rect::new(x0, y0, x1 - x0, y1 - y0);
        }
        // 大目标排前面, 标注时小目标不会被整体盖住
        proposals.sort_by(|a, b| b.rect.area().total_cmp(&a.rect.area()));
        Ok(proposals)
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 跟踪协作方边界。关联算法在外部实现, 这里只定义输入输出契约。

use crate::{DetectedObject, Rect};

/// 一条持续跟踪的目标轨迹
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub rect: Rect,
    /// 跨帧持久的轨迹id
    pub id: u32,
    pub label: usize,
    pub score: f32,
    /// 历史中心点, 旧→新
    pub trail: Vec<(f32, f32)>,
}

impl Track {
    pub fn center(&self) -> (f32, f32) {
        (
            self.rect.x + self.rect.width / 2.,
            self.rect.y + self.rect.height / 2.,
        )
    }
}

/// 逐帧消费检测结果, 维护持久id与轨迹
pub trait Tracker: Send {
    fn update(&mut self, objects: &[DetectedObject]) -> Vec<Track>;
}

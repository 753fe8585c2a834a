// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行时配置参数
pub mod context; // 检测上下文(模型+配置)
pub mod decode; // 各类解码算法
pub mod letterbox; // 坐标还原
pub mod models; // 模型家族与具体实现
pub mod ops; // 数值运算(fast_exp/sigmoid/softmax)
pub mod stream; // 视频流工作线程
pub mod summary; // 检测摘要统计
pub mod tensor; // 张量视图与推理引擎接口
pub mod track; // 外部跟踪器接口

pub use crate::config::{InferenceConfig, InputSize};
pub use crate::context::DetectContext;
pub use crate::models::{EngineProvider, ModelFamily, ModelKind};
pub use crate::stream::{CancelToken, ConfigMessage, DecodedFrame, StreamResult, StreamWorker};
pub use crate::summary::DetectSummary;
pub use crate::tensor::{Engine, Tensor, TensorMap};
pub use crate::track::{Track, Tracker};

/// 贪心NMS: 按得分降序遍历(排序由调用方负责),
/// 与所有已保留框的IoU均不超过阈值才保留。
/// 注意阈值边界使用严格大于: IoU恰好等于阈值的两个框会同时保留。
pub fn non_max_suppression<T, F>(xs: &mut Vec<T>, iou_threshold: f32, iou: F)
where
    F: Fn(&T, &T) -> f32,
{
    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if iou(&xs[prev_index], &xs[index]) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 12关键点人体骨架连接关系(用于下游渲染)
pub const JOINT_PAIRS: [(usize, usize); 12] = [
    (0, 1),
    (0, 2),
    (2, 4),
    (1, 3),
    (3, 5),
    (0, 6),
    (1, 7),
    (6, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (9, 11),
];

/// 检测框(原图坐标系, x/y为左上角)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn xmax(&self) -> f32 {
        self.x + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// 轴对齐交集面积, 不相交返回0。宽高须非负(由调用方裁剪保证)。
    pub fn intersection_area(&self, another: &Rect) -> f32 {
        let l = self.x.max(another.x);
        let r = self.xmax().min(another.xmax());
        let t = self.y.max(another.y);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &Rect) -> f32 {
        let inter = self.intersection_area(another);
        let union = self.area() + another.area() - inter;
        if union <= 0. {
            return 0.;
        }
        inter / union
    }
}

/// 带置信度的2D点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

/// 人脸关键点: 坐标 + 置信度 + 部位编号
/// 106点家族部位: 0轮廓 1眉毛 2鼻子 3眼睛 4嘴巴
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FacePoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
    pub part: usize,
}

/// 单个检测结果
///
/// 每次detect调用重新生成, 在解码→NMS→坐标还原链内部修改,
/// 返回后所有权完全转移给调用方, 不跨帧保留。
#[derive(Debug, Clone, Default)]
pub struct DetectedObject {
    pub rect: Rect,
    pub label: usize,
    pub score: f32,
    /// 实例分割掩码, 原图大小(width*height)行主序, 取值[0,1];
    /// 仅分割模型填充。二值化(>=0.5)是消费方策略。
    pub mask: Option<Vec<f32>>,
    /// 掩码重建的中间量(32维嵌入向量), 单独无意义
    pub mask_embedding: Option<Vec<f32>>,
    /// 人体姿态关键点(12个, 顺序由模型家族固定)
    pub pose_keypoints: Vec<Point2>,
    /// 人脸关键点
    pub face_landmarks: Vec<FacePoint>,
}

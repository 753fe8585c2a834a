// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 运行时配置。字段可在帧间热更新, 单次detect内读到的值保持一致。

use serde::{Deserialize, Serialize};

/// 网络输入边长只有两档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputSize {
    #[default]
    Small,
    Large,
}

impl InputSize {
    pub fn pixels(&self) -> u32 {
        match self {
            InputSize::Small => 320,
            InputSize::Large => 640,
        }
    }

    /// 配置约定: 0 → 320, 其余 → 640
    pub fn from_id(id: i32) -> Self {
        if id == 0 {
            InputSize::Small
        } else {
            InputSize::Large
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// 置信度阈值
    pub prob_threshold: f32,
    /// NMS IoU阈值
    pub nms_threshold: f32,
    /// 激活的模型id(见ModelKind::from_id)
    pub model_id: i32,
    pub input_size: InputSize,
    /// 是否启用目标跟踪
    pub track_enabled: bool,
    /// 是否绘制运动轨迹
    pub trail_enabled: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            prob_threshold: 0.45,
            nms_threshold: 0.65,
            model_id: 1,
            input_size: InputSize::Small,
            track_enabled: false,
            trail_enabled: false,
        }
    }
}

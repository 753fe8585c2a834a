// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 原始张量解码算法。解码器只做数值计算, 不碰像素, 不做日志。

pub mod grid;
pub mod heatmap;
pub mod keypoint;
pub mod mask;

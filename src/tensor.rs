// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 张量视图与推理引擎边界。
// 解码核心只要求按(通道,行,列)或扁平索引随机读取float,
// 不依赖引擎的执行方式。

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use image::DynamicImage;
use ndarray::{Array, ArrayView1, Axis, IxDyn};

/// 稠密float张量视图
///
/// 形状约定: 检测头输出为(行,列), 特征图输出为(通道,高,宽)。
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Array<f32, IxDyn>,
}

impl Tensor {
    pub fn new(data: Array<f32, IxDyn>) -> Self {
        Self { data }
    }

    pub fn from_shape_vec(shape: &[usize], v: Vec<f32>) -> Result<Self> {
        let data = Array::from_shape_vec(IxDyn(shape), v)?;
        Ok(Self { data })
    }

    pub fn data(&self) -> &Array<f32, IxDyn> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn dim(&self, axis: usize) -> usize {
        self.data.shape().get(axis).copied().unwrap_or(0)
    }

    /// (通道,高,宽)布局的通道数
    pub fn channels(&self) -> usize {
        self.dim(0)
    }

    pub fn height(&self) -> usize {
        self.dim(self.ndim() - 2)
    }

    pub fn width(&self) -> usize {
        self.dim(self.ndim() - 1)
    }

    /// (行,列)布局的行数
    pub fn rows(&self) -> usize {
        self.dim(0)
    }

    pub fn cols(&self) -> usize {
        self.dim(1)
    }

    /// 按(通道,行,列)读取, 越界返回None — 边界检查是结构性的,
    /// 解码器不再各自重推指针偏移。
    pub fn get3(&self, c: usize, y: usize, x: usize) -> Option<f32> {
        self.data.get(IxDyn(&[c, y, x])).copied()
    }

    /// 按通道内扁平索引读取(通道按行主序展开)
    pub fn channel_flat(&self, c: usize, i: usize) -> Option<f32> {
        let (h, w) = (self.height(), self.width());
        if w == 0 || i >= h * w {
            return None;
        }
        self.get3(c, i / w, i % w)
    }

    /// 连续内存的扁平视图(标准布局下总是可用)
    pub fn as_flat(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }

    /// (行,列)布局的一行。非二维张量(引擎输出形状异常)返回错误,
    /// 由解码器向上传播, 不在这里panic。
    pub fn row(&self, i: usize) -> Result<ArrayView1<'_, f32>> {
        self.data
            .index_axis(Axis(0), i)
            .into_dimensionality()
            .map_err(|_| anyhow!("张量不是(行,列)布局: 形状{:?}", self.shape()))
    }
}

/// 推理引擎的命名输出集合
#[derive(Debug, Default)]
pub struct TensorMap {
    map: HashMap<String, Tensor>,
}

impl TensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.map.insert(name.into(), tensor);
    }

    /// 取命名输出。缺失即本次detect的致命错误:
    /// 下游几何计算假定全部张量存在, 不做静默兜底。
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.map
            .get(name)
            .ok_or_else(|| anyhow!("推理引擎未产出期望的输出张量 `{name}`"))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// 外部推理引擎接口
///
/// 像素预处理(缩放/letterbox填充/归一化)与张量执行都在引擎侧完成;
/// 本核心只负责几何参数的计算与输出张量的解码。
pub trait Engine: Send {
    /// 对一帧图像以指定输入尺寸执行一次前向推理, 返回命名输出张量
    fn infer(&mut self, image: &DynamicImage, width: u32, height: u32) -> Result<TensorMap>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get3_bounds() {
        let t = Tensor::from_shape_vec(&[2, 2, 3], (0..12).map(|v| v as f32).collect()).unwrap();
        assert_eq!(t.get3(0, 0, 0), Some(0.0));
        assert_eq!(t.get3(1, 1, 2), Some(11.0));
        assert_eq!(t.get3(2, 0, 0), None);
        assert_eq!(t.get3(0, 0, 3), None);
    }

    #[test]
    fn test_channel_flat() {
        let t = Tensor::from_shape_vec(&[1, 2, 3], (0..6).map(|v| v as f32).collect()).unwrap();
        assert_eq!(t.channel_flat(0, 4), Some(4.0));
        assert_eq!(t.channel_flat(0, 6), None);
    }

    #[test]
    fn test_missing_tensor_is_error() {
        let m = TensorMap::new();
        assert!(m.get("output").is_err());
    }

    #[test]
    fn test_row_requires_2d() {
        // 行列数检查拦不住多出一维的输出, row自身必须报错
        let t = Tensor::from_shape_vec(&[1, 2, 3], vec![0.; 6]).unwrap();
        assert!(t.row(0).is_err());
        let t = Tensor::from_shape_vec(&[2, 3], vec![0.; 6]).unwrap();
        assert!(t.row(1).is_ok());
    }
}

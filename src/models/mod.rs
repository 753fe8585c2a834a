// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 模型家族: 每个家族一个文件, 封装该家族的张量名约定、
// 解码算法组合与坐标还原流程。

pub mod combined;
pub mod dbface;
pub mod facemark;
pub mod nanodet;
pub mod simple_pose;
pub mod yolov8;
pub mod yolov8_seg;

use anyhow::{bail, Result};
use image::DynamicImage;

use crate::config::InputSize;
use crate::tensor::Engine;
use crate::DetectedObject;

pub use combined::CombinedDetector;
pub use dbface::DbFaceDetector;
pub use facemark::FaceLandmarkDetector;
pub use nanodet::NanoDetDetector;
pub use simple_pose::SimplePoseDetector;
pub use yolov8::YoloDetector;
pub use yolov8_seg::YoloSegDetector;

/// COCO 80类
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub const PERSON_CLASSES: [&str; 2] = ["person", "person"];
pub const FACE_CLASSES: [&str; 1] = ["Face"];
pub const PERSON_FACE_CLASSES: [&str; 2] = ["Person", "Face"];

/// 配置整数id对应的具体模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    YoloV8n,
    YoloV8s,
    YoloV8Seg,
    NanoDet,
    SimplePose,
    DbFace,
    FaceLandmark,
    CombinedPoseFace,
}

impl ModelKind {
    pub fn from_id(id: i32) -> Result<Self> {
        Ok(match id {
            1 => ModelKind::YoloV8n,
            2 => ModelKind::YoloV8s,
            3 => ModelKind::YoloV8Seg,
            4 => ModelKind::NanoDet,
            5 => ModelKind::SimplePose,
            6 => ModelKind::DbFace,
            7 => ModelKind::FaceLandmark,
            8 => ModelKind::CombinedPoseFace,
            _ => bail!("未知的模型id: {id}"),
        })
    }
}

/// 按模型名提供推理引擎。多阶段家族会索取多个引擎实例。
pub trait EngineProvider {
    fn engine(&mut self, model_name: &str) -> Result<Box<dyn Engine>>;
}

/// 闭合的模型家族集合, 变体即分发
pub enum ModelFamily {
    Yolo(YoloDetector),
    YoloSeg(YoloSegDetector),
    NanoDet(NanoDetDetector),
    SimplePose(SimplePoseDetector),
    DbFace(DbFaceDetector),
    FaceLandmark(FaceLandmarkDetector),
    Combined(CombinedDetector),
}

impl ModelFamily {
    /// 工厂: 配置id → 家族实例, 引擎按模型名向provider索取
    pub fn load(
        kind: ModelKind,
        input_size: InputSize,
        provider: &mut dyn EngineProvider,
    ) -> Result<Self> {
        let target = input_size.pixels();
        Ok(match kind {
            ModelKind::YoloV8n => {
                ModelFamily::Yolo(YoloDetector::new(provider.engine("YoloV8n")?, target))
            }
            ModelKind::YoloV8s => {
                ModelFamily::Yolo(YoloDetector::new(provider.engine("YoloV8s")?, target))
            }
            ModelKind::YoloV8Seg => {
                ModelFamily::YoloSeg(YoloSegDetector::new(provider.engine("Yolov8Seg")?, target))
            }
            ModelKind::NanoDet => {
                ModelFamily::NanoDet(NanoDetDetector::new(provider.engine("NanoDet")?, target))
            }
            ModelKind::SimplePose => ModelFamily::SimplePose(SimplePoseDetector::new(
                provider.engine("PersonDetector")?,
                provider.engine("SimplePose")?,
                target,
            )),
            ModelKind::DbFace => {
                ModelFamily::DbFace(DbFaceDetector::new(provider.engine("DbFace")?, target))
            }
            ModelKind::FaceLandmark => ModelFamily::FaceLandmark(FaceLandmarkDetector::new(
                provider.engine("YoloFace-500k")?,
                provider.engine("LandMark106")?,
            )),
            ModelKind::CombinedPoseFace => ModelFamily::Combined(CombinedDetector::new(
                provider.engine("PersonDetector")?,
                provider.engine("SimplePose")?,
                provider.engine("DbFace")?,
                target,
            )),
        })
    }

    pub fn detect(
        &mut self,
        image: &DynamicImage,
        prob_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectedObject>> {
        match self {
            ModelFamily::Yolo(m) => m.detect(image, prob_threshold, nms_threshold),
            ModelFamily::YoloSeg(m) => m.detect(image, prob_threshold, nms_threshold),
            ModelFamily::NanoDet(m) => m.detect(image, prob_threshold, nms_threshold),
            ModelFamily::SimplePose(m) => m.detect(image, prob_threshold, nms_threshold),
            ModelFamily::DbFace(m) => m.detect(image, prob_threshold, nms_threshold),
            ModelFamily::FaceLandmark(m) => m.detect(image, prob_threshold, nms_threshold),
            ModelFamily::Combined(m) => m.detect(image, prob_threshold, nms_threshold),
        }
    }

    /// 类别名表, 下游标注与摘要统计共用
    pub fn class_names(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::Yolo(_) | ModelFamily::YoloSeg(_) | ModelFamily::NanoDet(_) => {
                &COCO_CLASSES
            }
            ModelFamily::SimplePose(_) => &PERSON_CLASSES,
            ModelFamily::DbFace(_) | ModelFamily::FaceLandmark(_) => &FACE_CLASSES,
            ModelFamily::Combined(_) => &PERSON_FACE_CLASSES,
        }
    }
}

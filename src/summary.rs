// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 单帧检测摘要: 耗时、FPS与按类别统计的可读文本。
// 摘要随检测结果一起按值返回, 调用方自行决定保留多久。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DetectedObject;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectSummary {
    /// 整帧耗时(毫秒)
    pub all_time_ms: f32,
    /// 推理引擎耗时(毫秒)
    pub infer_time_ms: f32,
    pub fps: f32,
    /// "Detect_Info: 3 target, 2 person, 1 dog" 形式的单行日志
    pub log_text: String,
    /// 每类一条 "name: count"
    pub class_info: Vec<String>,
}

/// 按标签升序统计类别计数, 生成日志行和计数列表
pub fn summarize_classes(
    objects: &[DetectedObject],
    class_names: &[&str],
) -> (String, Vec<String>) {
    let mut cls_count: BTreeMap<usize, usize> = BTreeMap::new();
    for obj in objects {
        *cls_count.entry(obj.label).or_insert(0) += 1;
    }
    let mut log_text = String::new();
    let mut class_info = Vec::new();
    if !cls_count.is_empty() {
        let total: usize = cls_count.values().sum();
        log_text += &format!("Detect_Info: {total} target, ");
        let mut first = true;
        for (&label, &count) in &cls_count {
            let name = class_names.get(label).copied().unwrap_or("unknown");
            if !first {
                log_text += ", ";
            }
            log_text += &format!("{count} {name}");
            class_info.push(format!("{name}: {count}"));
            first = false;
        }
    }
    (log_text, class_info)
}

impl DetectSummary {
    pub fn build(
        objects: &[DetectedObject],
        class_names: &[&str],
        all_time_ms: f32,
        infer_time_ms: f32,
    ) -> Self {
        let fps = if all_time_ms > 0. {
            1000.0 / all_time_ms
        } else {
            0.0
        };
        let (log_text, class_info) = summarize_classes(objects, class_names);
        Self {
            all_time_ms,
            infer_time_ms,
            fps,
            log_text,
            class_info,
        }
    }
}

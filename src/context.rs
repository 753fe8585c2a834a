// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测上下文: 当前模型家族 + 配置。
// detect与swap_model都走&mut self, 互斥由所有权保证, 不需要锁;
// 摘要作为返回值交给调用方, 没有共享的"最近一帧"状态。

use std::time::Instant;

use anyhow::Result;
use image::DynamicImage;

use crate::config::InferenceConfig;
use crate::models::{EngineProvider, ModelFamily, ModelKind};
use crate::summary::DetectSummary;
use crate::DetectedObject;

pub struct DetectContext {
    family: ModelFamily,
    config: InferenceConfig,
}

impl DetectContext {
    pub fn new(config: InferenceConfig, provider: &mut dyn EngineProvider) -> Result<Self> {
        let kind = ModelKind::from_id(config.model_id)?;
        let family = ModelFamily::load(kind, config.input_size, provider)?;
        println!("✅ 模型已加载: id={} size={}", config.model_id, config.input_size.pixels());
        Ok(Self { family, config })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// 帧间更新阈值类配置(模型id与输入尺寸变化走swap_model)
    pub fn set_thresholds(&mut self, prob_threshold: f32, nms_threshold: f32) {
        self.config.prob_threshold = prob_threshold;
        self.config.nms_threshold = nms_threshold;
    }

    pub fn set_track_enabled(&mut self, enabled: bool) {
        self.config.track_enabled = enabled;
    }

    pub fn set_trail_enabled(&mut self, enabled: bool) {
        self.config.trail_enabled = enabled;
    }

    /// 热切换模型家族。持有&mut self, 不可能与进行中的detect交错。
    pub fn swap_model(
        &mut self,
        model_id: i32,
        provider: &mut dyn EngineProvider,
    ) -> Result<()> {
        let kind = ModelKind::from_id(model_id)?;
        self.family = ModelFamily::load(kind, self.config.input_size, provider)?;
        self.config.model_id = model_id;
        println!("🔁 模型已切换: id={model_id}");
        Ok(())
    }

    /// 单帧检测入口: 解码结果 + 本帧摘要
    pub fn detect(
        &mut self,
        image: &DynamicImage,
    ) -> Result<(Vec<DetectedObject>, DetectSummary)> {
        let t0 = Instant::now();
        let objects = self.family.detect(
            image,
            self.config.prob_threshold,
            self.config.nms_threshold,
        )?;
        let infer_time_ms = t0.elapsed().as_secs_f32() * 1000.0;
        let all_time_ms = t0.elapsed().as_secs_f32() * 1000.0;
        // 解码与推理在同一次引擎调用里完成, 两个耗时此处同源
        let summary = DetectSummary::build(
            &objects,
            self.family.class_names(),
            all_time_ms,
            infer_time_ms,
        );
        Ok((objects, summary))
    }

    pub fn class_names(&self) -> &'static [&'static str] {
        self.family.class_names()
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 视频流检测工作线程。
// 帧进结果出都走有界crossbeam通道; 配置更新走独立通道, 帧间生效;
// 取消是协作式的: 每轮循环检查一次标志, 在途帧总是解码完成。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use image::{DynamicImage, RgbImage};

use crate::context::DetectContext;
use crate::summary::DetectSummary;
use crate::DetectedObject;

/// 解码后的一帧RGB数据(行主序, 3字节/像素)
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub rgb_data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

/// 一帧的检测产出
#[derive(Debug, Clone)]
pub struct StreamResult {
    pub objects: Vec<DetectedObject>,
    pub summary: DetectSummary,
}

/// 帧间生效的运行时配置更新
#[derive(Debug, Clone, Copy)]
pub enum ConfigMessage {
    SetProbThreshold(f32),
    SetNmsThreshold(f32),
    SetTrack(bool),
    SetTrail(bool),
}

/// 协作式停止标志
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct StreamWorker {
    pub frame_tx: Sender<DecodedFrame>,
    pub result_rx: Receiver<StreamResult>,
    pub config_tx: Sender<ConfigMessage>,
    pub cancel: CancelToken,
    pub handle: JoinHandle<()>,
}

impl StreamWorker {
    /// 启动工作线程, 上下文所有权移交给线程
    pub fn spawn(context: DetectContext, queue_depth: usize) -> Self {
        let (frame_tx, frame_rx) = bounded::<DecodedFrame>(queue_depth);
        let (result_tx, result_rx) = bounded::<StreamResult>(queue_depth);
        let (config_tx, config_rx) = bounded::<ConfigMessage>(16);
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = thread::spawn(move || {
            run_worker(context, frame_rx, result_tx, config_rx, token);
        });
        Self {
            frame_tx,
            result_rx,
            config_tx,
            cancel,
            handle,
        }
    }

    /// 请求停止并等待线程退出
    pub fn shutdown(self) {
        self.cancel.cancel();
        drop(self.frame_tx);
        let _ = self.handle.join();
    }
}

fn frame_to_image(frame: &DecodedFrame) -> Result<DynamicImage> {
    let rgb = RgbImage::from_raw(frame.width, frame.height, frame.rgb_data.as_ref().clone())
        .ok_or_else(|| anyhow::anyhow!("帧缓冲长度与{}x{}不符", frame.width, frame.height))?;
    Ok(DynamicImage::ImageRgb8(rgb))
}

fn apply_config(context: &mut DetectContext, msg: ConfigMessage) {
    let prob = context.config().prob_threshold;
    let nms = context.config().nms_threshold;
    match msg {
        ConfigMessage::SetProbThreshold(v) => context.set_thresholds(v, nms),
        ConfigMessage::SetNmsThreshold(v) => context.set_thresholds(prob, v),
        ConfigMessage::SetTrack(v) => context.set_track_enabled(v),
        ConfigMessage::SetTrail(v) => context.set_trail_enabled(v),
    }
}

fn run_worker(
    mut context: DetectContext,
    frame_rx: Receiver<DecodedFrame>,
    result_tx: Sender<StreamResult>,
    config_rx: Receiver<ConfigMessage>,
    cancel: CancelToken,
) {
    println!("✅ 检测线程已启动");
    while let Ok(frame) = frame_rx.recv() {
        // 每轮检查一次, 当前帧总是处理完才退出
        if cancel.is_cancelled() {
            break;
        }
        // 帧间吸收全部待处理配置更新
        while let Ok(msg) = config_rx.try_recv() {
            apply_config(&mut context, msg);
        }
        let image = match frame_to_image(&frame) {
            Ok(image) => image,
            Err(e) => {
                eprintln!("❌ 跳过无效帧: {e}");
                continue;
            }
        };
        match context.detect(&image) {
            Ok((objects, summary)) => {
                if result_tx
                    .send(StreamResult { objects, summary })
                    .is_err()
                {
                    break; // 消费端已关闭
                }
            }
            Err(e) => {
                eprintln!("❌ 检测失败: {e}");
            }
        }
    }
    println!("🔚 检测线程退出");
}

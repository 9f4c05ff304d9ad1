//! 相机实例 (Camera)
//!
//! 每个实例拥有一个帧源、一个检测器和一个跟踪管理器, 在独立工作线程中逐帧处理:
//! 读取 → 缩放 → (采样) 更新跟踪 → 检测 → 关联 → 发送事件。
//!
//! 控制调用与事件投递共用一把锁, 监听器在持锁状态下被调用,
//! 因此 `stop()` 返回后不会再有事件投递。

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::detection::{Detector, MotionDetector, MotionParams};
use crate::event::{encode_jpeg, CameraEvent, EventSink};
use crate::input::{downscale, FrameSource};
use crate::tracking::{Counts, Orientation, TrackerBackend, TrackerKind, TrackingManager};

/// 暂停时的轮询间隔
const PAUSE_POLL: Duration = Duration::from_millis(50);

/// 快进/快退的帧数
pub const FRAME_STEP: i64 = 5;

/// 工作线程与控制线程共享的状态
#[derive(Default)]
struct Shared {
    stop: bool,
    play: bool,
    paused: bool,
    running: bool,
    listener: Option<Box<dyn EventSink + Send>>,

    // 控制请求, 工作线程在下一帧开始时处理
    line_adjustments: Vec<(Orientation, f32)>,
    clear_requested: bool,
    seeks: Vec<i64>,

    // 每帧结束后发布
    counts: Counts,
    active: usize,
    offset: u64,
}

impl Shared {
    fn deliver(&mut self, event: CameraEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_event(event);
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 工作线程持有的处理流水线
struct Pipeline {
    config: TrackerConfig,
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    manager: TrackingManager,
}

impl Pipeline {
    fn run(mut self, shared: Arc<Mutex<Shared>>) {
        info!(
            "▶️  相机工作线程启动: 检测器 {}, 跳帧 {}",
            self.detector.name(),
            self.config.skip_count
        );
        let mut events = Vec::new();
        let mut processed = 0u64;

        loop {
            {
                let mut s = lock(&shared);
                if s.stop {
                    break;
                }
                if s.paused {
                    drop(s);
                    thread::sleep(PAUSE_POLL);
                    continue;
                }
                for (orientation, delta) in s.line_adjustments.drain(..) {
                    self.manager.set_reference_line(orientation, delta);
                }
                if mem::take(&mut s.clear_requested) {
                    self.manager.clear_all_contexts();
                }
                for step in s.seeks.drain(..) {
                    self.seek_by(step);
                }
            }

            let frame = match self.source.read() {
                Some(frame) => frame,
                None if self.source.has_ended() => {
                    // 空源回绕后仍读不到帧, 直接结束
                    if self.config.loop_playback && self.source.current_offset() > 0 {
                        info!("🔁 播放结束, 回绕到第一帧");
                        self.source.rewind();
                        self.manager.rewind();
                        continue;
                    }
                    info!("🏁 播放结束");
                    break;
                }
                None => {
                    warn!("❌ 读取第 {} 帧失败, 停止处理", self.source.current_offset());
                    break;
                }
            };

            let frame = match downscale(frame, self.config.max_frame_width) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("❌ 帧缩放失败: {:#}", e);
                    continue;
                }
            };

            if self.source.current_offset() % self.config.skip_count.saturating_add(1) == 0 {
                self.process(&frame, &mut events);
                processed += 1;
            }

            let mut s = lock(&shared);
            if s.play {
                match encode_jpeg(&frame) {
                    Ok(jpeg) => events.push(CameraEvent::Frame {
                        width: frame.width(),
                        height: frame.height(),
                        jpeg,
                    }),
                    Err(e) => warn!("❌ 播放帧编码失败: {:#}", e),
                }
            }
            for event in events.drain(..) {
                s.deliver(event);
            }
            s.counts = self.manager.counts();
            s.active = self.manager.active_count();
            s.offset = self.source.current_offset();
        }

        let mut s = lock(&shared);
        s.deliver(CameraEvent::Stop);
        s.running = false;
        info!(
            "⏹️  相机工作线程退出: 处理 {} 帧, 计数 {:?}",
            processed,
            self.manager.counts()
        );
    }

    /// 相对当前位置移动帧源, 越界时保持不动
    ///
    /// 轨迹不清空, 跳跃过大的轨迹由跟踪器失败或丢失判定自然退役。
    fn seek_by(&mut self, step: i64) {
        let from = self.source.current_offset();
        let target = i64::try_from(from).ok().and_then(|f| f.checked_add(step));
        match target.and_then(|t| u64::try_from(t).ok()) {
            Some(to) if self.source.seek(to) => info!("⏩ 跳转: 第 {} 帧 → 第 {} 帧", from, to),
            _ => debug!("⏩ 跳转 {:+} 超出范围 (当前第 {} 帧), 忽略", step, from),
        }
    }

    /// 单帧: 更新跟踪 → 检测 → 关联
    fn process(&mut self, frame: &RgbImage, events: &mut Vec<CameraEvent>) {
        let update = self.manager.update(frame, events);
        let detections = self.detector.detect(frame);
        let association = self.manager.associate(frame, &detections);
        if !update.retired.is_empty() || !association.spawned.is_empty() {
            debug!(
                "🧮 帧 {}: 检测 {} | 新建 {} | 退役 {} | 活跃 {}",
                self.source.current_offset(),
                detections.len(),
                association.spawned.len(),
                update.retired.len(),
                self.manager.active_count()
            );
        }
    }
}

pub struct Camera {
    shared: Arc<Mutex<Shared>>,
    pipeline: Option<Pipeline>,
    worker: Option<JoinHandle<()>>,
}

impl Camera {
    pub fn new(
        config: TrackerConfig,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        backend: Box<dyn TrackerBackend>,
    ) -> Self {
        let manager = TrackingManager::new(&config, backend);
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            pipeline: Some(Pipeline {
                config,
                source,
                detector,
                manager,
            }),
            worker: None,
        }
    }

    /// 运动检测器 + 配置中指定的跟踪器
    pub fn from_config(config: TrackerConfig, source: Box<dyn FrameSource>) -> Result<Self> {
        let kind = TrackerKind::from_name(&config.tracker)
            .ok_or_else(|| anyhow!("未知跟踪器: {}", config.tracker))?;
        let detector = MotionDetector::new(MotionParams::from_config(&config));
        Ok(Self::new(config, source, Box::new(detector), Box::new(kind)))
    }

    /// 启动工作线程 (只能启动一次)
    pub fn start(&mut self) -> Result<()> {
        let Some(pipeline) = self.pipeline.take() else {
            bail!("相机已启动");
        };
        {
            let mut s = lock(&self.shared);
            s.stop = false;
            s.running = true;
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(String::from("camera"))
            .spawn(move || pipeline.run(shared))
            .context("无法创建相机工作线程")?;
        self.worker = Some(handle);
        Ok(())
    }

    /// 请求停止并等待工作线程退出
    pub fn stop(&mut self) {
        lock(&self.shared).stop = true;
        self.join();
    }

    /// 等待工作线程自然结束 (非循环播放时读完即结束)
    pub fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("❌ 相机工作线程异常退出");
                lock(&self.shared).running = false;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared).running
    }

    /// 开始推送 JPEG 帧
    pub fn play(&self) {
        let mut s = lock(&self.shared);
        s.play = true;
        s.paused = false;
    }

    pub fn stop_play(&self) {
        lock(&self.shared).play = false;
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.shared).play
    }

    pub fn pause(&self) {
        lock(&self.shared).paused = true;
    }

    pub fn resume(&self) {
        lock(&self.shared).paused = false;
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.shared).paused
    }

    /// 安装事件监听器 (替换旧的)
    pub fn subscribe(&self, listener: impl EventSink + Send + 'static) {
        lock(&self.shared).listener = Some(Box::new(listener));
    }

    pub fn unsubscribe(&self) {
        lock(&self.shared).listener = None;
    }

    /// 调整参考线 (下一帧生效)
    pub fn set_reference_line(&self, orientation: Orientation, delta: f32) {
        lock(&self.shared)
            .line_adjustments
            .push((orientation, delta));
    }

    /// 快进 FRAME_STEP 帧 (下一帧生效)
    pub fn forward(&self) {
        lock(&self.shared).seeks.push(FRAME_STEP);
    }

    /// 快退 FRAME_STEP 帧 (下一帧生效)
    pub fn backward(&self) {
        lock(&self.shared).seeks.push(-FRAME_STEP);
    }

    /// 清空所有轨迹 (下一帧生效)
    pub fn clear_all_contexts(&self) {
        lock(&self.shared).clear_requested = true;
    }

    pub fn active_count(&self) -> usize {
        lock(&self.shared).active
    }

    pub fn counts(&self) -> Counts {
        lock(&self.shared).counts
    }

    /// 最近处理的帧序号
    pub fn frame_offset(&self) -> u64 {
        lock(&self.shared).offset
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

//! 相机事件与监听器
//! Camera events and listener abstraction
//!
//! 轨迹退役时发送 `trail`, 播放模式下每帧发送 `frame`, 实例停止时发送 `stop`。
//! 监听器在实例的工作线程中、持有实例锁时被调用, 不得回调跟踪管理器。

use std::io::Cursor;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use image::{ImageFormat, RgbImage};
use serde::Serialize;

use crate::geometry::Point;
use crate::tracking::{Demography, RetireReason};

/// 轨迹事件 (退役汇总)
#[derive(Debug, Clone, Serialize)]
pub struct TrailEvent {
    pub id: u64,
    /// 轨迹中心点 (时间顺序)
    pub path: Vec<Point>,
    pub demography: Option<Demography>,
    pub reason: RetireReason,
    /// 是否已计入过线计数
    pub counted: bool,
    pub retired_at: String,
    /// 代表性缩略图 (JPEG)
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CameraEvent {
    Trail(TrailEvent),
    Frame {
        width: u32,
        height: u32,
        #[serde(skip)]
        jpeg: Vec<u8>,
    },
    Stop,
}

/// JPEG 编码 (缩略图 / 播放帧)
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Jpeg)
        .with_context(|| format!("JPEG 编码失败 ({}x{})", image.width(), image.height()))?;
    Ok(buf.into_inner())
}

/// 事件监听器
pub trait EventSink {
    fn on_event(&mut self, event: CameraEvent);
}

/// 收集到 Vec (测试/离线处理)
impl EventSink for Vec<CameraEvent> {
    fn on_event(&mut self, event: CameraEvent) {
        self.push(event);
    }
}

/// 转发到通道 (接收端已关闭时丢弃)
impl EventSink for Sender<CameraEvent> {
    fn on_event(&mut self, event: CameraEvent) {
        let _ = self.send(event);
    }
}

/// 闭包监听器
pub struct Listener<F>(pub F);

impl<F: FnMut(CameraEvent)> EventSink for Listener<F> {
    fn on_event(&mut self, event: CameraEvent) {
        (self.0)(event)
    }
}

/// 不关心事件时使用
pub struct Discard;

impl EventSink for Discard {
    fn on_event(&mut self, _event: CameraEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_kind_tag() {
        let stop = serde_json::to_value(CameraEvent::Stop).unwrap();
        assert_eq!(stop["kind"], "stop");

        let trail = CameraEvent::Trail(TrailEvent {
            id: 7,
            path: vec![Point::new(1.0, 2.0)],
            demography: None,
            reason: RetireReason::Frozen,
            counted: true,
            retired_at: String::from("now"),
            thumbnail: Some(vec![1, 2, 3]),
        });
        let json = serde_json::to_value(&trail).unwrap();
        assert_eq!(json["kind"], "trail");
        assert_eq!(json["id"], 7);
        assert_eq!(json["reason"], "frozen");
        assert!(json.get("thumbnail").is_none());
    }

    #[test]
    fn test_channel_and_closure_sinks() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sink = tx;
        sink.on_event(CameraEvent::Stop);
        assert!(matches!(rx.try_recv(), Ok(CameraEvent::Stop)));

        let mut seen = 0;
        let mut listener = Listener(|_e: CameraEvent| seen += 1);
        listener.on_event(CameraEvent::Stop);
        listener.on_event(CameraEvent::Stop);
        drop(listener);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let jpeg = encode_jpeg(&RgbImage::new(16, 8)).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod camera; // 相机实例与工作线程
pub mod config; // 跟踪配置参数
pub mod detection; // 检测接口与运动检测
pub mod event; // 相机事件与监听器
pub mod geometry; // 矩形/点几何运算
pub mod input; // 帧源与缩放
pub mod tracking; // 轨迹管理与过线计数

pub use crate::camera::Camera;
pub use crate::config::TrackerConfig;
pub use crate::detection::{Detection, Detector, MotionDetector, MotionParams};
pub use crate::event::{CameraEvent, EventSink, Listener, TrailEvent};
pub use crate::geometry::{Point, Rect};
pub use crate::input::{FrameSource, ImageSequence, MemorySource};
pub use crate::tracking::{
    AssociationPolicy, Counts, Orientation, RetireReason, TrackerBackend, TrackerKind,
    TrackingManager, VisualTracker,
};

/// 时间戳字符串 (北京时间), 各字段以 `delimiter` 分隔
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = match chrono::FixedOffset::east_opt(8 * 60 * 60) {
        Some(offset) => chrono::Utc::now().with_timezone(&offset),
        None => chrono::Utc::now().fixed_offset(),
    };
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

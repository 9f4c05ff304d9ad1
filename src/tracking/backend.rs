//! 单目标视觉跟踪器统一接口
//! Visual tracker capability interface
//!
//! 每个 TrackingContext 独占一个跟踪器句柄 (Box<dyn VisualTracker>),
//! 句柄在上下文创建时初始化, 在退役时随上下文一起释放。

use anyhow::{bail, Result};
use image::RgbImage;
use phf::phf_map;

use super::kalman::KalmanTracker;
use super::template::TemplateTracker;
use crate::geometry::{inside_frame, Rect};

/// 已初始化的跟踪器句柄
pub trait VisualTracker: Send {
    /// 在新帧上更新区域, 返回 None 表示跟踪失败
    fn update(&mut self, frame: &RgbImage) -> Option<Rect>;

    /// 关联到检测框后的校正 (默认忽略)
    fn correct(&mut self, _region: &Rect) {}
}

/// 跟踪器后端: 负责创建句柄
pub trait TrackerBackend: Send {
    fn init(&self, frame: &RgbImage, region: &Rect) -> Result<Box<dyn VisualTracker>>;

    fn name(&self) -> &str;
}

/// 内置跟踪器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerKind {
    /// 归一化互相关模板跟踪 (相关滤波类)
    Template,
    /// 卡尔曼匀速运动模型 (由检测框校正)
    Kalman,
}

static TRACKER_KINDS: phf::Map<&'static str, TrackerKind> = phf_map! {
    "template" => TrackerKind::Template,
    "ncc" => TrackerKind::Template,
    "kcf" => TrackerKind::Template,
    "csrt" => TrackerKind::Template,
    "kalman" => TrackerKind::Kalman,
    "sort" => TrackerKind::Kalman,
    "bytetrack" => TrackerKind::Kalman,
};

impl TrackerKind {
    /// 从名称解析 (不区分大小写)
    pub fn from_name(name: &str) -> Option<Self> {
        TRACKER_KINDS.get(name.to_lowercase().as_str()).copied()
    }
}

impl TrackerBackend for TrackerKind {
    fn init(&self, frame: &RgbImage, region: &Rect) -> Result<Box<dyn VisualTracker>> {
        if !inside_frame(region, frame.width(), frame.height()) {
            bail!("初始区域超出帧范围: {:?}", region);
        }
        match self {
            TrackerKind::Template => Ok(Box::new(TemplateTracker::new(frame, region)?)),
            TrackerKind::Kalman => Ok(Box::new(KalmanTracker::new(region))),
        }
    }

    fn name(&self) -> &str {
        match self {
            TrackerKind::Template => "template",
            TrackerKind::Kalman => "kalman",
        }
    }
}

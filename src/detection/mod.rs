/// 检测系统 (Detection System)
///
/// - Detector:       帧 → 候选框 (+ 可选年龄/性别)
/// - MotionDetector: 背景差分运动检测
pub mod motion;
pub mod types;

use image::RgbImage;

pub use motion::{MotionDetector, MotionParams};
pub use types::Detection;

/// 目标检测器
///
/// 失败时返回空结果, 不中断处理循环。
pub trait Detector: Send {
    fn detect(&mut self, frame: &RgbImage) -> Vec<Detection>;

    fn name(&self) -> &str {
        "detector"
    }
}

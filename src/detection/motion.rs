//! 运动检测器 (背景差分)
//!
//! 灰度 → 高斯模糊 → 与基准帧做差 → 二值化 → 膨胀 → 外轮廓
//! → 面积/横向/互相重叠过滤 → 外接矩形。
//! 第一帧 (或 `mark_base_frame` 之后的下一帧) 作为基准帧。

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors2;
use imageproc::morphology::dilate;
use tracing::debug;

use super::{Detection, Detector};
use crate::config::TrackerConfig;
use crate::geometry::{overlaps, Rect};

/// 运动检测参数
#[derive(Debug, Clone, PartialEq)]
pub struct MotionParams {
    pub min_area: f64,
    pub exclude_horizontal: bool,
    pub diff_threshold: u8,
    pub blur_sigma: f32,
    pub dilate_iterations: u8,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

impl MotionParams {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            min_area: config.motion_min_area,
            exclude_horizontal: config.motion_exclude_horizontal,
            diff_threshold: config.motion_diff_threshold,
            blur_sigma: config.motion_blur_sigma,
            dilate_iterations: config.motion_dilate_iterations,
        }
    }
}

pub struct MotionDetector {
    params: MotionParams,
    base: Option<GrayImage>,
}

impl MotionDetector {
    pub fn new(params: MotionParams) -> Self {
        Self { params, base: None }
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    /// 丢弃基准帧, 下一帧成为新的基准
    pub fn mark_base_frame(&mut self) {
        self.base = None;
    }

    fn preprocess(&self, frame: &RgbImage) -> GrayImage {
        let gray = imageops::grayscale(frame);
        if self.params.blur_sigma > 0.0 {
            gaussian_blur_f32(&gray, self.params.blur_sigma)
        } else {
            gray
        }
    }

    /// 帧差二值化 + 膨胀
    fn motion_mask(&self, base: &GrayImage, current: &GrayImage) -> GrayImage {
        let diff: GrayImage = map_colors2(base, current, |a: Luma<u8>, b: Luma<u8>| {
            Luma([a[0].abs_diff(b[0])])
        });
        let mask = threshold(&diff, self.params.diff_threshold, ThresholdType::Binary);
        if self.params.dilate_iterations == 0 {
            mask
        } else {
            dilate(&mask, Norm::LInf, self.params.dilate_iterations)
        }
    }
}

impl Detector for MotionDetector {
    fn detect(&mut self, frame: &RgbImage) -> Vec<Detection> {
        let current = self.preprocess(frame);

        let base = match self.base.take() {
            Some(base) if base.dimensions() == current.dimensions() => base,
            _ => {
                debug!("📸 设置运动检测基准帧 {}x{}", current.width(), current.height());
                self.base = Some(current);
                return Vec::new();
            }
        };

        let mask = self.motion_mask(&base, &current);
        self.base = Some(base);

        let contours: Vec<Contour<i32>> = find_contours::<i32>(&mask)
            .into_iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .collect();
        let boxes: Vec<Rect> = contours.iter().map(bounding_rect).collect();

        let mut detections = Vec::new();
        for (i, contour) in contours.iter().enumerate() {
            if contour_area(contour) < self.params.min_area {
                continue;
            }
            let bb = boxes[i];
            if self.params.exclude_horizontal && bb.width > bb.height {
                continue;
            }
            // 与其它轮廓外接框重叠的都不要
            let crowded = boxes
                .iter()
                .enumerate()
                .any(|(j, other)| i != j && overlaps(&bb, other));
            if !crowded {
                detections.push(Detection::new(bb));
            }
        }
        detections
    }

    fn name(&self) -> &str {
        "motion"
    }
}

/// 外接矩形 (包含端点像素)
fn bounding_rect(contour: &Contour<i32>) -> Rect {
    let mut x1 = i32::MAX;
    let mut y1 = i32::MAX;
    let mut x2 = i32::MIN;
    let mut y2 = i32::MIN;
    for p in &contour.points {
        x1 = x1.min(p.x);
        y1 = y1.min(p.y);
        x2 = x2.max(p.x);
        y2 = y2.max(p.y);
    }
    if contour.points.is_empty() {
        return Rect::default();
    }
    Rect::from_corners(x1 as f32, y1 as f32, (x2 + 1) as f32, (y2 + 1) as f32)
}

/// 轮廓多边形面积 (鞋带公式)
fn contour_area(contour: &Contour<i32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (k, p) in pts.iter().enumerate() {
        let q = &pts[(k + 1) % pts.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice.abs() as f64 / 2.0
}

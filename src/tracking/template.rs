//! 模板匹配跟踪器 (归一化互相关)
//! Normalized cross-correlation template tracker

use anyhow::{bail, Result};
use image::{imageops, GrayImage, RgbImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

use super::backend::VisualTracker;
use crate::geometry::{clip_to_frame, Rect};

/// 最小模板边长 (像素)
const MIN_TEMPLATE_SIDE: u32 = 4;

/// 匹配得分下限, 低于此值视为跟踪失败
const MIN_SCORE: f32 = 0.6;

pub struct TemplateTracker {
    template: GrayImage,
    region: Rect,
    min_score: f32,
}

impl TemplateTracker {
    pub fn new(frame: &RgbImage, region: &Rect) -> Result<Self> {
        let Some((x, y, w, h)) = clip_to_frame(region, frame.width(), frame.height()) else {
            bail!("模板区域为空: {:?}", region);
        };
        if w < MIN_TEMPLATE_SIDE || h < MIN_TEMPLATE_SIDE {
            bail!("模板过小: {}x{}", w, h);
        }
        let template = gray_patch(frame, x, y, w, h);
        Ok(Self {
            template,
            region: Rect::new(x as f32, y as f32, w as f32, h as f32),
            min_score: MIN_SCORE,
        })
    }

    /// 搜索窗口: 上一区域向四周扩展
    fn search_window(&self, frame: &RgbImage) -> Option<(u32, u32, u32, u32)> {
        let margin = self.region.width.max(self.region.height) * 0.5 + 8.0;
        let window = Rect::new(
            self.region.x - margin,
            self.region.y - margin,
            self.region.width + 2.0 * margin,
            self.region.height + 2.0 * margin,
        );
        clip_to_frame(&window, frame.width(), frame.height())
    }
}

impl VisualTracker for TemplateTracker {
    fn update(&mut self, frame: &RgbImage) -> Option<Rect> {
        let (wx, wy, ww, wh) = self.search_window(frame)?;
        let (tw, th) = self.template.dimensions();
        if ww < tw || wh < th {
            return None;
        }

        let window = gray_patch(frame, wx, wy, ww, wh);
        let scores = match_template(
            &window,
            &self.template,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );
        let extremes = find_extremes(&scores);
        // NaN (全黑窗口) 同样视为失败
        if !(extremes.max_value >= self.min_score) {
            return None;
        }

        let (lx, ly) = extremes.max_value_location;
        let (nx, ny) = (wx + lx, wy + ly);
        self.template = gray_patch(frame, nx, ny, tw, th);
        self.region = Rect::new(nx as f32, ny as f32, tw as f32, th as f32);
        Some(self.region)
    }
}

fn gray_patch(frame: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
    let patch = imageops::crop_imm(frame, x, y, w, h).to_image();
    imageops::grayscale(&patch)
}

//! 跟踪与计数配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tracking::{AssociationPolicy, FrozenRule, Orientation, ReferenceLine};

/// 跟踪器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // === 关联与跟踪 ===
    pub association_policy: AssociationPolicy, // 检测关联策略
    pub tracker: String,                       // 跟踪器后端名称
    pub max_lost_frames: u32,                  // 最大连续未关联次数
    pub frozen_window: usize,                  // 冻结判定窗口 (轨迹点数)
    pub frozen_distance: f32,                  // 冻结判定位移 (像素)
    pub max_active_contexts: usize,            // 活跃轨迹上限

    // === 退役与事件 ===
    pub retired_capacity: usize,      // 已退役轨迹保留数
    pub max_thumbnails: usize,        // 每条轨迹缩略图上限
    pub emit_without_thumbnail: bool, // 无缩略图的轨迹是否仍发送事件

    // === 视频源 ===
    pub skip_count: u64,      // 每处理一帧跳过的帧数
    pub max_frame_width: u32, // 超过此宽度的帧先缩小
    pub loop_playback: bool,  // 播放结束后回绕

    // === 参考线 ===
    pub line_orientation: Orientation,
    pub line_offset: f32,

    // === 运动检测 ===
    pub motion_min_area: f64,           // 轮廓最小面积
    pub motion_exclude_horizontal: bool, // 排除宽大于高的框
    pub motion_diff_threshold: u8,      // 帧差二值化阈值
    pub motion_blur_sigma: f32,         // 高斯模糊 sigma
    pub motion_dilate_iterations: u8,   // 膨胀次数
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            association_policy: AssociationPolicy::SuppressThenSpawn,
            tracker: String::from("template"),
            max_lost_frames: 30,
            frozen_window: 8,
            frozen_distance: 2.0,
            max_active_contexts: 64,

            retired_capacity: 20,
            max_thumbnails: 16,
            emit_without_thumbnail: true,

            skip_count: 0,
            max_frame_width: 600,
            loop_playback: true,

            line_orientation: Orientation::Horizontal,
            line_offset: 0.0,

            motion_min_area: 100.0,
            motion_exclude_horizontal: false,
            motion_diff_threshold: 25,
            motion_blur_sigma: 3.5,
            motion_dilate_iterations: 2,
        }
    }
}

impl TrackerConfig {
    /// 从JSON文件加载配置, 文件不存在时写入默认配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn frozen_rule(&self) -> FrozenRule {
        FrozenRule {
            window: self.frozen_window,
            max_distance: self.frozen_distance,
        }
    }

    pub fn reference_line(&self) -> ReferenceLine {
        ReferenceLine::new(self.line_orientation, self.line_offset)
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前跟踪配置:");
        info!("  关联策略: {:?}", self.association_policy);
        info!("  跟踪器: {}", self.tracker);
        info!("  最大丢失次数: {}", self.max_lost_frames);
        info!(
            "  冻结判定: {} 点内位移 <= {:.1}",
            self.frozen_window, self.frozen_distance
        );
        info!("  跳帧: {}", self.skip_count);
        info!(
            "  参考线: {:?} 偏移 {:.0}",
            self.line_orientation, self.line_offset
        );
    }
}

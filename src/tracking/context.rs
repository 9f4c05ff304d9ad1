//! 跟踪上下文 (TrackingContext)
//!
//! 单个被跟踪对象的完整记录: 轨迹、属性累积 (年龄/性别)、缩略图、
//! 丢失计数、计数标记, 以及独占的视觉跟踪器句柄。

use std::collections::VecDeque;
use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::backend::VisualTracker;
use crate::geometry::{center, distance, Point, Rect};

/// 年龄指数平滑: 旧值权重
const AGE_SMOOTHING: f32 = 0.95;

/// 性别判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "M"),
            Gender::Female => write!(f, "F"),
        }
    }
}

/// 单次属性观测 (平滑后的年龄 + 当时的性别判定)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub age: i32,
    pub gender: Gender,
}

/// 属性汇总
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Demography {
    pub observations: Vec<Observation>,
    pub ages: Vec<f32>,
    pub genders: Vec<Gender>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
}

/// 冻结判定参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrozenRule {
    /// 比较 trail[len - window] 与最后一项
    pub window: usize,
    /// 中心点位移不超过该值即视为冻结
    pub max_distance: f32,
}

impl Default for FrozenRule {
    fn default() -> Self {
        Self {
            window: 8,
            max_distance: 2.0,
        }
    }
}

pub struct TrackingContext {
    id: u64,
    trail: Vec<Rect>,
    age_estimates: Vec<f32>,
    genders: Vec<Gender>,
    male_score: f32,
    female_score: f32,
    thumbnails: VecDeque<RgbImage>,
    max_thumbnails: usize,
    pub(crate) lost_count: u32,
    pub(crate) counted_once: bool,
    tracker: Box<dyn VisualTracker>,
}

impl fmt::Debug for TrackingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingContext")
            .field("id", &self.id)
            .field("trail", &self.trail.len())
            .field("ages", &self.age_estimates.len())
            .field("genders", &self.genders.len())
            .field("thumbnails", &self.thumbnails.len())
            .field("lost_count", &self.lost_count)
            .field("counted_once", &self.counted_once)
            .finish()
    }
}

impl TrackingContext {
    /// 轨迹以初始区域开始, 永不为空
    pub fn new(
        id: u64,
        seed: Rect,
        tracker: Box<dyn VisualTracker>,
        max_thumbnails: usize,
    ) -> Self {
        Self {
            id,
            trail: vec![seed],
            age_estimates: Vec::new(),
            genders: Vec::new(),
            male_score: 0.0,
            female_score: 0.0,
            thumbnails: VecDeque::new(),
            max_thumbnails,
            lost_count: 0,
            counted_once: false,
            tracker,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn trail(&self) -> &[Rect] {
        &self.trail
    }

    pub fn age_estimates(&self) -> &[f32] {
        &self.age_estimates
    }

    pub fn genders(&self) -> &[Gender] {
        &self.genders
    }

    pub fn lost_count(&self) -> u32 {
        self.lost_count
    }

    pub fn counted_once(&self) -> bool {
        self.counted_once
    }

    pub fn thumbnail_count(&self) -> usize {
        self.thumbnails.len()
    }

    pub fn last_region(&self) -> &Rect {
        // 轨迹非空
        &self.trail[self.trail.len() - 1]
    }

    pub fn first_center(&self) -> Option<Point> {
        self.trail.first().map(center)
    }

    pub fn last_center(&self) -> Option<Point> {
        self.trail.last().map(center)
    }

    /// 轨迹中心点序列
    pub fn path(&self) -> Vec<Point> {
        self.trail.iter().map(center).collect()
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut dyn VisualTracker {
        self.tracker.as_mut()
    }

    pub(crate) fn push_region(&mut self, region: Rect) {
        self.trail.push(region);
    }

    /// 冻结判定 (启发式)
    ///
    /// 假设目标在视野内大致单向运动; 跟踪器卡在背景上时
    /// 中心点几乎不动, 借此及时回收。
    pub fn is_frozen(&self, rule: &FrozenRule) -> bool {
        if rule.window == 0 || self.trail.len() < rule.window {
            return false;
        }
        let last = center(&self.trail[self.trail.len() - 1]);
        let prev = center(&self.trail[self.trail.len() - rule.window]);
        distance(&last, &prev) <= rule.max_distance
    }

    /// 年龄观测 (负值表示本帧无估计)
    pub fn update_age(&mut self, raw: f32) {
        if raw < 0.0 {
            return;
        }
        let smoothed = match self.age_estimates.last() {
            Some(prev) => AGE_SMOOTHING * prev + (1.0 - AGE_SMOOTHING) * raw,
            None => raw,
        };
        self.age_estimates.push(smoothed);
    }

    /// 性别观测 (男性概率, 负值表示本帧无估计)
    pub fn update_gender(&mut self, raw: f32) {
        if raw < 0.0 {
            return;
        }
        if raw > 0.5 {
            self.male_score += raw - 0.5;
        } else {
            self.female_score += 0.5 - raw;
        }
        let verdict = if self.is_male() {
            Gender::Male
        } else {
            Gender::Female
        };
        self.genders.push(verdict);
    }

    /// 成对记录一次检测属性观测
    ///
    /// 年龄与性别须同时存在且非负才记录, 否则整次观测丢弃,
    /// 保证两个序列等长。返回是否记录。
    pub fn observe(&mut self, age: Option<f32>, male_probability: Option<f32>) -> bool {
        match (age, male_probability) {
            (Some(age), Some(male)) if age >= 0.0 && male >= 0.0 => {
                self.update_age(age);
                self.update_gender(male);
                true
            }
            _ => false,
        }
    }

    /// 最近一次平滑年龄四舍五入, 无估计时为 None
    pub fn age_verdict(&self) -> Option<i32> {
        self.age_estimates
            .last()
            .map(|age| (age + 0.5).floor() as i32)
    }

    pub fn is_male(&self) -> bool {
        self.male_score > self.female_score
    }

    pub fn gender_verdict(&self) -> Option<Gender> {
        if self.genders.is_empty() {
            None
        } else if self.is_male() {
            Some(Gender::Male)
        } else {
            Some(Gender::Female)
        }
    }

    pub(crate) fn add_thumbnail(&mut self, crop: RgbImage) {
        if self.max_thumbnails == 0 {
            return;
        }
        while self.thumbnails.len() >= self.max_thumbnails {
            self.thumbnails.pop_front();
        }
        self.thumbnails.push_back(crop);
    }

    /// 代表性缩略图 (时间中位)
    pub fn representative_thumbnail(&self) -> Option<&RgbImage> {
        self.thumbnails.get(self.thumbnails.len() / 2)
    }

    /// 属性汇总, 无任何观测时为 None
    ///
    /// 年龄与性别序列必须等长 (检测器要么同时给出, 要么都不给),
    /// 长度不一致说明跟踪状态已损坏。
    pub fn demography(&self) -> Option<Demography> {
        if self.age_estimates.is_empty() && self.genders.is_empty() {
            return None;
        }
        if !self.age_estimates.is_empty() && !self.genders.is_empty() {
            assert_eq!(
                self.age_estimates.len(),
                self.genders.len(),
                "track {}: age/gender observation counts diverged",
                self.id
            );
        }
        let observations = self
            .age_estimates
            .iter()
            .zip(self.genders.iter())
            .map(|(age, gender)| Observation {
                age: (age + 0.5).floor() as i32,
                gender: *gender,
            })
            .collect();
        Some(Demography {
            observations,
            ages: self.age_estimates.clone(),
            genders: self.genders.clone(),
            age: self.age_verdict(),
            gender: self.gender_verdict(),
        })
    }
}

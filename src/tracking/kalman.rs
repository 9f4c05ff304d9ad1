//! 卡尔曼运动模型跟踪器
//! Kalman constant-velocity box tracker
//!
//! 不读取像素, 每帧按匀速模型预测, 关联到检测框时校正。
//! 位置不确定性过大 (长时间无校正) 时报告跟踪失败。

use image::RgbImage;

use super::backend::VisualTracker;
use crate::geometry::Rect;

/// 位置不确定性上限 (像素), 超过即视为跟丢
const MAX_POSITION_UNCERTAINTY: f32 = 12.0;

/// 简化卡尔曼滤波器 (边界框位置和尺寸平滑)
/// 状态向量: [x_center, y_center, width, height, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    /// 状态估计: [cx, cy, w, h, vx, vy, vw, vh]
    state: [f32; 8],

    /// 估计误差协方差 (简化为对角阵)
    p: [f32; 8],

    /// 过程噪声
    q: f32,

    /// 观测噪声
    r: f32,

    /// 速度衰减因子 (0.9-0.99)
    velocity_decay: f32,

    /// 静止阈值 (像素/帧)
    stationary_threshold: f32,

    /// 连续静止帧数
    stationary_count: u32,
}

impl KalmanBoxFilter {
    /// - `q`: 过程噪声 (越小越平滑)
    /// - `r`: 观测噪声 (越大越平滑)
    pub fn new(region: &Rect, q: f32, r: f32) -> Self {
        let c = region.center();
        Self {
            state: [c.x, c.y, region.width, region.height, 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
            stationary_threshold: 2.0,
            stationary_count: 0,
        }
    }

    /// 预测下一帧状态 (匀速运动 + 速度衰减)
    pub fn predict(&mut self) {
        let speed = (self.state[4] * self.state[4] + self.state[5] * self.state[5]).sqrt();
        let is_stationary = speed < self.stationary_threshold;

        if is_stationary {
            self.stationary_count += 1;
            // 连续静止3帧后大幅衰减速度
            let decay = if self.stationary_count > 3 {
                0.7
            } else {
                self.velocity_decay
            };
            for v in &mut self.state[4..8] {
                *v *= decay;
            }
        } else {
            self.stationary_count = 0;
            self.state[4] *= self.velocity_decay;
            self.state[5] *= self.velocity_decay;
            self.state[6] *= 0.98; // 尺寸变化更慢
            self.state[7] *= 0.98;
        }

        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }

        let q_factor = if is_stationary { 0.5 } else { 1.0 };
        for p in &mut self.p {
            *p += self.q * q_factor;
        }
    }

    /// 融合观测值 (按残差自适应观测噪声)
    pub fn update(&mut self, region: &Rect) {
        let c = region.center();
        let y = [
            c.x - self.state[0],
            c.y - self.state[1],
            region.width - self.state[2],
            region.height - self.state[3],
        ];

        let residual_norm = (y[0] * y[0] + y[1] * y[1]).sqrt();
        let adaptive_r = if residual_norm < self.stationary_threshold {
            self.r * 0.3
        } else if residual_norm < 10.0 {
            self.r
        } else {
            // 大幅跳变: 更信任预测
            self.r * 3.0
        };

        let mut k = [0.0f32; 8];
        for i in 0..8 {
            let noise = if i < 4 { adaptive_r } else { adaptive_r * 10.0 };
            k[i] = self.p[i] / (self.p[i] + noise);
        }

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
        }

        let velocity_gain = if residual_norm < self.stationary_threshold {
            0.3
        } else {
            1.0
        };
        for i in 0..4 {
            self.state[i + 4] += k[i + 4] * y[i] * velocity_gain;
        }

        for i in 0..8 {
            self.p[i] *= 1.0 - k[i];
        }

        if residual_norm >= self.stationary_threshold {
            self.stationary_count = 0;
        }
    }

    /// 当前状态对应的边界框
    pub fn state_region(&self) -> Rect {
        let w = self.state[2].max(1.0);
        let h = self.state[3].max(1.0);
        Rect::new(self.state[0] - w / 2.0, self.state[1] - h / 2.0, w, h)
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }

    /// 位置不确定性
    pub fn position_uncertainty(&self) -> f32 {
        (self.p[0] + self.p[1]).sqrt()
    }
}

/// 基于 KalmanBoxFilter 的跟踪器句柄
pub struct KalmanTracker {
    filter: KalmanBoxFilter,
}

impl KalmanTracker {
    pub fn new(region: &Rect) -> Self {
        // 低观测噪声: 更信任检测结果
        Self {
            filter: KalmanBoxFilter::new(region, 1.0, 0.5),
        }
    }
}

impl VisualTracker for KalmanTracker {
    fn update(&mut self, _frame: &RgbImage) -> Option<Rect> {
        self.filter.predict();
        let region = self.filter.state_region();
        let finite = region.x.is_finite() && region.y.is_finite();
        if !finite || self.filter.position_uncertainty() > MAX_POSITION_UNCERTAINTY {
            return None;
        }
        Some(region)
    }

    fn correct(&mut self, region: &Rect) {
        self.filter.update(region);
    }
}

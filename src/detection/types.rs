//! 检测结果数据结构
//! Detection data types

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// 单个检测 (区域 + 可选属性)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    pub region: Rect,
    pub confidence: f32,
    /// 估计年龄
    pub age: Option<f32>,
    /// 男性概率 [0, 1]
    pub male_probability: Option<f32>,
}

impl Detection {
    pub fn new(region: Rect) -> Self {
        Self {
            region,
            confidence: 1.0,
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_attributes(mut self, age: Option<f32>, male_probability: Option<f32>) -> Self {
        self.age = age;
        self.male_probability = male_probability;
        self
    }
}

//! 参考线过线计数 (ReferenceLineCounter)
//!
//! 水平线按 y 划分 (上/下), 垂直线按 x 划分 (左/右)。
//! 参考线位置 = 帧中心线 + 偏移量。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::Point;

/// 参考线方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn toggled(self) -> Self {
        match self {
            Orientation::Horizontal => Orientation::Vertical,
            Orientation::Vertical => Orientation::Horizontal,
        }
    }
}

/// 四向计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counts {
    pub up: u32,
    pub down: u32,
    pub left: u32,
    pub right: u32,
}

impl Counts {
    pub fn total(&self) -> u32 {
        self.up + self.down + self.left + self.right
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    fn add(&mut self, other: &Counts) {
        self.up += other.up;
        self.down += other.down;
        self.left += other.left;
        self.right += other.right;
    }
}

/// 参考线
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferenceLine {
    pub orientation: Orientation,
    /// 相对帧中心线的偏移 (像素)
    pub offset: f32,
}

impl ReferenceLine {
    pub fn new(orientation: Orientation, offset: f32) -> Self {
        Self {
            orientation,
            offset,
        }
    }

    /// 参考线在帧内的坐标 (水平线为 y, 垂直线为 x)
    pub fn position(&self, frame_width: u32, frame_height: u32) -> f32 {
        match self.orientation {
            Orientation::Horizontal => frame_height as f32 / 2.0 + self.offset,
            Orientation::Vertical => frame_width as f32 / 2.0 + self.offset,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceLineCounter {
    line: ReferenceLine,
    initial: ReferenceLine,
    counts: Counts,
}

impl ReferenceLineCounter {
    pub fn new(line: ReferenceLine) -> Self {
        Self {
            line,
            initial: line,
            counts: Counts::default(),
        }
    }

    pub fn line(&self) -> &ReferenceLine {
        &self.line
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }

    /// 设置方向并累加偏移
    pub fn set_reference_line(&mut self, orientation: Orientation, delta: f32) {
        self.line.orientation = orientation;
        self.line.offset += delta;
        debug!(
            "📏 参考线: {:?} 偏移 {:.0}",
            self.line.orientation, self.line.offset
        );
    }

    pub fn toggle_orientation(&mut self) {
        self.line.orientation = self.line.orientation.toggled();
    }

    /// 流回绕时重置计数和参考线
    pub fn reset(&mut self) {
        self.line = self.initial;
        self.counts = Counts::default();
    }

    /// 判定起点→终点相对参考线的穿越方向 (每个分量 0 或 1, 互斥)
    pub fn classify(&self, start: Point, end: Point, frame_width: u32, frame_height: u32) -> Counts {
        let mut c = Counts::default();
        let line = self.line.position(frame_width, frame_height);
        match self.line.orientation {
            Orientation::Horizontal => {
                if start.y < line && end.y >= line {
                    c.down = 1;
                } else if start.y > line && end.y <= line {
                    c.up = 1;
                }
            }
            Orientation::Vertical => {
                if start.x < line && end.x >= line {
                    c.right = 1;
                } else if start.x > line && end.x <= line {
                    c.left = 1;
                }
            }
        }
        c
    }

    /// 判定并累加, 返回本次是否计数
    pub fn process(&mut self, start: Point, end: Point, frame_width: u32, frame_height: u32) -> bool {
        let c = self.classify(start, end, frame_width, frame_height);
        if c.is_zero() {
            return false;
        }
        debug!(
            "➕ 过线: ({:.0},{:.0}) → ({:.0},{:.0}) {:?}",
            start.x, start.y, end.x, end.y, c
        );
        self.counts.add(&c);
        true
    }

    /// 参考线两端点 (供绘制)
    pub fn line_endpoints(&self, frame_width: u32, frame_height: u32) -> (Point, Point) {
        let pos = self.line.position(frame_width, frame_height);
        match self.line.orientation {
            Orientation::Horizontal => (Point::new(0.0, pos), Point::new(frame_width as f32, pos)),
            Orientation::Vertical => (Point::new(pos, 0.0), Point::new(pos, frame_height as f32)),
        }
    }
}

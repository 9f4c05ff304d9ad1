//! 几何工具 (Geometry utilities)
//!
//! 轴对齐矩形与点的纯函数: 包含、重叠、中心点、距离。
//! 所有面积语义统一使用浮点矩形交集 (面积 >= 0)。

use serde::{Deserialize, Serialize};

/// 二维点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 轴对齐矩形 (x, y 为左上角)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 由左上角/右下角两点构造
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn xmax(&self) -> f32 {
        self.x + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> Point {
        center(self)
    }
}

/// 两矩形交集面积 (无交集时为 0)
pub fn intersection_area(a: &Rect, b: &Rect) -> f32 {
    let l = a.x.max(b.x);
    let r = a.xmax().min(b.xmax());
    let t = a.y.max(b.y);
    let btm = a.ymax().min(b.ymax());
    (r - l).max(0.0) * (btm - t).max(0.0)
}

/// 交集面积 > 0
pub fn overlaps(a: &Rect, b: &Rect) -> bool {
    intersection_area(a, b) > 0.0
}

/// inner 完全位于 outer 内部
///
/// 等价于 "交集面积 == inner 面积", 但按边比较以避免浮点误差。
/// 面积为 0 的 inner 永远不算被包含。
pub fn contains(outer: &Rect, inner: &Rect) -> bool {
    if inner.area() <= 0.0 {
        return false;
    }
    inner.x >= outer.x
        && inner.y >= outer.y
        && inner.xmax() <= outer.xmax()
        && inner.ymax() <= outer.ymax()
}

pub fn center(r: &Rect) -> Point {
    Point::new(r.x + r.width / 2.0, r.y + r.height / 2.0)
}

/// 欧氏距离
pub fn distance(p: &Point, q: &Point) -> f32 {
    let dx = p.x - q.x;
    let dy = p.y - q.y;
    (dx * dx + dy * dy).sqrt()
}

/// 整帧矩形
pub fn frame_rect(width: u32, height: u32) -> Rect {
    Rect::new(0.0, 0.0, width as f32, height as f32)
}

/// 区域是否完全在帧内
pub fn inside_frame(r: &Rect, width: u32, height: u32) -> bool {
    contains(&frame_rect(width, height), r)
}

/// 裁剪到帧内的整数像素窗口 (x, y, w, h), 无有效面积时返回 None
pub fn clip_to_frame(r: &Rect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x1 = r.x.max(0.0).floor() as u32;
    let y1 = r.y.max(0.0).floor() as u32;
    let x2 = (r.xmax().min(width as f32)).ceil().max(0.0) as u32;
    let y2 = (r.ymax().min(height as f32)).ceil().max(0.0) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
}

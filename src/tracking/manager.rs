//! 跟踪管理器 (Track Store)
//!
//! 持有活跃轨迹与最近退役轨迹, 负责:
//! 1. 每帧更新所有跟踪器, 判定冻结/丢失/失败/越界并退役
//! 2. 将检测结果关联到已有轨迹 (两种策略)
//! 3. 为未关联的检测创建新轨迹
//! 4. 退役时构建轨迹事件并交给监听器

use std::collections::{BTreeMap, HashSet, VecDeque};

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backend::TrackerBackend;
use super::context::{FrozenRule, TrackingContext};
use super::counter::{Counts, Orientation, ReferenceLineCounter};
use crate::config::TrackerConfig;
use crate::detection::Detection;
use crate::event::{encode_jpeg, CameraEvent, EventSink, TrailEvent};
use crate::gen_time_string;
use crate::geometry::{clip_to_frame, inside_frame, intersection_area, overlaps, Rect};

/// 检测关联策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationPolicy {
    /// 丢弃与任何轨迹重叠的检测, 其余全部新建轨迹
    #[default]
    SuppressThenSpawn,
    /// 每条轨迹认领重叠面积最大的检测, 未认领的新建轨迹
    BestMatch,
}

/// 退役原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireReason {
    Frozen,
    Lost,
    TrackerFailure,
    OutOfBounds,
}

/// 轨迹认领的检测 (检测列表下标)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSlot {
    None,
    Matched(usize),
}

/// 已退役轨迹快照 (仅用于轨迹显示/诊断)
#[derive(Debug, Clone)]
pub struct RetiredTrack {
    pub id: u64,
    pub trail: Vec<Rect>,
    pub reason: RetireReason,
}

/// 单帧更新结果
#[derive(Debug, Clone, Default)]
pub struct FrameUpdate {
    pub updated: Vec<u64>,
    pub retired: Vec<(u64, RetireReason)>,
    /// 本帧完成计数的轨迹
    pub counted: Vec<u64>,
    /// 更新后的累计计数
    pub counts: Counts,
}

/// 单帧关联结果
#[derive(Debug, Clone, Default)]
pub struct Association {
    pub spawned: Vec<u64>,
    /// (轨迹ID, 检测下标)
    pub matched: Vec<(u64, usize)>,
    pub suppressed: usize,
    pub dropped: usize,
}

pub struct TrackingManager {
    active: BTreeMap<u64, TrackingContext>,
    retired: VecDeque<RetiredTrack>,
    counter: ReferenceLineCounter,
    backend: Box<dyn TrackerBackend>,
    next_id: u64,

    policy: AssociationPolicy,
    frozen: FrozenRule,
    max_lost_frames: u32,
    max_active_contexts: usize,
    retired_capacity: usize,
    max_thumbnails: usize,
    emit_without_thumbnail: bool,
}

impl TrackingManager {
    pub fn new(config: &TrackerConfig, backend: Box<dyn TrackerBackend>) -> Self {
        info!(
            "🎯 跟踪管理器: {} 跟踪器 | {:?}",
            backend.name(),
            config.association_policy
        );
        Self {
            active: BTreeMap::new(),
            retired: VecDeque::new(),
            counter: ReferenceLineCounter::new(config.reference_line()),
            backend,
            next_id: 1,
            policy: config.association_policy,
            frozen: config.frozen_rule(),
            max_lost_frames: config.max_lost_frames,
            max_active_contexts: config.max_active_contexts,
            retired_capacity: config.retired_capacity,
            max_thumbnails: config.max_thumbnails,
            emit_without_thumbnail: config.emit_without_thumbnail,
        }
    }

    pub fn policy(&self) -> AssociationPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: AssociationPolicy) {
        self.policy = policy;
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn counts(&self) -> Counts {
        self.counter.counts()
    }

    pub fn counter(&self) -> &ReferenceLineCounter {
        &self.counter
    }

    pub fn set_reference_line(&mut self, orientation: Orientation, delta: f32) {
        self.counter.set_reference_line(orientation, delta);
    }

    pub fn toggle_orientation(&mut self) {
        self.counter.toggle_orientation();
    }

    /// 活跃轨迹 (按ID升序)
    pub fn contexts(&self) -> impl Iterator<Item = &TrackingContext> {
        self.active.values()
    }

    pub fn context(&self, id: u64) -> Option<&TrackingContext> {
        self.active.get(&id)
    }

    /// 最近退役的轨迹 (旧 → 新)
    pub fn retired(&self) -> impl Iterator<Item = &RetiredTrack> {
        self.retired.iter()
    }

    /// 清空所有轨迹 (视频回绕时使用), 不发送事件
    pub fn clear_all_contexts(&mut self) {
        if !self.active.is_empty() {
            debug!("🧹 清空 {} 条活跃轨迹", self.active.len());
        }
        self.active.clear();
        self.retired.clear();
    }

    /// 视频回绕: 清空轨迹并重置计数与参考线
    pub fn rewind(&mut self) {
        self.clear_all_contexts();
        self.counter.reset();
    }

    /// 区域是否与任何活跃轨迹的最新位置重叠
    pub fn overlaps_any_context(&self, region: &Rect) -> bool {
        self.active
            .values()
            .any(|ctx| overlaps(region, ctx.last_region()))
    }

    /// 更新所有活跃轨迹
    pub fn update(&mut self, frame: &RgbImage, sink: &mut dyn EventSink) -> FrameUpdate {
        let (width, height) = frame.dimensions();
        let mut report = FrameUpdate::default();
        let ids: Vec<u64> = self.active.keys().copied().collect();

        for id in ids {
            let Some(ctx) = self.active.get_mut(&id) else {
                continue;
            };

            // 冻结判定在跟踪器更新之前, 避免无用计算
            let verdict = if ctx.is_frozen(&self.frozen) {
                Some(RetireReason::Frozen)
            } else if ctx.lost_count > self.max_lost_frames {
                Some(RetireReason::Lost)
            } else {
                match ctx.tracker_mut().update(frame) {
                    None => Some(RetireReason::TrackerFailure),
                    Some(region) if !inside_frame(&region, width, height) => {
                        Some(RetireReason::OutOfBounds)
                    }
                    Some(region) => {
                        ctx.push_region(region);
                        report.updated.push(id);
                        if !ctx.counted_once {
                            if let (Some(start), Some(end)) = (ctx.first_center(), ctx.last_center())
                            {
                                if self.counter.process(start, end, width, height) {
                                    ctx.counted_once = true;
                                    report.counted.push(id);
                                }
                            }
                        }
                        None
                    }
                }
            };

            if let Some(reason) = verdict {
                self.retire(id, reason, sink);
                report.retired.push((id, reason));
            }
        }

        report.counts = self.counter.counts();
        report
    }

    /// 按当前策略关联检测结果
    pub fn associate(&mut self, frame: &RgbImage, detections: &[Detection]) -> Association {
        match self.policy {
            AssociationPolicy::SuppressThenSpawn => self.suppress_then_spawn(frame, detections),
            AssociationPolicy::BestMatch => self.best_match(frame, detections),
        }
    }

    fn suppress_then_spawn(&mut self, frame: &RgbImage, detections: &[Detection]) -> Association {
        let mut report = Association::default();
        let mut touched = HashSet::new();
        let mut survivors = Vec::new();

        // 被抑制的检测用于校正重叠面积最大的轨迹
        let mut corrections: Vec<(u64, usize)> = Vec::new();

        for (idx, det) in detections.iter().enumerate() {
            let mut best: Option<(u64, f32)> = None;
            for (id, ctx) in &self.active {
                let area = intersection_area(&det.region, ctx.last_region());
                if area > 0.0 {
                    touched.insert(*id);
                    if best.map_or(true, |(_, a)| area > a) {
                        best = Some((*id, area));
                    }
                }
            }
            match best {
                Some((id, _)) => {
                    report.suppressed += 1;
                    corrections.push((id, idx));
                }
                None => survivors.push(idx),
            }
        }

        for (id, ctx) in self.active.iter_mut() {
            if touched.contains(id) {
                ctx.lost_count = 0;
            } else {
                ctx.lost_count += 1;
            }
        }
        for (id, idx) in corrections {
            if let Some(ctx) = self.active.get_mut(&id) {
                ctx.tracker_mut().correct(&detections[idx].region);
            }
        }

        for idx in survivors {
            match self.spawn(frame, &detections[idx]) {
                Some(id) => report.spawned.push(id),
                None => report.dropped += 1,
            }
        }

        report
    }

    fn best_match(&mut self, frame: &RgbImage, detections: &[Detection]) -> Association {
        let (width, height) = frame.dimensions();
        let mut report = Association::default();
        let mut claimed = vec![false; detections.len()];
        let mut slots = Vec::with_capacity(self.active.len());

        for (id, ctx) in &self.active {
            let mut best: Option<(usize, f32)> = None;
            for (idx, det) in detections.iter().enumerate() {
                if claimed[idx] {
                    continue;
                }
                let area = intersection_area(&det.region, ctx.last_region());
                // 面积相同保留先遇到的
                if area > 0.0 && best.map_or(true, |(_, a)| area > a) {
                    best = Some((idx, area));
                }
            }
            let slot = match best {
                Some((idx, _)) => {
                    claimed[idx] = true;
                    MatchSlot::Matched(idx)
                }
                None => MatchSlot::None,
            };
            slots.push((*id, slot));
        }

        for (id, slot) in slots {
            let Some(ctx) = self.active.get_mut(&id) else {
                continue;
            };
            match slot {
                MatchSlot::Matched(idx) => {
                    let det = &detections[idx];
                    ctx.observe(det.age, det.male_probability);
                    if inside_frame(&det.region, width, height) {
                        if let Some(crop) = crop_region(frame, &det.region) {
                            ctx.add_thumbnail(crop);
                        }
                    }
                    ctx.tracker_mut().correct(&det.region);
                    ctx.lost_count = 0;
                    report.matched.push((id, idx));
                }
                MatchSlot::None => ctx.lost_count += 1,
            }
        }

        for (idx, det) in detections.iter().enumerate() {
            if claimed[idx] {
                continue;
            }
            match self.spawn(frame, det) {
                Some(id) => report.spawned.push(id),
                None => report.dropped += 1,
            }
        }

        report
    }

    /// 以区域新建轨迹
    pub fn add_context(&mut self, frame: &RgbImage, region: Rect) -> Option<u64> {
        self.spawn(frame, &Detection::new(region))
    }

    fn spawn(&mut self, frame: &RgbImage, det: &Detection) -> Option<u64> {
        let (width, height) = frame.dimensions();
        if !inside_frame(&det.region, width, height) {
            debug!("↩️  检测框超出帧范围, 忽略: {:?}", det.region);
            return None;
        }
        if self.active.len() >= self.max_active_contexts {
            warn!(
                "⚠️  活跃轨迹已达上限 {}, 本帧跳过新建",
                self.max_active_contexts
            );
            return None;
        }

        let tracker = match self.backend.init(frame, &det.region) {
            Ok(tracker) => tracker,
            Err(e) => {
                warn!("❌ 跟踪器初始化失败: {:#}", e);
                return None;
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        let mut ctx = TrackingContext::new(id, det.region, tracker, self.max_thumbnails);
        ctx.observe(det.age, det.male_probability);
        debug!(
            "🆕 轨迹 #{} ({:.0},{:.0} {:.0}x{:.0}), 活跃 {}",
            id,
            det.region.x,
            det.region.y,
            det.region.width,
            det.region.height,
            self.active.len() + 1
        );
        self.active.insert(id, ctx);
        Some(id)
    }

    /// 退役轨迹: 发送事件后移入退役队列, 跟踪器句柄随上下文释放
    ///
    /// 已退役或不存在的ID返回 false。
    pub fn retire(&mut self, id: u64, reason: RetireReason, sink: &mut dyn EventSink) -> bool {
        let Some(ctx) = self.active.remove(&id) else {
            return false;
        };

        debug!(
            "🏁 轨迹 #{} 退役: {:?} (轨迹点 {}, 缩略图 {})",
            id,
            reason,
            ctx.trail().len(),
            ctx.thumbnail_count()
        );

        if ctx.thumbnail_count() > 0 || self.emit_without_thumbnail {
            let thumbnail = ctx
                .representative_thumbnail()
                .and_then(|thumb| match encode_jpeg(thumb) {
                    Ok(jpeg) => Some(jpeg),
                    Err(e) => {
                        warn!("❌ 缩略图编码失败: {:#}", e);
                        None
                    }
                });
            sink.on_event(CameraEvent::Trail(TrailEvent {
                id,
                path: ctx.path(),
                demography: ctx.demography(),
                reason,
                counted: ctx.counted_once(),
                retired_at: gen_time_string("-"),
                thumbnail,
            }));
        }

        self.retired.push_back(RetiredTrack {
            id,
            trail: ctx.trail().to_vec(),
            reason,
        });
        while self.retired.len() > self.retired_capacity {
            self.retired.pop_front();
        }
        true
    }
}

fn crop_region(frame: &RgbImage, region: &Rect) -> Option<RgbImage> {
    let (x, y, w, h) = clip_to_frame(region, frame.width(), frame.height())?;
    Some(imageops::crop_imm(frame, x, y, w, h).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::backend::VisualTracker;
    use anyhow::{bail, Result};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// 每次更新平移固定距离
    struct Shift {
        dx: f32,
        dy: f32,
    }

    struct ShiftTracker {
        region: Rect,
        dx: f32,
        dy: f32,
    }

    impl TrackerBackend for Shift {
        fn init(&self, _frame: &RgbImage, region: &Rect) -> Result<Box<dyn VisualTracker>> {
            Ok(Box::new(ShiftTracker {
                region: *region,
                dx: self.dx,
                dy: self.dy,
            }))
        }

        fn name(&self) -> &str {
            "shift"
        }
    }

    impl VisualTracker for ShiftTracker {
        fn update(&mut self, _frame: &RgbImage) -> Option<Rect> {
            self.region.x += self.dx;
            self.region.y += self.dy;
            Some(self.region)
        }
    }

    /// 初始化成功但每次更新都失败
    struct Broken;

    struct BrokenTracker;

    impl TrackerBackend for Broken {
        fn init(&self, _frame: &RgbImage, _region: &Rect) -> Result<Box<dyn VisualTracker>> {
            Ok(Box::new(BrokenTracker))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    impl VisualTracker for BrokenTracker {
        fn update(&mut self, _frame: &RgbImage) -> Option<Rect> {
            None
        }
    }

    /// 无法分配句柄
    struct Exhausted;

    impl TrackerBackend for Exhausted {
        fn init(&self, _frame: &RgbImage, _region: &Rect) -> Result<Box<dyn VisualTracker>> {
            bail!("no tracker slots left")
        }

        fn name(&self) -> &str {
            "exhausted"
        }
    }

    /// 在帧内随机游走
    struct Wander {
        seed: u64,
    }

    struct WanderTracker {
        region: Rect,
        rng: StdRng,
    }

    impl TrackerBackend for Wander {
        fn init(&self, _frame: &RgbImage, region: &Rect) -> Result<Box<dyn VisualTracker>> {
            Ok(Box::new(WanderTracker {
                region: *region,
                rng: StdRng::seed_from_u64(self.seed ^ region.x.to_bits() as u64),
            }))
        }

        fn name(&self) -> &str {
            "wander"
        }
    }

    impl VisualTracker for WanderTracker {
        fn update(&mut self, _frame: &RgbImage) -> Option<Rect> {
            let dx: f32 = self.rng.gen_range(-40.0..40.0);
            let dy: f32 = self.rng.gen_range(-40.0..40.0);
            self.region.x = (self.region.x + dx).clamp(0.0, 640.0 - self.region.width);
            self.region.y = (self.region.y + dy).clamp(0.0, 480.0 - self.region.height);
            Some(self.region)
        }
    }

    fn frame() -> RgbImage {
        RgbImage::new(640, 480)
    }

    fn manager(policy: AssociationPolicy, backend: Box<dyn TrackerBackend>) -> TrackingManager {
        let config = TrackerConfig {
            association_policy: policy,
            ..Default::default()
        };
        TrackingManager::new(&config, backend)
    }

    fn trail_events(events: &[CameraEvent]) -> Vec<&TrailEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                CameraEvent::Trail(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_suppress_then_spawn_scenario() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 0.0, dy: 0.0 }),
        );
        tm.add_context(&frame, Rect::new(10.0, 10.0, 50.0, 50.0))
            .expect("seed");
        assert_eq!(tm.active_count(), 1);

        let detections = [
            Detection::new(Rect::new(20.0, 20.0, 50.0, 50.0)),
            Detection::new(Rect::new(400.0, 400.0, 50.0, 50.0)),
        ];
        let report = tm.associate(&frame, &detections);
        assert_eq!(report.suppressed, 1);
        assert_eq!(report.spawned.len(), 1);
        assert_eq!(tm.active_count(), 2);
        assert!(tm.overlaps_any_context(&Rect::new(420.0, 420.0, 5.0, 5.0)));
    }

    #[test]
    fn test_seed_outside_frame_is_dropped() {
        let frame = frame();
        for policy in [
            AssociationPolicy::SuppressThenSpawn,
            AssociationPolicy::BestMatch,
        ] {
            let mut tm = manager(policy, Box::new(Shift { dx: 0.0, dy: 0.0 }));
            let report = tm.associate(
                &frame,
                &[
                    Detection::new(Rect::new(600.0, 10.0, 50.0, 50.0)),
                    Detection::new(Rect::new(10.0, 440.0, 50.0, 50.0)),
                ],
            );
            assert_eq!(report.dropped, 2);
            assert_eq!(tm.active_count(), 0);
        }
    }

    #[test]
    fn test_update_out_of_frame_retires() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 30.0, dy: 0.0 }),
        );
        let id = tm
            .add_context(&frame, Rect::new(560.0, 10.0, 50.0, 50.0))
            .unwrap();
        let mut events = Vec::new();

        // 590 + 50 = 640, 恰好在帧内
        let report = tm.update(&frame, &mut events);
        assert_eq!(report.updated, vec![id]);

        let report = tm.update(&frame, &mut events);
        assert_eq!(report.retired, vec![(id, RetireReason::OutOfBounds)]);
        assert_eq!(tm.active_count(), 0);
        let trails = trail_events(&events);
        assert_eq!(trails.len(), 1);
        // 越界区域不进入轨迹
        assert_eq!(trails[0].path.len(), 2);
    }

    #[test]
    fn test_crossing_counts_down_once() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 0.0, dy: 60.0 }),
        );
        let id = tm
            .add_context(&frame, Rect::new(75.0, 175.0, 50.0, 50.0))
            .unwrap();
        let mut events = Vec::new();

        let report = tm.update(&frame, &mut events);
        assert_eq!(report.counted, vec![id]);
        assert_eq!(report.counts, tm.counts());
        assert_eq!(
            tm.counts(),
            Counts {
                down: 1,
                ..Default::default()
            }
        );
        assert!(tm.context(id).unwrap().counted_once());

        // 继续向下移动不会重复计数
        let report = tm.update(&frame, &mut events);
        assert!(report.counted.is_empty());
        assert_eq!(tm.counts().total(), 1);
    }

    #[test]
    fn test_crossing_counts_up() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 0.0, dy: -60.0 }),
        );
        tm.add_context(&frame, Rect::new(75.0, 235.0, 50.0, 50.0))
            .unwrap();
        tm.update(&frame, &mut Vec::new());
        assert_eq!(
            tm.counts(),
            Counts {
                up: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_at_most_once_counting_random_walks() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Wander { seed: 7 }),
        );
        let mut rng = StdRng::seed_from_u64(42);
        let mut created = 0u32;
        let mut events = Vec::new();

        for step in 0..200 {
            if step % 5 == 0 {
                let x = rng.gen_range(0.0..580.0);
                let y = rng.gen_range(0.0..420.0);
                if tm.add_context(&frame, Rect::new(x, y, 40.0, 40.0)).is_some() {
                    created += 1;
                }
            }
            if step == 100 {
                tm.set_reference_line(Orientation::Vertical, 15.0);
            }
            let before = tm.counts().total();
            let report = tm.update(&frame, &mut events);
            // 每条轨迹每帧最多贡献一次
            assert_eq!(tm.counts().total() - before, report.counted.len() as u32);
        }

        let counted_ids: Vec<u64> = trail_events(&events)
            .iter()
            .filter(|t| t.counted)
            .map(|t| t.id)
            .chain(tm.contexts().filter(|c| c.counted_once()).map(|c| c.id()))
            .collect();
        let unique: HashSet<u64> = counted_ids.iter().copied().collect();
        assert_eq!(unique.len(), counted_ids.len());
        assert_eq!(tm.counts().total() as usize, counted_ids.len());
        assert!(tm.counts().total() <= created);
    }

    #[test]
    fn test_trail_grows_by_one_per_update() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 3.0, dy: 3.0 }),
        );
        let id = tm
            .add_context(&frame, Rect::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        for expected in 2..20 {
            tm.update(&frame, &mut Vec::new());
            assert_eq!(tm.context(id).unwrap().trail().len(), expected);
        }
    }

    #[test]
    fn test_retirement_is_terminal() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 0.0, dy: 0.0 }),
        );
        let id = tm
            .add_context(&frame, Rect::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let mut events = Vec::new();
        assert!(tm.retire(id, RetireReason::Lost, &mut events));
        assert!(!tm.retire(id, RetireReason::Lost, &mut events));
        assert_eq!(trail_events(&events).len(), 1);
        assert!(tm.context(id).is_none());

        let next = tm
            .add_context(&frame, Rect::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        assert!(next > id);
    }

    #[test]
    fn test_frozen_track_retires_before_update() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 0.0, dy: 0.0 }),
        );
        let id = tm
            .add_context(&frame, Rect::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let mut events = Vec::new();
        for _ in 0..7 {
            assert!(tm.update(&frame, &mut events).retired.is_empty());
        }
        assert_eq!(tm.context(id).unwrap().trail().len(), 8);

        let report = tm.update(&frame, &mut events);
        assert_eq!(report.retired, vec![(id, RetireReason::Frozen)]);
        assert!(report.updated.is_empty());
        assert_eq!(trail_events(&events)[0].path.len(), 8);
    }

    #[test]
    fn test_tracker_failure_retires() {
        let frame = frame();
        let mut tm = manager(AssociationPolicy::SuppressThenSpawn, Box::new(Broken));
        let id = tm
            .add_context(&frame, Rect::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let report = tm.update(&frame, &mut Vec::new());
        assert_eq!(report.retired, vec![(id, RetireReason::TrackerFailure)]);
        assert_eq!(tm.retired().count(), 1);
    }

    #[test]
    fn test_lost_track_retires_after_threshold() {
        let frame = frame();
        let config = TrackerConfig {
            association_policy: AssociationPolicy::BestMatch,
            max_lost_frames: 2,
            ..Default::default()
        };
        let mut tm = TrackingManager::new(&config, Box::new(Shift { dx: 5.0, dy: 0.0 }));
        let id = tm
            .add_context(&frame, Rect::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let mut events = Vec::new();
        for _ in 0..3 {
            assert!(tm.update(&frame, &mut events).retired.is_empty());
            tm.associate(&frame, &[]);
        }
        assert_eq!(tm.context(id).unwrap().lost_count(), 3);
        let report = tm.update(&frame, &mut events);
        assert_eq!(report.retired, vec![(id, RetireReason::Lost)]);
    }

    #[test]
    fn test_best_match_claims_largest_overlap() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::BestMatch,
            Box::new(Shift { dx: 0.0, dy: 0.0 }),
        );
        let a = tm
            .add_context(&frame, Rect::new(100.0, 100.0, 50.0, 50.0))
            .unwrap();
        let b = tm
            .add_context(&frame, Rect::new(300.0, 100.0, 50.0, 50.0))
            .unwrap();

        let detections = [
            // 与 a 小面积重叠
            Detection::new(Rect::new(140.0, 140.0, 50.0, 50.0))
                .with_attributes(Some(60.0), Some(0.1)),
            // 与 a 大面积重叠
            Detection::new(Rect::new(105.0, 105.0, 50.0, 50.0))
                .with_attributes(Some(30.0), Some(0.9)),
            // 与 b 重叠
            Detection::new(Rect::new(310.0, 100.0, 50.0, 50.0)),
            // 无重叠 → 新建
            Detection::new(Rect::new(500.0, 300.0, 40.0, 40.0))
                .with_attributes(Some(25.0), Some(0.7)),
        ];
        let report = tm.associate(&frame, &detections);
        assert_eq!(report.matched, vec![(a, 1), (b, 2)]);
        assert_eq!(report.spawned.len(), 2);
        assert_eq!(tm.active_count(), 4);

        let ctx_a = tm.context(a).unwrap();
        assert_eq!(ctx_a.age_estimates(), &[30.0]);
        assert_eq!(ctx_a.thumbnail_count(), 1);
        assert_eq!(ctx_a.lost_count(), 0);
        assert_eq!(tm.context(b).unwrap().thumbnail_count(), 1);

        // 新建轨迹以首个属性观测为种子
        let seeded = tm
            .contexts()
            .find(|c| c.age_estimates() == [25.0])
            .expect("seeded context");
        assert_eq!(seeded.genders().len(), 1);
        assert_eq!(seeded.thumbnail_count(), 0);
    }

    #[test]
    fn test_suppressing_detection_corrects_kalman_track() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(crate::tracking::TrackerKind::Kalman),
        );
        let mut events = Vec::new();
        let first = tm.associate(&frame, &[Detection::new(Rect::new(300.0, 100.0, 40.0, 40.0))]);
        assert_eq!(first.spawned.len(), 1);
        let id = first.spawned[0];

        // 每帧向下 20 px, 中心在第 7 帧越过 y = 240
        for k in 1..12 {
            tm.update(&frame, &mut events);
            let det = Detection::new(Rect::new(300.0, 100.0 + 20.0 * k as f32, 40.0, 40.0));
            let report = tm.associate(&frame, &[det]);
            assert!(report.spawned.is_empty(), "frame {}: respawned", k);
            assert_eq!(report.suppressed, 1);
        }

        assert!(trail_events(&events).is_empty());
        assert_eq!(tm.active_count(), 1);
        assert_eq!(tm.context(id).unwrap().trail().len(), 12);
        assert_eq!(
            tm.counts(),
            Counts {
                down: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_partial_attributes_do_not_break_retirement() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::BestMatch,
            Box::new(Shift { dx: 0.0, dy: 0.0 }),
        );
        let spawned = tm.associate(
            &frame,
            &[Detection::new(Rect::new(100.0, 100.0, 50.0, 50.0))
                .with_attributes(Some(30.0), Some(0.9))],
        );
        let id = spawned.spawned[0];
        for (age, male) in [(Some(30.0), Some(-1.0)), (Some(30.0), None)] {
            let report = tm.associate(
                &frame,
                &[Detection::new(Rect::new(102.0, 102.0, 50.0, 50.0)).with_attributes(age, male)],
            );
            assert_eq!(report.matched, vec![(id, 0)]);
        }

        let mut events = Vec::new();
        assert!(tm.retire(id, RetireReason::Lost, &mut events));
        let trails = trail_events(&events);
        assert_eq!(trails.len(), 1);
        let demography = trails[0].demography.as_ref().expect("demography");
        assert_eq!(demography.observations.len(), 1);
        assert_eq!(demography.ages, vec![30.0]);
    }

    #[test]
    fn test_best_match_tie_keeps_first_detection() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::BestMatch,
            Box::new(Shift { dx: 0.0, dy: 0.0 }),
        );
        let id = tm
            .add_context(&frame, Rect::new(100.0, 100.0, 50.0, 50.0))
            .unwrap();
        let detections = [
            Detection::new(Rect::new(90.0, 100.0, 50.0, 50.0)),
            Detection::new(Rect::new(110.0, 100.0, 50.0, 50.0)),
        ];
        let report = tm.associate(&frame, &detections);
        assert_eq!(report.matched, vec![(id, 0)]);
        assert_eq!(report.spawned.len(), 1);
    }

    #[test]
    fn test_event_requires_thumbnail_when_configured() {
        let frame = frame();
        let config = TrackerConfig {
            association_policy: AssociationPolicy::BestMatch,
            emit_without_thumbnail: false,
            ..Default::default()
        };
        let mut tm = TrackingManager::new(&config, Box::new(Shift { dx: 0.0, dy: 0.0 }));
        let silent = tm
            .add_context(&frame, Rect::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let seen = tm
            .add_context(&frame, Rect::new(300.0, 300.0, 20.0, 20.0))
            .unwrap();
        tm.associate(&frame, &[Detection::new(Rect::new(302.0, 302.0, 20.0, 20.0))]);

        let mut events = Vec::new();
        assert!(tm.retire(silent, RetireReason::Lost, &mut events));
        assert!(tm.retire(seen, RetireReason::Lost, &mut events));
        let trails = trail_events(&events);
        assert_eq!(trails.len(), 1);
        assert_eq!(trails[0].id, seen);
        assert!(trails[0].thumbnail.is_some());
        // 两条都进入退役队列
        assert_eq!(tm.retired().count(), 2);
    }

    #[test]
    fn test_event_without_thumbnail_by_default() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 0.0, dy: 0.0 }),
        );
        let id = tm
            .add_context(&frame, Rect::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let mut events = Vec::new();
        tm.retire(id, RetireReason::Frozen, &mut events);
        let trails = trail_events(&events);
        assert_eq!(trails.len(), 1);
        assert!(trails[0].thumbnail.is_none());
        assert!(trails[0].demography.is_none());
    }

    #[test]
    fn test_retired_ring_is_bounded() {
        let frame = frame();
        let config = TrackerConfig {
            retired_capacity: 3,
            ..Default::default()
        };
        let mut tm = TrackingManager::new(&config, Box::new(Shift { dx: 0.0, dy: 0.0 }));
        let mut sink = crate::event::Discard;
        let mut ids = Vec::new();
        for i in 0..5 {
            let id = tm
                .add_context(&frame, Rect::new(i as f32 * 60.0, 10.0, 20.0, 20.0))
                .unwrap();
            ids.push(id);
            tm.retire(id, RetireReason::Lost, &mut sink);
        }
        let kept: Vec<u64> = tm.retired().map(|r| r.id).collect();
        assert_eq!(kept, ids[2..].to_vec());
    }

    #[test]
    fn test_tracker_allocation_failure_skips_detection() {
        let frame = frame();
        let mut tm = manager(AssociationPolicy::SuppressThenSpawn, Box::new(Exhausted));
        let report = tm.associate(&frame, &[Detection::new(Rect::new(10.0, 10.0, 20.0, 20.0))]);
        assert_eq!(report.dropped, 1);
        assert_eq!(tm.active_count(), 0);
    }

    #[test]
    fn test_active_context_limit() {
        let frame = frame();
        let config = TrackerConfig {
            max_active_contexts: 2,
            ..Default::default()
        };
        let mut tm = TrackingManager::new(&config, Box::new(Shift { dx: 0.0, dy: 0.0 }));
        let detections: Vec<Detection> = (0..4)
            .map(|i| Detection::new(Rect::new(i as f32 * 100.0, 10.0, 20.0, 20.0)))
            .collect();
        let report = tm.associate(&frame, &detections);
        assert_eq!(report.spawned.len(), 2);
        assert_eq!(report.dropped, 2);
    }

    #[test]
    fn test_rewind_clears_contexts_and_counts() {
        let frame = frame();
        let mut tm = manager(
            AssociationPolicy::SuppressThenSpawn,
            Box::new(Shift { dx: 0.0, dy: 60.0 }),
        );
        tm.set_reference_line(Orientation::Horizontal, 0.0);
        tm.add_context(&frame, Rect::new(75.0, 175.0, 50.0, 50.0))
            .unwrap();
        tm.update(&frame, &mut Vec::new());
        assert_eq!(tm.counts().down, 1);

        let mut events = Vec::new();
        tm.rewind();
        assert_eq!(tm.active_count(), 0);
        assert!(tm.counts().is_zero());
        assert!(tm.update(&frame, &mut events).updated.is_empty());
        assert!(events.is_empty());
    }
}

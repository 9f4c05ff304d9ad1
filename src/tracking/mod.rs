/// 跟踪系统 (Tracking System)
///
/// - context:  单个目标的轨迹与属性
/// - counter:  参考线过线计数
/// - manager:  轨迹生命周期与检测关联
/// - backend:  视觉跟踪器接口与后端选择
pub mod backend;
pub mod context;
pub mod counter;
pub mod kalman;
pub mod manager;
pub mod template;

pub use backend::{TrackerBackend, TrackerKind, VisualTracker};
pub use context::{Demography, FrozenRule, Gender, Observation, TrackingContext};
pub use counter::{Counts, Orientation, ReferenceLine, ReferenceLineCounter};
pub use kalman::{KalmanBoxFilter, KalmanTracker};
pub use manager::{
    Association, AssociationPolicy, FrameUpdate, MatchSlot, RetireReason, RetiredTrack,
    TrackingManager,
};
pub use template::TemplateTracker;

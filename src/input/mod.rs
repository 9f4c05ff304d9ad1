/// 视频输入系统 (Video Input System)
///
/// - FrameSource:   帧源接口 (读取 / 结束判定 / 回绕 / 帧序号)
/// - ImageSequence: 图片目录
/// - MemorySource:  内存帧
/// - downscale:     超宽帧缩小
pub mod resize;
pub mod source;

pub use resize::downscale;
pub use source::{FrameSource, ImageSequence, MemorySource};

//! 帧源 (FrameSource)
//!
//! 处理循环只依赖 `read` / `has_ended` / `rewind` / `seek` / `current_offset`。
//! `read` 返回 None 且 `has_ended()` 为 false 表示读取失败。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{info, warn};

pub trait FrameSource: Send {
    /// 读取下一帧
    fn read(&mut self) -> Option<RgbImage>;

    /// 是否已读到末尾
    fn has_ended(&self) -> bool;

    /// 回到第一帧
    fn rewind(&mut self);

    /// 跳到指定帧序号, 超出帧数时不移动并返回 false
    ///
    /// `offset` 等于帧数表示定位到末尾。
    fn seek(&mut self, offset: u64) -> bool;

    /// 下一帧的序号
    fn current_offset(&self) -> u64;
}

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tif"];

/// 图片序列 (目录中的图片按文件名排序)
pub struct ImageSequence {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
}

impl ImageSequence {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("无法读取目录 {}", dir.display()))? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            bail!("目录 {} 中没有图片", dir.display());
        }
        files.sort();
        info!("🎞️  图片序列: {} ({} 帧)", dir.display(), files.len());
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            position: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn read(&mut self) -> Option<RgbImage> {
        let path = self.files.get(self.position)?;
        match image::open(path) {
            Ok(img) => {
                self.position += 1;
                Some(img.to_rgb8())
            }
            Err(e) => {
                warn!("❌ 读取 {} 失败: {}", path.display(), e);
                None
            }
        }
    }

    fn has_ended(&self) -> bool {
        self.position >= self.files.len()
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn seek(&mut self, offset: u64) -> bool {
        match usize::try_from(offset) {
            Ok(offset) if offset <= self.files.len() => {
                self.position = offset;
                true
            }
            _ => false,
        }
    }

    fn current_offset(&self) -> u64 {
        self.position as u64
    }
}

/// 内存帧源 (测试/离线处理)
pub struct MemorySource {
    frames: Vec<RgbImage>,
    position: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames,
            position: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn read(&mut self) -> Option<RgbImage> {
        let frame = self.frames.get(self.position)?.clone();
        self.position += 1;
        Some(frame)
    }

    fn has_ended(&self) -> bool {
        self.position >= self.frames.len()
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn seek(&mut self, offset: u64) -> bool {
        match usize::try_from(offset) {
            Ok(offset) if offset <= self.frames.len() => {
                self.position = offset;
                true
            }
            _ => false,
        }
    }

    fn current_offset(&self) -> u64 {
        self.position as u64
    }
}

//! 帧缩放: 宽度超过上限时等比缩小 (fast_image_resize)

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::RgbImage;

/// 等比缩小到不超过 `max_width`, 已满足时原样返回 (`max_width == 0` 表示不限制)
pub fn downscale(frame: RgbImage, max_width: u32) -> Result<RgbImage> {
    let (width, height) = frame.dimensions();
    if max_width == 0 || width <= max_width {
        return Ok(frame);
    }

    let dst_width = max_width;
    let dst_height = ((height as f64 * max_width as f64 / width as f64).round() as u32).max(1);

    let src_image = fr::images::Image::from_vec_u8(width, height, frame.into_raw(), fr::PixelType::U8x3)
        .context("构建源图像失败")?;
    let mut dst_image = fr::images::Image::new(dst_width, dst_height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .with_context(|| format!("缩放 {}x{} → {}x{} 失败", width, height, dst_width, dst_height))?;

    RgbImage::from_raw(dst_width, dst_height, dst_image.buffer().to_vec())
        .context("RGB图像转换失败")
}

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// Copy a `size` region centered on the framebuffer. Areas outside the frame
/// come back black.
pub fn capture_center_region(
    frame: &[u32],
    frame_size: (u32, u32),
    size: (u32, u32),
) -> RgbImage {
    let (fw, fh) = (i64::from(frame_size.0), i64::from(frame_size.1));
    let left = fw / 2 - i64::from(size.0) / 2;
    let top = fh / 2 - i64::from(size.1) / 2;

    RgbImage::from_fn(size.0, size.1, |x, y| {
        let sx = left + i64::from(x);
        let sy = top + i64::from(y);
        if sx < 0 || sy < 0 || sx >= fw || sy >= fh {
            return Rgb([0, 0, 0]);
        }
        let packed = frame.get((sy * fw + sx) as usize).copied().unwrap_or(0);
        Rgb([(packed >> 16) as u8, (packed >> 8) as u8, packed as u8])
    })
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(image)
        .context("failed to encode seed image as JPEG")?;
    Ok(out)
}

//! Mirrored tiling of the current image around the camera position.
//!
//! The base tile is centered on the viewport center plus the camera offset and
//! scaled by the camera zoom. Neighbours sit exactly one scaled width/height
//! away and are flipped on every axis whose offset index is odd, so shared
//! edges always show the same pixels and the seam disappears.

use image::RgbaImage;
use image::imageops::{self, FilterType};

use super::state::CameraState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlacement {
    /// Horizontal offset index relative to the base tile.
    pub column: i32,
    /// Vertical offset index relative to the base tile.
    pub row: i32,
    pub rect: Rect,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl TilePlacement {
    fn variant(&self) -> usize {
        usize::from(self.flip_horizontal) | (usize::from(self.flip_vertical) << 1)
    }
}

pub fn scaled_size(width: u32, height: u32, zoom: f32) -> (u32, u32) {
    let w = (width as f32 * zoom).round().max(1.0);
    let h = (height as f32 * zoom).round().max(1.0);
    (w as u32, h as u32)
}

/// Placement of the unflipped tile, snapped to whole pixels.
pub fn base_rect(image: (u32, u32), camera: &CameraState, viewport: (u32, u32)) -> Rect {
    let (sw, sh) = scaled_size(image.0, image.1, camera.zoom);
    let center_x = (viewport.0 / 2) as f32 + camera.x;
    let center_y = (viewport.1 / 2) as f32 + camera.y;
    Rect {
        x: (center_x - sw as f32 / 2.0).floor(),
        y: (center_y - sh as f32 / 2.0).floor(),
        width: sw as f32,
        height: sh as f32,
    }
}

/// Every tile of a `(2 * radius + 1)`-square grid around the base placement.
pub fn tile_layout(
    image: (u32, u32),
    camera: &CameraState,
    viewport: (u32, u32),
    radius: u32,
) -> Vec<TilePlacement> {
    let base = base_rect(image, camera, viewport);
    let r = radius as i32;
    let mut tiles = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for column in -r..=r {
        for row in -r..=r {
            tiles.push(TilePlacement {
                column,
                row,
                rect: Rect {
                    x: base.x + base.width * column as f32,
                    y: base.y + base.height * row as f32,
                    ..base
                },
                flip_horizontal: column % 2 != 0,
                flip_vertical: row % 2 != 0,
            });
        }
    }
    tiles
}

/// Pack an RGB triple into the `0x00RRGGBB` layout softbuffer presents.
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

struct TileCache {
    serial: u64,
    width: u32,
    height: u32,
    /// Indexed by `flip_h | flip_v << 1`.
    variants: [Vec<u32>; 4],
}

/// Draws the tiled image into a packed framebuffer. Scaled and flipped copies
/// are cached until the image or the scaled size changes.
pub struct TiledRenderer {
    radius: u32,
    cache: Option<TileCache>,
}

impl TiledRenderer {
    pub fn new(radius: u32) -> Self {
        Self {
            radius: radius.max(1),
            cache: None,
        }
    }

    /// Returns how many tiles intersected the viewport.
    pub fn draw(
        &mut self,
        frame: &mut [u32],
        viewport: (u32, u32),
        image: &RgbaImage,
        serial: u64,
        camera: &CameraState,
    ) -> usize {
        let (sw, sh) = scaled_size(image.width(), image.height(), camera.zoom);
        let stale = self
            .cache
            .as_ref()
            .is_none_or(|c| c.serial != serial || c.width != sw || c.height != sh);
        if stale {
            self.cache = Some(TileCache {
                serial,
                width: sw,
                height: sh,
                variants: prepare_variants(image, sw, sh),
            });
        }
        let Some(cache) = self.cache.as_ref() else {
            return 0;
        };

        let mut drawn = 0;
        for tile in tile_layout(image.dimensions(), camera, viewport, self.radius) {
            let pixels = &cache.variants[tile.variant()];
            if blit(
                frame,
                viewport,
                pixels,
                (sw, sh),
                (tile.rect.x as i64, tile.rect.y as i64),
            ) {
                drawn += 1;
            }
        }
        drawn
    }
}

fn prepare_variants(image: &RgbaImage, width: u32, height: u32) -> [Vec<u32>; 4] {
    let scaled = if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::Triangle)
    };
    let flipped_h = imageops::flip_horizontal(&scaled);
    let flipped_v = imageops::flip_vertical(&scaled);
    let flipped_both = imageops::rotate180(&scaled);
    [
        pack_image(&scaled),
        pack_image(&flipped_h),
        pack_image(&flipped_v),
        pack_image(&flipped_both),
    ]
}

fn pack_image(image: &RgbaImage) -> Vec<u32> {
    image
        .pixels()
        .map(|p| pack_rgb(p.0[0], p.0[1], p.0[2]))
        .collect()
}

/// Copy `src` into `frame` at `origin`, clipped to the viewport.
fn blit(
    frame: &mut [u32],
    viewport: (u32, u32),
    src: &[u32],
    size: (u32, u32),
    origin: (i64, i64),
) -> bool {
    let (vw, vh) = (i64::from(viewport.0), i64::from(viewport.1));
    let (sw, sh) = (i64::from(size.0), i64::from(size.1));
    let (x, y) = origin;

    let x0 = x.max(0);
    let x1 = (x + sw).min(vw);
    let y0 = y.max(0);
    let y1 = (y + sh).min(vh);
    if x0 >= x1 || y0 >= y1 {
        return false;
    }

    let len = (x1 - x0) as usize;
    for row in y0..y1 {
        let src_start = ((row - y) * sw + (x0 - x)) as usize;
        let dst_start = (row * vw + x0) as usize;
        let (Some(dst), Some(src)) = (
            frame.get_mut(dst_start..dst_start + len),
            src.get(src_start..src_start + len),
        ) else {
            continue;
        };
        dst.copy_from_slice(src);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn base_rect_centers_scaled_image_on_camera() {
        let camera = CameraState {
            x: 10.0,
            y: -4.0,
            zoom: 2.0,
        };
        let rect = base_rect((100, 50), &camera, (1024, 768));
        assert_eq!(rect.width, 200.0);
        assert_eq!(rect.height, 100.0);
        assert_eq!(rect.x, 512.0 + 10.0 - 100.0);
        assert_eq!(rect.y, 384.0 - 4.0 - 50.0);
    }

    #[test]
    fn blit_clips_negative_origin() {
        let mut frame = vec![0u32; 4];
        let src = vec![1, 2, 3, 4];
        assert!(blit(&mut frame, (2, 2), &src, (2, 2), (-1, -1)));
        assert_eq!(frame, vec![4, 0, 0, 0]);
        assert!(!blit(&mut frame, (2, 2), &src, (2, 2), (5, 0)));
    }

    #[test]
    fn renderer_reuses_cache_for_same_image() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let mut renderer = TiledRenderer::new(1);
        let mut frame = vec![0u32; 16 * 16];
        renderer.draw(&mut frame, (16, 16), &image, 1, &CameraState::ORIGIN);
        let before = renderer.cache.as_ref().map(|c| c.variants[0].as_ptr());
        renderer.draw(&mut frame, (16, 16), &image, 1, &CameraState::ORIGIN);
        let after = renderer.cache.as_ref().map(|c| c.variants[0].as_ptr());
        assert_eq!(before, after);
        renderer.draw(&mut frame, (16, 16), &image, 2, &CameraState::ORIGIN);
        assert_eq!(renderer.cache.as_ref().map(|c| c.serial), Some(2));
    }
}

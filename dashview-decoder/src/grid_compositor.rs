//! Grid compositor for tiling camera frames

use dashview_core::{CameraRole, FrameSlot};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Tiles up to four camera frames into one 2x2 image.
///
/// Front and back fill the top row, the left and right repeaters the bottom
/// row. Cameras without a frame get a placeholder tile.
#[derive(Debug, Clone)]
pub struct GridCompositor {
    tile_width: u32,
    tile_height: u32,
    background: Rgba<u8>,
    placeholder: Rgba<u8>,
}

impl Default for GridCompositor {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl GridCompositor {
    /// Creates a compositor with the given tile size
    pub fn new(tile_width: u32, tile_height: u32) -> Self {
        Self {
            tile_width: tile_width.max(1),
            tile_height: tile_height.max(1),
            background: Rgba([0, 0, 0, 255]),
            placeholder: Rgba([32, 32, 32, 255]),
        }
    }

    /// Sets the placeholder tile color
    pub fn with_placeholder(mut self, color: Rgba<u8>) -> Self {
        self.placeholder = color;
        self
    }

    /// Grid cell for a camera, as (column, row)
    pub fn cell(role: CameraRole) -> Option<(u32, u32)> {
        match role {
            CameraRole::Front => Some((0, 0)),
            CameraRole::Back => Some((1, 0)),
            CameraRole::LeftRepeater => Some((0, 1)),
            CameraRole::RightRepeater => Some((1, 1)),
            CameraRole::Unknown => None,
        }
    }

    /// Output image dimensions
    pub fn size(&self) -> (u32, u32) {
        (self.tile_width * 2, self.tile_height * 2)
    }

    /// Renders one grid image from the frame each camera presents
    pub fn compose<'a>(&self, frames: impl IntoIterator<Item = (CameraRole, &'a FrameSlot)>) -> RgbaImage {
        let (width, height) = self.size();
        let mut grid = RgbaImage::from_pixel(width, height, self.background);

        let mut filled = [[false; 2]; 2];
        for (role, slot) in frames {
            let Some((col, row)) = Self::cell(role) else {
                continue;
            };
            let x = (col * self.tile_width) as i32;
            let y = (row * self.tile_height) as i32;
            match slot.frame() {
                Some(frame) => {
                    let tile = self.fit(&frame.image);
                    // Center letterboxed tiles within their cell
                    let dx = (self.tile_width - tile.width()) as i32 / 2;
                    let dy = (self.tile_height - tile.height()) as i32 / 2;
                    overlay_image(&mut grid, &tile, x + dx, y + dy);
                }
                None => self.fill(&mut grid, x, y),
            }
            filled[row as usize][col as usize] = true;
        }

        for (row, cols) in filled.iter().enumerate() {
            for (col, done) in cols.iter().enumerate() {
                if !done {
                    let x = col as i32 * self.tile_width as i32;
                    let y = row as i32 * self.tile_height as i32;
                    self.fill(&mut grid, x, y);
                }
            }
        }

        grid
    }

    /// Scales `image` to fit a tile, keeping its aspect ratio
    fn fit(&self, image: &RgbaImage) -> RgbaImage {
        if image.width() == self.tile_width && image.height() == self.tile_height {
            return image.clone();
        }
        let scale = f64::min(
            self.tile_width as f64 / image.width().max(1) as f64,
            self.tile_height as f64 / image.height().max(1) as f64,
        );
        let w = ((image.width() as f64 * scale).round() as u32).clamp(1, self.tile_width);
        let h = ((image.height() as f64 * scale).round() as u32).clamp(1, self.tile_height);
        imageops::resize(image, w, h, FilterType::Triangle)
    }

    fn fill(&self, grid: &mut RgbaImage, x: i32, y: i32) {
        let tile = RgbaImage::from_pixel(self.tile_width, self.tile_height, self.placeholder);
        overlay_image(grid, &tile, x, y);
    }
}

/// Overlays one image onto another at the specified position
fn overlay_image(base: &mut RgbaImage, overlay: &RgbaImage, x: i32, y: i32) {
    let base_width = base.width() as i32;
    let base_height = base.height() as i32;

    // Calculate the region to copy
    let src_x_start = 0.max(-x);
    let src_y_start = 0.max(-y);
    let src_x_end = (overlay.width() as i32).min(base_width - x);
    let src_y_end = (overlay.height() as i32).min(base_height - y);

    if src_x_start >= src_x_end || src_y_start >= src_y_end {
        return;
    }

    for src_y in src_y_start..src_y_end {
        for src_x in src_x_start..src_x_end {
            let over = overlay.get_pixel(src_x as u32, src_y as u32);
            let dest = base.get_pixel_mut((x + src_x) as u32, (y + src_y) as u32);

            // Alpha blending
            let alpha = over[3] as f32 / 255.0;
            let inv_alpha = 1.0 - alpha;
            for c in 0..3 {
                dest[c] = (over[c] as f32 * alpha + dest[c] as f32 * inv_alpha) as u8;
            }
            dest[3] = 255;
        }
    }
}

//! Zooming Mandelbrot kernel.
//!
//! Every iteration recomputes the whole frame into the current buffer for the
//! current viewport, then widens the viewport around its center.

use num_complex::Complex32;
use rayon::prelude::*;

use super::{finalize_scheduler, init_scheduler, offload_compute, run_chunked_rows, run_cyclic_rows};
use crate::compute::{
    Affinity, BackendDescriptor, Buffer, Engine, EngineError, FrameBuffers, Registry, Tile,
};

/// Per-pixel iteration cap.
pub const MAX_ITERATIONS: u32 = 4096;

/// Relative viewport growth per iteration (negative zooms in).
pub const ZOOM_SPEED: f32 = -0.01;

/// Rows per task of the `dynamic` variant.
const DYNAMIC_CHUNK: usize = 2;

/// Region of the complex plane mapped onto the raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub left_x: f32,
    pub right_x: f32,
    pub top_y: f32,
    pub bottom_y: f32,
    pub x_step: f32,
    pub y_step: f32,
}

impl Viewport {
    /// Starting window for a `dim`×`dim` raster.
    pub fn initial(dim: usize) -> Self {
        let mut viewport = Self {
            left_x: -0.744,
            right_x: -0.7439,
            top_y: 0.146,
            bottom_y: 0.1459,
            x_step: 0.0,
            y_step: 0.0,
        };
        viewport.update_steps(dim);
        viewport
    }

    /// Move each side outward by `-ZOOM_SPEED` of the window size, so the
    /// window grows by 2% per axis.
    pub fn zoom(&mut self, dim: usize) {
        let x_range = self.right_x - self.left_x;
        let y_range = self.top_y - self.bottom_y;

        self.left_x += ZOOM_SPEED * x_range;
        self.right_x -= ZOOM_SPEED * x_range;
        self.top_y -= ZOOM_SPEED * y_range;
        self.bottom_y += ZOOM_SPEED * y_range;

        self.update_steps(dim);
    }

    fn update_steps(&mut self, dim: usize) {
        self.x_step = (self.right_x - self.left_x) / dim as f32;
        self.y_step = (self.top_y - self.bottom_y) / dim as f32;
    }
}

/// Escape-time iteration count of the pixel at `(row, col)`.
pub fn compute_one_pixel(row: usize, col: usize, viewport: &Viewport) -> u32 {
    let c = Complex32::new(
        viewport.left_x + viewport.x_step * col as f32,
        viewport.top_y - viewport.y_step * row as f32,
    );
    let mut z = Complex32::new(0.0, 0.0);

    let mut iter = 0;
    while iter < MAX_ITERATIONS {
        if z.norm_sqr() > 4.0 {
            break;
        }
        z = z * z + c;
        iter += 1;
    }
    iter
}

/// Map an escape-time count to a packed `0xRRGGBBAA` color. Points inside the
/// set are black.
pub fn iteration_to_color(iter: u32) -> u32 {
    let (r, g) = match iter {
        i if i >= MAX_ITERATIONS => (0, 0),
        i if i < 64 => (i * 2, 0),
        i if i < 128 => (((i - 64) * 128) / 126 + 128, 0),
        i if i < 256 => (((i - 128) * 62) / 127 + 193, 0),
        i if i < 512 => (255, ((i - 256) * 62) / 255 + 1),
        i if i < 1024 => (255, ((i - 512) * 63) / 511 + 64),
        i if i < 2048 => (255, ((i - 1024) * 63) / 1023 + 128),
        i => (255, ((i - 2048) * 63) / 2047 + 192),
    };
    (r << 24) | (g << 16) | 0xFF
}

#[inline]
fn paint_row(frames: &FrameBuffers, row: usize, viewport: &Viewport) {
    for col in 0..frames.dim() {
        let color = iteration_to_color(compute_one_pixel(row, col, viewport));
        frames.set(Buffer::Current, row, col, color);
    }
}

#[inline]
fn paint_tile(frames: &FrameBuffers, tile: &Tile, viewport: &Viewport) {
    for (row, col) in tile.cells() {
        let color = iteration_to_color(compute_one_pixel(row, col, viewport));
        frames.set(Buffer::Current, row, col, color);
    }
}

/// Tiles go to the worker matching their tile row, in both first touch and
/// compute, so each worker keeps revisiting the memory it touched first.
#[inline]
fn row_affinity(tile: &Tile) -> Affinity {
    Affinity::Worker(tile.coord.row)
}

fn advance(engine: &mut Engine) {
    let dim = engine.dim();
    engine.state_mut().viewport.zoom(dim);
}

fn compute_seq(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        let viewport = engine.state().viewport;
        for row in 0..engine.dim() {
            paint_row(engine.frames(), row, &viewport);
        }
        advance(engine);
    }
    Ok(0)
}

fn compute_tiled(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        let viewport = engine.state().viewport;
        engine.run_tiles_inline(|frames, tile| paint_tile(frames, tile, &viewport));
        advance(engine);
    }
    Ok(0)
}

fn first_touch_sched(engine: &mut Engine) -> Result<(), EngineError> {
    engine.run_tile_wave(row_affinity, None, |frames, tile| {
        for (row, col) in tile.cells() {
            frames.set(Buffer::Current, row, col, 0);
        }
    })
}

fn compute_sched(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        let viewport = engine.state().viewport;
        engine.run_tile_wave(row_affinity, Some(Buffer::Current), move |frames, tile| {
            paint_tile(frames, tile, &viewport)
        })?;
        advance(engine);
    }
    Ok(0)
}

fn compute_static(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        let viewport = engine.state().viewport;
        run_cyclic_rows(engine, move |frames, row| paint_row(frames, row, &viewport))?;
        advance(engine);
    }
    Ok(0)
}

fn compute_dynamic(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        let viewport = engine.state().viewport;
        run_chunked_rows(engine, DYNAMIC_CHUNK, move |frames, row| {
            paint_row(frames, row, &viewport)
        })?;
        advance(engine);
    }
    Ok(0)
}

fn compute_rayon(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        let viewport = engine.state().viewport;
        let frames = engine.frames();
        (0..frames.dim())
            .into_par_iter()
            .for_each(|row| paint_row(frames, row, &viewport));
        advance(engine);
    }
    Ok(0)
}

pub(super) fn register(registry: &mut Registry) {
    registry.register(BackendDescriptor::new("mandel", "seq", compute_seq));
    registry.register(BackendDescriptor::new("mandel", "tiled", compute_tiled));
    registry.register(
        BackendDescriptor::new("mandel", "sched", compute_sched)
            .with_init(init_scheduler)
            .with_finalize(finalize_scheduler)
            .with_first_touch(first_touch_sched),
    );
    registry.register(
        BackendDescriptor::new("mandel", "static", compute_static)
            .with_init(init_scheduler)
            .with_finalize(finalize_scheduler),
    );
    registry.register(
        BackendDescriptor::new("mandel", "dynamic", compute_dynamic)
            .with_init(init_scheduler)
            .with_finalize(finalize_scheduler),
    );
    registry.register(BackendDescriptor::new("mandel", "rayon", compute_rayon));
    registry.register(BackendDescriptor::new("mandel", "ocl", offload_compute).on_device());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_viewport_steps() {
        let viewport = Viewport::initial(1024);
        assert!((viewport.x_step - 0.0001 / 1024.0).abs() < 1e-9);
        assert!((viewport.y_step - 0.0001 / 1024.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_widens_window_around_center() {
        let mut viewport = Viewport::initial(64);
        let width = viewport.right_x - viewport.left_x;
        let center = (viewport.left_x + viewport.right_x) / 2.0;

        viewport.zoom(64);

        let zoomed = viewport.right_x - viewport.left_x;
        assert!((zoomed - width * 1.02).abs() < 1e-6);
        assert!(((viewport.left_x + viewport.right_x) / 2.0 - center).abs() < 1e-6);
        assert!((viewport.x_step - zoomed / 64.0).abs() < 1e-12);
    }

    #[test]
    fn test_origin_never_escapes() {
        let viewport = Viewport {
            left_x: 0.0,
            right_x: 1.0,
            top_y: 0.0,
            bottom_y: -1.0,
            x_step: 0.0,
            y_step: 0.0,
        };
        assert_eq!(compute_one_pixel(0, 0, &viewport), MAX_ITERATIONS);
    }

    #[test]
    fn test_far_point_escapes_immediately() {
        let viewport = Viewport {
            left_x: 3.0,
            right_x: 4.0,
            top_y: 3.0,
            bottom_y: 2.0,
            x_step: 0.0,
            y_step: 0.0,
        };
        assert_eq!(compute_one_pixel(0, 0, &viewport), 1);
    }

    #[test]
    fn test_color_ramp() {
        assert_eq!(iteration_to_color(0), 0x0000_00FF);
        assert_eq!(iteration_to_color(10), 0x1400_00FF);
        assert_eq!(iteration_to_color(100), 0xA400_00FF);
        assert_eq!(iteration_to_color(4095), 0xFFFF_00FF);
        assert_eq!(iteration_to_color(MAX_ITERATIONS), 0x0000_00FF);
    }
}

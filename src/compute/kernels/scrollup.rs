//! Scrolling kernel: each iteration moves the frame up by one row, wrapping
//! the top row to the bottom.

use rayon::prelude::*;

use super::{finalize_scheduler, init_scheduler, run_chunked_rows, run_cyclic_rows};
use crate::compute::{
    Affinity, BackendDescriptor, Buffer, Engine, EngineError, FrameBuffers, Registry, Tile,
};

/// Rows per task of the `dynamic` variant.
const DYNAMIC_CHUNK: usize = 10;

#[inline]
fn scroll_cell(frames: &FrameBuffers, row: usize, col: usize) {
    let below = (row + 1) % frames.dim();
    frames.set(Buffer::Next, row, col, frames.get(Buffer::Current, below, col));
}

fn scroll_row(frames: &FrameBuffers, row: usize) {
    for col in 0..frames.dim() {
        scroll_cell(frames, row, col);
    }
}

fn scroll_tile(frames: &FrameBuffers, tile: &Tile) {
    for (row, col) in tile.cells() {
        scroll_cell(frames, row, col);
    }
}

fn row_affinity(tile: &Tile) -> Affinity {
    Affinity::Worker(tile.coord.row)
}

fn compute_seq(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        for row in 0..engine.dim() {
            scroll_row(engine.frames(), row);
        }
        engine.swap_buffers();
    }
    Ok(0)
}

fn compute_tiled(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        engine.run_tiles_inline(scroll_tile);
        engine.swap_buffers();
    }
    Ok(0)
}

// Both buffers are written during a run, so both get placed.
fn first_touch_sched(engine: &mut Engine) -> Result<(), EngineError> {
    engine.run_tile_wave(row_affinity, None, |frames, tile| {
        for (row, col) in tile.cells() {
            frames.set(Buffer::Current, row, col, 0);
            frames.set(Buffer::Next, row, col, 0);
        }
    })
}

fn compute_sched(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        // No debug overlay: the next wave reads this frame.
        engine.run_tile_wave(row_affinity, None, scroll_tile)?;
        engine.swap_buffers();
    }
    Ok(0)
}

fn compute_static(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        run_cyclic_rows(engine, scroll_row)?;
        engine.swap_buffers();
    }
    Ok(0)
}

fn compute_dynamic(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        run_chunked_rows(engine, DYNAMIC_CHUNK, scroll_row)?;
        engine.swap_buffers();
    }
    Ok(0)
}

fn compute_rayon(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    for _ in 0..nb_iter {
        let frames = engine.frames();
        (0..frames.dim())
            .into_par_iter()
            .for_each(|row| scroll_row(frames, row));
        engine.swap_buffers();
    }
    Ok(0)
}

pub(super) fn register(registry: &mut Registry) {
    registry.register(BackendDescriptor::new("scrollup", "seq", compute_seq));
    registry.register(BackendDescriptor::new("scrollup", "tiled", compute_tiled));
    registry.register(
        BackendDescriptor::new("scrollup", "sched", compute_sched)
            .with_init(init_scheduler)
            .with_finalize(finalize_scheduler)
            .with_first_touch(first_touch_sched),
    );
    registry.register(
        BackendDescriptor::new("scrollup", "static", compute_static)
            .with_init(init_scheduler)
            .with_finalize(finalize_scheduler),
    );
    registry.register(
        BackendDescriptor::new("scrollup", "dynamic", compute_dynamic)
            .with_init(init_scheduler)
            .with_finalize(finalize_scheduler),
    );
    registry.register(BackendDescriptor::new("scrollup", "rayon", compute_rayon));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Pattern, RunConfig, Seed};

    fn engine(variant: &str, dim: usize) -> Engine {
        let registry = {
            let mut registry = Registry::new();
            register(&mut registry);
            registry
        };
        let config = RunConfig {
            kernel: "scrollup".to_string(),
            variant: variant.to_string(),
            dim,
            grain: 2,
            threads: crate::schema::Parallelism::Fixed(3),
            seed: Seed {
                pattern: Pattern::Stripes {
                    period: 1,
                    colors: (0xFFFF_FFFF, 0x0000_00FF),
                },
            },
            ..Default::default()
        };
        Engine::from_registry(config, &registry).unwrap()
    }

    #[test]
    fn test_single_step_moves_rows_up() {
        let mut engine = engine("seq", 4);
        engine.compute(1).unwrap();
        let frames = engine.frames();
        // Row 0 now holds what was row 1
        assert_eq!(frames.get(Buffer::Current, 0, 0), 0x0000_00FF);
        assert_eq!(frames.get(Buffer::Current, 1, 2), 0xFFFF_FFFF);
        assert_eq!(frames.get(Buffer::Current, 3, 3), 0xFFFF_FFFF);
    }

    #[test]
    fn test_full_cycle_restores_frame() {
        for variant in ["seq", "static", "dynamic", "rayon"] {
            let mut engine = engine(variant, 12);
            let initial = engine.config().seed.generate(12).unwrap();
            engine.compute(12).unwrap();
            assert_eq!(
                engine.frames().snapshot(Buffer::Current),
                initial,
                "{variant} did not wrap around"
            );
        }
    }

    #[test]
    fn test_more_workers_than_rows() {
        let mut engine = engine("static", 2);
        engine.compute(1).unwrap();
        assert_eq!(engine.frames().get(Buffer::Current, 0, 0), 0x0000_00FF);
        assert_eq!(engine.frames().get(Buffer::Current, 1, 0), 0xFFFF_FFFF);
    }
}

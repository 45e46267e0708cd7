//! Built-in kernels and the hooks their variants share.

pub mod mandel;
pub mod scrollup;

use std::sync::Arc;

pub use mandel::{MAX_ITERATIONS, Viewport, ZOOM_SPEED};

use super::{Affinity, Engine, EngineError, FrameBuffers, Registry, Scheduler, WaveParams};

/// Register every built-in backend and the generic device launcher.
pub fn register_builtin(registry: &mut Registry) {
    mandel::register(registry);
    scrollup::register(registry);
    registry.set_fallback(offload_compute);
}

/// Generic device launcher: enqueue one whole-frame wave per iteration and
/// advance the viewport on the host. Never waits for the device.
pub fn offload_compute(engine: &mut Engine, nb_iter: u32) -> Result<u32, EngineError> {
    let dim = engine.dim();
    for _ in 0..nb_iter {
        let viewport = engine.state().viewport;
        engine.device_mut()?.enqueue_wave(WaveParams {
            viewport,
            max_iter: MAX_ITERATIONS,
        });
        engine.state_mut().viewport.zoom(dim);
    }
    Ok(0)
}

/// `init` hook of scheduled variants.
pub fn init_scheduler(engine: &mut Engine) -> Result<(), EngineError> {
    let scheduler = Scheduler::init(engine.config().threads, engine.trace())?;
    engine.install_scheduler(scheduler);
    Ok(())
}

/// `finalize` hook of scheduled variants.
pub fn finalize_scheduler(engine: &mut Engine) -> Result<(), EngineError> {
    if let Some(scheduler) = engine.take_scheduler() {
        let stats = scheduler.stats();
        log::debug!(
            "Scheduler ran {} tasks, per worker {:?}",
            stats.total(),
            stats.per_worker
        );
        scheduler.finalize();
    }
    Ok(())
}

/// One task per worker; task `w` handles rows `w, w + P, w + 2P, ...` and is
/// hinted to worker `w`.
pub(crate) fn run_cyclic_rows<F>(engine: &mut Engine, row_fn: F) -> Result<(), EngineError>
where
    F: Fn(&FrameBuffers, usize) + Send + Sync + 'static,
{
    let dim = engine.dim();
    let frames = Arc::clone(engine.frames());
    let row_fn = Arc::new(row_fn);

    let scheduler = engine.scheduler_mut()?;
    let workers = scheduler.workers();
    for worker in 0..workers {
        let frames = Arc::clone(&frames);
        let row_fn = Arc::clone(&row_fn);
        scheduler.create_task(Affinity::Worker(worker), move |_| {
            for row in (worker..dim).step_by(workers) {
                row_fn(&frames, row);
            }
        });
    }
    scheduler.task_wait();
    Ok(())
}

/// One unhinted task per block of `chunk` consecutive rows.
pub(crate) fn run_chunked_rows<F>(
    engine: &mut Engine,
    chunk: usize,
    row_fn: F,
) -> Result<(), EngineError>
where
    F: Fn(&FrameBuffers, usize) + Send + Sync + 'static,
{
    let dim = engine.dim();
    let frames = Arc::clone(engine.frames());
    let row_fn = Arc::new(row_fn);

    let scheduler = engine.scheduler_mut()?;
    for start in (0..dim).step_by(chunk) {
        let frames = Arc::clone(&frames);
        let row_fn = Arc::clone(&row_fn);
        let end = (start + chunk).min(dim);
        scheduler.create_task(Affinity::Any, move |_| {
            for row in start..end {
                row_fn(&frames, row);
            }
        });
    }
    scheduler.task_wait();
    Ok(())
}

//! Iteration driver.
//!
//! The [`Engine`] owns everything a backend touches: the raster, the
//! iteration state, the scheduler and the offload device. Backends receive
//! `&mut Engine`, so global iteration state and buffer roles are only ever
//! mutated on the driver thread, between waves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::{
    Affinity, BackendDescriptor, Buffer, DeviceError, DeviceOffload, Display, EngineError,
    FrameBuffers, Registry, Scheduler, SchedulerState, Tile, Viewport, divides_evenly, partition,
};
use crate::schema::{RunConfig, TraceFlags};

/// Colors identifying workers in the debug overlay.
const WORKER_COLORS: [u32; 7] = [
    0x00F9_F9FF, // Cyan
    0xAE4A_FFFF, // Purple
    0x66CC_FFFF, // Sky blue
    0xFF66_66FF, // Salmon
    0xFFFF_00FF, // Yellow
    0xFF74_26FF, // Orange
    0x00FF_00FF, // Green
];

/// Side of the square painted in a tile's corner by the debug overlay.
const OVERLAY_SIZE: usize = 6;

/// Global state carried from one iteration to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationState {
    /// Iterations completed so far.
    pub iteration: u64,
    /// Viewing window of the next iteration.
    pub viewport: Viewport,
}

/// Outcome of [`Engine::run`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunSummary {
    pub kernel: String,
    pub variant: String,
    pub iterations: u64,
    /// A backend reported that no further iterations are needed.
    pub stabilized: bool,
    /// The cancel flag stopped the run.
    pub cancelled: bool,
    pub elapsed_ms: f64,
    /// Checksum of the final current buffer.
    pub checksum: u64,
}

struct PartitionCache {
    dim: usize,
    grain: usize,
    tiles: Arc<[Tile]>,
}

/// Drives one backend over a double-buffered raster.
pub struct Engine {
    config: RunConfig,
    descriptor: BackendDescriptor,
    frames: Arc<FrameBuffers>,
    state: IterationState,
    scheduler: Option<Scheduler>,
    device: Option<DeviceOffload>,
    partition: Option<PartitionCache>,
    started: bool,
    finished: bool,
}

impl Engine {
    /// Allocate the raster for a resolved backend.
    pub fn new(config: RunConfig, descriptor: BackendDescriptor) -> Result<Self, EngineError> {
        config.validate()?;

        let frames = Arc::new(FrameBuffers::allocate(config.dim));
        let state = IterationState {
            iteration: 0,
            viewport: Viewport::initial(config.dim),
        };

        Ok(Self {
            config,
            descriptor,
            frames,
            state,
            scheduler: None,
            device: None,
            partition: None,
            started: false,
            finished: false,
        })
    }

    /// Resolve the configured backend from `registry` and build an engine.
    pub fn from_registry(config: RunConfig, registry: &Registry) -> Result<Self, EngineError> {
        config.validate()?;
        let descriptor = registry.resolve(&config.kernel, &config.variant, config.uses_offload())?;
        Self::new(config, descriptor)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    /// Raster side length.
    #[inline]
    pub fn dim(&self) -> usize {
        self.config.dim
    }

    #[inline]
    pub fn trace(&self) -> TraceFlags {
        self.config.debug_flags
    }

    /// Shared handle on the raster buffers.
    #[inline]
    pub fn frames(&self) -> &Arc<FrameBuffers> {
        &self.frames
    }

    #[inline]
    pub fn state(&self) -> &IterationState {
        &self.state
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut IterationState {
        &mut self.state
    }

    /// Iterations completed so far.
    #[inline]
    pub fn iteration(&self) -> u64 {
        self.state.iteration
    }

    /// Hand a scheduler to the engine. Typically called from an `init` hook.
    pub fn install_scheduler(&mut self, scheduler: Scheduler) {
        self.scheduler = Some(scheduler);
    }

    /// Take the scheduler back. Typically called from a `finalize` hook.
    pub fn take_scheduler(&mut self) -> Option<Scheduler> {
        self.scheduler.take()
    }

    /// The scheduler installed by the backend's `init` hook.
    pub fn scheduler_mut(&mut self) -> Result<&mut Scheduler, EngineError> {
        let Self {
            scheduler,
            descriptor,
            ..
        } = self;
        scheduler.as_mut().ok_or_else(|| EngineError::MissingScheduler {
            kernel: descriptor.kernel.clone(),
            variant: descriptor.variant.clone(),
        })
    }

    /// The offload device, present once `start` ran for a device backend.
    pub fn device_mut(&mut self) -> Result<&mut DeviceOffload, EngineError> {
        self.device
            .as_mut()
            .ok_or(EngineError::Device(DeviceError::NotInitialized))
    }

    /// Tiles of the active `(dim, grain)`, computed once and cached.
    pub fn tiles(&mut self) -> Arc<[Tile]> {
        let (dim, grain) = (self.config.dim, self.config.grain);

        if let Some(cache) = &self.partition {
            if cache.dim == dim && cache.grain == grain {
                return Arc::clone(&cache.tiles);
            }
        }

        if !divides_evenly(dim, grain) && self.trace().is_enabled('c') {
            log::debug!(
                "Grain {} does not divide {}: last tile row and column absorb {} extra cells",
                grain,
                dim,
                dim % grain
            );
        }

        let tiles: Arc<[Tile]> = partition(dim, grain).into();
        self.partition = Some(PartitionCache {
            dim,
            grain,
            tiles: Arc::clone(&tiles),
        });
        tiles
    }

    /// Run init, first touch, initial seeding and device upload.
    ///
    /// Called implicitly by the first [`compute`](Self::compute).
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        if let Some(init) = self.descriptor.init {
            init(self)?;
        }

        if self.config.first_touch {
            if let Some(first_touch) = self.descriptor.first_touch {
                first_touch(self)?;
            }
        }

        if let Some(image) = self.config.seed.generate(self.config.dim) {
            self.frames.load(Buffer::Current, &image);
        }

        if self.descriptor.device {
            let mut device =
                pollster::block_on(DeviceOffload::new(&self.config.kernel, self.config.dim))?;
            device.send_full_frame(&self.frames);
            self.device = Some(device);
        } else if self.config.uses_offload() {
            log::warn!(
                "Backend {}/{} computes on the host, no device opened",
                self.descriptor.kernel,
                self.descriptor.variant
            );
        }

        log::debug!(
            "Started backend {}/{} on a {}x{} raster",
            self.descriptor.kernel,
            self.descriptor.variant,
            self.config.dim,
            self.config.dim
        );
        Ok(())
    }

    /// Call the backend's compute entry for `nb_iter` iterations.
    ///
    /// Advances the iteration counter by `nb_iter` when the backend returns 0,
    /// or by the returned count when it reports stabilization.
    pub fn compute(&mut self, nb_iter: u32) -> Result<u32, EngineError> {
        assert!(!self.finished, "compute called after finish");
        self.start()?;

        let compute = self.descriptor.compute;
        let n = compute(self, nb_iter)?;

        self.state.iteration += u64::from(if n > 0 { n } else { nb_iter });
        Ok(n)
    }

    /// Exchange buffer roles. Only valid between waves.
    pub fn swap_buffers(&mut self) {
        assert!(
            self.scheduler
                .as_ref()
                .is_none_or(|s| s.state() == SchedulerState::Ready),
            "buffer swap while a wave is outstanding"
        );
        self.frames.swap();
    }

    /// Wait for the device, if any, and copy its frame into the current
    /// buffer.
    pub fn sync_device(&mut self) -> Result<(), EngineError> {
        if let Some(device) = self.device.as_mut() {
            device.wait(&self.frames)?;
        }
        Ok(())
    }

    /// Execute one wave: one task per tile, then the wave barrier.
    ///
    /// With the debug overlay enabled, each tile's corner of `overlay` is
    /// painted with the color of the worker that ran it.
    pub fn run_tile_wave<A, F>(
        &mut self,
        affinity: A,
        overlay: Option<Buffer>,
        task: F,
    ) -> Result<(), EngineError>
    where
        A: Fn(&Tile) -> Affinity,
        F: Fn(&FrameBuffers, &Tile) + Send + Sync + 'static,
    {
        let tiles = self.tiles();
        let frames = Arc::clone(&self.frames);
        let trace = self.trace();
        let overlay = overlay.filter(|_| self.config.debug_overlay);
        let task = Arc::new(task);

        let scheduler = self.scheduler_mut()?;
        for tile in tiles.iter().copied() {
            let frames = Arc::clone(&frames);
            let task = Arc::clone(&task);
            scheduler.create_task(affinity(&tile), move |worker| {
                task(&frames, &tile);
                if let Some(buffer) = overlay {
                    paint_worker_overlay(&frames, buffer, &tile, worker);
                }
                if trace.is_enabled('c') {
                    log::trace!(
                        "Tile [{}-{}][{}-{}] done on worker #{}",
                        tile.row_start,
                        tile.row_end,
                        tile.col_start,
                        tile.col_end,
                        worker
                    );
                }
            });
        }
        scheduler.task_wait();
        Ok(())
    }

    /// Execute every tile on the calling thread, in row-major order.
    pub fn run_tiles_inline<F>(&mut self, mut task: F)
    where
        F: FnMut(&FrameBuffers, &Tile),
    {
        let tiles = self.tiles();
        let trace = self.trace();
        for tile in tiles.iter() {
            task(&self.frames, tile);
            if trace.is_enabled('c') {
                log::trace!(
                    "Tile [{}-{}][{}-{}] done",
                    tile.row_start,
                    tile.row_end,
                    tile.col_start,
                    tile.col_end
                );
            }
        }
    }

    /// Finish the run: wait for the device, call `finalize`, stop the
    /// scheduler. Safe to call more than once.
    pub fn finish(&mut self) -> Result<(), EngineError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if !self.started {
            return Ok(());
        }

        self.sync_device()?;
        if let Some(finalize) = self.descriptor.finalize {
            finalize(self)?;
        }
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.finalize();
        }
        Ok(())
    }

    /// Drive the backend until the iteration cap is reached, the backend
    /// stabilizes, or `cancel` is raised. `cancel` is checked between driver
    /// calls only.
    pub fn run(
        &mut self,
        display: &mut dyn Display,
        cancel: &AtomicBool,
    ) -> Result<RunSummary, EngineError> {
        self.start()?;

        let trace = self.trace();
        let max_iter = self.config.max_iter;
        let wave_length = self.config.wave_length;

        if display.display_enabled() {
            self.sync_device()?;
            display.refresh(&self.frames);
        }

        let start = Instant::now();
        let mut stabilized = false;
        let mut cancelled = false;

        loop {
            if cancel.load(Ordering::Relaxed) {
                log::info!("Run cancelled at iteration {}", self.state.iteration);
                cancelled = true;
                break;
            }

            let done = self.state.iteration;
            if max_iter != 0 && done >= max_iter {
                log::info!("Stopped after {} iterations", done);
                break;
            }

            let request = if max_iter == 0 {
                wave_length
            } else {
                (max_iter - done).min(u64::from(wave_length)) as u32
            };

            if trace.is_enabled('p') {
                log::debug!("=== iteration {} ===", done);
            }

            let call_start = Instant::now();
            let n = self.compute(request)?;

            if trace.is_enabled('t') {
                self.sync_device()?;
                let call_ms = call_start.elapsed().as_secs_f64() * 1000.0;
                let total_ms = start.elapsed().as_secs_f64() * 1000.0;
                let ran = if n > 0 { n } else { request };
                log::debug!(
                    "Last iteration {:.3} ms, mean per iteration {:.3} ms",
                    call_ms / f64::from(ran),
                    total_ms / self.state.iteration as f64
                );
            }

            if display.display_enabled() {
                self.sync_device()?;
                display.refresh(&self.frames);
            }

            if n > 0 {
                log::info!(
                    "Computation finished after {} iterations",
                    self.state.iteration
                );
                stabilized = true;
                break;
            }
        }

        self.finish()?;

        Ok(RunSummary {
            kernel: self.descriptor.kernel.clone(),
            variant: self.descriptor.variant.clone(),
            iterations: self.state.iteration,
            stabilized,
            cancelled,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            checksum: self.frames.checksum(Buffer::Current),
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("Failed to finish backend: {}", e);
        }
    }
}

/// Paint the top-left corner of `tile` with the color of `worker`.
fn paint_worker_overlay(frames: &FrameBuffers, buffer: Buffer, tile: &Tile, worker: usize) {
    let color = WORKER_COLORS[worker % WORKER_COLORS.len()];
    let row_end = tile.row_end.min(tile.row_start + OVERLAY_SIZE - 1);
    let col_end = tile.col_end.min(tile.col_start + OVERLAY_SIZE - 1);
    for row in tile.row_start..=row_end {
        for col in tile.col_start..=col_end {
            frames.set(buffer, row, col, color);
        }
    }
}

//! Double-buffered raster storage.
//!
//! Both buffers are shared with scheduler workers through an `Arc`. Cells are
//! atomics accessed with relaxed ordering: within a wave every task writes a
//! disjoint set of cells, and the wave barrier publishes the writes to the
//! driver thread, so no lock is taken per pixel.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Selects one of the two raster buffers by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffer {
    Current,
    Next,
}

/// Two equally sized `dim`×`dim` buffers of packed `0xRRGGBBAA` colors.
pub struct FrameBuffers {
    dim: usize,
    buffers: [Box<[AtomicU32]>; 2],
    /// Index of the buffer playing the "current" role.
    current: AtomicUsize,
}

impl FrameBuffers {
    /// Allocate two zeroed buffers.
    pub fn allocate(dim: usize) -> Self {
        let cells = dim * dim;
        let zeroed = || (0..cells).map(|_| AtomicU32::new(0)).collect::<Box<[_]>>();

        Self {
            dim,
            buffers: [zeroed(), zeroed()],
            current: AtomicUsize::new(0),
        }
    }

    /// Raster side length.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    fn slot(&self, which: Buffer) -> &[AtomicU32] {
        let current = self.current.load(Ordering::Relaxed);
        match which {
            Buffer::Current => &self.buffers[current],
            Buffer::Next => &self.buffers[current ^ 1],
        }
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        assert!(
            row < self.dim && col < self.dim,
            "cell ({row}, {col}) outside {0}x{0} raster",
            self.dim
        );
        row * self.dim + col
    }

    /// Read one cell. Panics when `(row, col)` lies outside the raster.
    #[inline]
    pub fn get(&self, which: Buffer, row: usize, col: usize) -> u32 {
        let idx = self.index(row, col);
        self.slot(which)[idx].load(Ordering::Relaxed)
    }

    /// Write one cell. Panics when `(row, col)` lies outside the raster.
    #[inline]
    pub fn set(&self, which: Buffer, row: usize, col: usize, value: u32) {
        let idx = self.index(row, col);
        self.slot(which)[idx].store(value, Ordering::Relaxed);
    }

    /// Exchange the roles of the two buffers without copying.
    ///
    /// Only the driver calls this, and only while no task is outstanding.
    pub fn swap(&self) {
        self.current.fetch_xor(1, Ordering::Relaxed);
    }

    /// Set every cell of a buffer.
    pub fn fill(&self, which: Buffer, value: u32) {
        for cell in self.slot(which) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Copy a row-major image into a buffer.
    pub fn load(&self, which: Buffer, data: &[u32]) {
        let slot = self.slot(which);
        assert_eq!(data.len(), slot.len(), "image size does not match raster");
        for (cell, &value) in slot.iter().zip(data) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Row-major copy of a buffer.
    pub fn snapshot(&self, which: Buffer) -> Vec<u32> {
        self.slot(which)
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }

    /// FNV-1a hash of a buffer, for comparing runs.
    pub fn checksum(&self, which: Buffer) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        self.slot(which).iter().fold(OFFSET, |hash, cell| {
            cell.load(Ordering::Relaxed)
                .to_le_bytes()
                .iter()
                .fold(hash, |h, &b| (h ^ b as u64).wrapping_mul(PRIME))
        })
    }
}

impl std::fmt::Debug for FrameBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffers")
            .field("dim", &self.dim)
            .field("current", &self.current.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroed() {
        let frames = FrameBuffers::allocate(4);
        assert_eq!(frames.dim(), 4);
        assert!(frames.snapshot(Buffer::Current).iter().all(|&c| c == 0));
        assert_eq!(frames.snapshot(Buffer::Next).len(), 16);
    }

    #[test]
    fn test_swap_exchanges_roles() {
        let frames = FrameBuffers::allocate(2);
        frames.set(Buffer::Current, 0, 1, 7);
        frames.set(Buffer::Next, 1, 0, 9);

        frames.swap();
        assert_eq!(frames.get(Buffer::Next, 0, 1), 7);
        assert_eq!(frames.get(Buffer::Current, 1, 0), 9);

        frames.swap();
        assert_eq!(frames.get(Buffer::Current, 0, 1), 7);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_out_of_range_row_panics() {
        let frames = FrameBuffers::allocate(4);
        frames.get(Buffer::Current, 4, 0);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_out_of_range_col_panics() {
        let frames = FrameBuffers::allocate(4);
        frames.set(Buffer::Next, 0, 4, 1);
    }

    #[test]
    fn test_load_snapshot_and_checksum() {
        let frames = FrameBuffers::allocate(2);
        frames.load(Buffer::Current, &[1, 2, 3, 4]);
        assert_eq!(frames.snapshot(Buffer::Current), vec![1, 2, 3, 4]);
        assert_eq!(frames.get(Buffer::Current, 1, 0), 3);

        let before = frames.checksum(Buffer::Current);
        frames.set(Buffer::Current, 1, 1, 5);
        assert_ne!(before, frames.checksum(Buffer::Current));

        frames.fill(Buffer::Next, 8);
        assert_eq!(frames.snapshot(Buffer::Next), vec![8; 4]);
    }
}

//! Tile partitioning of a square raster.

/// Tile position in tile units, used as task payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub row: usize,
    pub col: usize,
}

/// Rectangular raster region with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub coord: TileCoord,
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Tile {
    /// Bounds of the tile at `coord` in a `dim`×`dim` raster cut `grain` times
    /// per axis.
    ///
    /// Tiles are `dim / grain` cells wide. When `grain` does not divide `dim`
    /// the last tile of each axis extends to the raster edge.
    pub fn at(coord: TileCoord, dim: usize, grain: usize) -> Self {
        assert!(
            grain > 0 && grain <= dim,
            "grain {grain} out of range for raster {dim}"
        );
        assert!(
            coord.row < grain && coord.col < grain,
            "tile ({}, {}) outside {grain}x{grain} grid",
            coord.row,
            coord.col
        );

        let tranche = dim / grain;
        let bounds = |i: usize| {
            let start = i * tranche;
            let end = if i + 1 == grain {
                dim - 1
            } else {
                (i + 1) * tranche - 1
            };
            (start, end)
        };
        let (row_start, row_end) = bounds(coord.row);
        let (col_start, col_end) = bounds(coord.col);

        Self {
            coord,
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    /// Row range covered by this tile.
    #[inline]
    pub fn rows(&self) -> std::ops::RangeInclusive<usize> {
        self.row_start..=self.row_end
    }

    /// Column range covered by this tile.
    #[inline]
    pub fn cols(&self) -> std::ops::RangeInclusive<usize> {
        self.col_start..=self.col_end
    }

    /// Number of cells in the tile.
    #[inline]
    pub fn area(&self) -> usize {
        (self.row_end - self.row_start + 1) * (self.col_end - self.col_start + 1)
    }

    /// Every `(row, col)` of the tile, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows()
            .flat_map(move |row| self.cols().map(move |col| (row, col)))
    }
}

/// Whether `grain` tiles per axis cover a `dim` raster without remainder.
#[inline]
pub fn divides_evenly(dim: usize, grain: usize) -> bool {
    grain != 0 && dim % grain == 0
}

/// Split a `dim`×`dim` raster into `grain`² tiles, row-major.
pub fn partition(dim: usize, grain: usize) -> Vec<Tile> {
    let mut tiles = Vec::with_capacity(grain * grain);
    for row in 0..grain {
        for col in 0..grain {
            tiles.push(Tile::at(TileCoord { row, col }, dim, grain));
        }
    }
    tiles
}

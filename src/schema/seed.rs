//! Seed types for the initial raster contents.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// Opaque black, the color of a freshly allocated raster.
pub const BLACK: u32 = 0x0000_00FF;

/// Complete seed specification for raster initialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Pattern painted into the current buffer before the first wave.
    pub pattern: Pattern,
}

/// Predefined patterns for initialization.
///
/// Colors are packed `0xRRGGBBAA`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Pattern {
    /// Leave the raster zeroed.
    Blank,
    /// Single color everywhere.
    Solid { color: u32 },
    /// Red grows with the row, green with the column.
    #[default]
    Gradient,
    /// Horizontal bands alternating between two colors.
    Stripes {
        /// Band height in rows.
        period: usize,
        colors: (u32, u32),
    },
    /// Uniform random opaque colors.
    Noise {
        /// Random seed.
        seed: u64,
    },
}

impl Seed {
    /// Generate the row-major initial raster of a `dim`×`dim` frame.
    ///
    /// Returns `None` for [`Pattern::Blank`] so callers can skip touching
    /// memory that first-touch placement should own.
    pub fn generate(&self, dim: usize) -> Option<Vec<u32>> {
        let cells = dim * dim;

        let data = match &self.pattern {
            Pattern::Blank => return None,
            Pattern::Solid { color } => vec![*color; cells],
            Pattern::Gradient => {
                let mut data = Vec::with_capacity(cells);
                for row in 0..dim {
                    for col in 0..dim {
                        data.push(gradient_color(row, col, dim));
                    }
                }
                data
            }
            Pattern::Stripes { period, colors } => {
                let period = (*period).max(1);
                let mut data = Vec::with_capacity(cells);
                for row in 0..dim {
                    let color = if (row / period) % 2 == 0 {
                        colors.0
                    } else {
                        colors.1
                    };
                    data.extend(std::iter::repeat_n(color, dim));
                }
                data
            }
            Pattern::Noise { seed } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                (0..cells).map(|_| rng.r#gen::<u32>() | 0xFF).collect()
            }
        };

        Some(data)
    }
}

fn gradient_color(row: usize, col: usize, dim: usize) -> u32 {
    let scale = |v: usize| ((v * 255) / dim.saturating_sub(1).max(1)) as u32;
    let r = scale(row);
    let g = scale(col);
    let b = 0x40;
    (r << 24) | (g << 16) | (b << 8) | 0xFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_generates_nothing() {
        let seed = Seed {
            pattern: Pattern::Blank,
        };
        assert!(seed.generate(8).is_none());
    }

    #[test]
    fn test_gradient_corners() {
        let data = Seed::default().generate(4).unwrap();
        assert_eq!(data.len(), 16);
        assert_eq!(data[0], 0x0000_40FF);
        assert_eq!(data[15], 0xFFFF_40FF);
    }

    #[test]
    fn test_stripes_alternate() {
        let seed = Seed {
            pattern: Pattern::Stripes {
                period: 2,
                colors: (1, 2),
            },
        };
        let data = seed.generate(4).unwrap();
        assert_eq!(&data[0..8], &[1; 8]);
        assert_eq!(&data[8..16], &[2; 8]);
    }

    #[test]
    fn test_noise_is_deterministic_and_opaque() {
        let seed = Seed {
            pattern: Pattern::Noise { seed: 7 },
        };
        let a = seed.generate(16).unwrap();
        let b = seed.generate(16).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|c| c & 0xFF == 0xFF));
    }

    #[test]
    fn test_seed_json_roundtrip_tagged() {
        let json = r#"{"pattern":{"type":"Noise","seed":3}}"#;
        let seed: Seed = serde_json::from_str(json).unwrap();
        assert_eq!(seed.pattern, Pattern::Noise { seed: 3 });
    }
}

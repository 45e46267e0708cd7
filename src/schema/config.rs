//! Run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Seed, TraceFlags};

fn default_kernel() -> String {
    "mandel".to_string()
}

fn default_variant() -> String {
    "seq".to_string()
}

fn default_dim() -> usize {
    1024
}

fn default_wave_length() -> u32 {
    1
}

fn default_grain() -> usize {
    32
}

fn default_first_touch() -> bool {
    true
}

/// How many workers the scheduler starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallelism {
    /// One worker per available hardware context.
    #[default]
    Auto,
    /// Exactly this many workers.
    Fixed(usize),
}

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Kernel name (`mandel`, `scrollup`, ...).
    #[serde(default = "default_kernel")]
    pub kernel: String,
    /// Variant name (`seq`, `tiled`, `sched`, ...).
    #[serde(default = "default_variant")]
    pub variant: String,
    /// Raster side length in pixels.
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Stop after this many iterations; 0 runs until a backend stabilizes.
    #[serde(default)]
    pub max_iter: u64,
    /// Iterations requested per driver call (the refresh rate).
    #[serde(default = "default_wave_length")]
    pub wave_length: u32,
    /// Run waves on the external compute device.
    #[serde(default)]
    pub offload: bool,
    /// Run the backend's first-touch entry point before the first wave.
    #[serde(default = "default_first_touch")]
    pub first_touch: bool,
    /// Tiles per raster axis.
    #[serde(default = "default_grain")]
    pub grain: usize,
    /// Scheduler worker count.
    #[serde(default)]
    pub threads: Parallelism,
    /// Enabled trace flags.
    #[serde(default)]
    pub debug_flags: TraceFlags,
    /// Paint each scheduled tile's corner with its worker color.
    #[serde(default)]
    pub debug_overlay: bool,
    /// Initial raster contents.
    #[serde(default)]
    pub seed: Seed,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            kernel: default_kernel(),
            variant: default_variant(),
            dim: default_dim(),
            max_iter: 0,
            wave_length: default_wave_length(),
            offload: false,
            first_touch: default_first_touch(),
            grain: default_grain(),
            threads: Parallelism::Auto,
            debug_flags: TraceFlags::NONE,
            debug_overlay: false,
            seed: Seed::default(),
        }
    }
}

impl RunConfig {
    /// Load a configuration from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether waves run on the compute device. Selecting the `ocl`
    /// variant implies offloading.
    #[inline]
    pub fn uses_offload(&self) -> bool {
        self.offload || self.variant == "ocl"
    }

    /// Side length of a tile when the grain divides the raster evenly.
    #[inline]
    pub fn tranche(&self) -> usize {
        self.dim / self.grain
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel.is_empty() {
            return Err(ConfigError::MissingKernel);
        }
        if self.variant.is_empty() {
            return Err(ConfigError::MissingVariant);
        }
        if self.dim == 0 {
            return Err(ConfigError::InvalidDimension);
        }
        if self.wave_length == 0 {
            return Err(ConfigError::InvalidWaveLength);
        }
        if self.grain == 0 || self.grain > self.dim {
            return Err(ConfigError::InvalidGrain {
                grain: self.grain,
                dim: self.dim,
            });
        }
        if self.threads == Parallelism::Fixed(0) {
            return Err(ConfigError::InvalidThreads);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Kernel name must not be empty")]
    MissingKernel,
    #[error("Variant name must not be empty")]
    MissingVariant,
    #[error("Raster dimension must be non-zero")]
    InvalidDimension,
    #[error("Wave length must be non-zero")]
    InvalidWaveLength,
    #[error("Grain {grain} must be between 1 and the raster dimension {dim}")]
    InvalidGrain { grain: usize, dim: usize },
    #[error("Fixed worker count must be non-zero")]
    InvalidThreads,
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Pattern;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.uses_offload());
        assert_eq!(config.tranche(), 32);
    }

    #[test]
    fn test_rejects_bad_grain() {
        let config = RunConfig {
            dim: 8,
            grain: 9,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGrain { grain: 9, dim: 8 })
        ));

        let config = RunConfig {
            grain: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_workers_and_wave_length() {
        let config = RunConfig {
            threads: Parallelism::Fixed(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThreads)));

        let config = RunConfig {
            wave_length: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWaveLength)
        ));
    }

    #[test]
    fn test_ocl_variant_implies_offload() {
        let config = RunConfig {
            variant: "ocl".to_string(),
            ..Default::default()
        };
        assert!(config.uses_offload());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "kernel": "scrollup",
            "variant": "sched",
            "dim": 64,
            "threads": {"fixed": 3},
            "debug_flags": "cs",
            "seed": {"pattern": {"type": "Blank"}}
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kernel, "scrollup");
        assert_eq!(config.threads, Parallelism::Fixed(3));
        assert_eq!(config.wave_length, 1);
        assert_eq!(config.grain, 32);
        assert!(config.first_touch);
        assert!(config.debug_flags.is_enabled('s'));
        assert_eq!(config.seed.pattern, Pattern::Blank);
    }

    #[test]
    fn test_invalid_debug_flag_fails_to_parse() {
        let json = r#"{"debug_flags": "c!"}"#;
        assert!(serde_json::from_str::<RunConfig>(json).is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"dim": 16, "grain": 4, "max_iter": 5}}"#).unwrap();

        let config = RunConfig::from_path(&path).unwrap();
        assert_eq!(config.dim, 16);
        assert_eq!(config.max_iter, 5);
        assert_eq!(config.tranche(), 4);
    }

    #[test]
    fn test_from_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"dim": 0}"#).unwrap();
        assert!(matches!(
            RunConfig::from_path(&path),
            Err(ConfigError::InvalidDimension)
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            RunConfig::from_path(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}

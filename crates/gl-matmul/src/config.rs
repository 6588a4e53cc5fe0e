//! # Harness Configuration
//!
//! Figment-based layered configuration:
//! 1. Compiled defaults
//! 2. TOML file (`--config` or `gl-matmul.toml` in the working directory)
//! 3. Environment variables (`GL_MATMUL_*`, `__` separates nested keys)
//! 4. Command line overrides
//!
//! The merged [`HarnessConfig`] is validated once into an immutable
//! [`RunConfig`].

use crate::compute::strategy::{Algorithm, DEFAULT_BLOCK_ROWS, DEFAULT_TILE};
use crate::compute::types::padded_dimension;
use crate::error::ConfigurationError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Configuration file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "gl-matmul.toml";

/// Environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "GL_MATMUL";

/// Largest tile whose square fits the guaranteed GL 4.3 work group size
pub const MAX_TILE: usize = 32;

pub const DEFAULT_SEED: u64 = 123;

/// Named matrix sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Small,
    #[default]
    Medium,
    Big,
    Huge,
    Massive,
}

impl SizeCategory {
    pub fn dimension(&self) -> usize {
        match self {
            SizeCategory::Small => 128,
            SizeCategory::Medium => 1024,
            SizeCategory::Big => 8192,
            SizeCategory::Huge => 16384,
            SizeCategory::Massive => 32768,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Big => "big",
            SizeCategory::Huge => "huge",
            SizeCategory::Massive => "massive",
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.dimension())
    }
}

impl FromStr for SizeCategory {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(SizeCategory::Small),
            "medium" => Ok(SizeCategory::Medium),
            "big" => Ok(SizeCategory::Big),
            "huge" => Ok(SizeCategory::Huge),
            "massive" => Ok(SizeCategory::Massive),
            other => Err(ConfigurationError::InvalidValue {
                key: "size".to_string(),
                value: other.to_string(),
                reason: "expected small|medium|big|huge|massive".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub mode: Algorithm,
    pub size: SizeCategory,
    /// Explicit dimension; overrides `size`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<usize>,
    pub tile: usize,
    pub block_rows: usize,
    pub seed: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: Algorithm::default(),
            size: SizeCategory::default(),
            n: None,
            tile: DEFAULT_TILE,
            block_rows: DEFAULT_BLOCK_ROWS,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    /// Directory searched for `matmul_<mode>.comp`
    pub dir: PathBuf,
    /// Use the built-in kernel when the file is missing
    pub embedded_fallback: bool,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            embedded_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// Compare every element against a serial host product after timing
    pub full_check: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// JSON report destination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub log_level: String,
    pub run: RunSettings,
    pub kernels: KernelSettings,
    pub verification: VerificationSettings,
    pub output: OutputSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            run: RunSettings::default(),
            kernels: KernelSettings::default(),
            verification: VerificationSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl HarnessConfig {
    pub fn to_toml(&self) -> Result<String, ConfigurationError> {
        toml::to_string_pretty(self).map_err(|e| ConfigurationError::ParseError {
            details: format!("Failed to serialize configuration: {e}"),
        })
    }

    /// Effective matrix dimension
    pub fn dimension(&self) -> usize {
        self.run.n.unwrap_or_else(|| self.run.size.dimension())
    }
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub mode: Option<Algorithm>,
    pub size: Option<SizeCategory>,
    pub n: Option<usize>,
    pub tile: Option<usize>,
    pub block_rows: Option<usize>,
    pub seed: Option<u64>,
    pub kernel_dir: Option<PathBuf>,
    pub no_embedded_fallback: bool,
    pub full_check: bool,
    pub report_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl CliOverrides {
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(mode) = self.mode {
            config.run.mode = mode;
        }
        if let Some(size) = self.size {
            config.run.size = size;
            // A named size on the command line beats an `n` from lower layers.
            config.run.n = None;
        }
        if let Some(n) = self.n {
            config.run.n = Some(n);
        }
        if let Some(tile) = self.tile {
            config.run.tile = tile;
        }
        if let Some(block_rows) = self.block_rows {
            config.run.block_rows = block_rows;
        }
        if let Some(seed) = self.seed {
            config.run.seed = seed;
        }
        if let Some(dir) = &self.kernel_dir {
            config.kernels.dir = dir.clone();
        }
        if self.no_embedded_fallback {
            config.kernels.embedded_fallback = false;
        }
        if self.full_check {
            config.verification.full_check = true;
        }
        if let Some(path) = &self.report_path {
            config.output.report_path = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Explicit configuration file; must exist when given
    pub config_path: Option<PathBuf>,
    pub env_prefix: String,
    pub overrides: CliOverrides,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            overrides: CliOverrides::default(),
        }
    }
}

/// Loads and merges every configuration layer
pub fn load_config(options: &LoadOptions) -> Result<HarnessConfig, ConfigurationError> {
    let mut figment = Figment::new().merge(Serialized::defaults(HarnessConfig::default()));

    match &options.config_path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigurationError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            figment = add_file_provider(figment, path)?;
        }
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.exists() {
                figment = add_file_provider(figment, local)?;
            } else {
                debug!("No {} in working directory, using defaults", DEFAULT_CONFIG_FILE);
            }
        }
    }

    figment = figment.merge(Env::prefixed(&format!("{}_", options.env_prefix)).split("__"));

    let mut config: HarnessConfig =
        figment
            .extract()
            .map_err(|err| ConfigurationError::ParseError {
                details: err.to_string(),
            })?;

    options.overrides.apply(&mut config);
    Ok(config)
}

fn add_file_provider(figment: Figment, path: &Path) -> Result<Figment, ConfigurationError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("toml");

    match extension.to_lowercase().as_str() {
        "toml" => {
            info!("Loading configuration from file: {}", path.display());
            Ok(figment.merge(Toml::file(path)))
        }
        _ => Err(ConfigurationError::ParseError {
            details: format!(
                "Unsupported configuration file format: {extension} (supported: toml)"
            ),
        }),
    }
}

/// Validated, immutable parameters of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub algorithm: Algorithm,
    pub n: usize,
    pub tile: usize,
    pub block_rows: usize,
    pub seed: u64,
    pub full_check: bool,
}

impl RunConfig {
    /// Seeds for matrices A and B
    pub fn input_seeds(&self) -> (u64, u64) {
        (self.seed, self.seed.wrapping_add(1))
    }
}

fn invalid(key: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl TryFrom<&HarnessConfig> for RunConfig {
    type Error = ConfigurationError;

    fn try_from(config: &HarnessConfig) -> Result<Self, Self::Error> {
        let run = &config.run;
        let n = config.dimension();

        if n == 0 {
            return Err(invalid("run.n", n, "must be at least 1"));
        }
        if run.tile == 0 || run.tile > MAX_TILE {
            return Err(invalid("run.tile", run.tile, "must be between 1 and 32"));
        }
        if run.block_rows == 0 {
            return Err(invalid("run.block_rows", run.block_rows, "must be at least 1"));
        }
        if run.block_rows % run.tile != 0 {
            warn!(
                "block_rows {} is not a multiple of tile {}; rows at block edges are computed twice",
                run.block_rows, run.tile
            );
        }

        let padded = padded_dimension(n, run.tile);
        if i32::try_from(padded).is_err() {
            return Err(invalid("run.n", n, "padded dimension exceeds i32 range"));
        }
        if padded
            .checked_mul(padded)
            .and_then(|elems| elems.checked_mul(std::mem::size_of::<f32>()))
            .is_none()
        {
            return Err(invalid("run.n", n, "buffer size overflows usize"));
        }

        Ok(Self {
            algorithm: run.mode,
            n,
            tile: run.tile,
            block_rows: run.block_rows,
            seed: run.seed,
            full_check: config.verification.full_check,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.run.mode, Algorithm::Naive);
        assert_eq!(config.dimension(), 1024);
        assert_eq!(config.run.tile, 16);
        assert_eq!(config.run.block_rows, 512);
        assert!(config.kernels.embedded_fallback);
        assert!(!config.verification.full_check);
    }

    #[test]
    fn test_size_categories() {
        let dims: Vec<usize> = ["small", "medium", "big", "huge", "massive"]
            .iter()
            .map(|s| s.parse::<SizeCategory>().unwrap().dimension())
            .collect();
        assert_eq!(dims, vec![128, 1024, 8192, 16384, 32768]);
        assert!("tiny".parse::<SizeCategory>().is_err());
    }

    #[test]
    fn test_explicit_n_overrides_size() {
        let mut config = HarnessConfig::default();
        config.run.n = Some(1000);
        assert_eq!(RunConfig::try_from(&config).unwrap().n, 1000);
    }

    #[test]
    fn test_cli_size_clears_lower_layer_n() {
        let mut config = HarnessConfig::default();
        config.run.n = Some(1000);
        CliOverrides {
            size: Some(SizeCategory::Small),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.dimension(), 128);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = HarnessConfig::default();
        config.run.n = Some(0);
        assert!(RunConfig::try_from(&config).is_err());

        let mut config = HarnessConfig::default();
        config.run.tile = 0;
        assert!(RunConfig::try_from(&config).is_err());

        let mut config = HarnessConfig::default();
        config.run.tile = 64;
        assert!(RunConfig::try_from(&config).is_err());

        let mut config = HarnessConfig::default();
        config.run.block_rows = 0;
        assert!(RunConfig::try_from(&config).is_err());

        let mut config = HarnessConfig::default();
        config.run.n = Some(i32::MAX as usize);
        assert!(RunConfig::try_from(&config).is_err());
    }

    #[test]
    fn test_block_rows_need_not_align_with_tile() {
        let mut config = HarnessConfig::default();
        config.run.n = Some(1000);
        config.run.block_rows = 500;
        let run = RunConfig::try_from(&config).unwrap();
        assert_eq!(run.block_rows, 500);
        assert_eq!(run.tile, 16);
    }

    #[test]
    fn test_input_seeds() {
        let run = RunConfig::try_from(&HarnessConfig::default()).unwrap();
        assert_eq!(run.input_seeds(), (123, 124));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = HarnessConfig::default();
        config.run.mode = Algorithm::Chunked;
        let text = config.to_toml().unwrap();
        assert!(text.contains("mode = \"chunked\""));
        let parsed: HarnessConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}

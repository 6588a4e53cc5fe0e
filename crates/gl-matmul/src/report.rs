//! Run summary for the console and for JSON export

use crate::compute::harness::RunOutcome;
use crate::compute::strategy::Algorithm;
use crate::compute::verify::{FullCheck, Sample};
use crate::config::RunConfig;
use crate::error::MatmulError;
use crate::gl::DeviceInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

/// `2 * n^3` floating point operations over `time_ms` milliseconds
pub fn gflops(n: usize, time_ms: f64) -> f64 {
    if time_ms <= 0.0 {
        return 0.0;
    }
    let operations = 2.0 * (n as f64).powi(3);
    operations / (time_ms * 1e6)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub algorithm: Algorithm,
    pub n: usize,
    pub padded_n: usize,
    pub tile: usize,
    pub block_rows: usize,
    pub dispatches: usize,
    pub kernel: String,
    pub gpu_time_ms: f64,
    pub gflops: f64,
    pub samples: Vec<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_check: Option<FullCheck>,
    pub device: DeviceInfo,
}

impl RunReport {
    pub fn new(
        config: &RunConfig,
        outcome: &RunOutcome,
        kernel: String,
        device: DeviceInfo,
    ) -> Self {
        let gpu_time_ms = outcome.gpu_time_ms();
        Self {
            timestamp: Utc::now(),
            algorithm: config.algorithm,
            n: config.n,
            padded_n: outcome.plan.padded_n,
            tile: config.tile,
            block_rows: config.block_rows,
            dispatches: outcome.plan.dispatch_count(),
            kernel,
            gpu_time_ms,
            gflops: gflops(config.n, gpu_time_ms),
            samples: outcome.samples.clone(),
            full_check: outcome.full_check.clone(),
            device,
        }
    }

    /// Writes the report as pretty JSON, creating parent directories
    pub fn write_json(&self, path: &Path) -> Result<(), MatmulError> {
        let report_error = |details: String| MatmulError::Report {
            path: path.to_path_buf(),
            details,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| report_error(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| report_error(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| report_error(e.to_string()))?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

/// Console summary: header, size, mode, wall time, GFLOPS and samples
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "================================================")?;
        writeln!(f, "Headless GPU Matrix Multiplication")?;
        writeln!(f, "================================================")?;
        if let Some(renderer) = &self.device.gl_renderer {
            writeln!(f, "Renderer: {renderer}")?;
        }
        writeln!(
            f,
            "Matrix size: {}x{}, shader={}",
            self.n, self.n, self.algorithm
        )?;
        writeln!(
            f,
            "Padded size: {}, tile={}, dispatches={}",
            self.padded_n, self.tile, self.dispatches
        )?;
        writeln!(f, "Kernel: {}", self.kernel)?;
        writeln!(f, "GPU walltime = {:.3} ms", self.gpu_time_ms)?;
        writeln!(f, "Performance = {:.2} GFLOPS", self.gflops)?;
        for s in &self.samples {
            writeln!(
                f,
                "sample ({},{}): GPU={:.6}, CPU={:.6}, diff={:.6}",
                s.row, s.col, s.gpu, s.host, s.abs_diff
            )?;
        }
        if let Some(check) = &self.full_check {
            for m in &check.mismatches {
                writeln!(
                    f,
                    "  Error at ({},{}): got {}, expected {}, diff={}",
                    m.row, m.col, m.got, m.expected, m.diff
                )?;
            }
            writeln!(f, "Relative L2 error: {:.6e}", check.relative_l2_error)?;
            let verdict = if check.passed { "PASSED" } else { "FAILED" };
            writeln!(f, "Full check: {verdict}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::strategy::Strategy;
    use crate::compute::types::Matrix;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_report() -> RunReport {
        let config = RunConfig {
            algorithm: Algorithm::Chunked,
            n: 1000,
            tile: 16,
            block_rows: 512,
            seed: 123,
            full_check: false,
        };
        let outcome = RunOutcome {
            plan: Strategy::Chunked { block_rows: 512 }.plan(1000, 16),
            gpu_time: Duration::from_millis(40),
            result: Matrix::zeros(1000),
            samples: vec![Sample {
                row: 0,
                col: 0,
                gpu: 250.5,
                host: 250.5,
                abs_diff: 0.0,
            }],
            full_check: None,
        };
        RunReport::new(&config, &outcome, "embedded".to_string(), DeviceInfo::default())
    }

    #[test]
    fn test_gflops() {
        assert!((gflops(1000, 1000.0) - 2.0).abs() < 1e-9);
        assert_eq!(gflops(1000, 0.0), 0.0);
    }

    #[test]
    fn test_report_fields() {
        let report = sample_report();
        assert_eq!(report.padded_n, 1008);
        assert_eq!(report.dispatches, 2);
        assert!((report.gflops - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_render_contains_console_lines() {
        let text = sample_report().to_string();
        assert!(text.contains("Matrix size: 1000x1000, shader=chunked"));
        assert!(text.contains("GPU walltime = 40.000 ms"));
        assert!(text.contains("sample (0,0): GPU=250.500000, CPU=250.500000, diff=0.000000"));
        assert!(!text.contains("Full check"));
    }

    #[test]
    fn test_write_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("run.json");
        let report = sample_report();
        report.write_json(&path).unwrap();

        let parsed: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, report);
    }
}

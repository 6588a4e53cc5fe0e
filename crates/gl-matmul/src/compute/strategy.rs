//! Algorithm selection and dispatch planning
//!
//! An [`Algorithm`] is the user-facing mode name. It is resolved once into a
//! [`Strategy`] carrying its own parameters, which then produces a
//! [`DispatchPlan`]: the padded dimension, the uniforms set before timing and
//! the ordered list of dispatches.

use super::types::{groups_for, padded_dimension, WorkGroups};
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

pub const UNIFORM_N: &str = "N";
pub const UNIFORM_STRIDE: &str = "stride";
pub const UNIFORM_BASE_ROW: &str = "baseRow";
pub const UNIFORM_OFFSET_A: &str = "offsetA";
pub const UNIFORM_OFFSET_B: &str = "offsetB";

pub const DEFAULT_TILE: usize = 16;
pub const DEFAULT_BLOCK_ROWS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// One thread per output element, no padding
    #[default]
    #[serde(alias = "direct")]
    Naive,
    /// Row blocks dispatched one after another over padded input
    #[serde(alias = "tiled")]
    Chunked,
    /// Block-recursive layout, run as a single padded pass
    #[serde(alias = "block-recursive")]
    Strassen,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Naive, Algorithm::Chunked, Algorithm::Strassen];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Naive => "naive",
            Algorithm::Chunked => "chunked",
            Algorithm::Strassen => "strassen",
        }
    }

    /// File name of the external kernel for this mode
    pub fn kernel_file_name(&self) -> String {
        format!("matmul_{}.comp", self.as_str())
    }

    /// Whether inputs are padded to a tile multiple
    pub fn pads_input(&self) -> bool {
        !matches!(self, Algorithm::Naive)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" | "direct" => Ok(Algorithm::Naive),
            "chunked" | "tiled" => Ok(Algorithm::Chunked),
            "strassen" | "block-recursive" => Ok(Algorithm::Strassen),
            other => Err(ConfigurationError::InvalidValue {
                key: "mode".to_string(),
                value: other.to_string(),
                reason: "expected naive|chunked|strassen (or direct|tiled|block-recursive)"
                    .to_string(),
            }),
        }
    }
}

/// A resolved algorithm with its own parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Naive,
    Chunked { block_rows: usize },
    /// Single full-extent pass with zero block offsets
    Strassen,
}

impl Strategy {
    pub fn resolve(algorithm: Algorithm, block_rows: usize) -> Self {
        match algorithm {
            Algorithm::Naive => Strategy::Naive,
            Algorithm::Chunked => Strategy::Chunked { block_rows },
            Algorithm::Strassen => Strategy::Strassen,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Strategy::Naive => Algorithm::Naive,
            Strategy::Chunked { .. } => Algorithm::Chunked,
            Strategy::Strassen => Algorithm::Strassen,
        }
    }

    /// Plans the dispatches for an `n x n` product with `tile`-wide work groups
    ///
    /// `n`, `tile` and `block_rows` must all be at least one.
    pub fn plan(&self, n: usize, tile: usize) -> DispatchPlan {
        let padded_n = if self.algorithm().pads_input() {
            padded_dimension(n, tile)
        } else {
            n
        };

        let passes = match *self {
            Strategy::Naive => vec![DispatchPass {
                groups: WorkGroups::covering(n, n, tile),
                uniforms: Vec::new(),
                rows: 0..n,
            }],
            Strategy::Chunked { block_rows } => {
                let groups_x = groups_for(padded_n, tile);
                (0..n)
                    .step_by(block_rows.max(1))
                    .map(|base| {
                        let rows = block_rows.min(n - base);
                        DispatchPass {
                            groups: WorkGroups {
                                x: groups_x,
                                y: groups_for(rows, tile),
                                z: 1,
                            },
                            uniforms: vec![(UNIFORM_BASE_ROW, to_uniform(base))],
                            rows: base..base + rows,
                        }
                    })
                    .collect()
            }
            Strategy::Strassen => vec![DispatchPass {
                groups: WorkGroups::covering(padded_n, padded_n, tile),
                uniforms: vec![(UNIFORM_OFFSET_A, 0), (UNIFORM_OFFSET_B, 0)],
                rows: 0..padded_n,
            }],
        };

        DispatchPlan {
            n,
            padded_n,
            tile,
            base_uniforms: vec![
                (UNIFORM_N, to_uniform(n)),
                (UNIFORM_STRIDE, to_uniform(padded_n)),
            ],
            passes,
        }
    }
}

// Dimensions are validated against the i32 range when the run is configured.
fn to_uniform(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// One compute dispatch and the uniforms set just before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPass {
    pub groups: WorkGroups,
    pub uniforms: Vec<(&'static str, i32)>,
    /// Output rows this pass is responsible for
    pub rows: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub n: usize,
    pub padded_n: usize,
    pub tile: usize,
    /// Uniforms set once, before timing starts
    pub base_uniforms: Vec<(&'static str, i32)>,
    pub passes: Vec<DispatchPass>,
}

impl DispatchPlan {
    pub fn dispatch_count(&self) -> usize {
        self.passes.len()
    }

    /// Number of `f32` elements in each device buffer
    pub fn padded_len(&self) -> usize {
        self.padded_n * self.padded_n
    }

    pub fn padded_byte_len(&self) -> usize {
        self.padded_len() * std::mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing_with_aliases() {
        assert_eq!("naive".parse::<Algorithm>().unwrap(), Algorithm::Naive);
        assert_eq!("direct".parse::<Algorithm>().unwrap(), Algorithm::Naive);
        assert_eq!("Tiled".parse::<Algorithm>().unwrap(), Algorithm::Chunked);
        assert_eq!(
            "block-recursive".parse::<Algorithm>().unwrap(),
            Algorithm::Strassen
        );
        assert!("winograd".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_algorithm_serde_aliases() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: Algorithm,
        }
        let w: Wrapper = toml::from_str("mode = \"tiled\"").unwrap();
        assert_eq!(w.mode, Algorithm::Chunked);
        let w: Wrapper = toml::from_str("mode = \"strassen\"").unwrap();
        assert_eq!(w.mode, Algorithm::Strassen);
        assert_eq!(
            serde_json::to_string(&Algorithm::Chunked).unwrap(),
            "\"chunked\""
        );
    }

    #[test]
    fn test_kernel_file_names() {
        assert_eq!(Algorithm::Naive.kernel_file_name(), "matmul_naive.comp");
        assert_eq!(Algorithm::Chunked.kernel_file_name(), "matmul_chunked.comp");
        assert_eq!(
            Algorithm::Strassen.kernel_file_name(),
            "matmul_strassen.comp"
        );
    }

    #[test]
    fn test_naive_plan_for_128() {
        let plan = Strategy::resolve(Algorithm::Naive, DEFAULT_BLOCK_ROWS).plan(128, 16);

        assert_eq!(plan.padded_n, 128);
        assert_eq!(plan.dispatch_count(), 1);
        assert_eq!(plan.passes[0].groups, WorkGroups { x: 8, y: 8, z: 1 });
        assert!(plan.passes[0].uniforms.is_empty());
        assert_eq!(
            plan.base_uniforms,
            vec![(UNIFORM_N, 128), (UNIFORM_STRIDE, 128)]
        );
    }

    #[test]
    fn test_naive_does_not_pad() {
        let plan = Strategy::Naive.plan(1000, 16);
        assert_eq!(plan.padded_n, 1000);
        assert_eq!(plan.passes[0].groups, WorkGroups { x: 63, y: 63, z: 1 });
    }

    #[test]
    fn test_chunked_plan_for_1000() {
        let plan = Strategy::resolve(Algorithm::Chunked, 512).plan(1000, 16);

        assert_eq!(plan.padded_n, 1008);
        assert_eq!(plan.dispatch_count(), 2);
        assert_eq!(plan.passes[0].rows, 0..512);
        assert_eq!(plan.passes[1].rows, 512..1000);
        assert_eq!(plan.passes[0].groups, WorkGroups { x: 63, y: 32, z: 1 });
        assert_eq!(plan.passes[1].groups, WorkGroups { x: 63, y: 31, z: 1 });
        assert_eq!(plan.passes[1].uniforms, vec![(UNIFORM_BASE_ROW, 512)]);
        assert_eq!(
            plan.base_uniforms,
            vec![(UNIFORM_N, 1000), (UNIFORM_STRIDE, 1008)]
        );
    }

    #[test]
    fn test_chunked_blocks_partition_rows() {
        for n in [1usize, 15, 16, 17, 511, 512, 513, 1000, 1536, 2049] {
            for block_rows in [16usize, 64, 512] {
                let plan = Strategy::Chunked { block_rows }.plan(n, 16);
                let mut next = 0;
                for pass in &plan.passes {
                    assert_eq!(pass.rows.start, next, "gap or overlap at n={n}");
                    assert!(pass.rows.end > pass.rows.start);
                    assert!(pass.groups.x >= 1 && pass.groups.y >= 1);
                    next = pass.rows.end;
                }
                assert_eq!(next, n);

                let full_blocks = n / block_rows;
                let last = plan.passes.last().unwrap();
                if n % block_rows != 0 {
                    assert_eq!(last.rows.len(), n - full_blocks * block_rows);
                } else {
                    assert_eq!(last.rows.len(), block_rows);
                }
            }
        }
    }

    #[test]
    fn test_strassen_is_single_full_pass() {
        let plan = Strategy::Strassen.plan(1000, 16);
        assert_eq!(plan.padded_n, 1008);
        assert_eq!(plan.dispatch_count(), 1);
        assert_eq!(plan.passes[0].groups, WorkGroups { x: 63, y: 63, z: 1 });
        assert_eq!(
            plan.passes[0].uniforms,
            vec![(UNIFORM_OFFSET_A, 0), (UNIFORM_OFFSET_B, 0)]
        );
    }

    #[test]
    fn test_groups_never_zero_below_tile() {
        for algorithm in Algorithm::ALL {
            let plan = Strategy::resolve(algorithm, DEFAULT_BLOCK_ROWS).plan(3, 16);
            for pass in &plan.passes {
                assert_eq!(pass.groups, WorkGroups { x: 1, y: 1, z: 1 });
            }
        }
    }

    #[test]
    fn test_output_is_padded_square() {
        let plan = Strategy::Chunked { block_rows: 512 }.plan(1000, 16);
        assert_eq!(plan.padded_len(), 1008 * 1008);
        assert_eq!(plan.padded_byte_len(), 1008 * 1008 * 4);
    }
}

pub mod cli;
pub mod compute;
pub mod config;
pub mod error;
pub mod gl;
pub mod kernels;
pub mod report;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export commonly used items for convenience
pub use compute::{Algorithm, Matrix, RunOutcome};
pub use config::{HarnessConfig, RunConfig};
pub use error::{MatmulError, Result};

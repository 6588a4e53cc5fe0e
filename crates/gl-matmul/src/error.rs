//! Error handling for gl-matmul
//!
//! Each stage of a run has its own error type so the binary can report which
//! part of the pipeline failed:
//! - `ContextError` for EGL display/context/surface acquisition
//! - `CompileError` for kernel compilation and linking
//! - `TransferError` for device buffer allocation, binding and readback
//! - `DispatchError` for compute dispatch submission
//! - `ConfigurationError` for layered configuration and run parameters
//!
//! None of these are retried. Use thiserror for library errors, anyhow in the binary.

use std::path::PathBuf;
use thiserror::Error;

/// Headless context acquisition errors
///
/// These errors mean the environment cannot provide a compute-capable
/// headless context. They are fatal.
#[derive(Error, Debug)]
pub enum ContextError {
    /// EGL shared library could not be loaded
    #[error("Failed to load {library}: {details}")]
    LibraryUnavailable { library: String, details: String },

    /// Required EGL or GL entry point is missing
    #[error("Missing entry point {name}")]
    MissingEntryPoint { name: String },

    /// Default display could not be opened
    #[error("Failed to get EGL display")]
    NoDisplay,

    /// Display could not be initialized
    #[error("Failed to initialize EGL display (egl error 0x{code:04x})")]
    InitializeFailed { code: i32 },

    /// No config satisfies the requested attributes
    #[error("No suitable EGL config found for pbuffer OpenGL rendering")]
    NoMatchingConfig,

    /// OpenGL API could not be bound
    #[error("Failed to bind OpenGL API (egl error 0x{code:04x})")]
    BindApiFailed { code: i32 },

    /// Context creation failed
    #[error("Failed to create EGL context (egl error 0x{code:04x})")]
    ContextCreationFailed { code: i32 },

    /// Off-screen surface creation failed
    #[error("Failed to create {width}x{height} pbuffer surface (egl error 0x{code:04x})")]
    SurfaceCreationFailed { width: i32, height: i32, code: i32 },

    /// Context could not be made current on this thread
    #[error("Failed to make EGL context current (egl error 0x{code:04x})")]
    MakeCurrentFailed { code: i32 },

    /// Driver does not expose compute dispatch
    #[error("Compute dispatch is not supported by this driver (GL {version})")]
    ComputeUnsupported { version: String },
}

/// Kernel compilation errors
///
/// The message carries the driver's info log verbatim.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Source contains an interior NUL byte
    #[error("Kernel source contains a NUL byte at offset {offset}")]
    InvalidSource { offset: usize },

    /// Driver refused to create a shader or program object
    #[error("Failed to create {object} object")]
    ObjectCreationFailed { object: &'static str },

    /// Compute stage failed to compile
    #[error("Compute shader compilation failed:\n{log}")]
    Compile { log: String },

    /// Program failed to link
    #[error("Compute program link failed:\n{log}")]
    Link { log: String },
}

/// Device buffer errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Device memory allocation failed
    #[error("Failed to allocate {bytes} bytes for binding {binding}: {details}")]
    AllocationFailed {
        binding: u32,
        bytes: usize,
        details: String,
    },

    /// Binding index already holds a buffer in this run
    #[error("Binding {binding} is already in use for this run")]
    BindingInUse { binding: u32 },

    /// Requested readback does not fit the buffer
    #[error("Invalid readback of {requested} bytes from a {available} byte buffer")]
    InvalidReadback { requested: usize, available: usize },

    /// Buffer handle is unknown to the transfer layer
    #[error("Unknown device buffer {id}")]
    UnknownBuffer { id: u32 },

    /// Driver reported an error while reading back
    #[error("Readback failed: {details}")]
    ReadbackFailed { details: String },
}

/// Compute dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Dispatcher state machine was driven out of order
    #[error("Invalid dispatcher transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Work group count exceeds the device limit on one axis
    #[error("Work group count {requested} on axis {axis} exceeds device limit {limit}")]
    GroupLimitExceeded {
        axis: char,
        requested: u32,
        limit: u32,
    },

    /// Driver rejected the dispatch
    #[error("Dispatch rejected by driver (gl error 0x{code:04x})")]
    Rejected { code: u32 },

    /// Driver rejected a uniform update, e.g. a type mismatch with the kernel
    #[error("Failed to set uniform {name} (gl error 0x{code:04x})")]
    UniformRejected { name: String, code: u32 },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing failed
    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    /// Value is outside its allowed range
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Top-level error for a harness run
#[derive(Error, Debug)]
pub enum MatmulError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Kernel source could not be read
    #[error("Failed to read kernel source {path}: {source}")]
    KernelSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Run report could not be written
    #[error("Failed to write report {path}: {details}")]
    Report { path: PathBuf, details: String },
}

pub type Result<T> = std::result::Result<T, MatmulError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_error_formats_egl_code_as_hex() {
        let err = ContextError::ContextCreationFailed { code: 0x3009 };
        assert_eq!(
            err.to_string(),
            "Failed to create EGL context (egl error 0x3009)"
        );
    }

    #[test]
    fn test_compile_error_surfaces_log_verbatim() {
        let log = "0:12(5): error: `acc' undeclared";
        let err: MatmulError = CompileError::Compile {
            log: log.to_string(),
        }
        .into();
        assert!(err.to_string().ends_with(log));
        assert!(matches!(err, MatmulError::Compile(_)));
    }

    #[test]
    fn test_kernel_source_error_keeps_io_source() {
        let err = MatmulError::KernelSource {
            path: PathBuf::from("matmul_naive.comp"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("missing"));
    }
}

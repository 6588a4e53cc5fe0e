//! Compute kernel sources
//!
//! External `matmul_<mode>.comp` files take precedence. The embedded GLSL
//! versions below are used when a file is missing and fallback is enabled.
//! All kernels read A and B from bindings 0 and 1 and write C at binding 2,
//! each a row-major square of side `stride`.

use crate::compute::strategy::Algorithm;
use crate::config::KernelSettings;
use crate::error::MatmulError;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

const TILE_PLACEHOLDER: &str = "{{TILE}}";

/// One invocation per output element, no shared memory
pub const NAIVE_SOURCE: &str = r#"#version 430
layout(local_size_x = {{TILE}}, local_size_y = {{TILE}}, local_size_z = 1) in;

layout(std430, binding = 0) readonly buffer MatA { float A[]; };
layout(std430, binding = 1) readonly buffer MatB { float B[]; };
layout(std430, binding = 2) writeonly buffer MatC { float C[]; };

uniform int N;
uniform int stride;

void main() {
    int col = int(gl_GlobalInvocationID.x);
    int row = int(gl_GlobalInvocationID.y);
    if (row >= N || col >= N) {
        return;
    }

    float acc = 0.0;
    for (int k = 0; k < N; ++k) {
        acc += A[row * stride + k] * B[k * stride + col];
    }
    C[row * stride + col] = acc;
}
"#;

/// Shared-memory tiles over one block of rows starting at `baseRow`
pub const CHUNKED_SOURCE: &str = r#"#version 430
#define TILE {{TILE}}
layout(local_size_x = TILE, local_size_y = TILE, local_size_z = 1) in;

layout(std430, binding = 0) readonly buffer MatA { float A[]; };
layout(std430, binding = 1) readonly buffer MatB { float B[]; };
layout(std430, binding = 2) writeonly buffer MatC { float C[]; };

uniform int N;
uniform int stride;
uniform int baseRow;

shared float tileA[TILE][TILE];
shared float tileB[TILE][TILE];

void main() {
    int tx = int(gl_LocalInvocationID.x);
    int ty = int(gl_LocalInvocationID.y);
    int col = int(gl_GlobalInvocationID.x);
    int row = baseRow + int(gl_GlobalInvocationID.y);
    bool inside = row < stride && col < stride;

    float acc = 0.0;
    for (int t = 0; t < stride; t += TILE) {
        tileA[ty][tx] = inside ? A[row * stride + t + tx] : 0.0;
        tileB[ty][tx] = (t + ty < stride && col < stride) ? B[(t + ty) * stride + col] : 0.0;
        barrier();
        for (int k = 0; k < TILE; ++k) {
            acc += tileA[ty][k] * tileB[k][tx];
        }
        barrier();
    }

    if (inside) {
        C[row * stride + col] = acc;
    }
}
"#;

/// Tiled product of the sub-blocks at `offsetA` and `offsetB`
pub const STRASSEN_SOURCE: &str = r#"#version 430
#define TILE {{TILE}}
layout(local_size_x = TILE, local_size_y = TILE, local_size_z = 1) in;

layout(std430, binding = 0) readonly buffer MatA { float A[]; };
layout(std430, binding = 1) readonly buffer MatB { float B[]; };
layout(std430, binding = 2) writeonly buffer MatC { float C[]; };

uniform int N;
uniform int stride;
uniform int offsetA;
uniform int offsetB;

shared float tileA[TILE][TILE];
shared float tileB[TILE][TILE];

void main() {
    int tx = int(gl_LocalInvocationID.x);
    int ty = int(gl_LocalInvocationID.y);
    int col = int(gl_GlobalInvocationID.x);
    int row = int(gl_GlobalInvocationID.y);
    bool inside = row < stride && col < stride;

    float acc = 0.0;
    for (int t = 0; t < stride; t += TILE) {
        tileA[ty][tx] = inside ? A[offsetA + row * stride + t + tx] : 0.0;
        tileB[ty][tx] = (t + ty < stride && col < stride)
            ? B[offsetB + (t + ty) * stride + col]
            : 0.0;
        barrier();
        for (int k = 0; k < TILE; ++k) {
            acc += tileA[ty][k] * tileB[k][tx];
        }
        barrier();
    }

    if (inside) {
        C[row * stride + col] = acc;
    }
}
"#;

/// Built-in kernel for `algorithm` with the work group edge set to `tile`
pub fn embedded_source(algorithm: Algorithm, tile: usize) -> String {
    let template = match algorithm {
        Algorithm::Naive => NAIVE_SOURCE,
        Algorithm::Chunked => CHUNKED_SOURCE,
        Algorithm::Strassen => STRASSEN_SOURCE,
    };
    template.replace(TILE_PLACEHOLDER, &tile.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelOrigin {
    File(PathBuf),
    Embedded,
}

impl fmt::Display for KernelOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelOrigin::File(path) => write!(f, "{}", path.display()),
            KernelOrigin::Embedded => f.write_str("embedded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KernelSource {
    pub text: String,
    pub origin: KernelOrigin,
}

/// Reads `matmul_<mode>.comp` from the kernel directory, falling back to the
/// embedded kernel when the file does not exist and fallback is enabled
pub fn load_source(
    settings: &KernelSettings,
    algorithm: Algorithm,
    tile: usize,
) -> Result<KernelSource, MatmulError> {
    let path = settings.dir.join(algorithm.kernel_file_name());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("Using kernel {}", path.display());
            Ok(KernelSource {
                text,
                origin: KernelOrigin::File(path),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && settings.embedded_fallback => {
            warn!(
                "Kernel {} not found, using embedded {} kernel",
                path.display(),
                algorithm
            );
            Ok(KernelSource {
                text: embedded_source(algorithm, tile),
                origin: KernelOrigin::Embedded,
            })
        }
        Err(source) => Err(MatmulError::KernelSource { path, source }),
    }
}

//! Headless EGL context and the OpenGL compute backend

pub mod api;
pub mod context;
pub mod device;
pub mod egl;
pub mod ffi;

pub use context::{ComputeEntryPoints, ContextOptions, DeviceInfo, HeadlessContext};
pub use device::GlDevice;
pub use egl::{EglApi, EglLibrary};

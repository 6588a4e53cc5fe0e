//! Headless EGL context lifecycle
//!
//! A `HeadlessContext` owns the EGL display connection, a 1x1 pbuffer surface
//! and an OpenGL context current on the acquiring thread. Whatever part of it
//! has been created is torn down exactly once, either by an explicit
//! `release()` or on drop, including when `acquire` fails halfway.

use super::egl::{resolve_optional, EglApi, EglLibrary};
use super::ffi::*;
use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use tracing::{debug, info, warn};

/// Minimum per-axis work group count guaranteed by GL 4.3
pub const GL43_MIN_WORK_GROUP_COUNT: u32 = 65_535;

const PBUFFER_WIDTH: EGLint = 1;
const PBUFFER_HEIGHT: EGLint = 1;

#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// GL version requested first; `None` asks for the driver default
    pub gl_version: Option<(EGLint, EGLint)>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            gl_version: Some((4, 3)),
        }
    }
}

/// The two GL 4.3 entry points the dispatcher needs
///
/// Resolved once during acquisition and handed to the device explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeEntryPoints {
    dispatch_compute: Option<GlDispatchComputeFn>,
    memory_barrier: Option<GlMemoryBarrierFn>,
}

impl ComputeEntryPoints {
    pub fn load<A: EglApi + ?Sized>(egl: &A) -> Self {
        // SAFETY: prototypes match the GL 4.3 definitions of these entry points.
        unsafe {
            Self {
                dispatch_compute: resolve_optional(egl, "glDispatchCompute"),
                memory_barrier: resolve_optional(egl, "glMemoryBarrier"),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn from_fns(
        dispatch_compute: GlDispatchComputeFn,
        memory_barrier: GlMemoryBarrierFn,
    ) -> Self {
        Self {
            dispatch_compute: Some(dispatch_compute),
            memory_barrier: Some(memory_barrier),
        }
    }

    pub fn supports_compute_dispatch(&self) -> bool {
        self.dispatch_compute.is_some() && self.memory_barrier.is_some()
    }

    pub(crate) fn dispatch_compute(&self) -> Option<GlDispatchComputeFn> {
        self.dispatch_compute
    }

    pub(crate) fn memory_barrier(&self) -> Option<GlMemoryBarrierFn> {
        self.memory_barrier
    }
}

/// Driver identification strings and compute limits, for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub egl_version: String,
    pub egl_vendor: Option<String>,
    pub gl_vendor: Option<String>,
    pub gl_renderer: Option<String>,
    pub gl_version: Option<String>,
    pub glsl_version: Option<String>,
    pub max_work_group_count: [u32; 3],
}

impl DeviceInfo {
    fn query<A: EglApi + ?Sized>(
        egl: &A,
        display: EGLDisplay,
        egl_version: (EGLint, EGLint),
    ) -> Self {
        // SAFETY: prototypes match the GL 1.0 / 3.0 definitions.
        let get_string: Option<GlGetStringFn> = unsafe { resolve_optional(egl, "glGetString") };
        let get_integer_indexed: Option<GlGetIntegeriVFn> =
            unsafe { resolve_optional(egl, "glGetIntegeri_v") };

        let gl_string = |name: GLenum| -> Option<String> {
            let get_string = get_string?;
            let ptr = unsafe { get_string(name) };
            if ptr.is_null() {
                return None;
            }
            // SAFETY: glGetString returns a static NUL-terminated string.
            Some(
                unsafe { CStr::from_ptr(ptr.cast()) }
                    .to_string_lossy()
                    .into_owned(),
            )
        };

        let mut max_work_group_count = [GL43_MIN_WORK_GROUP_COUNT; 3];
        if let Some(get_integer_indexed) = get_integer_indexed {
            for (axis, slot) in max_work_group_count.iter_mut().enumerate() {
                let mut value: GLint = 0;
                unsafe {
                    get_integer_indexed(GL_MAX_COMPUTE_WORK_GROUP_COUNT, axis as GLuint, &mut value)
                };
                if value > 0 {
                    *slot = value as u32;
                }
            }
        }

        Self {
            egl_version: format!("{}.{}", egl_version.0, egl_version.1),
            egl_vendor: egl.query_string(display, EGL_VENDOR),
            gl_vendor: gl_string(GL_VENDOR),
            gl_renderer: gl_string(GL_RENDERER),
            gl_version: gl_string(GL_VERSION),
            glsl_version: gl_string(GL_SHADING_LANGUAGE_VERSION),
            max_work_group_count,
        }
    }
}

/// EGL display, pbuffer surface and GL context bound to the current thread
pub struct HeadlessContext<E: EglApi = EglLibrary> {
    egl: E,
    display: EGLDisplay,
    initialized: bool,
    context: EGLContext,
    surface: EGLSurface,
    current: bool,
    released: bool,
    compute: ComputeEntryPoints,
    info: DeviceInfo,
}

impl HeadlessContext<EglLibrary> {
    /// Loads the system EGL library and acquires a context from it
    pub fn acquire_default(options: &ContextOptions) -> Result<Self, ContextError> {
        Self::acquire(EglLibrary::load()?, options)
    }
}

impl<E: EglApi> HeadlessContext<E> {
    pub fn acquire(egl: E, options: &ContextOptions) -> Result<Self, ContextError> {
        let mut ctx = Self {
            egl,
            display: EGL_NO_DISPLAY,
            initialized: false,
            context: EGL_NO_CONTEXT,
            surface: EGL_NO_SURFACE,
            current: false,
            released: false,
            compute: ComputeEntryPoints::default(),
            info: DeviceInfo::default(),
        };

        // Early returns below drop `ctx`, which releases whatever exists so far.
        ctx.display = ctx.egl.get_display();
        if ctx.display == EGL_NO_DISPLAY {
            return Err(ContextError::NoDisplay);
        }

        let version = ctx
            .egl
            .initialize(ctx.display)
            .map_err(|code| ContextError::InitializeFailed { code })?;
        ctx.initialized = true;
        info!("EGL version: {}.{}", version.0, version.1);

        let config = ctx
            .egl
            .choose_config(
                ctx.display,
                &[
                    EGL_SURFACE_TYPE,
                    EGL_PBUFFER_BIT,
                    EGL_RENDERABLE_TYPE,
                    EGL_OPENGL_BIT,
                    EGL_NONE,
                ],
            )
            .ok_or(ContextError::NoMatchingConfig)?;

        if !ctx.egl.bind_api(EGL_OPENGL_API) {
            return Err(ContextError::BindApiFailed {
                code: ctx.egl.get_error(),
            });
        }

        ctx.context = ctx.create_context(config, options)?;

        ctx.surface = ctx.egl.create_pbuffer_surface(
            ctx.display,
            config,
            &[EGL_WIDTH, PBUFFER_WIDTH, EGL_HEIGHT, PBUFFER_HEIGHT, EGL_NONE],
        );
        if ctx.surface == EGL_NO_SURFACE {
            return Err(ContextError::SurfaceCreationFailed {
                width: PBUFFER_WIDTH,
                height: PBUFFER_HEIGHT,
                code: ctx.egl.get_error(),
            });
        }

        if !ctx.egl.make_current(ctx.display, ctx.surface, ctx.context) {
            return Err(ContextError::MakeCurrentFailed {
                code: ctx.egl.get_error(),
            });
        }
        ctx.current = true;

        ctx.compute = ComputeEntryPoints::load(&ctx.egl);
        ctx.info = DeviceInfo::query(&ctx.egl, ctx.display, version);
        info!(
            "OpenGL Version: {}",
            ctx.info.gl_version.as_deref().unwrap_or("Unknown")
        );
        info!(
            "OpenGL Renderer: {}",
            ctx.info.gl_renderer.as_deref().unwrap_or("Unknown")
        );

        if !ctx.compute.supports_compute_dispatch() {
            return Err(ContextError::ComputeUnsupported {
                version: ctx
                    .info
                    .gl_version
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        Ok(ctx)
    }

    fn create_context(
        &self,
        config: EGLConfig,
        options: &ContextOptions,
    ) -> Result<EGLContext, ContextError> {
        if let Some((major, minor)) = options.gl_version {
            let context = self.egl.create_context(
                self.display,
                config,
                &[
                    EGL_CONTEXT_MAJOR_VERSION,
                    major,
                    EGL_CONTEXT_MINOR_VERSION,
                    minor,
                    EGL_NONE,
                ],
            );
            if context != EGL_NO_CONTEXT {
                return Ok(context);
            }
            warn!(
                "GL {}.{} context request failed (egl error 0x{:04x}), retrying with driver default",
                major,
                minor,
                self.egl.get_error()
            );
        }

        let context = self.egl.create_context(self.display, config, &[EGL_NONE]);
        if context == EGL_NO_CONTEXT {
            return Err(ContextError::ContextCreationFailed {
                code: self.egl.get_error(),
            });
        }
        Ok(context)
    }

    /// Unbinds and destroys the context and surface, then terminates the display
    ///
    /// Safe to call more than once; only the first call has any effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.current {
            self.egl
                .make_current(self.display, EGL_NO_SURFACE, EGL_NO_CONTEXT);
            self.current = false;
        }
        if self.context != EGL_NO_CONTEXT {
            self.egl.destroy_context(self.display, self.context);
            self.context = EGL_NO_CONTEXT;
        }
        if self.surface != EGL_NO_SURFACE {
            self.egl.destroy_surface(self.display, self.surface);
            self.surface = EGL_NO_SURFACE;
        }
        if self.initialized {
            self.egl.terminate(self.display);
            self.initialized = false;
        }
        debug!("Headless context released");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn compute(&self) -> ComputeEntryPoints {
        self.compute
    }

    pub fn display(&self) -> EGLDisplay {
        self.display
    }

    pub fn surface(&self) -> EGLSurface {
        self.surface
    }

    pub fn context(&self) -> EGLContext {
        self.context
    }

    pub(crate) fn egl(&self) -> &E {
        &self.egl
    }
}

impl<E: EglApi> Drop for HeadlessContext<E> {
    fn drop(&mut self) {
        self.release();
    }
}

//! Runtime-loaded EGL entry points
//!
//! `EglApi` is the seam the context manager talks to. `EglLibrary` resolves
//! the real entry points from `libEGL` with `libloading`; tests substitute a
//! fake that counts calls and injects failures.

use super::ffi::*;
use crate::error::ContextError;
use libloading::Library;
use std::ffi::{CStr, CString};
use std::os::raw::c_void;
use tracing::debug;

const EGL_LIBRARY_CANDIDATES: &[&str] = &["libEGL.so.1", "libEGL.so"];

/// Libraries consulted when `eglGetProcAddress` does not return core GL symbols
const GL_LIBRARY_CANDIDATES: &[&str] = &["libOpenGL.so.0", "libGL.so.1", "libGL.so"];

/// EGL operations used to build a headless context
///
/// Handles are the raw EGL handles; callers only pass back handles obtained
/// from the same implementation.
pub trait EglApi {
    fn get_display(&self) -> EGLDisplay;
    /// Returns the EGL (major, minor) version, or the EGL error code
    fn initialize(&self, display: EGLDisplay) -> Result<(EGLint, EGLint), EGLint>;
    fn choose_config(&self, display: EGLDisplay, attribs: &[EGLint]) -> Option<EGLConfig>;
    fn bind_api(&self, api: EGLenum) -> bool;
    fn create_context(
        &self,
        display: EGLDisplay,
        config: EGLConfig,
        attribs: &[EGLint],
    ) -> EGLContext;
    fn create_pbuffer_surface(
        &self,
        display: EGLDisplay,
        config: EGLConfig,
        attribs: &[EGLint],
    ) -> EGLSurface;
    fn make_current(
        &self,
        display: EGLDisplay,
        surface: EGLSurface,
        context: EGLContext,
    ) -> bool;
    fn destroy_context(&self, display: EGLDisplay, context: EGLContext) -> bool;
    fn destroy_surface(&self, display: EGLDisplay, surface: EGLSurface) -> bool;
    fn terminate(&self, display: EGLDisplay) -> bool;
    fn get_error(&self) -> EGLint;
    fn query_string(&self, display: EGLDisplay, name: EGLint) -> Option<String>;
    /// Resolves a GL entry point; null when unavailable
    fn get_proc_address(&self, name: &CStr) -> *const c_void;
}

struct EglFns {
    get_display: EglGetDisplayFn,
    initialize: EglInitializeFn,
    choose_config: EglChooseConfigFn,
    bind_api: EglBindApiFn,
    create_context: EglCreateContextFn,
    create_pbuffer_surface: EglCreatePbufferSurfaceFn,
    make_current: EglMakeCurrentFn,
    destroy_context: EglDestroyContextFn,
    destroy_surface: EglDestroySurfaceFn,
    terminate: EglTerminateFn,
    get_error: EglGetErrorFn,
    query_string: EglQueryStringFn,
    get_proc_address: EglGetProcAddressFn,
}

/// EGL entry points resolved from the system library
pub struct EglLibrary {
    fns: EglFns,
    gl_fallback: Option<Library>,
    _egl: Library,
}

impl EglLibrary {
    pub fn load() -> Result<Self, ContextError> {
        let egl = open_first(EGL_LIBRARY_CANDIDATES).ok_or_else(|| {
            ContextError::LibraryUnavailable {
                library: "libEGL".to_string(),
                details: format!("tried {}", EGL_LIBRARY_CANDIDATES.join(", ")),
            }
        })?;

        let fns = EglFns {
            get_display: load_symbol(&egl, b"eglGetDisplay\0")?,
            initialize: load_symbol(&egl, b"eglInitialize\0")?,
            choose_config: load_symbol(&egl, b"eglChooseConfig\0")?,
            bind_api: load_symbol(&egl, b"eglBindAPI\0")?,
            create_context: load_symbol(&egl, b"eglCreateContext\0")?,
            create_pbuffer_surface: load_symbol(&egl, b"eglCreatePbufferSurface\0")?,
            make_current: load_symbol(&egl, b"eglMakeCurrent\0")?,
            destroy_context: load_symbol(&egl, b"eglDestroyContext\0")?,
            destroy_surface: load_symbol(&egl, b"eglDestroySurface\0")?,
            terminate: load_symbol(&egl, b"eglTerminate\0")?,
            get_error: load_symbol(&egl, b"eglGetError\0")?,
            query_string: load_symbol(&egl, b"eglQueryString\0")?,
            get_proc_address: load_symbol(&egl, b"eglGetProcAddress\0")?,
        };

        let gl_fallback = open_first(GL_LIBRARY_CANDIDATES);
        if gl_fallback.is_none() {
            debug!("No desktop GL library found; relying on eglGetProcAddress only");
        }

        Ok(Self {
            fns,
            gl_fallback,
            _egl: egl,
        })
    }
}

fn open_first(candidates: &[&str]) -> Option<Library> {
    candidates.iter().find_map(|candidate| {
        // SAFETY: dynamic library probing only; EGL/GL loaders have no unsound initializers.
        match unsafe { Library::new(candidate) } {
            Ok(lib) => {
                debug!("Loaded {}", candidate);
                Some(lib)
            }
            Err(e) => {
                debug!("Could not load {}: {}", candidate, e);
                None
            }
        }
    })
}

fn load_symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T, ContextError> {
    // SAFETY: symbol types in ffi.rs match the EGL 1.4 prototypes.
    let symbol = unsafe { lib.get::<T>(name) }.map_err(|_| ContextError::MissingEntryPoint {
        name: String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]).into_owned(),
    })?;
    Ok(*symbol)
}

fn terminated(attribs: &[EGLint]) -> Vec<EGLint> {
    let mut list = attribs.to_vec();
    if list.last() != Some(&EGL_NONE) {
        list.push(EGL_NONE);
    }
    list
}

impl EglApi for EglLibrary {
    fn get_display(&self) -> EGLDisplay {
        unsafe { (self.fns.get_display)(EGL_DEFAULT_DISPLAY) }
    }

    fn initialize(&self, display: EGLDisplay) -> Result<(EGLint, EGLint), EGLint> {
        let mut major: EGLint = 0;
        let mut minor: EGLint = 0;
        let ok = unsafe { (self.fns.initialize)(display, &mut major, &mut minor) };
        if ok == EGL_TRUE {
            Ok((major, minor))
        } else {
            Err(self.get_error())
        }
    }

    fn choose_config(&self, display: EGLDisplay, attribs: &[EGLint]) -> Option<EGLConfig> {
        let attribs = terminated(attribs);
        let mut config: EGLConfig = std::ptr::null_mut();
        let mut count: EGLint = 0;
        let ok = unsafe {
            (self.fns.choose_config)(display, attribs.as_ptr(), &mut config, 1, &mut count)
        };
        (ok == EGL_TRUE && count > 0).then_some(config)
    }

    fn bind_api(&self, api: EGLenum) -> bool {
        unsafe { (self.fns.bind_api)(api) == EGL_TRUE }
    }

    fn create_context(
        &self,
        display: EGLDisplay,
        config: EGLConfig,
        attribs: &[EGLint],
    ) -> EGLContext {
        let attribs = terminated(attribs);
        unsafe { (self.fns.create_context)(display, config, EGL_NO_CONTEXT, attribs.as_ptr()) }
    }

    fn create_pbuffer_surface(
        &self,
        display: EGLDisplay,
        config: EGLConfig,
        attribs: &[EGLint],
    ) -> EGLSurface {
        let attribs = terminated(attribs);
        unsafe { (self.fns.create_pbuffer_surface)(display, config, attribs.as_ptr()) }
    }

    fn make_current(
        &self,
        display: EGLDisplay,
        surface: EGLSurface,
        context: EGLContext,
    ) -> bool {
        unsafe { (self.fns.make_current)(display, surface, surface, context) == EGL_TRUE }
    }

    fn destroy_context(&self, display: EGLDisplay, context: EGLContext) -> bool {
        unsafe { (self.fns.destroy_context)(display, context) == EGL_TRUE }
    }

    fn destroy_surface(&self, display: EGLDisplay, surface: EGLSurface) -> bool {
        unsafe { (self.fns.destroy_surface)(display, surface) == EGL_TRUE }
    }

    fn terminate(&self, display: EGLDisplay) -> bool {
        unsafe { (self.fns.terminate)(display) == EGL_TRUE }
    }

    fn get_error(&self) -> EGLint {
        unsafe { (self.fns.get_error)() }
    }

    fn query_string(&self, display: EGLDisplay, name: EGLint) -> Option<String> {
        let ptr = unsafe { (self.fns.query_string)(display, name) };
        if ptr.is_null() {
            return None;
        }
        // SAFETY: EGL returns a static NUL-terminated string owned by the driver.
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }

    fn get_proc_address(&self, name: &CStr) -> *const c_void {
        let ptr = unsafe { (self.fns.get_proc_address)(name.as_ptr()) };
        if !ptr.is_null() {
            return ptr;
        }
        let Some(lib) = &self.gl_fallback else {
            return std::ptr::null();
        };
        // SAFETY: the symbol is only reinterpreted by the caller using the matching prototype.
        unsafe { lib.get::<*const c_void>(name.to_bytes_with_nul()) }
            .map(|symbol| *symbol)
            .unwrap_or(std::ptr::null())
    }
}

/// Resolves `name` through `egl` as a typed function pointer
///
/// # Safety
/// `F` must be an `extern "C"` function pointer type matching the prototype
/// of the named entry point.
pub unsafe fn resolve<F: Copy, A: EglApi + ?Sized>(egl: &A, name: &str) -> Result<F, ContextError> {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const c_void>());
    let missing = || ContextError::MissingEntryPoint {
        name: name.to_string(),
    };
    let cname = CString::new(name).map_err(|_| missing())?;
    let ptr = egl.get_proc_address(&cname);
    if ptr.is_null() {
        return Err(missing());
    }
    Ok(std::mem::transmute_copy::<*const c_void, F>(&ptr))
}

/// Like [`resolve`] but yields `None` for optional entry points
///
/// # Safety
/// Same contract as [`resolve`].
pub unsafe fn resolve_optional<F: Copy, A: EglApi + ?Sized>(egl: &A, name: &str) -> Option<F> {
    resolve(egl, name).ok()
}

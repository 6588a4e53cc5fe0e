//! EGL and OpenGL FFI types for headless compute
//!
//! Only the subset needed to create a pbuffer context, compile a compute
//! program, move shader storage buffers and dispatch work is declared here.
//! Nothing is linked at build time: entry points are resolved at runtime
//! through `libloading` and `eglGetProcAddress`.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int, c_uint, c_void, ptrdiff_t};

pub type EGLint = i32;
pub type EGLBoolean = c_uint;
pub type EGLenum = c_uint;
pub type EGLDisplay = *mut c_void;
pub type EGLConfig = *mut c_void;
pub type EGLContext = *mut c_void;
pub type EGLSurface = *mut c_void;
pub type EGLNativeDisplayType = *mut c_void;

pub const EGL_TRUE: EGLBoolean = 1;
pub const EGL_DEFAULT_DISPLAY: EGLNativeDisplayType = std::ptr::null_mut();
pub const EGL_NO_DISPLAY: EGLDisplay = std::ptr::null_mut();
pub const EGL_NO_CONTEXT: EGLContext = std::ptr::null_mut();
pub const EGL_NO_SURFACE: EGLSurface = std::ptr::null_mut();

pub const EGL_NONE: EGLint = 0x3038;
pub const EGL_SURFACE_TYPE: EGLint = 0x3033;
pub const EGL_PBUFFER_BIT: EGLint = 0x0001;
pub const EGL_RENDERABLE_TYPE: EGLint = 0x3040;
pub const EGL_OPENGL_BIT: EGLint = 0x0008;
pub const EGL_OPENGL_API: EGLenum = 0x30A2;
pub const EGL_WIDTH: EGLint = 0x3057;
pub const EGL_HEIGHT: EGLint = 0x3056;
pub const EGL_VENDOR: EGLint = 0x3053;
pub const EGL_CONTEXT_MAJOR_VERSION: EGLint = 0x3098;
pub const EGL_CONTEXT_MINOR_VERSION: EGLint = 0x30FB;

pub type GLenum = c_uint;
pub type GLuint = c_uint;
pub type GLint = c_int;
pub type GLsizei = c_int;
pub type GLbitfield = c_uint;
pub type GLchar = c_char;
pub type GLubyte = u8;
pub type GLintptr = ptrdiff_t;
pub type GLsizeiptr = ptrdiff_t;

pub const GL_NO_ERROR: GLenum = 0;
pub const GL_OUT_OF_MEMORY: GLenum = 0x0505;
pub const GL_FALSE: GLint = 0;
pub const GL_TRUE: GLint = 1;

pub const GL_VENDOR: GLenum = 0x1F00;
pub const GL_RENDERER: GLenum = 0x1F01;
pub const GL_VERSION: GLenum = 0x1F02;
pub const GL_SHADING_LANGUAGE_VERSION: GLenum = 0x8B8C;
pub const GL_MAX_COMPUTE_WORK_GROUP_COUNT: GLenum = 0x91BE;

pub const GL_COMPUTE_SHADER: GLenum = 0x91B9;
pub const GL_COMPILE_STATUS: GLenum = 0x8B81;
pub const GL_LINK_STATUS: GLenum = 0x8B82;
pub const GL_INFO_LOG_LENGTH: GLenum = 0x8B84;

pub const GL_SHADER_STORAGE_BUFFER: GLenum = 0x90D2;
pub const GL_STATIC_DRAW: GLenum = 0x88E4;
pub const GL_DYNAMIC_READ: GLenum = 0x88E9;
pub const GL_SHADER_STORAGE_BARRIER_BIT: GLbitfield = 0x0000_2000;

// EGL entry points
pub type EglGetDisplayFn = unsafe extern "C" fn(EGLNativeDisplayType) -> EGLDisplay;
pub type EglInitializeFn =
    unsafe extern "C" fn(EGLDisplay, *mut EGLint, *mut EGLint) -> EGLBoolean;
pub type EglChooseConfigFn = unsafe extern "C" fn(
    EGLDisplay,
    *const EGLint,
    *mut EGLConfig,
    EGLint,
    *mut EGLint,
) -> EGLBoolean;
pub type EglBindApiFn = unsafe extern "C" fn(EGLenum) -> EGLBoolean;
pub type EglCreateContextFn =
    unsafe extern "C" fn(EGLDisplay, EGLConfig, EGLContext, *const EGLint) -> EGLContext;
pub type EglCreatePbufferSurfaceFn =
    unsafe extern "C" fn(EGLDisplay, EGLConfig, *const EGLint) -> EGLSurface;
pub type EglMakeCurrentFn =
    unsafe extern "C" fn(EGLDisplay, EGLSurface, EGLSurface, EGLContext) -> EGLBoolean;
pub type EglDestroyContextFn = unsafe extern "C" fn(EGLDisplay, EGLContext) -> EGLBoolean;
pub type EglDestroySurfaceFn = unsafe extern "C" fn(EGLDisplay, EGLSurface) -> EGLBoolean;
pub type EglTerminateFn = unsafe extern "C" fn(EGLDisplay) -> EGLBoolean;
pub type EglGetErrorFn = unsafe extern "C" fn() -> EGLint;
pub type EglQueryStringFn = unsafe extern "C" fn(EGLDisplay, EGLint) -> *const c_char;
pub type EglGetProcAddressFn = unsafe extern "C" fn(*const c_char) -> *const c_void;

// GL entry points
pub type GlGetStringFn = unsafe extern "C" fn(GLenum) -> *const GLubyte;
pub type GlGetIntegeriVFn = unsafe extern "C" fn(GLenum, GLuint, *mut GLint);
pub type GlGetErrorFn = unsafe extern "C" fn() -> GLenum;
pub type GlCreateShaderFn = unsafe extern "C" fn(GLenum) -> GLuint;
pub type GlShaderSourceFn =
    unsafe extern "C" fn(GLuint, GLsizei, *const *const GLchar, *const GLint);
pub type GlCompileShaderFn = unsafe extern "C" fn(GLuint);
pub type GlGetShaderivFn = unsafe extern "C" fn(GLuint, GLenum, *mut GLint);
pub type GlGetShaderInfoLogFn = unsafe extern "C" fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar);
pub type GlDeleteShaderFn = unsafe extern "C" fn(GLuint);
pub type GlCreateProgramFn = unsafe extern "C" fn() -> GLuint;
pub type GlAttachShaderFn = unsafe extern "C" fn(GLuint, GLuint);
pub type GlLinkProgramFn = unsafe extern "C" fn(GLuint);
pub type GlGetProgramivFn = unsafe extern "C" fn(GLuint, GLenum, *mut GLint);
pub type GlGetProgramInfoLogFn =
    unsafe extern "C" fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar);
pub type GlDeleteProgramFn = unsafe extern "C" fn(GLuint);
pub type GlUseProgramFn = unsafe extern "C" fn(GLuint);
pub type GlGetUniformLocationFn = unsafe extern "C" fn(GLuint, *const GLchar) -> GLint;
pub type GlUniform1iFn = unsafe extern "C" fn(GLint, GLint);
pub type GlGenBuffersFn = unsafe extern "C" fn(GLsizei, *mut GLuint);
pub type GlBindBufferFn = unsafe extern "C" fn(GLenum, GLuint);
pub type GlBufferDataFn = unsafe extern "C" fn(GLenum, GLsizeiptr, *const c_void, GLenum);
pub type GlBufferSubDataFn = unsafe extern "C" fn(GLenum, GLintptr, GLsizeiptr, *const c_void);
pub type GlBindBufferBaseFn = unsafe extern "C" fn(GLenum, GLuint, GLuint);
pub type GlGetBufferSubDataFn = unsafe extern "C" fn(GLenum, GLintptr, GLsizeiptr, *mut c_void);
pub type GlDeleteBuffersFn = unsafe extern "C" fn(GLsizei, *const GLuint);
pub type GlFinishFn = unsafe extern "C" fn();

// GL 4.3 compute entry points
pub type GlDispatchComputeFn = unsafe extern "C" fn(GLuint, GLuint, GLuint);
pub type GlMemoryBarrierFn = unsafe extern "C" fn(GLbitfield);

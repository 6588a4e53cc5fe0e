//! OpenGL function table for the compute path

use super::egl::{resolve, EglApi};
use super::ffi::*;
use crate::error::ContextError;

/// Core GL entry points used by [`super::GlDevice`]
///
/// Loaded once, after the context has been made current.
#[derive(Clone, Copy)]
pub struct GlApi {
    pub get_error: GlGetErrorFn,
    pub create_shader: GlCreateShaderFn,
    pub shader_source: GlShaderSourceFn,
    pub compile_shader: GlCompileShaderFn,
    pub get_shader_iv: GlGetShaderivFn,
    pub get_shader_info_log: GlGetShaderInfoLogFn,
    pub delete_shader: GlDeleteShaderFn,
    pub create_program: GlCreateProgramFn,
    pub attach_shader: GlAttachShaderFn,
    pub link_program: GlLinkProgramFn,
    pub get_program_iv: GlGetProgramivFn,
    pub get_program_info_log: GlGetProgramInfoLogFn,
    pub delete_program: GlDeleteProgramFn,
    pub use_program: GlUseProgramFn,
    pub get_uniform_location: GlGetUniformLocationFn,
    pub uniform_1i: GlUniform1iFn,
    pub gen_buffers: GlGenBuffersFn,
    pub bind_buffer: GlBindBufferFn,
    pub buffer_data: GlBufferDataFn,
    pub buffer_sub_data: GlBufferSubDataFn,
    pub bind_buffer_base: GlBindBufferBaseFn,
    pub get_buffer_sub_data: GlGetBufferSubDataFn,
    pub delete_buffers: GlDeleteBuffersFn,
    pub finish: GlFinishFn,
}

impl GlApi {
    pub fn load<A: EglApi + ?Sized>(egl: &A) -> Result<Self, ContextError> {
        // SAFETY: every prototype in ffi.rs matches its GL 4.3 core definition.
        unsafe {
            Ok(Self {
                get_error: resolve(egl, "glGetError")?,
                create_shader: resolve(egl, "glCreateShader")?,
                shader_source: resolve(egl, "glShaderSource")?,
                compile_shader: resolve(egl, "glCompileShader")?,
                get_shader_iv: resolve(egl, "glGetShaderiv")?,
                get_shader_info_log: resolve(egl, "glGetShaderInfoLog")?,
                delete_shader: resolve(egl, "glDeleteShader")?,
                create_program: resolve(egl, "glCreateProgram")?,
                attach_shader: resolve(egl, "glAttachShader")?,
                link_program: resolve(egl, "glLinkProgram")?,
                get_program_iv: resolve(egl, "glGetProgramiv")?,
                get_program_info_log: resolve(egl, "glGetProgramInfoLog")?,
                delete_program: resolve(egl, "glDeleteProgram")?,
                use_program: resolve(egl, "glUseProgram")?,
                get_uniform_location: resolve(egl, "glGetUniformLocation")?,
                uniform_1i: resolve(egl, "glUniform1i")?,
                gen_buffers: resolve(egl, "glGenBuffers")?,
                bind_buffer: resolve(egl, "glBindBuffer")?,
                buffer_data: resolve(egl, "glBufferData")?,
                buffer_sub_data: resolve(egl, "glBufferSubData")?,
                bind_buffer_base: resolve(egl, "glBindBufferBase")?,
                get_buffer_sub_data: resolve(egl, "glGetBufferSubData")?,
                delete_buffers: resolve(egl, "glDeleteBuffers")?,
                finish: resolve(egl, "glFinish")?,
            })
        }
    }

    /// Drains the GL error queue, returning the first error seen
    pub fn take_error(&self) -> GLenum {
        let first = unsafe { (self.get_error)() };
        if first != GL_NO_ERROR {
            // Bounded: a lost context can report errors forever.
            for _ in 0..16 {
                if unsafe { (self.get_error)() } == GL_NO_ERROR {
                    break;
                }
            }
        }
        first
    }
}

//! OpenGL 4.3 implementation of [`ComputeDevice`]

use super::api::GlApi;
use super::context::{ComputeEntryPoints, HeadlessContext};
use super::egl::EglApi;
use super::ffi::*;
use crate::compute::device::ComputeDevice;
use crate::compute::types::{BufferId, ProgramId, WorkGroups};
use crate::error::{CompileError, ContextError, DispatchError, TransferError};
use std::ffi::CString;
use std::marker::PhantomData;
use std::os::raw::c_void;
use tracing::{debug, trace};

/// Compute device backed by the GL context current on this thread
///
/// Borrows the [`HeadlessContext`] so it cannot outlive it.
pub struct GlDevice<'ctx> {
    gl: GlApi,
    compute: ComputeEntryPoints,
    max_work_group_count: [u32; 3],
    _context: PhantomData<&'ctx ()>,
}

impl<'ctx> GlDevice<'ctx> {
    pub fn new<E: EglApi>(context: &'ctx HeadlessContext<E>) -> Result<Self, ContextError> {
        let compute = context.compute();
        if !compute.supports_compute_dispatch() {
            return Err(ContextError::ComputeUnsupported {
                version: context
                    .info()
                    .gl_version
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }
        let gl = GlApi::load(context.egl())?;
        debug!("Loaded GL compute function table");
        Ok(Self {
            gl,
            compute,
            max_work_group_count: context.info().max_work_group_count,
            _context: PhantomData,
        })
    }

    fn shader_log(&self, shader: GLuint) -> String {
        let mut len: GLint = 0;
        unsafe { (self.gl.get_shader_iv)(shader, GL_INFO_LOG_LENGTH, &mut len) };
        let mut buf = vec![0u8; len.max(1) as usize];
        let mut written: GLsizei = 0;
        unsafe {
            (self.gl.get_shader_info_log)(shader, len.max(1), &mut written, buf.as_mut_ptr().cast())
        };
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn program_log(&self, program: GLuint) -> String {
        let mut len: GLint = 0;
        unsafe { (self.gl.get_program_iv)(program, GL_INFO_LOG_LENGTH, &mut len) };
        let mut buf = vec![0u8; len.max(1) as usize];
        let mut written: GLsizei = 0;
        unsafe {
            (self.gl.get_program_info_log)(
                program,
                len.max(1),
                &mut written,
                buf.as_mut_ptr().cast(),
            )
        };
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn allocate(
        &mut self,
        binding: u32,
        byte_len: usize,
        initial: Option<&[u8]>,
        usage: GLenum,
    ) -> Result<BufferId, TransferError> {
        let size = GLsizeiptr::try_from(byte_len).map_err(|_| TransferError::AllocationFailed {
            binding,
            bytes: byte_len,
            details: "size exceeds GLsizeiptr".to_string(),
        })?;

        self.gl.take_error();
        let mut buffer: GLuint = 0;
        unsafe {
            (self.gl.gen_buffers)(1, &mut buffer);
            (self.gl.bind_buffer)(GL_SHADER_STORAGE_BUFFER, buffer);
            (self.gl.buffer_data)(GL_SHADER_STORAGE_BUFFER, size, std::ptr::null(), usage);
        }

        self.check_allocation(buffer, binding, byte_len)?;

        // Drivers that commit storage lazily report exhaustion on the first write.
        if let Some(bytes) = initial {
            unsafe {
                (self.gl.buffer_sub_data)(
                    GL_SHADER_STORAGE_BUFFER,
                    0,
                    size,
                    bytes.as_ptr() as *const c_void,
                )
            };
            self.check_allocation(buffer, binding, byte_len)?;
        }

        unsafe { (self.gl.bind_buffer_base)(GL_SHADER_STORAGE_BUFFER, binding, buffer) };
        self.check_allocation(buffer, binding, byte_len)?;

        unsafe { (self.gl.bind_buffer)(GL_SHADER_STORAGE_BUFFER, 0) };
        trace!(buffer, binding, bytes = byte_len, "allocated shader storage buffer");
        Ok(BufferId(buffer))
    }

    /// Deletes `buffer` and fails if the last buffer call raised a GL error
    fn check_allocation(
        &self,
        buffer: GLuint,
        binding: u32,
        byte_len: usize,
    ) -> Result<(), TransferError> {
        let code = self.gl.take_error();
        if code == GL_NO_ERROR {
            return Ok(());
        }
        unsafe {
            (self.gl.bind_buffer)(GL_SHADER_STORAGE_BUFFER, 0);
            (self.gl.delete_buffers)(1, &buffer);
        }
        let details = if code == GL_OUT_OF_MEMORY {
            "out of device memory".to_string()
        } else {
            format!("gl error 0x{code:04x}")
        };
        Err(TransferError::AllocationFailed {
            binding,
            bytes: byte_len,
            details,
        })
    }
}

impl ComputeDevice for GlDevice<'_> {
    fn compile_program(&mut self, source: &str) -> Result<ProgramId, CompileError> {
        let c_source = CString::new(source).map_err(|e| CompileError::InvalidSource {
            offset: e.nul_position(),
        })?;

        let shader = unsafe { (self.gl.create_shader)(GL_COMPUTE_SHADER) };
        if shader == 0 {
            return Err(CompileError::ObjectCreationFailed { object: "shader" });
        }

        let mut status: GLint = GL_FALSE;
        unsafe {
            let ptr = c_source.as_ptr();
            (self.gl.shader_source)(shader, 1, &ptr, std::ptr::null());
            (self.gl.compile_shader)(shader);
            (self.gl.get_shader_iv)(shader, GL_COMPILE_STATUS, &mut status);
        }
        if status != GL_TRUE {
            let log = self.shader_log(shader);
            unsafe { (self.gl.delete_shader)(shader) };
            return Err(CompileError::Compile { log });
        }

        let program = unsafe { (self.gl.create_program)() };
        if program == 0 {
            unsafe { (self.gl.delete_shader)(shader) };
            return Err(CompileError::ObjectCreationFailed { object: "program" });
        }

        unsafe {
            (self.gl.attach_shader)(program, shader);
            (self.gl.link_program)(program);
            (self.gl.get_program_iv)(program, GL_LINK_STATUS, &mut status);
            // Flagged for deletion; freed with the program.
            (self.gl.delete_shader)(shader);
        }
        if status != GL_TRUE {
            let log = self.program_log(program);
            unsafe { (self.gl.delete_program)(program) };
            return Err(CompileError::Link { log });
        }

        debug!(program, "compute program linked");
        Ok(ProgramId(program))
    }

    fn use_program(&mut self, program: ProgramId) {
        unsafe { (self.gl.use_program)(program.0) };
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<i32> {
        let c_name = CString::new(name).ok()?;
        let location = unsafe { (self.gl.get_uniform_location)(program.0, c_name.as_ptr()) };
        (location != -1).then_some(location)
    }

    fn set_uniform_i32(&mut self, location: i32, value: i32) -> Result<(), DispatchError> {
        unsafe { (self.gl.uniform_1i)(location, value) };
        match self.gl.take_error() {
            GL_NO_ERROR => Ok(()),
            code => Err(DispatchError::Rejected { code }),
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        unsafe {
            (self.gl.use_program)(0);
            (self.gl.delete_program)(program.0);
        }
    }

    fn upload_buffer(&mut self, binding: u32, bytes: &[u8]) -> Result<BufferId, TransferError> {
        self.allocate(binding, bytes.len(), Some(bytes), GL_STATIC_DRAW)
    }

    fn reserve_buffer(
        &mut self,
        binding: u32,
        byte_len: usize,
    ) -> Result<BufferId, TransferError> {
        self.allocate(binding, byte_len, None, GL_DYNAMIC_READ)
    }

    fn read_buffer(&mut self, buffer: BufferId, out: &mut [u8]) -> Result<(), TransferError> {
        let size = GLsizeiptr::try_from(out.len()).map_err(|_| TransferError::ReadbackFailed {
            details: "size exceeds GLsizeiptr".to_string(),
        })?;
        self.gl.take_error();
        unsafe {
            (self.gl.bind_buffer)(GL_SHADER_STORAGE_BUFFER, buffer.0);
            (self.gl.get_buffer_sub_data)(
                GL_SHADER_STORAGE_BUFFER,
                0,
                size,
                out.as_mut_ptr() as *mut c_void,
            );
            (self.gl.bind_buffer)(GL_SHADER_STORAGE_BUFFER, 0);
        }
        match self.gl.take_error() {
            GL_NO_ERROR => Ok(()),
            code => Err(TransferError::ReadbackFailed {
                details: format!("gl error 0x{code:04x}"),
            }),
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        unsafe { (self.gl.delete_buffers)(1, &buffer.0) };
    }

    fn dispatch_compute(&mut self, groups: WorkGroups) -> Result<(), DispatchError> {
        let Some(dispatch) = self.compute.dispatch_compute() else {
            return Err(DispatchError::Rejected { code: 0 });
        };
        // Left over from glUseProgram; the program state is not what was requested.
        let pending = self.gl.take_error();
        if pending != GL_NO_ERROR {
            return Err(DispatchError::Rejected { code: pending });
        }
        unsafe { dispatch(groups.x, groups.y, groups.z) };
        match self.gl.take_error() {
            GL_NO_ERROR => Ok(()),
            code => Err(DispatchError::Rejected { code }),
        }
    }

    fn memory_barrier(&mut self) {
        if let Some(barrier) = self.compute.memory_barrier() {
            unsafe { barrier(GL_SHADER_STORAGE_BARRIER_BIT) };
        }
    }

    fn finish(&mut self) {
        unsafe { (self.gl.finish)() };
    }

    fn max_work_group_count(&self) -> [u32; 3] {
        self.max_work_group_count
    }
}

//! Device abstraction used by the transfer layer and the dispatcher

use super::types::{BufferId, ProgramId, WorkGroups};
use crate::error::{CompileError, DispatchError, TransferError};

/// Operations a compute backend must provide to run a matmul kernel
///
/// Implementations issue work on the calling thread's current context.
/// `dispatch_compute` and `memory_barrier` are non-blocking submissions;
/// only `finish` waits for the device.
#[cfg_attr(test, mockall::automock)]
pub trait ComputeDevice {
    /// Compiles and links a single compute-stage program
    fn compile_program(&mut self, source: &str) -> Result<ProgramId, CompileError>;

    fn use_program(&mut self, program: ProgramId);

    /// Location of an integer uniform, `None` when the program does not declare it
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<i32>;

    /// Sets an integer uniform on the current program
    ///
    /// A driver error is returned as [`DispatchError::Rejected`].
    fn set_uniform_i32(&mut self, location: i32, value: i32) -> Result<(), DispatchError>;

    fn delete_program(&mut self, program: ProgramId);

    /// Allocates a buffer initialized with `bytes` and binds it at `binding`
    fn upload_buffer(&mut self, binding: u32, bytes: &[u8]) -> Result<BufferId, TransferError>;

    /// Allocates an uninitialized buffer of `byte_len` bytes and binds it at `binding`
    fn reserve_buffer(&mut self, binding: u32, byte_len: usize)
        -> Result<BufferId, TransferError>;

    /// Copies the first `out.len()` bytes of `buffer` into `out`
    fn read_buffer(&mut self, buffer: BufferId, out: &mut [u8]) -> Result<(), TransferError>;

    fn delete_buffer(&mut self, buffer: BufferId);

    fn dispatch_compute(&mut self, groups: WorkGroups) -> Result<(), DispatchError>;

    /// Makes shader storage writes visible to subsequent dispatches and reads
    fn memory_barrier(&mut self);

    /// Blocks until all submitted work has completed
    fn finish(&mut self);

    /// Per-axis dispatch limit
    fn max_work_group_count(&self) -> [u32; 3];
}

//! Host to device staging of matrices and readback of results

use super::device::ComputeDevice;
use super::types::{Binding, BufferId};
use crate::error::TransferError;
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct TrackedBuffer {
    binding: Binding,
    byte_len: usize,
}

/// Owns the device buffers of one run
///
/// Each binding slot is claimed at most once until [`BufferTransfer::release`].
#[derive(Debug, Default)]
pub struct BufferTransfer {
    buffers: HashMap<BufferId, TrackedBuffer>,
    claimed: Vec<Binding>,
}

impl BufferTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&mut self, binding: Binding) -> Result<(), TransferError> {
        if self.claimed.contains(&binding) {
            return Err(TransferError::BindingInUse {
                binding: binding.index(),
            });
        }
        self.claimed.push(binding);
        Ok(())
    }

    /// Allocates a buffer holding `host` and binds it at `binding`
    pub fn upload<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        binding: Binding,
        host: &[f32],
    ) -> Result<BufferId, TransferError> {
        self.claim(binding)?;
        let bytes: &[u8] = bytemuck::cast_slice(host);
        let id = device.upload_buffer(binding.index(), bytes)?;
        debug!("Uploaded {} bytes to {}", bytes.len(), binding);
        self.buffers.insert(
            id,
            TrackedBuffer {
                binding,
                byte_len: bytes.len(),
            },
        );
        Ok(id)
    }

    /// Allocates uninitialized storage for kernel output and binds it at `binding`
    pub fn reserve<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        binding: Binding,
        byte_len: usize,
    ) -> Result<BufferId, TransferError> {
        self.claim(binding)?;
        let id = device.reserve_buffer(binding.index(), byte_len)?;
        debug!("Reserved {} bytes at {}", byte_len, binding);
        self.buffers.insert(id, TrackedBuffer { binding, byte_len });
        Ok(id)
    }

    /// Reads `byte_len` bytes back as `f32` values
    ///
    /// The completion fence must already have been issued.
    pub fn download<D: ComputeDevice + ?Sized>(
        &self,
        device: &mut D,
        id: BufferId,
        byte_len: usize,
    ) -> Result<Vec<f32>, TransferError> {
        let tracked = self
            .buffers
            .get(&id)
            .ok_or(TransferError::UnknownBuffer { id: id.0 })?;

        if byte_len % std::mem::size_of::<f32>() != 0 || byte_len > tracked.byte_len {
            return Err(TransferError::InvalidReadback {
                requested: byte_len,
                available: tracked.byte_len,
            });
        }

        let mut out = vec![0.0f32; byte_len / std::mem::size_of::<f32>()];
        device.read_buffer(id, bytemuck::cast_slice_mut(&mut out))?;
        trace!("Read back {} bytes from {}", byte_len, tracked.binding);
        Ok(out)
    }

    /// Frees every buffer of the run; safe to call more than once
    pub fn release<D: ComputeDevice + ?Sized>(&mut self, device: &mut D) {
        for (id, tracked) in self.buffers.drain() {
            trace!("Releasing buffer {} at {}", id.0, tracked.binding);
            device.delete_buffer(id);
        }
        self.claimed.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }
}

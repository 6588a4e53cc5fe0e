//! Host-memory [`ComputeDevice`] for exercising the harness without a GPU
//!
//! `RecordingDevice` logs every call it receives and, on dispatch, computes
//! the textbook product over the rows and columns the work groups cover,
//! reading the `stride`, `baseRow`, `offsetA` and `offsetB` uniforms the same
//! way the embedded kernels do. Uniform locations exist only for names the
//! compiled source declares as `uniform int <name>;`.

use crate::compute::device::ComputeDevice;
use crate::compute::types::{Binding, BufferId, ProgramId, WorkGroups};
use crate::error::{CompileError, DispatchError, TransferError};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Compile(ProgramId),
    UseProgram(ProgramId),
    SetUniform { name: String, value: i32 },
    Upload { binding: u32, bytes: usize },
    Reserve { binding: u32, bytes: usize },
    Read { buffer: BufferId, bytes: usize },
    Dispatch(WorkGroups),
    Barrier,
    Finish,
    DeleteBuffer(BufferId),
    DeleteProgram(ProgramId),
}

#[derive(Debug)]
struct Program {
    uniforms: Vec<String>,
}

#[derive(Debug)]
struct Buffer {
    binding: u32,
    data: Vec<f32>,
}

#[derive(Debug, Default, Clone)]
struct Failures {
    compile: Option<String>,
    upload_binding: Option<u32>,
    uniform: Option<(String, u32)>,
    dispatch: Option<u32>,
}

#[derive(Debug)]
pub struct RecordingDevice {
    tile: usize,
    limits: [u32; 3],
    events: Vec<DeviceEvent>,
    programs: HashMap<u32, Program>,
    current: Option<u32>,
    /// (program, uniform index) for each handed-out location
    locations: Vec<(u32, usize)>,
    values: HashMap<String, i32>,
    buffers: HashMap<u32, Buffer>,
    next_id: u32,
    failures: Failures,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(16)
    }
}

impl RecordingDevice {
    /// A device whose emulated work groups are `tile x tile` invocations
    pub fn new(tile: usize) -> Self {
        Self {
            tile,
            limits: [65_535; 3],
            events: Vec::new(),
            programs: HashMap::new(),
            current: None,
            locations: Vec::new(),
            values: HashMap::new(),
            buffers: HashMap::new(),
            next_id: 1,
            failures: Failures::default(),
        }
    }

    pub fn with_limits(mut self, limits: [u32; 3]) -> Self {
        self.limits = limits;
        self
    }

    /// Makes the next compile fail with `log`
    pub fn fail_compile(mut self, log: &str) -> Self {
        self.failures.compile = Some(log.to_string());
        self
    }

    /// Makes uploads at `binding` fail as out of memory
    pub fn fail_upload_at(mut self, binding: Binding) -> Self {
        self.failures.upload_binding = Some(binding.index());
        self
    }

    /// Makes every update of uniform `name` fail with GL error `code`
    pub fn fail_uniform(mut self, name: &str, code: u32) -> Self {
        self.failures.uniform = Some((name.to_string(), code));
        self
    }

    /// Makes every dispatch fail with GL error `code`
    pub fn fail_dispatch(mut self, code: u32) -> Self {
        self.failures.dispatch = Some(code);
        self
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn count(&self, predicate: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    pub fn dispatches(&self) -> Vec<WorkGroups> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Dispatch(groups) => Some(*groups),
                _ => None,
            })
            .collect()
    }

    pub fn barriers(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::Barrier))
    }

    pub fn finishes(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::Finish))
    }

    /// Buffers allocated and not yet deleted
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Programs compiled and not yet deleted
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn uniform(&self, name: &str) -> i32 {
        self.values.get(name).copied().unwrap_or(0)
    }

    fn buffer_at(&self, binding: u32) -> Option<&[f32]> {
        self.buffers
            .values()
            .find(|b| b.binding == binding)
            .map(|b| b.data.as_slice())
    }

    fn emulate(&mut self, groups: WorkGroups) {
        let stride = self.uniform("stride").max(0) as usize;
        let base_row = self.uniform("baseRow").max(0) as usize;
        let offset_a = self.uniform("offsetA").max(0) as usize;
        let offset_b = self.uniform("offsetB").max(0) as usize;

        let (Some(a), Some(b)) = (
            self.buffer_at(Binding::A.index()),
            self.buffer_at(Binding::B.index()),
        ) else {
            return;
        };

        let rows = base_row..(base_row + groups.y as usize * self.tile).min(stride);
        let cols = 0..(groups.x as usize * self.tile).min(stride);
        let mut writes = Vec::new();
        for row in rows {
            for col in cols.clone() {
                let mut acc = 0.0f32;
                for k in 0..stride {
                    let lhs = a.get(offset_a + row * stride + k).copied().unwrap_or(0.0);
                    let rhs = b.get(offset_b + k * stride + col).copied().unwrap_or(0.0);
                    acc += lhs * rhs;
                }
                writes.push((row * stride + col, acc));
            }
        }

        if let Some(c) = self
            .buffers
            .values_mut()
            .find(|buf| buf.binding == Binding::C.index())
        {
            for (index, value) in writes {
                if let Some(slot) = c.data.get_mut(index) {
                    *slot = value;
                }
            }
        }
    }
}

fn declared_uniforms(source: &str) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("uniform "))
        .filter_map(|line| {
            line.trim_end_matches(';')
                .split_whitespace()
                .last()
                .map(str::to_string)
        })
        .collect()
}

impl ComputeDevice for RecordingDevice {
    fn compile_program(&mut self, source: &str) -> Result<ProgramId, CompileError> {
        if let Some(log) = self.failures.compile.take() {
            return Err(CompileError::Compile { log });
        }
        let id = self.next_id();
        self.programs.insert(
            id,
            Program {
                uniforms: declared_uniforms(source),
            },
        );
        self.events.push(DeviceEvent::Compile(ProgramId(id)));
        Ok(ProgramId(id))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current = Some(program.0);
        self.events.push(DeviceEvent::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<i32> {
        let index = self
            .programs
            .get(&program.0)?
            .uniforms
            .iter()
            .position(|u| u == name)?;
        self.locations.push((program.0, index));
        i32::try_from(self.locations.len() - 1).ok()
    }

    fn set_uniform_i32(&mut self, location: i32, value: i32) -> Result<(), DispatchError> {
        // GL_INVALID_OPERATION, as a driver reports a location without a current program.
        const INVALID_OPERATION: u32 = 0x0502;

        let Some(&(program, index)) = usize::try_from(location)
            .ok()
            .and_then(|l| self.locations.get(l))
        else {
            return Err(DispatchError::Rejected {
                code: INVALID_OPERATION,
            });
        };
        if self.current != Some(program) {
            return Err(DispatchError::Rejected {
                code: INVALID_OPERATION,
            });
        }
        let Some(name) = self
            .programs
            .get(&program)
            .and_then(|p| p.uniforms.get(index))
            .cloned()
        else {
            return Err(DispatchError::Rejected {
                code: INVALID_OPERATION,
            });
        };
        if let Some((_, code)) = self.failures.uniform.as_ref().filter(|(n, _)| *n == name) {
            return Err(DispatchError::Rejected { code: *code });
        }
        self.events.push(DeviceEvent::SetUniform {
            name: name.clone(),
            value,
        });
        self.values.insert(name, value);
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        if self.current == Some(program.0) {
            self.current = None;
        }
        self.events.push(DeviceEvent::DeleteProgram(program));
    }

    fn upload_buffer(&mut self, binding: u32, bytes: &[u8]) -> Result<BufferId, TransferError> {
        if self.failures.upload_binding == Some(binding) {
            return Err(TransferError::AllocationFailed {
                binding,
                bytes: bytes.len(),
                details: "out of device memory".to_string(),
            });
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let id = self.next_id();
        self.buffers.insert(id, Buffer { binding, data });
        self.events.push(DeviceEvent::Upload {
            binding,
            bytes: bytes.len(),
        });
        Ok(BufferId(id))
    }

    fn reserve_buffer(
        &mut self,
        binding: u32,
        byte_len: usize,
    ) -> Result<BufferId, TransferError> {
        let id = self.next_id();
        self.buffers.insert(
            id,
            Buffer {
                binding,
                data: vec![0.0; byte_len / 4],
            },
        );
        self.events.push(DeviceEvent::Reserve {
            binding,
            bytes: byte_len,
        });
        Ok(BufferId(id))
    }

    fn read_buffer(&mut self, buffer: BufferId, out: &mut [u8]) -> Result<(), TransferError> {
        let data = &self
            .buffers
            .get(&buffer.0)
            .ok_or(TransferError::UnknownBuffer { id: buffer.0 })?
            .data;
        for (chunk, value) in out.chunks_exact_mut(4).zip(data) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        self.events.push(DeviceEvent::Read {
            buffer,
            bytes: out.len(),
        });
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer.0);
        self.events.push(DeviceEvent::DeleteBuffer(buffer));
    }

    fn dispatch_compute(&mut self, groups: WorkGroups) -> Result<(), DispatchError> {
        if let Some(code) = self.failures.dispatch {
            return Err(DispatchError::Rejected { code });
        }
        self.events.push(DeviceEvent::Dispatch(groups));
        self.emulate(groups);
        Ok(())
    }

    fn memory_barrier(&mut self) {
        self.events.push(DeviceEvent::Barrier);
    }

    fn finish(&mut self) {
        self.events.push(DeviceEvent::Finish);
    }

    fn max_work_group_count(&self) -> [u32; 3] {
        self.limits
    }
}

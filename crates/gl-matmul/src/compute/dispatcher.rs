//! Kernel compilation, uniform binding and dispatch sequencing
//!
//! The dispatcher walks a fixed state machine per run:
//! `Uncompiled -> Compiled -> Bound -> Dispatching -> Finished`.
//! Each dispatch is followed by a storage barrier and the run ends with a
//! single blocking fence, which is where timing stops.

use super::device::ComputeDevice;
use super::strategy::DispatchPlan;
use super::types::{ProgramId, WorkGroups};
use crate::error::{DispatchError, MatmulError};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Uncompiled,
    Compiled,
    /// Program in use; uniforms may be set
    Bound,
    Dispatching { issued: usize },
    Finished,
}

impl DispatchState {
    pub fn name(&self) -> &'static str {
        match self {
            DispatchState::Uncompiled => "uncompiled",
            DispatchState::Compiled => "compiled",
            DispatchState::Bound => "bound",
            DispatchState::Dispatching { .. } => "dispatching",
            DispatchState::Finished => "finished",
        }
    }
}

#[derive(Debug)]
pub struct KernelDispatcher {
    state: DispatchState,
    program: Option<ProgramId>,
    locations: HashMap<String, Option<i32>>,
}

impl Default for KernelDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelDispatcher {
    pub fn new() -> Self {
        Self {
            state: DispatchState::Uncompiled,
            program: None,
            locations: HashMap::new(),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    fn transition(&self, to: DispatchState) -> DispatchError {
        DispatchError::InvalidTransition {
            from: self.state.name(),
            to: to.name(),
        }
    }

    /// Compiles and links the kernel; driver logs are surfaced unchanged
    pub fn compile<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        source: &str,
    ) -> Result<ProgramId, MatmulError> {
        if self.state != DispatchState::Uncompiled {
            return Err(self.transition(DispatchState::Compiled).into());
        }
        let program = device.compile_program(source)?;
        debug!("Compiled compute program {}", program.0);
        self.program = Some(program);
        self.state = DispatchState::Compiled;
        Ok(program)
    }

    /// Makes the compiled program current
    pub fn bind<D: ComputeDevice + ?Sized>(&mut self, device: &mut D) -> Result<(), DispatchError> {
        match (self.state, self.program) {
            (DispatchState::Compiled, Some(program)) => {
                device.use_program(program);
                self.state = DispatchState::Bound;
                Ok(())
            }
            _ => Err(self.transition(DispatchState::Bound)),
        }
    }

    /// Sets an integer uniform; names the program does not declare are skipped
    pub fn set_scalar<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        name: &str,
        value: i32,
    ) -> Result<(), DispatchError> {
        let program = match (self.state, self.program) {
            (DispatchState::Bound | DispatchState::Dispatching { .. }, Some(program)) => program,
            _ => return Err(self.transition(DispatchState::Bound)),
        };

        let location = match self.locations.get(name) {
            Some(location) => *location,
            None => {
                let location = device.uniform_location(program, name);
                self.locations.insert(name.to_string(), location);
                location
            }
        };

        match location {
            Some(location) => {
                trace!("Set uniform {} = {}", name, value);
                device
                    .set_uniform_i32(location, value)
                    .map_err(|e| match e {
                        DispatchError::Rejected { code } => DispatchError::UniformRejected {
                            name: name.to_string(),
                            code,
                        },
                        other => other,
                    })?;
            }
            None => trace!("Uniform {} not declared by kernel, skipping", name),
        }
        Ok(())
    }

    /// Submits one dispatch followed by a storage barrier
    pub fn dispatch<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        groups: WorkGroups,
    ) -> Result<(), DispatchError> {
        let issued = match self.state {
            DispatchState::Bound => 0,
            DispatchState::Dispatching { issued } => issued,
            _ => return Err(self.transition(DispatchState::Dispatching { issued: 1 })),
        };

        let limits = device.max_work_group_count();
        for ((axis, requested), limit) in ['x', 'y', 'z']
            .into_iter()
            .zip(groups.as_array())
            .zip(limits)
        {
            if requested == 0 || requested > limit {
                return Err(DispatchError::GroupLimitExceeded {
                    axis,
                    requested,
                    limit,
                });
            }
        }

        device.dispatch_compute(groups)?;
        device.memory_barrier();
        trace!("Dispatch {} issued with groups {}", issued + 1, groups);
        self.state = DispatchState::Dispatching { issued: issued + 1 };
        Ok(())
    }

    /// Blocks until every submitted dispatch has completed
    pub fn finish<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Result<(), DispatchError> {
        match self.state {
            DispatchState::Dispatching { issued } if issued > 0 => {
                device.finish();
                self.state = DispatchState::Finished;
                Ok(())
            }
            _ => Err(self.transition(DispatchState::Finished)),
        }
    }

    /// Runs every pass of `plan` and returns the wall time from the first
    /// submission to the completion fence
    ///
    /// Base uniforms are set before the clock starts.
    pub fn execute<D: ComputeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        plan: &DispatchPlan,
    ) -> Result<Duration, DispatchError> {
        if self.state != DispatchState::Bound {
            return Err(self.transition(DispatchState::Dispatching { issued: 1 }));
        }
        for (name, value) in &plan.base_uniforms {
            self.set_scalar(device, name, *value)?;
        }

        let start = Instant::now();
        for pass in &plan.passes {
            for (name, value) in &pass.uniforms {
                self.set_scalar(device, name, *value)?;
            }
            self.dispatch(device, pass.groups)?;
        }
        self.finish(device)?;
        let elapsed = start.elapsed();

        debug!(
            "Executed {} dispatches in {:.3} ms",
            plan.dispatch_count(),
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(elapsed)
    }

    /// Deletes the program; safe to call more than once
    pub fn release<D: ComputeDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(program) = self.program.take() {
            trace!("Releasing program {}", program.0);
            device.delete_program(program);
        }
        self.locations.clear();
    }
}

//! Device-independent matmul pipeline
//!
//! Everything here talks to the GPU through [`device::ComputeDevice`].

pub mod device;
pub mod dispatcher;
pub mod harness;
pub mod strategy;
pub mod transfer;
pub mod types;
pub mod verify;

pub use device::ComputeDevice;
pub use dispatcher::{DispatchState, KernelDispatcher};
pub use harness::{run, DeviceSession, RunOutcome};
pub use strategy::{Algorithm, DispatchPass, DispatchPlan, Strategy};
pub use transfer::BufferTransfer;
pub use types::{Binding, BufferId, Matrix, ProgramId, WorkGroups};
pub use verify::{FullCheck, Sample};

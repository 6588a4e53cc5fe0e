//! One end-to-end matmul run on a [`ComputeDevice`]
//!
//! Stages: compile, upload, dispatch, fence, readback, verify. Every device
//! resource belongs to a [`DeviceSession`] which frees buffers and then the
//! program when it goes out of scope, on success and on every error path.

use super::device::ComputeDevice;
use super::dispatcher::KernelDispatcher;
use super::strategy::{DispatchPlan, Strategy};
use super::transfer::BufferTransfer;
use super::types::{Binding, BufferId, Matrix};
use super::verify::{self, FullCheck, Sample};
use crate::config::RunConfig;
use crate::error::Result;
use std::time::Duration;
use tracing::{debug, info};

/// Device resources of a single run
pub struct DeviceSession<'d, D: ComputeDevice + ?Sized> {
    device: &'d mut D,
    transfer: BufferTransfer,
    dispatcher: KernelDispatcher,
}

impl<'d, D: ComputeDevice + ?Sized> DeviceSession<'d, D> {
    pub fn new(device: &'d mut D) -> Self {
        Self {
            device,
            transfer: BufferTransfer::new(),
            dispatcher: KernelDispatcher::new(),
        }
    }

    pub fn compile(&mut self, source: &str) -> Result<()> {
        self.dispatcher.compile(&mut *self.device, source)?;
        Ok(())
    }

    /// Uploads both padded inputs and reserves the padded output
    pub fn stage(&mut self, a: &Matrix, b: &Matrix, output_bytes: usize) -> Result<StagedBuffers> {
        let a = self.transfer.upload(&mut *self.device, Binding::A, a.as_slice())?;
        let b = self.transfer.upload(&mut *self.device, Binding::B, b.as_slice())?;
        let c = self
            .transfer
            .reserve(&mut *self.device, Binding::C, output_bytes)?;
        Ok(StagedBuffers { a, b, c })
    }

    /// Binds the program and runs the plan, returning the measured wall time
    pub fn execute(&mut self, plan: &DispatchPlan) -> Result<Duration> {
        self.dispatcher.bind(&mut *self.device)?;
        Ok(self.dispatcher.execute(&mut *self.device, plan)?)
    }

    pub fn download(&mut self, buffers: &StagedBuffers, byte_len: usize) -> Result<Vec<f32>> {
        Ok(self
            .transfer
            .download(&mut *self.device, buffers.c, byte_len)?)
    }

    /// Frees buffers, then the program; also runs on drop
    pub fn release(&mut self) {
        self.transfer.release(&mut *self.device);
        self.dispatcher.release(&mut *self.device);
    }
}

impl<D: ComputeDevice + ?Sized> Drop for DeviceSession<'_, D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StagedBuffers {
    pub a: BufferId,
    pub b: BufferId,
    pub c: BufferId,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub plan: DispatchPlan,
    pub gpu_time: Duration,
    /// Top-left `n x n` of the device output
    pub result: Matrix,
    pub samples: Vec<Sample>,
    pub full_check: Option<FullCheck>,
}

impl RunOutcome {
    pub fn gpu_time_ms(&self) -> f64 {
        self.gpu_time.as_secs_f64() * 1000.0
    }
}

/// Runs `source` over `a` and `b` as described by `config`
pub fn run<D: ComputeDevice + ?Sized>(
    device: &mut D,
    config: &RunConfig,
    source: &str,
    a: &Matrix,
    b: &Matrix,
) -> Result<RunOutcome> {
    let strategy = Strategy::resolve(config.algorithm, config.block_rows);
    let plan = strategy.plan(config.n, config.tile);
    info!(
        "Running {} {}x{} (padded {}) with {} dispatch(es)",
        config.algorithm,
        config.n,
        config.n,
        plan.padded_n,
        plan.dispatch_count()
    );

    let mut session = DeviceSession::new(device);
    session.compile(source)?;

    let staged = session.stage(
        &a.padded(plan.padded_n),
        &b.padded(plan.padded_n),
        plan.padded_byte_len(),
    )?;

    let gpu_time = session.execute(&plan)?;

    let raw = session.download(&staged, plan.padded_byte_len())?;
    drop(session);

    let result = Matrix::from_vec(plan.padded_n, raw)?.top_left(config.n);
    let samples = verify::sample(&result, a, b, &verify::default_points(config.n));

    let full_check = if config.full_check {
        debug!("Running full host verification");
        Some(verify::full_check(&result, a, b))
    } else {
        None
    };

    Ok(RunOutcome {
        plan,
        gpu_time,
        result,
        samples,
        full_check,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::device::MockComputeDevice;
    use crate::compute::strategy::Algorithm;
    use crate::compute::types::ProgramId;
    use crate::error::{DispatchError, MatmulError, TransferError};
    use crate::kernels::embedded_source;
    use crate::test_utils::{DeviceEvent, RecordingDevice};

    fn run_config(algorithm: Algorithm, n: usize) -> RunConfig {
        RunConfig {
            algorithm,
            n,
            tile: 16,
            block_rows: 512,
            seed: 123,
            full_check: false,
        }
    }

    #[test]
    fn test_upload_failure_releases_program_and_earlier_buffers() {
        let mut device = MockComputeDevice::new();
        device
            .expect_compile_program()
            .returning(|_| Ok(ProgramId(9)));
        device
            .expect_upload_buffer()
            .withf(|binding, _| *binding == 0)
            .returning(|_, _| Ok(BufferId(1)));
        device
            .expect_upload_buffer()
            .withf(|binding, _| *binding == 1)
            .returning(|binding, bytes| {
                Err(TransferError::AllocationFailed {
                    binding,
                    bytes: bytes.len(),
                    details: "out of device memory".to_string(),
                })
            });
        device
            .expect_delete_buffer()
            .withf(|id| *id == BufferId(1))
            .times(1)
            .return_const(());
        device
            .expect_delete_program()
            .withf(|p| *p == ProgramId(9))
            .times(1)
            .return_const(());
        device.expect_dispatch_compute().never();

        let a = Matrix::random(4, 1);
        let b = Matrix::random(4, 2);
        let err = run(&mut device, &run_config(Algorithm::Naive, 4), "src", &a, &b).unwrap_err();
        assert!(matches!(
            err,
            MatmulError::Transfer(TransferError::AllocationFailed { binding: 1, .. })
        ));
    }

    #[test]
    fn test_dispatch_failure_releases_everything_once() {
        let mut device = RecordingDevice::default().fail_dispatch(0x0502);
        let a = Matrix::random(32, 1);
        let b = Matrix::random(32, 2);
        let source = embedded_source(Algorithm::Chunked, 16);

        let err = run(&mut device, &run_config(Algorithm::Chunked, 32), &source, &a, &b)
            .unwrap_err();
        assert!(matches!(
            err,
            MatmulError::Dispatch(DispatchError::Rejected { code: 0x0502 })
        ));
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_programs(), 0);
        assert_eq!(
            device.count(|e| matches!(e, DeviceEvent::DeleteBuffer(_))),
            3
        );
        assert_eq!(
            device.count(|e| matches!(e, DeviceEvent::DeleteProgram(_))),
            1
        );
        assert_eq!(device.finishes(), 0);
    }

    #[test]
    fn test_rejected_uniform_fails_run_before_any_dispatch() {
        let mut device = RecordingDevice::default().fail_uniform("stride", 0x0502);
        let a = Matrix::random(16, 1);
        let b = Matrix::random(16, 2);
        let source = embedded_source(Algorithm::Naive, 16);

        let err = run(&mut device, &run_config(Algorithm::Naive, 16), &source, &a, &b)
            .unwrap_err();
        assert!(matches!(
            err,
            MatmulError::Dispatch(DispatchError::UniformRejected { ref name, code: 0x0502 })
                if name == "stride"
        ));
        assert!(device.dispatches().is_empty());
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_buffers_released_before_program() {
        let mut device = RecordingDevice::default();
        let a = Matrix::random(20, 1);
        let b = Matrix::random(20, 2);
        let source = embedded_source(Algorithm::Naive, 16);
        run(&mut device, &run_config(Algorithm::Naive, 20), &source, &a, &b).unwrap();

        let events = device.events();
        let last_buffer = events
            .iter()
            .rposition(|e| matches!(e, DeviceEvent::DeleteBuffer(_)))
            .unwrap();
        let program = events
            .iter()
            .position(|e| matches!(e, DeviceEvent::DeleteProgram(_)))
            .unwrap();
        assert!(last_buffer < program);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_compile_failure_allocates_nothing() {
        let mut device = RecordingDevice::default().fail_compile("0:1(1): error: bad token");
        let a = Matrix::random(8, 1);
        let b = Matrix::random(8, 2);
        let err = run(&mut device, &run_config(Algorithm::Naive, 8), "bad", &a, &b).unwrap_err();

        assert!(matches!(err, MatmulError::Compile(_)));
        assert!(device.events().is_empty());
    }

    #[test]
    fn test_result_is_n_by_n_for_padded_modes() {
        for algorithm in Algorithm::ALL {
            let mut device = RecordingDevice::default();
            let a = Matrix::random(37, 1);
            let b = Matrix::random(37, 2);
            let source = embedded_source(algorithm, 16);
            let outcome = run(&mut device, &run_config(algorithm, 37), &source, &a, &b).unwrap();

            assert_eq!(outcome.result.n(), 37);
            assert_eq!(outcome.result.as_slice().len(), 37 * 37);
            assert_eq!(outcome.samples.len(), 3);
            for sample in &outcome.samples {
                assert!(sample.abs_diff < 1e-3, "{algorithm}: {sample:?}");
            }
        }
    }
}

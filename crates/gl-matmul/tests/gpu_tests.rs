//! Runs against a real driver; needs an EGL-capable GPU
//!
//! `cargo test -- --ignored` to run.

use gl_matmul::compute::{harness, Algorithm, Matrix};
use gl_matmul::config::RunConfig;
use gl_matmul::gl::{ContextOptions, GlDevice, HeadlessContext};
use gl_matmul::kernels::embedded_source;

#[test]
#[ignore] // Requires EGL and a GL 4.3 driver
fn test_embedded_kernels_on_hardware() {
    let context = HeadlessContext::acquire_default(&ContextOptions::default()).unwrap();
    assert!(context.compute().supports_compute_dispatch());

    for algorithm in Algorithm::ALL {
        let config = RunConfig {
            algorithm,
            n: 1000,
            tile: 16,
            block_rows: 512,
            seed: 123,
            full_check: true,
        };
        let (seed_a, seed_b) = config.input_seeds();
        let a = Matrix::random(config.n, seed_a);
        let b = Matrix::random(config.n, seed_b);

        let mut device = GlDevice::new(&context).unwrap();
        let outcome = harness::run(
            &mut device,
            &config,
            &embedded_source(algorithm, config.tile),
            &a,
            &b,
        )
        .unwrap();

        assert_eq!(outcome.result.n(), 1000);
        for sample in &outcome.samples {
            assert!(sample.abs_diff < 1e-3, "{algorithm}: {sample:?}");
        }
        assert!(outcome.full_check.unwrap().passed, "{algorithm}");
    }
}

#[test]
#[ignore] // Requires EGL and a GL 4.3 driver
fn test_context_release_is_idempotent_on_hardware() {
    let mut context = HeadlessContext::acquire_default(&ContextOptions::default()).unwrap();
    assert!(context.info().gl_version.is_some());
    context.release();
    context.release();
    assert!(context.is_released());
}

use anyhow::{Context, Result};
use tracing::info;

use gl_matmul::{
    cli::{parse_args, setup_logging},
    compute::{harness, Matrix},
    config::{load_config, RunConfig},
    gl::{ContextOptions, GlDevice, HeadlessContext},
    kernels::load_source,
    report::RunReport,
};

fn main() -> Result<()> {
    let args = parse_args()?;
    let config = load_config(&args.load).context("Failed to load configuration")?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    setup_logging(&config.log_level)?;
    info!("Starting gl-matmul v{}", env!("CARGO_PKG_VERSION"));

    let run_config = RunConfig::try_from(&config).context("Invalid run configuration")?;
    let kernel = load_source(&config.kernels, run_config.algorithm, run_config.tile)
        .context("Failed to load kernel source")?;

    let (seed_a, seed_b) = run_config.input_seeds();
    info!(
        "Generating {}x{} inputs (seeds {}, {})",
        run_config.n, run_config.n, seed_a, seed_b
    );
    let a = Matrix::random(run_config.n, seed_a);
    let b = Matrix::random(run_config.n, seed_b);

    let context = HeadlessContext::acquire_default(&ContextOptions::default())
        .context("Failed to acquire headless GPU context")?;
    let device_info = context.info().clone();
    info!(
        "GL {} on {} ({})",
        device_info.gl_version.as_deref().unwrap_or("unknown"),
        device_info.gl_renderer.as_deref().unwrap_or("unknown renderer"),
        device_info.gl_vendor.as_deref().unwrap_or("unknown vendor"),
    );

    let mut device = GlDevice::new(&context).context("Failed to initialize GL compute device")?;
    let outcome = harness::run(&mut device, &run_config, &kernel.text, &a, &b)
        .with_context(|| format!("{} run failed", run_config.algorithm))?;

    let report = RunReport::new(&run_config, &outcome, kernel.origin.to_string(), device_info);
    print!("{report}");

    if let Some(path) = &config.output.report_path {
        report.write_json(path)?;
    }

    Ok(())
}

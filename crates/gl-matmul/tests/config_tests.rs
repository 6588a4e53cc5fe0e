//! Layered configuration loading

use gl_matmul::compute::Algorithm;
use gl_matmul::config::{
    load_config, CliOverrides, HarnessConfig, LoadOptions, RunConfig, SizeCategory,
};
use gl_matmul::error::ConfigurationError;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

const ENV_KEYS: &[&str] = &[
    "GL_MATMUL_LOG_LEVEL",
    "GL_MATMUL_RUN__MODE",
    "GL_MATMUL_RUN__N",
    "GL_MATMUL_RUN__TILE",
    "GL_MATMUL_KERNELS__EMBEDDED_FALLBACK",
];

fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
}

fn toml_file(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_defaults_without_file_or_env() {
    clear_env();
    let config = load_config(&LoadOptions::default()).unwrap();
    assert_eq!(config, HarnessConfig::default());
}

#[test]
#[serial]
fn test_file_layer() {
    clear_env();
    let file = toml_file(
        r#"
        log_level = "debug"

        [run]
        mode = "tiled"
        size = "small"
        block_rows = 64

        [kernels]
        dir = "/opt/kernels"
        embedded_fallback = false
        "#,
    );

    let config = load_config(&LoadOptions {
        config_path: Some(file.path().to_path_buf()),
        ..LoadOptions::default()
    })
    .unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.run.mode, Algorithm::Chunked);
    assert_eq!(config.run.size, SizeCategory::Small);
    assert_eq!(config.run.block_rows, 64);
    assert_eq!(config.run.tile, 16);
    assert_eq!(config.kernels.dir, PathBuf::from("/opt/kernels"));
    assert!(!config.kernels.embedded_fallback);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let file = toml_file("[run]\nmode = \"naive\"\nn = 256\n");
    env::set_var("GL_MATMUL_RUN__MODE", "strassen");
    env::set_var("GL_MATMUL_RUN__N", "1000");

    let config = load_config(&LoadOptions {
        config_path: Some(file.path().to_path_buf()),
        ..LoadOptions::default()
    });
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.run.mode, Algorithm::Strassen);
    assert_eq!(config.dimension(), 1000);
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var("GL_MATMUL_RUN__TILE", "8");
    env::set_var("GL_MATMUL_LOG_LEVEL", "warn");

    let config = load_config(&LoadOptions {
        overrides: CliOverrides {
            tile: Some(32),
            mode: Some(Algorithm::Chunked),
            ..Default::default()
        },
        ..LoadOptions::default()
    });
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.run.tile, 32);
    assert_eq!(config.log_level, "warn");
    let run = RunConfig::try_from(&config).unwrap();
    assert_eq!(run.algorithm, Algorithm::Chunked);
    assert_eq!(run.tile, 32);
}

#[test]
#[serial]
fn test_missing_explicit_file() {
    clear_env();
    let err = load_config(&LoadOptions {
        config_path: Some(PathBuf::from("/nonexistent/gl-matmul.toml")),
        ..LoadOptions::default()
    })
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::FileNotFound { .. }));
}

#[test]
#[serial]
fn test_invalid_value_in_file() {
    clear_env();
    let file = toml_file("[run]\nmode = \"winograd\"\n");
    let err = load_config(&LoadOptions {
        config_path: Some(file.path().to_path_buf()),
        ..LoadOptions::default()
    })
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::ParseError { .. }));
}

#[test]
#[serial]
fn test_printed_config_loads_back() {
    clear_env();
    let mut original = HarnessConfig::default();
    original.run.mode = Algorithm::Strassen;
    original.run.n = Some(1000);
    original.verification.full_check = true;

    let file = toml_file(&original.to_toml().unwrap());
    let loaded = load_config(&LoadOptions {
        config_path: Some(file.path().to_path_buf()),
        ..LoadOptions::default()
    })
    .unwrap();
    assert_eq!(loaded, original);
}

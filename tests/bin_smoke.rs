use std::{
    env, fs,
    path::Path,
    process::Command,
    sync::{Mutex, OnceLock},
};
use tempfile::TempDir;
use vmclink::{
    app::{App, AppConfig},
    cli::RunOptions,
    config::Config,
};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn with_temp_home<F: FnOnce(&Path)>(f: F) {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let original_home = env::var_os("HOME");
    let home = TempDir::new().expect("failed to create temp HOME");
    env::set_var("HOME", home.path());
    f(home.path());
    match original_home {
        Some(val) => env::set_var("HOME", val),
        None => env::remove_var("HOME"),
    }
}

fn write_config(home: &Path, contents: &str) {
    let cfg_dir = home.join(".vmclink");
    fs::create_dir_all(&cfg_dir).expect("failed to create config dir");
    fs::write(cfg_dir.join("config.toml"), contents).expect("failed to write config");
}

fn vmclink() -> Command {
    Command::new(env!("CARGO_BIN_EXE_vmclink"))
}

#[test]
fn first_run_writes_default_config() {
    with_temp_home(|home| {
        let app = App::from_options(RunOptions::default()).expect("default config");
        assert_eq!(app.config().link, Config::default());
        assert!(home.join(".vmclink").join("config.toml").exists());
    });
}

#[test]
fn cli_overrides_config_device_and_baud() {
    with_temp_home(|home| {
        write_config(
            home,
            r#"
device = "/dev/ttyAMA0"
baud = 9600
        "#,
        );
        let cfg = Config::load_or_default().expect("config load failed");
        let opts = RunOptions {
            device: Some("/dev/ttyS1".into()),
            baud: Some(19_200),
            ..RunOptions::default()
        };
        let merged = AppConfig::from_sources(cfg, opts).expect("merge failed");
        assert_eq!(merged.link.device, "/dev/ttyS1");
        assert_eq!(merged.link.baud, 19_200);
    });
}

#[test]
fn help_lists_core_flags() {
    let out = vmclink().arg("--help").output().expect("failed to run binary");
    assert!(out.status.success());
    let help = String::from_utf8_lossy(&out.stdout);
    for flag in ["--device", "--baud", "--poll-interval-ms", "--key-duration-ms", "--format"] {
        assert!(help.contains(flag), "help output missing flag {flag}: {help}");
    }
}

#[test]
fn prints_version() {
    let out = vmclink().arg("--version").output().expect("failed to run binary");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_device_is_fatal() {
    let dir = TempDir::new().unwrap();
    let cfg = dir.path().join("config.toml");
    let out = vmclink()
        .args(["--config", cfg.to_str().unwrap()])
        .args(["--device", "/dev/vmclink-does-not-exist"])
        .env("HOME", dir.path())
        .env_remove("VMCLINK_LOG_PATH")
        .output()
        .expect("failed to run binary");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(stderr.contains("failed to initialize UART"), "stderr: {stderr}");
}

#[test]
fn invalid_config_is_rejected_before_opening_the_port() {
    let dir = TempDir::new().unwrap();
    let cfg = dir.path().join("config.toml");
    fs::write(&cfg, "poll_interval_ms = 1\n").unwrap();
    let out = vmclink()
        .args(["--config", cfg.to_str().unwrap()])
        .output()
        .expect("failed to run binary");
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("poll_interval_ms"));
}

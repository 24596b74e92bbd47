//! CLI and shutdown integration tests.
//!
//! Tests:
//! - CLI help and version output
//! - Graceful shutdown on SIGTERM

use std::process::Command;
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_ritm");

/// CLI --help output should show expected options.
#[test]
fn test_cli_help_output() {
    let output = Command::new(BIN)
        .arg("--help")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);

    // Verify expected CLI options are present
    assert!(
        stdout.contains("--port"),
        "help should mention --port option"
    );
    assert!(
        stdout.contains("--metrics-port"),
        "help should mention --metrics-port option"
    );
    assert!(
        stdout.contains("--environment"),
        "help should mention --environment option"
    );
    assert!(stdout.contains("ritm"), "help should mention ritm");
}

/// CLI --version should show version.
#[test]
fn test_cli_version_output() {
    let output = Command::new(BIN)
        .arg("--version")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        stdout.contains("0.1.0"),
        "version output should contain version number: {}",
        stdout
    );
}

/// Start the server with the given environment, then stop it with SIGTERM.
#[cfg(unix)]
async fn run_until_sigterm(envs: &[(&str, &str)]) {
    use std::process::Stdio;
    use tokio::process::Command as TokioCommand;
    use tokio::time::timeout;

    let static_dir = tempfile::TempDir::new().expect("failed to create temp dir");

    let mut child = TokioCommand::new(BIN)
        .args([
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--static-dir",
            static_dir.path().to_str().unwrap(),
        ])
        .env_remove("NODE_ENV")
        .env_remove("NEXT_RUNTIME")
        .envs(envs.iter().copied())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn server");

    // Wait a bit for server to start
    tokio::time::sleep(Duration::from_secs(1)).await;

    let pid = child.id().expect("no pid");
    let _ = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status();

    let exit_result = timeout(Duration::from_secs(5), child.wait()).await;

    match exit_result {
        Ok(Ok(status)) => {
            assert!(status.success(), "server should exit cleanly: {status}");
        }
        Ok(Err(e)) => panic!("failed to wait for child: {}", e),
        Err(_) => {
            child.kill().await.expect("failed to kill");
            panic!("server did not respond to SIGTERM within timeout");
        }
    }
}

/// Server started in development mode exits cleanly on SIGTERM.
#[cfg(unix)]
#[tokio::test]
async fn test_graceful_shutdown_on_sigterm() {
    run_until_sigterm(&[("NODE_ENV", "development")]).await;
}

/// Unrecognized NODE_ENV and NEXT_RUNTIME values do not stop the server.
#[cfg(unix)]
#[tokio::test]
async fn test_unknown_environment_values_start_server() {
    run_until_sigterm(&[("NODE_ENV", "staging"), ("NEXT_RUNTIME", "browser")]).await;
}

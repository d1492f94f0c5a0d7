//! Test utilities: stub encoders and preconfigured test servers.
//!
//! Stub encoders are small `/bin/sh` scripts that accept the real encoder's argument list. Each one
//! appends its arguments to an invocation log before running its body, so tests can assert how
//! (and whether) the encoder was called. Tests that write or run stubs are marked `#[serial]`:
//! executing a script while another thread still holds it open for writing fails with ETXTBSY.

use crate::config::{Config, DEFAULT_MAX_UPLOAD_SIZE, EncoderConfig};
use crate::{AppState, build_router};
use axum_test::TestServer;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// An executable stub standing in for ffmpeg. The script lives as long as this value.
pub struct StubEncoder {
    _dir: TempDir,
    pub program: PathBuf,
    log: PathBuf,
}

impl StubEncoder {
    /// One line per invocation, holding the space-joined arguments.
    pub fn invocations(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.log) {
            Ok(contents) => contents.lines().map(str::to_owned).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => panic!("Failed to read stub invocation log: {e}"),
        }
    }
}

/// Write a stub whose behavior is `body`, run after the invocation is logged.
pub fn write_stub(body: &str) -> StubEncoder {
    let dir = tempfile::tempdir().expect("Failed to create stub directory");
    let program = dir.path().join("ffmpeg");
    let log = dir.path().join("invocations.log");

    let script = format!("#!/bin/sh\necho \"$@\" >> '{}'\n{body}", log.display());
    std::fs::write(&program, script).expect("Failed to write stub encoder");
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).expect("Failed to make stub executable");

    StubEncoder { _dir: dir, program, log }
}

// Finds the value after -i, leaves the final argument (the output path) in $1
const COPY_INPUT_TO_OUTPUT: &str = r#"
while [ $# -gt 1 ]; do
  if [ "$1" = "-i" ]; then input="$2"; fi
  shift
done
cp "$input" "$1"
"#;

/// Stub that "encodes" by copying the input to the output path.
pub fn copy_stub() -> StubEncoder {
    write_stub(COPY_INPUT_TO_OUTPUT)
}

/// Like [`copy_stub`], but takes a moment so concurrent requests overlap.
pub fn slow_copy_stub() -> StubEncoder {
    write_stub(&format!("sleep 0.2\n{COPY_INPUT_TO_OUTPUT}"))
}

/// Stub that prints `message` to stderr and exits 1.
pub fn failing_stub(message: &str) -> StubEncoder {
    write_stub(&format!("echo '{message}' >&2\nexit 1\n"))
}

/// Stub that records its pid in `pid_file` and then hangs.
pub fn sleeping_stub(pid_file: &Path) -> StubEncoder {
    write_stub(&format!("echo $$ > '{}'\nexec sleep 30\n", pid_file.display()))
}

/// Assert that the process whose pid was written to `pid_file` no longer exists.
pub fn assert_process_gone(pid_file: &Path) {
    let pid = std::fs::read_to_string(pid_file).expect("Stub never recorded its pid");
    let alive = std::process::Command::new("kill")
        .args(["-0", pid.trim()])
        .stderr(std::process::Stdio::null())
        .status()
        .expect("Failed to run kill")
        .success();
    assert!(!alive, "encoder process {} is still running", pid.trim());
}

pub fn create_test_config(temp_dir: &Path, program: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        temp_dir: temp_dir.to_path_buf(),
        enable_otel_export: false,
        encoder: EncoderConfig {
            program: program.to_path_buf(),
            timeout: Duration::from_secs(10),
            verify_on_startup: false,
        },
    }
}

/// Test server over the in-process mock transport.
pub fn create_test_server(config: Config) -> TestServer {
    TestServer::new(build_router(AppState::new(config))).expect("Failed to create test server")
}

/// Test server over a real socket, for behavior that depends on HTTP framing (Content-Length).
pub fn create_http_test_server(config: Config) -> TestServer {
    TestServer::builder()
        .http_transport()
        .build(build_router(AppState::new(config)))
        .expect("Failed to create test server")
}

/// Everything currently in `dir`.
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .map(|entry| entry.expect("Failed to read directory entry").path())
        .collect()
}

/// In-memory log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route events on the current thread here until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&bytes).lines().map(str::to_owned).collect()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Helper struct for E2E test environment
pub struct TestEnv {
    temp_dir: TempDir,
    emu_bin: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with an isolated working directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("project")).unwrap();
        Self {
            temp_dir,
            emu_bin: PathBuf::from(env!("CARGO_BIN_EXE_emu")),
        }
    }

    /// Working directory of every emu command; the PID file lives here
    pub fn project_dir(&self) -> PathBuf {
        self.temp_dir.path().join("project")
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.project_dir().join("emu.pid")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.project_dir().join("outputs")
    }

    /// Write emu.toml serving on 127.0.0.1:`port`
    pub fn create_config(&self, port: u16) -> PathBuf {
        self.create_config_with_url(&format!("http://127.0.0.1:{port}/wps"))
    }

    pub fn create_config_with_url(&self, url: &str) -> PathBuf {
        let path = self.project_dir().join("emu.toml");
        fs::write(
            &path,
            format!(
                r#"
[server]
url = "{url}"
outputpath = "{}"
"#,
                self.outputs_dir().display()
            ),
        )
        .unwrap();
        path
    }

    pub fn create_output(&self, name: &str, content: &str) {
        fs::create_dir_all(self.outputs_dir()).unwrap();
        fs::write(self.outputs_dir().join(name), content).unwrap();
    }

    /// Run an emu command and return the output
    pub fn run_command(&self, args: &[&str]) -> Output {
        self.command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .expect("Failed to execute emu command")
    }

    /// Run an emu command in the background
    pub fn run_background(&self, args: &[&str]) -> Child {
        self.command(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn emu command")
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.emu_bin);
        cmd.args(args)
            .current_dir(self.project_dir())
            .env_remove("EMU_PID_FILE")
            .env_remove("EMU_LOG_FILE")
            .env("EMU_LOG", "debug")
            .env("EMU_WATCH_DEBOUNCE_MS", "200")
            .env("NO_COLOR", "1");
        cmd
    }

    pub fn read_pid_file(&self) -> Option<String> {
        fs::read_to_string(self.pid_file_path()).ok()
    }

    pub fn read_log_file(&self) -> String {
        fs::read_to_string(self.project_dir().join("emu.log")).unwrap_or_default()
    }

    /// Poll until something accepts connections on `port`
    pub fn wait_for_port(&self, port: u16, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if TcpStream::connect(("127.0.0.1", port)).is_ok() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        false
    }

    /// Best-effort teardown of a background service
    pub fn cleanup(&self) {
        if self.pid_file_path().exists() {
            let _ = self.run_command(&["stop"]);
        }
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// A port nothing is listening on right now
pub fn free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Minimal HTTP/1.1 GET returning (status code, body)
pub fn http_get(port: u16, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw.as_str(), ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    (status, body.to_string())
}

/// Send SIGTERM and wait for the child to exit
#[cfg(unix)]
pub fn terminate(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let _ = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status();
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Ok(Some(status)) = child.try_wait() {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    let _ = child.kill();
    None
}

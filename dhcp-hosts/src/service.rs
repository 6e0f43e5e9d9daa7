//! Control of the DHCP daemon through systemd.
//!
//! Controllers never return errors: every outcome, including a missing
//! `systemctl` binary or a timeout, is reported as a value.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Active,
    Inactive,
    Failed,
    NotFound,
    Unknown,
    Error,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceState::Active => "active",
            ServiceState::Inactive => "inactive",
            ServiceState::Failed => "failed",
            ServiceState::NotFound => "not_found",
            ServiceState::Unknown => "unknown",
            ServiceState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub message: String,
    pub raw_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartOutcome {
    pub success: bool,
    pub message: String,
    pub raw_output: Option<String>,
}

pub trait ServiceController {
    fn status(&self) -> ServiceStatus;
    fn restart(&self) -> RestartOutcome;
}

/// Runs `systemctl status|restart <unit>`, optionally through `sudo`.
#[derive(Debug, Clone)]
pub struct Systemctl {
    unit: String,
    use_sudo: bool,
    timeout: Duration,
}

impl Systemctl {
    pub fn new(unit: impl Into<String>, use_sudo: bool, timeout: Duration) -> Self {
        Self {
            unit: unit.into(),
            use_sudo,
            timeout,
        }
    }

    /// The binary actually spawned.
    fn program(&self) -> &'static str {
        if self.use_sudo {
            "sudo"
        } else {
            "systemctl"
        }
    }

    fn command(&self, verb: &str) -> Command {
        let mut cmd = Command::new(self.program());
        if self.use_sudo {
            // -n: fail instead of prompting for a password.
            cmd.arg("-n").arg("systemctl");
        }
        cmd.arg(verb).arg(&self.unit);
        cmd
    }

    fn run(&self, verb: &str) -> Result<RunOutput, String> {
        debug!(unit = %self.unit, verb, sudo = self.use_sudo, "running systemctl");
        let child = self
            .command(verb)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(self.program(), verb, &err))?;
        wait_with_timeout(child, self.timeout)
            .map_err(|err| format!("systemctl {verb} {}: {err}", self.unit))
    }
}

impl ServiceController for Systemctl {
    fn status(&self) -> ServiceStatus {
        let output = match self.run("status") {
            Ok(output) => output,
            Err(message) => {
                return ServiceStatus {
                    state: ServiceState::Error,
                    message,
                    raw_output: String::new(),
                }
            }
        };
        let state = classify_status(output.code, &output.stdout);
        ServiceStatus {
            state,
            message: status_message(&self.unit, state),
            raw_output: output.combined(),
        }
    }

    fn restart(&self) -> RestartOutcome {
        match self.run("restart") {
            Ok(output) if output.code == Some(0) => RestartOutcome {
                success: true,
                message: format!("service {} restarted", self.unit),
                raw_output: None,
            },
            Ok(output) => {
                warn!(unit = %self.unit, code = ?output.code, "service restart failed");
                RestartOutcome {
                    success: false,
                    message: format!(
                        "failed to restart service {}; check sudo permissions and that the unit exists",
                        self.unit
                    ),
                    raw_output: Some(output.combined()),
                }
            }
            Err(message) => {
                warn!(unit = %self.unit, "service restart failed: {message}");
                RestartOutcome {
                    success: false,
                    message,
                    raw_output: Some(String::new()),
                }
            }
        }
    }
}

/// Always-healthy controller for development and tests.
#[derive(Debug, Clone)]
pub struct SimulatedService {
    unit: String,
}

impl SimulatedService {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

impl ServiceController for SimulatedService {
    fn status(&self) -> ServiceStatus {
        ServiceStatus {
            state: ServiceState::Active,
            message: format!("service {} is active and running (simulated)", self.unit),
            raw_output: "Active: active (running) (simulated)".to_string(),
        }
    }

    fn restart(&self) -> RestartOutcome {
        RestartOutcome {
            success: true,
            message: format!("service {} restarted (simulated)", self.unit),
            raw_output: None,
        }
    }
}

/// Map `systemctl status` results onto a [`ServiceState`].
///
/// Exit codes 0, 3 and 4 are authoritative; anything else falls back to the
/// `Active:` line of the output.
pub fn classify_status(code: Option<i32>, stdout: &str) -> ServiceState {
    match code {
        Some(0) => return ServiceState::Active,
        Some(3) => return ServiceState::Inactive,
        Some(4) => return ServiceState::NotFound,
        _ => {}
    }

    for line in stdout.lines().filter(|l| l.contains("Active:")) {
        if line.contains("active (running)") {
            return ServiceState::Active;
        }
        if line.contains("inactive") {
            return ServiceState::Inactive;
        }
        if line.contains("failed") {
            return ServiceState::Failed;
        }
    }
    ServiceState::Unknown
}

fn spawn_error(program: &str, verb: &str, err: &std::io::Error) -> String {
    match (err.kind(), program) {
        (std::io::ErrorKind::NotFound, "systemctl") => {
            "systemctl not found; this host does not appear to use systemd".to_string()
        }
        (std::io::ErrorKind::NotFound, _) => {
            format!("{program} not found; install it or set use_sudo = false")
        }
        _ => format!("failed to run {program} for systemctl {verb}: {err}"),
    }
}

fn status_message(unit: &str, state: ServiceState) -> String {
    match state {
        ServiceState::Active => format!("service {unit} is active and running"),
        ServiceState::Inactive => format!("service {unit} is inactive/stopped"),
        ServiceState::Failed => format!("service {unit} has failed"),
        ServiceState::NotFound => format!("service {unit} not found"),
        ServiceState::Unknown | ServiceState::Error => {
            format!("could not determine the status of service {unit}")
        }
    }
}

struct RunOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl RunOutput {
    fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<RunOutput, String> {
    // Both pipes are drained on reader threads while the child runs.
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("timed out after {}s", timeout.as_secs()));
            }
            Ok(None) => thread::sleep(Duration::from_millis(50)),
            Err(err) => return Err(format!("failed to wait for process: {err}")),
        }
    };

    Ok(RunOutput {
        code: status.code(),
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

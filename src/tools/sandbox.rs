//! Isolated code execution
//!
//! Each call gets a brand-new process in a brand-new temporary directory;
//! nothing is shared between calls and nothing outlives the call.
//!
//! # Isolation Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ProcessSandbox::run(code)                                      │
//! │                                                                 │
//! │  1. tempdir            cwd/HOME/TMPDIR, removed after the call  │
//! │  2. env_clear          no inherited secrets or config           │
//! │  3. setsid             own process group, killed as a unit      │
//! │  4. rlimits            address space, CPU seconds, file size,   │
//! │                        no core dumps                            │
//! │  5. timeout            wall clock; SIGKILL to the whole group   │
//! │  6. kill_on_drop       no orphan if the caller goes away        │
//! │  7. confinement        landlock writes to the workdir only;     │
//! │                        seccomp denies network and spawning      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Layers 1 to 6 hold everywhere. Layer 7 needs Linux and is narrowed by
//! `Confinement::supported` to what the running kernel offers.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use super::confinement::{self, ChildRestrictions, Confinement};

/// Marker appended when captured output is cut short
const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// PATH visible to sandboxed code
const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Resource ceilings for one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Wall-clock timeout in milliseconds
    pub timeout_ms: u64,
    /// Address-space ceiling in bytes
    pub memory_bytes: u64,
    /// Largest file the code may create, in bytes
    pub max_file_bytes: u64,
    /// Cap on captured stdout and stderr, each, in bytes
    pub max_output_bytes: usize,
}

impl SandboxLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// CPU-seconds rlimit: the wall-clock budget rounded up, plus one
    pub fn cpu_seconds(&self) -> u64 {
        self.timeout_ms.div_ceil(1000) + 1
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            memory_bytes: 256 * 1024 * 1024,
            max_file_bytes: 1024 * 1024,
            max_output_bytes: 16 * 1024,
        }
    }
}

/// One execution request
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub code: String,
    pub timeout: Duration,
    pub limits: SandboxLimits,
}

impl SandboxRequest {
    pub fn new(code: impl Into<String>, limits: &SandboxLimits) -> Self {
        Self {
            code: code.into(),
            timeout: limits.timeout(),
            limits: limits.clone(),
        }
    }
}

/// What came back from the sandboxed process
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code, -1 when killed by a signal or timed out
    pub exit_code: i32,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    pub duration_ms: f64,
    pub timed_out: bool,
}

/// Infrastructure failures (the code never got a chance to run properly)
#[derive(Debug)]
pub enum SandboxError {
    /// The interpreter could not be started
    Spawn(String),
    /// Waiting on or reading from the process failed
    Io(std::io::Error),
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::Spawn(msg) => write!(f, "Failed to start sandbox: {}", msg),
            SandboxError::Io(e) => write!(f, "Sandbox I/O error: {}", e),
        }
    }
}

impl std::error::Error for SandboxError {}

impl From<std::io::Error> for SandboxError {
    fn from(e: std::io::Error) -> Self {
        SandboxError::Io(e)
    }
}

/// An isolated execution context
///
/// Implementations must enforce `request.timeout` themselves and tear down
/// everything they started before returning.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn run(&self, request: &SandboxRequest) -> Result<SandboxOutput, SandboxError>;
}

/// Sandbox that runs an interpreter as a locked-down child process
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    program: String,
    args: Vec<String>,
    confinement: Confinement,
}

impl ProcessSandbox {
    /// Run `program args... <code>` under every boundary the kernel supports
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            confinement: Confinement::strict().supported(),
        }
    }

    /// Replace the boundaries, keeping only those the kernel supports
    pub fn with_confinement(mut self, confinement: Confinement) -> Self {
        self.confinement = confinement.supported();
        self
    }

    /// Boundaries actually applied to each run
    pub fn confinement(&self) -> Confinement {
        self.confinement
    }

    /// `python3 -I -c <code>` (isolated mode: no user site, no PYTHON* env)
    pub fn python() -> Self {
        Self::new("python3", vec!["-I".to_string(), "-c".to_string()])
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::python()
    }
}

#[async_trait]
impl CodeSandbox for ProcessSandbox {
    async fn run(&self, request: &SandboxRequest) -> Result<SandboxOutput, SandboxError> {
        let workdir = tempfile::Builder::new()
            .prefix("tutorloop-sandbox-")
            .tempdir()?;
        let restrictions = confinement::prepare(&self.confinement, workdir.path())?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&request.code)
            .current_dir(workdir.path())
            .env_clear()
            .env("PATH", SANDBOX_PATH)
            .env("HOME", workdir.path())
            .env("TMPDIR", workdir.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        apply_process_limits(&mut cmd, &request.limits, restrictions);

        let start = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| SandboxError::Spawn(format!("{}: {}", self.program, e)))?;
        let pid = child.id();
        debug!(pid, program = %self.program, code_len = request.code.len(), "Sandbox process started");

        // Dropping the wait future on timeout drops the child, which sends
        // SIGKILL to it (kill_on_drop); the group kill below takes care of
        // anything it spawned.
        let result = tokio::time::timeout(request.timeout, child.wait_with_output()).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let cap = request.limits.max_output_bytes;

        match result {
            Ok(Ok(output)) => Ok(SandboxOutput {
                stdout: truncate_output(&String::from_utf8_lossy(&output.stdout), cap),
                stderr: truncate_output(&String::from_utf8_lossy(&output.stderr), cap),
                exit_code: output.status.code().unwrap_or(-1),
                signal: exit_signal(&output.status),
                duration_ms,
                timed_out: false,
            }),
            Ok(Err(e)) => Err(SandboxError::Io(e)),
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                warn!(pid, timeout_ms = request.timeout.as_millis() as u64, "Sandbox execution timed out");
                Ok(SandboxOutput {
                    stdout: String::new(),
                    stderr: "Execution timed out".to_string(),
                    exit_code: -1,
                    signal: None,
                    duration_ms,
                    timed_out: true,
                })
            }
        }
    }
}

/// Put the child in its own session, apply rlimits, then confine it, all
/// before exec
#[cfg(target_os = "linux")]
fn apply_process_limits(
    cmd: &mut Command,
    limits: &SandboxLimits,
    mut restrictions: ChildRestrictions,
) {
    use nix::sys::resource::{setrlimit, Resource};

    let memory = limits.memory_bytes;
    let cpu = limits.cpu_seconds();
    let file = limits.max_file_bytes;

    // SAFETY: the closure runs in the forked child before exec. It calls
    // setsid and setrlimit, then installs a landlock ruleset and a seccomp
    // program that were fully built in the parent (prctl and the landlock
    // syscalls, no allocation on the success path).
    unsafe {
        cmd.pre_exec(move || {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            setrlimit(Resource::RLIMIT_AS, memory, memory).map_err(std::io::Error::from)?;
            setrlimit(Resource::RLIMIT_CPU, cpu, cpu).map_err(std::io::Error::from)?;
            setrlimit(Resource::RLIMIT_FSIZE, file, file).map_err(std::io::Error::from)?;
            setrlimit(Resource::RLIMIT_CORE, 0, 0).map_err(std::io::Error::from)?;
            // seccomp last: it may deny syscalls the steps above need
            restrictions.install()
        });
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn apply_process_limits(
    cmd: &mut Command,
    _limits: &SandboxLimits,
    _restrictions: ChildRestrictions,
) {
    // SAFETY: setsid is async-signal-safe.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_process_limits(
    _cmd: &mut Command,
    _limits: &SandboxLimits,
    _restrictions: ChildRestrictions,
) {
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // ESRCH just means the group is already gone
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        if e != nix::errno::Errno::ESRCH {
            warn!(pid, error = %e, "Failed to kill sandbox process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Cut `text` to at most `max_bytes` on a char boundary
pub fn truncate_output(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}

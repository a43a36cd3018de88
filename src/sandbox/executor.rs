//! Sandboxed executor for user submissions
//!
//! Each invocation gets a fresh working directory and its own process
//! group. Wall time is clamped by the caller-supplied limit, address space
//! by RLIMIT_AS (JVM excepted, which gets -Xmx), and captured stdout by a
//! byte cap. Peak RSS and CPU time are sampled from /proc while the child
//! runs; the figures are order-of-magnitude, not cgroup-accurate.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};

use crate::config::SandboxConfig;
use crate::error::{AppError, AppResult};
use crate::models::Language;

use super::languages::LanguageHandler;

/// Cap on captured stderr; diagnostics only, never compared
const STDERR_CAP_BYTES: u64 = 64 * 1024;

/// Headroom above the memory limit before RLIMIT_AS kicks in, so the
/// sampled peak can cross the limit and be classified as MLE instead of a
/// bare allocation failure
const RLIMIT_HEADROOM_MB: u64 = 64;

/// How one sandboxed run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTag {
    Ok,
    Tle,
    Mle,
    Rte,
    Oom,
    Killed,
    SpawnError,
}

/// Resource limits for a single run
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    /// Wall-time limit in milliseconds, already scaled by the language
    /// factor
    pub wall_limit_ms: u64,
    /// Memory limit in megabytes
    pub memory_limit_mb: u64,
    /// Cap on captured stdout in bytes
    pub stdout_cap_bytes: u64,
}

/// Structured result of one sandboxed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub wall_ms: u64,
    pub cpu_ms: u64,
    pub mem_peak_mb: u64,
    /// Spawn-to-exec setup time, excluded from wall_ms
    pub overhead_ms: u64,
    pub signal: Option<i32>,
    pub output_overflow: bool,
    pub tag: OutcomeTag,
}

impl RunOutcome {
    /// OS-level failure before or during spawn; retryable upstream
    pub fn spawn_error(message: &str) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: message.to_string(),
            wall_ms: 0,
            cpu_ms: 0,
            mem_peak_mb: 0,
            overhead_ms: 0,
            signal: None,
            output_overflow: false,
            tag: OutcomeTag::SpawnError,
        }
    }
}

/// A compiled submission: working directory plus the handler that knows
/// how to invoke it. The directory is removed when the artifact drops.
pub struct CompiledArtifact {
    workdir: tempfile::TempDir,
    handler: LanguageHandler,
}

impl CompiledArtifact {
    pub fn dir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn language(&self) -> Language {
        self.handler.language()
    }
}

/// Result of the compile step
pub enum CompileOutcome {
    Success {
        artifact: CompiledArtifact,
        compile_ms: u64,
    },
    Failed {
        compile_stderr: String,
        compile_ms: u64,
    },
}

/// Sandboxed executor, safe for concurrent use up to the configured ceiling
pub struct SandboxExecutor {
    config: SandboxConfig,
    permits: Arc<Semaphore>,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, permits }
    }

    /// Default stdout cap from configuration
    pub fn stdout_cap_bytes(&self) -> u64 {
        self.config.stdout_cap_bytes
    }

    /// Fallback wall-time limit for problems without one
    pub fn default_time_limit_ms(&self) -> u64 {
        self.config.default_time_limit_ms
    }

    /// Fallback memory limit for problems without one
    pub fn default_memory_limit_mb(&self) -> u64 {
        self.config.default_memory_limit_mb
    }

    /// Compile `source` for `language` in a fresh working directory.
    ///
    /// Compiler failures and compile timeouts are verdicts
    /// (`CompileOutcome::Failed`), not errors; only OS-level trouble
    /// surfaces as `Err`.
    pub async fn compile(&self, source: &str, language: Language) -> AppResult<CompileOutcome> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::SandboxSpawn("executor shut down".to_string()))?;

        let handler = LanguageHandler::new(language);

        let workdir = tempfile::Builder::new()
            .prefix("judge-")
            .tempdir()
            .map_err(|e| AppError::SandboxSpawn(format!("workdir: {}", e)))?;

        tokio::fs::write(workdir.path().join(handler.source_file()), source)
            .await
            .map_err(|e| AppError::SandboxSpawn(format!("write source: {}", e)))?;

        let cmd_line = handler.compile_command();
        let mut cmd = Command::new(&cmd_line[0]);
        cmd.args(&cmd_line[1..])
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| AppError::SandboxSpawn(format!("spawn compiler: {}", e)))?;

        let compile_timeout = Duration::from_secs(self.config.compile_timeout_secs);
        match timeout(compile_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let compile_ms = started.elapsed().as_millis() as u64;
                if output.status.success() {
                    Ok(CompileOutcome::Success {
                        artifact: CompiledArtifact { workdir, handler },
                        compile_ms,
                    })
                } else {
                    let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    stderr.truncate(STDERR_CAP_BYTES as usize);
                    Ok(CompileOutcome::Failed {
                        compile_stderr: stderr,
                        compile_ms,
                    })
                }
            }
            Ok(Err(e)) => Err(AppError::SandboxSpawn(format!("compiler wait: {}", e))),
            // Dropping the future kills the compiler via kill_on_drop
            Err(_) => Ok(CompileOutcome::Failed {
                compile_stderr: format!(
                    "compilation timed out after {}s",
                    self.config.compile_timeout_secs
                ),
                compile_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Run a compiled artifact against one stdin payload under `limits`.
    ///
    /// Never returns an error: OS failures come back tagged `SpawnError`
    /// so the judging layer can fold them into a system_error verdict.
    pub async fn run(
        &self,
        artifact: &CompiledArtifact,
        stdin_data: &str,
        limits: RunLimits,
    ) -> RunOutcome {
        let invoked = Instant::now();

        let _permit = match self.permits.acquire().await {
            Ok(p) => p,
            Err(_) => return RunOutcome::spawn_error("executor shut down"),
        };

        // Fresh scratch directory per run; the artifact dir is referenced
        // by absolute path and never written to.
        let scratch = match tempfile::Builder::new().prefix("run-").tempdir() {
            Ok(d) => d,
            Err(e) => return RunOutcome::spawn_error(&format!("scratch dir: {}", e)),
        };

        let handler = artifact.handler;
        let cmd_line = handler.run_command(artifact.dir(), limits.memory_limit_mb);

        let mut cmd = Command::new(&cmd_line[0]);
        cmd.args(&cmd_line[1..])
            .current_dir(scratch.path())
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .env("LANG", "C.UTF-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let address_space_bytes = handler
            .uses_address_space_limit()
            .then(|| (limits.memory_limit_mb + RLIMIT_HEADROOM_MB) * 1024 * 1024);

        // New session: the child becomes a process-group leader so the
        // whole tree can be killed at once.
        unsafe {
            cmd.pre_exec(move || {
                nix::unistd::setsid().map_err(std::io::Error::other)?;
                if let Some(bytes) = address_space_bytes {
                    nix::sys::resource::setrlimit(
                        nix::sys::resource::Resource::RLIMIT_AS,
                        bytes,
                        bytes,
                    )
                    .map_err(std::io::Error::other)?;
                }
                nix::sys::resource::setrlimit(nix::sys::resource::Resource::RLIMIT_CORE, 0, 0)
                    .map_err(std::io::Error::other)?;
                Ok(())
            });
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return RunOutcome::spawn_error(&format!("spawn: {}", e)),
        };

        let overhead_ms = invoked.elapsed().as_millis() as u64;
        let started = Instant::now();
        let pid = child.id();

        // Feed stdin from a detached task; dropping the handle closes the
        // pipe so programs reading to EOF terminate.
        if let Some(mut sink) = child.stdin.take() {
            let payload = stdin_data.as_bytes().to_vec();
            tokio::spawn(async move {
                let _ = sink.write_all(&payload).await;
            });
        }

        let overflow = Arc::new(AtomicBool::new(false));

        let stdout_task = match child.stdout.take() {
            Some(stream) => tokio::spawn(read_capped(
                stream,
                limits.stdout_cap_bytes,
                pid,
                Some(overflow.clone()),
            )),
            None => return RunOutcome::spawn_error("stdout pipe missing"),
        };
        let stderr_task = match child.stderr.take() {
            Some(stream) => tokio::spawn(read_capped(stream, STDERR_CAP_BYTES, pid, None)),
            None => return RunOutcome::spawn_error("stderr pipe missing"),
        };

        // Wait for exit while sampling /proc and enforcing the wall limit.
        let wall_limit = Duration::from_millis(limits.wall_limit_ms);
        let mut sample = tokio::time::interval(Duration::from_millis(
            crate::constants::PROC_SAMPLE_INTERVAL_MS,
        ));
        sample.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut peak_kb: u64 = 0;
        let mut cpu_ms: u64 = 0;
        let mut timed_out = false;

        let status = loop {
            tokio::select! {
                res = child.wait() => break res,
                _ = sample.tick() => {
                    if let Some(pid) = pid {
                        if let Some(kb) = read_vm_hwm_kb(pid) {
                            peak_kb = peak_kb.max(kb);
                        }
                        if let Some(ms) = read_cpu_ms(pid) {
                            cpu_ms = ms;
                        }
                    }
                    if !timed_out && started.elapsed() > wall_limit {
                        timed_out = true;
                        kill_group(pid);
                    }
                }
            }
        };

        let wall_ms = started.elapsed().as_millis() as u64;

        let (stdout, _) = stdout_task.await.unwrap_or_else(|_| (String::new(), false));
        let (stderr, _) = stderr_task.await.unwrap_or_else(|_| (String::new(), false));
        let output_overflow = overflow.load(Ordering::SeqCst);

        // Leftover children in the group die with the scratch dir.
        kill_group(pid);

        let status = match status {
            Ok(s) => s,
            Err(e) => return RunOutcome::spawn_error(&format!("wait: {}", e)),
        };

        let exit_code = status.code();
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        let mem_peak_mb = peak_kb / 1024;

        let tag = if timed_out {
            OutcomeTag::Tle
        } else if output_overflow {
            OutcomeTag::Rte
        } else if mem_peak_mb >= limits.memory_limit_mb {
            if signal == Some(9) {
                OutcomeTag::Oom
            } else {
                OutcomeTag::Mle
            }
        } else if let Some(sig) = signal {
            if sig == 9 {
                OutcomeTag::Killed
            } else {
                OutcomeTag::Rte
            }
        } else if exit_code != Some(0) {
            OutcomeTag::Rte
        } else {
            OutcomeTag::Ok
        };

        RunOutcome {
            exit_code,
            stdout,
            stderr,
            wall_ms,
            cpu_ms,
            mem_peak_mb,
            overhead_ms,
            signal,
            output_overflow,
            tag,
        }
    }
}

/// Read a stream up to `cap` bytes. On overflow the process group is
/// killed, the flag (when present) is raised, and the captured prefix is
/// returned.
async fn read_capped(
    mut stream: impl tokio::io::AsyncRead + Unpin,
    cap: u64,
    pid: Option<u32>,
    overflow: Option<Arc<AtomicBool>>,
) -> (String, bool) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut overflowed = false;

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() as u64 + n as u64 > cap {
                    let keep = (cap as usize).saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..keep]);
                    overflowed = true;
                    if let Some(flag) = &overflow {
                        flag.store(true, Ordering::SeqCst);
                    }
                    kill_group(pid);
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(_) => break,
        }
    }

    (String::from_utf8_lossy(&buf).to_string(), overflowed)
}

/// SIGKILL the child's whole process group; best-effort
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

/// Peak resident set in KB from /proc/<pid>/status
fn read_vm_hwm_kb(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmHWM:") {
            return rest
                .trim()
                .trim_end_matches(" kB")
                .trim()
                .parse()
                .ok();
        }
    }
    None
}

/// utime + stime in milliseconds from /proc/<pid>/stat. USER_HZ is 100 on
/// every platform we deploy to.
fn read_cpu_ms(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // comm may contain spaces; fields are counted after the closing paren
    let after = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = after.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some((utime + stime) * 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_outcome() {
        let outcome = RunOutcome::spawn_error("fork failed");
        assert_eq!(outcome.tag, OutcomeTag::SpawnError);
        assert!(outcome.exit_code.is_none());
        assert!(!outcome.output_overflow);
    }

    #[test]
    fn test_outcome_tag_wire_names() {
        let json = serde_json::to_string(&OutcomeTag::SpawnError).unwrap();
        assert_eq!(json, "\"spawn_error\"");
        let json = serde_json::to_string(&OutcomeTag::Tle).unwrap();
        assert_eq!(json, "\"tle\"");
    }

    #[test]
    fn test_read_capped_truncates_at_cap() {
        let data = vec![b'x'; 100];
        let (out, overflowed) =
            tokio_test::block_on(read_capped(&data[..], 10, None, None));
        assert_eq!(out.len(), 10);
        assert!(overflowed);
    }

    #[test]
    fn test_read_capped_under_cap() {
        let data = b"hello".to_vec();
        let (out, overflowed) =
            tokio_test::block_on(read_capped(&data[..], 1024, None, None));
        assert_eq!(out, "hello");
        assert!(!overflowed);
    }
}

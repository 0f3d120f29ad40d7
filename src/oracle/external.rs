//! External executables as implementations, exchanging audio as WAV files.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::types::SampleBuffer;
use crate::error::{OracleError, Result};
use crate::io::wav::{read_wav, write_wav};
use crate::oracle::implementation::{Implementation, ProcessParams};

/// Default wall-clock limit for one invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long to wait for pipe output once the process has exited or been
/// killed. Descendants that escaped the kill may hold the pipes open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs `program <input.wav> <output.wav> [args...] [params.args...]`.
///
/// The input is written as 32-bit float WAV into a fresh temporary
/// directory; the program must write the output WAV and exit with status 0.
/// On unix the program runs in its own process group, and the whole group is
/// killed when it exceeds the timeout. Every failure carries
/// the captured stdout/stderr as diagnostics.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalCommand {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Fixed arguments placed after the input and output paths.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn failure(&self, reason: impl Into<String>, diagnostics: String) -> OracleError {
        OracleError::ExternalProcessFailure {
            implementation: self.name.clone(),
            reason: reason.into(),
            diagnostics,
        }
    }

    /// Waits for `child` up to the timeout, killing it on expiry.
    /// Returns `None` on timeout.
    fn wait_with_timeout(&self, child: &mut Child) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                kill_process_tree(child);
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Implementation for ExternalCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, input: &SampleBuffer, params: &ProcessParams) -> Result<SampleBuffer> {
        let dir = tempfile::Builder::new().prefix("pvoc-oracle-").tempdir()?;
        let input_path = dir.path().join("input.wav");
        let output_path = dir.path().join("output.wav");
        write_wav(&input_path, input)?;

        let mut command = Command::new(&self.program);
        command
            .arg(&input_path)
            .arg(&output_path)
            .args(&self.args)
            .args(&params.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|e| {
            self.failure(
                format!("failed to spawn {}: {}", self.program.display(), e),
                String::new(),
            )
        })?;

        let (tx, rx) = mpsc::channel();
        let pipes = drain(child.stdout.take(), Pipe::Stdout, &tx)
            + drain(child.stderr.take(), Pipe::Stderr, &tx);
        drop(tx);
        let status = self.wait_with_timeout(&mut child);
        let (stdout, stderr) = collect_drained(&rx, pipes);
        let diagnostics = format_diagnostics(stdout, stderr);

        match status? {
            None => {
                log::warn!(
                    "{} timed out after {:?}, process killed",
                    self.name,
                    self.timeout
                );
                Err(self.failure(format!("timed out after {:?}", self.timeout), diagnostics))
            }
            Some(status) if !status.success() => {
                Err(self.failure(format!("exited with {}", status), diagnostics))
            }
            Some(_) => read_wav(&output_path).map_err(|e| {
                self.failure(format!("could not decode output: {}", e), diagnostics)
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    Stdout,
    Stderr,
}

/// Reads a child pipe to completion on a helper thread so a chatty process
/// cannot block on a full pipe. Returns the number of pipes being drained.
fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    which: Pipe,
    tx: &Sender<(Pipe, String)>,
) -> usize {
    let Some(mut pipe) = pipe else {
        return 0;
    };
    let tx = tx.clone();
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        let _ = tx.send((which, String::from_utf8_lossy(&bytes).into_owned()));
    });
    1
}

/// Collects drained output, giving up after [`DRAIN_GRACE`]. A drain thread
/// still blocked on a pipe is left detached and exits once the pipe closes.
fn collect_drained(rx: &Receiver<(Pipe, String)>, pipes: usize) -> (String, String) {
    let deadline = Instant::now() + DRAIN_GRACE;
    let (mut stdout, mut stderr) = (String::new(), String::new());
    for _ in 0..pipes {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Pipe::Stdout, text)) => stdout = text,
            Ok((Pipe::Stderr, text)) => stderr = text,
            Err(_) => {
                log::warn!("output pipes still open after exit, diagnostics may be partial");
                break;
            }
        }
    }
    (stdout, stderr)
}

/// Kills the child's process group so descendants holding its pipes die too.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    // A negative pid addresses the process group the child leads
    let group = format!("-{}", child.id());
    let _ = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    // The process may exit between try_wait and kill
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

fn format_diagnostics(stdout: String, stderr: String) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str("stdout:\n");
        out.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("stderr:\n");
        out.push_str(stderr.trim_end());
    }
    out
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn input() -> SampleBuffer {
        SampleBuffer::mono((0..512).map(|i| (i as f32 * 0.05).sin()).collect(), 8000).unwrap()
    }

    #[test]
    fn test_copy_script_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let prog = script(dir.path(), "copy.sh", "cp \"$1\" \"$2\"");
        let cmd = ExternalCommand::new("copy", prog);
        let out = cmd.process(&input(), &ProcessParams::new()).unwrap();
        assert_eq!(out, input());
    }

    #[test]
    fn test_nonzero_exit_keeps_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let prog = script(dir.path(), "fail.sh", "echo progress; echo boom >&2; exit 3");
        let err = ExternalCommand::new("fail", prog)
            .process(&input(), &ProcessParams::new())
            .unwrap_err();
        let diag = err.diagnostics().unwrap();
        assert!(diag.contains("progress"));
        assert!(diag.contains("boom"));
        assert!(err.to_string().contains("fail"));
    }

    #[test]
    fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let prog = script(dir.path(), "hang.sh", "exec sleep 30");
        let started = Instant::now();
        let err = ExternalCommand::new("hang", prog)
            .with_timeout(Duration::from_millis(200))
            .process(&input(), &ProcessParams::new())
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            OracleError::ExternalProcessFailure { reason, .. } => {
                assert!(reason.contains("timed out"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_timeout_kills_wrapped_descendants() {
        // No exec: the shell forks sleep, which inherits the output pipes
        let dir = tempfile::tempdir().unwrap();
        let prog = script(dir.path(), "wrap.sh", "sleep 8\necho done");
        let started = Instant::now();
        let err = ExternalCommand::new("wrap", prog)
            .with_timeout(Duration::from_millis(200))
            .process(&input(), &ProcessParams::new())
            .unwrap_err();
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
        match err {
            OracleError::ExternalProcessFailure { reason, .. } => {
                assert!(reason.contains("timed out"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_background_descendant_does_not_block_success() {
        let dir = tempfile::tempdir().unwrap();
        let prog = script(dir.path(), "daemon.sh", "sleep 8 &\ncp \"$1\" \"$2\"");
        let started = Instant::now();
        let out = ExternalCommand::new("daemon", prog)
            .process(&input(), &ProcessParams::new())
            .unwrap();
        assert_eq!(out, input());
        assert!(started.elapsed() < DRAIN_GRACE + Duration::from_secs(2));
    }

    #[test]
    fn test_missing_output_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let prog = script(dir.path(), "noop.sh", "exit 0");
        let err = ExternalCommand::new("noop", prog)
            .process(&input(), &ProcessParams::new())
            .unwrap_err();
        match err {
            OracleError::ExternalProcessFailure { reason, .. } => {
                assert!(reason.contains("decode"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_spawn_failure() {
        let err = ExternalCommand::new("ghost", "/nonexistent/pvoc-oracle-binary")
            .process(&input(), &ProcessParams::new())
            .unwrap_err();
        assert!(matches!(err, OracleError::ExternalProcessFailure { .. }));
    }

    #[test]
    fn test_args_are_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let prog = script(
            dir.path(),
            "args.sh",
            "[ \"$3\" = fixed ] && [ \"$4\" = extra ] && cp \"$1\" \"$2\"",
        );
        let cmd = ExternalCommand::new("args", prog).with_args(["fixed"]);
        let params = ProcessParams::new().with_arg("extra");
        assert!(cmd.process(&input(), &params).is_ok());
        assert!(cmd.process(&input(), &ProcessParams::new()).is_err());
    }
}

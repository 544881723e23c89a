//! Helpers for running external collaborator commands with timeouts.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Build a `Command` from an argv-style spec plus extra trailing args.
pub fn build_command(spec: &[String], extra_args: &[String]) -> Result<Command> {
    if spec.is_empty() || spec[0].trim().is_empty() {
        bail!("command must be a non-empty array");
    }
    let mut cmd = Command::new(&spec[0]);
    cmd.args(&spec[1..]).args(extra_args);
    Ok(cmd)
}

/// Run a command with a timeout, capturing stdout/stderr.
///
/// Output is drained concurrently while the child runs so a chatty child
/// cannot deadlock against a full pipe. On timeout the child is killed and
/// reaped, and `timed_out` is set.
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    let stdin_handle = if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        Some(thread::spawn(move || {
            // Ignore a broken pipe from a child that exits without reading.
            let _ = child_stdin.write_all(&input);
        }))
    } else {
        None
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle {
        let _ = handle.join();
    }
    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let spec = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        build_command(&spec, &[]).expect("command")
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let output = run_with_timeout(sh("printf hello; exit 0"), None, Duration::from_secs(5))
            .expect("run");
        assert!(output.status.success());
        assert!(!output.timed_out);
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn feeds_stdin_to_the_child() {
        let output = run_with_timeout(sh("cat"), Some(b"ping"), Duration::from_secs(5))
            .expect("run");
        assert_eq!(output.stdout, b"ping");
    }

    #[test]
    fn kills_on_timeout() {
        let output = run_with_timeout(sh("sleep 10"), None, Duration::from_millis(100))
            .expect("run");
        assert!(output.timed_out);
    }

    #[test]
    fn rejects_empty_command_spec() {
        let err = build_command(&[], &[]).expect_err("empty");
        assert!(err.to_string().contains("non-empty"));
    }
}

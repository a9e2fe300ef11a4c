// SPDX-License-Identifier: GPL-2.0-only

//! Traits to extend [`std::process::Command`] for running `quilt`.

use std::{
    io::Read,
    process::{Command, ExitStatus, Output, Stdio},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use bstr::ByteSlice;

const QUILT_EXEC_FAIL: &str = "could not execute `quilt`";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(super) trait QuiltCommand {
    /// Run quilt command, wait for completion, and collect output streams.
    ///
    /// Stdout and stderr are piped and stdin is null. The streams are drained
    /// from separate threads so a chatty child cannot block on a full pipe
    /// while being waited on.
    ///
    /// If `timeout` elapses first, the child is killed and an error is returned.
    fn output_quilt(&mut self, timeout: Option<Duration>) -> Result<Output>;
}

impl QuiltCommand for Command {
    fn output_quilt(&mut self, timeout: Option<Duration>) -> Result<Output> {
        let mut child = self
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context(QUILT_EXEC_FAIL)?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = if let Some(timeout) = timeout {
            let deadline = Instant::now() + timeout;
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    // Reader threads are left to finish on their own; a
                    // grandchild may still hold the pipes open.
                    child.kill().ok();
                    child.wait().ok();
                    return Err(anyhow!(
                        "timed out after {} seconds",
                        timeout.as_secs_f64()
                    ));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        } else {
            child.wait()?
        };

        Ok(Output {
            status,
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    let buf = handle
        .join()
        .map_err(|_| anyhow!("quilt output reader panicked"))??;
    Ok(buf)
}

pub(super) trait QuiltOutput {
    /// Ensure that Output is successful, returning Output.
    fn require_success(self, command: &str) -> Result<Output>;

    /// Everything the command wrote, stdout first, decoded lossily.
    fn combined_text(&self) -> String;
}

impl QuiltOutput for Output {
    fn require_success(self, command: &str) -> Result<Output> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(quilt_command_error(command, &self))
        }
    }

    fn combined_text(&self) -> String {
        let mut text = self.stdout.to_str_lossy().into_owned();
        let stderr = self.stderr.to_str_lossy();
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text
    }
}

/// Error for a failed quilt command.
///
/// Quilt reports many problems on stdout, so stdout is used when stderr is
/// empty.
pub(super) fn quilt_command_error(command: &str, output: &Output) -> anyhow::Error {
    let stream = if output.stderr.trim().is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };
    let err_str = stream.to_str_lossy();
    let err_str = err_str.trim_end();
    let err = match output.status.code() {
        Some(code) if err_str.is_empty() => anyhow!("exited with status {code}"),
        None if err_str.is_empty() => anyhow!("terminated by signal"),
        _ => anyhow!(err_str.to_string()),
    };
    err.context(format!("`quilt {command}`"))
}

pub(super) trait QuiltExitStatus {
    /// Test whether command exit was due to a signal.
    fn is_signal(&self) -> bool;
}

impl QuiltExitStatus for ExitStatus {
    #[cfg(unix)]
    fn is_signal(&self) -> bool {
        use std::os::unix::process::ExitStatusExt;
        self.signal().is_some()
    }

    #[cfg(not(unix))]
    fn is_signal(&self) -> bool {
        false
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn collects_both_streams() {
        let output = Command::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .output_quilt(None)
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.combined_text(), "out\nerr\n");
        let err = output.require_success("push x.patch").unwrap_err();
        assert_eq!(format!("{err:#}"), "`quilt push x.patch`: err");
    }

    #[test]
    fn error_falls_back_to_stdout() {
        let output = Command::new("sh")
            .args(["-c", "echo 'Hunk #1 FAILED at 3.'; exit 1"])
            .output_quilt(Some(Duration::from_secs(30)))
            .unwrap();
        let err = quilt_command_error("push", &output);
        assert_eq!(format!("{err:#}"), "`quilt push`: Hunk #1 FAILED at 3.");
    }

    #[test]
    fn times_out() {
        let start = Instant::now();
        let err = Command::new("sh")
            .args(["-c", "sleep 5"])
            .output_quilt(Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(err.to_string().starts_with("timed out"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_program() {
        let err = Command::new("/nonexistent/quilt")
            .output_quilt(None)
            .unwrap_err();
        assert_eq!(err.to_string(), QUILT_EXEC_FAIL);
    }
}

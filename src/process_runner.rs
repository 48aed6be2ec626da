//! Subprocess runner that streams child output into the harness log.
//!
//! stdout and stderr are drained by two scoped reader threads so neither pipe
//! can fill up and stall the child. Each stream is forwarded line by line in
//! the order it was produced; the relative order between the two streams is
//! whatever the OS and scheduler make of it.

use crate::log_broadcaster::LogBroadcaster;
use log::{debug, warn};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Which child stream a reader was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Failures that prevent a trustworthy exit code.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch `{command}`")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {stream} of `{command}`")]
    Stream {
        command: String,
        stream: StreamKind,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for `{command}`")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{stream} reader of `{command}` panicked")]
    ReaderPanicked { command: String, stream: StreamKind },
}

/// Splits an argument string into argv entries.
///
/// The argument is a plain whitespace separated command tail; there is no
/// quoting.
pub fn split_arguments(argument: &str) -> Vec<&str> {
    argument.split_ascii_whitespace().collect()
}

/// Runs one test executable to completion and reports its exit code.
#[cfg_attr(test, mockall::automock)]
pub trait CaseRunner: Send + Sync {
    fn run(&self, executable: &Path, argument: &str, working_dir: &Path) -> Result<i32, RunError>;
}

/// Launches test executables and forwards their output to a [`LogBroadcaster`].
#[derive(Clone)]
pub struct ProcessRunner {
    log: Arc<LogBroadcaster>,
}

impl ProcessRunner {
    pub fn new(log: Arc<LogBroadcaster>) -> Self {
        Self { log }
    }

    /// Runs `executable` with `argument` inside `working_dir` and returns its exit code.
    ///
    /// Blocks until the child has exited and both output streams are fully
    /// drained. A child killed by a signal reports `-1`.
    ///
    /// # Errors
    ///
    /// * the executable cannot be spawned
    /// * reading either output stream fails
    /// * waiting for the child fails
    pub fn run(
        &self,
        executable: &Path,
        argument: &str,
        working_dir: &Path,
    ) -> Result<i32, RunError> {
        let command = display_command(executable, argument);
        debug!("Launching `{}` in {}", command, working_dir.display());

        let mut child = spawn(executable, argument, working_dir).map_err(|source| {
            RunError::Launch {
                command: command.clone(),
                source,
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, stdout_result, stderr_result) = thread::scope(|scope| {
            let stdout_reader = stdout.map(|pipe| scope.spawn(move || self.forward_lines(pipe)));
            let stderr_reader = stderr.map(|pipe| scope.spawn(move || self.forward_lines(pipe)));

            let status = child.wait();
            if status.is_err() {
                // readers only see EOF once the child is gone
                reap(&mut child);
            }

            (
                status,
                join_reader(stdout_reader),
                join_reader(stderr_reader),
            )
        });

        let status = status.map_err(|source| RunError::Wait {
            command: command.clone(),
            source,
        })?;

        for (stream, result) in [
            (StreamKind::Stdout, stdout_result),
            (StreamKind::Stderr, stderr_result),
        ] {
            match result {
                Some(Ok(())) => {}
                Some(Err(source)) => {
                    return Err(RunError::Stream {
                        command,
                        stream,
                        source,
                    });
                }
                None => return Err(RunError::ReaderPanicked { command, stream }),
            }
        }

        let code = status.code().unwrap_or_else(|| {
            warn!("`{}` was terminated by a signal: {}", command, status);
            -1
        });
        debug!("`{}` exited with {}", command, code);
        Ok(code)
    }

    /// Appends every line of `pipe` to the log, including a final unterminated line.
    fn forward_lines(&self, pipe: impl Read) -> io::Result<()> {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            self.log.append(String::from_utf8_lossy(&buf));
        }
    }
}

impl CaseRunner for ProcessRunner {
    fn run(
        &self,
        executable: &Path,
        argument: &str,
        working_dir: &Path,
    ) -> Result<i32, RunError> {
        ProcessRunner::run(self, executable, argument, working_dir)
    }
}

/// `Some(result)` if the reader ran to completion, `None` if it panicked.
/// A missing pipe counts as an empty stream.
fn join_reader(
    reader: Option<thread::ScopedJoinHandle<'_, io::Result<()>>>,
) -> Option<io::Result<()>> {
    match reader {
        Some(handle) => handle.join().ok(),
        None => Some(Ok(())),
    }
}

const SPAWN_ATTEMPTS: u32 = 3;

fn spawn(executable: &Path, argument: &str, working_dir: &Path) -> io::Result<Child> {
    let mut attempt = 1;
    loop {
        let result = Command::new(executable)
            .args(split_arguments(argument))
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match result {
            // a freshly written executable may still be open for writing elsewhere
            Err(e) if e.kind() == io::ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                debug!("{} is busy, retrying: {e}", executable.display());
                attempt += 1;
                thread::sleep(Duration::from_millis(50));
            }
            other => return other,
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("kill after failed wait: {e}");
    }
    let _ = child.wait();
}

fn display_command(executable: &Path, argument: &str) -> String {
    if argument.is_empty() {
        executable.display().to_string()
    } else {
        format!("{} {}", executable.display(), argument)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test_log::test]
    fn test_returns_exit_code_and_captures_both_streams() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "child", "echo out\necho err >&2\nexit 7");
        let log = Arc::new(LogBroadcaster::new());
        let runner = ProcessRunner::new(log.clone());

        let code = runner.run(&script, "", dir.path()).unwrap();

        assert_eq!(code, 7);
        let history = log.history();
        assert_eq!(history.iter().filter(|l| *l == "out").count(), 1);
        assert_eq!(history.iter().filter(|l| *l == "err").count(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_per_stream_order_and_partial_final_line() {
        let dir = tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "child",
            "for i in 1 2 3 4 5; do echo \"o$i\"; echo \"e$i\" >&2; done\nprintf 'tail'",
        );
        let log = Arc::new(LogBroadcaster::new());
        let code = ProcessRunner::new(log.clone())
            .run(&script, "", dir.path())
            .unwrap();
        assert_eq!(code, 0);

        let history = log.history();
        let stdout: Vec<_> = history.iter().filter(|l| l.starts_with('o')).collect();
        let stderr: Vec<_> = history.iter().filter(|l| l.starts_with('e')).collect();
        assert_eq!(stdout, vec!["o1", "o2", "o3", "o4", "o5"]);
        assert_eq!(stderr, vec!["e1", "e2", "e3", "e4", "e5"]);
        assert!(history.contains(&"tail".to_string()));
    }

    #[test]
    fn test_arguments_and_working_directory() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("work");
        fs::create_dir(&work).unwrap();
        fs::write(work.join("fixture.txt"), "fixture").unwrap();
        let script = write_script(dir.path(), "child", "echo \"$#:$1:$2\"\ncat fixture.txt");
        let log = Arc::new(LogBroadcaster::new());

        ProcessRunner::new(log.clone())
            .run(&script, "-m  tests/test_std.js", &work)
            .unwrap();

        assert_eq!(log.history(), vec!["2:-m:tests/test_std.js", "fixture"]);
    }

    #[test]
    fn test_crlf_and_invalid_utf8_are_decoded() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "child", "printf 'a\\r\\n\\377b\\n'");
        let log = Arc::new(LogBroadcaster::new());
        ProcessRunner::new(log.clone())
            .run(&script, "", dir.path())
            .unwrap();
        assert_eq!(log.history(), vec!["a".to_string(), "\u{FFFD}b".to_string()]);
    }

    #[test]
    fn test_large_output_on_both_streams_does_not_deadlock() {
        let dir = tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "child",
            "i=0; while [ $i -lt 5000 ]; do echo \"stdout line $i\"; echo \"stderr line $i\" >&2; i=$((i+1)); done",
        );
        let log = Arc::new(LogBroadcaster::new());
        let code = ProcessRunner::new(log.clone())
            .run(&script, "", dir.path())
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(log.len(), 10_000);
    }

    #[test]
    fn test_missing_executable_is_launch_error() {
        let dir = tempdir().unwrap();
        let log = Arc::new(LogBroadcaster::new());
        let err = ProcessRunner::new(log.clone())
            .run(&dir.path().join("missing"), "", dir.path())
            .unwrap_err();
        assert!(matches!(err, RunError::Launch { .. }));
        assert!(log.is_empty());
    }

    #[test]
    fn test_non_executable_file_is_launch_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain");
        fs::write(&path, "not a program").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let err = ProcessRunner::new(Arc::new(LogBroadcaster::new()))
            .run(&path, "", dir.path())
            .unwrap_err();
        assert!(matches!(err, RunError::Launch { .. }));
    }

    #[test]
    fn test_signal_termination_reports_minus_one() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "child", "kill -9 $$");
        let code = ProcessRunner::new(Arc::new(LogBroadcaster::new()))
            .run(&script, "", dir.path())
            .unwrap();
        assert_eq!(code, -1);
    }

    /// Yields `first_line` once, then fails like a broken pipe.
    struct FailingReader {
        first_line: Option<&'static [u8]>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.first_line.take() {
                Some(line) => {
                    buf[..line.len()].copy_from_slice(line);
                    Ok(line.len())
                }
                None => Err(io::Error::other("device went away")),
            }
        }
    }

    #[test]
    fn test_read_error_keeps_earlier_lines_and_surfaces() {
        let log = Arc::new(LogBroadcaster::new());
        let runner = ProcessRunner::new(log.clone());

        let err = runner
            .forward_lines(FailingReader {
                first_line: Some(b"first\n"),
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "device went away");
        assert_eq!(log.history(), vec!["first"]);
    }

    #[test]
    fn test_stream_error_message_names_stream_and_command() {
        let err = RunError::Stream {
            command: "libqjs.so -qd".to_string(),
            stream: StreamKind::Stderr,
            source: io::Error::other("device went away"),
        };
        assert_eq!(err.to_string(), "failed to read stderr of `libqjs.so -qd`");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "device went away");
    }

    #[test]
    fn test_split_arguments() {
        assert!(split_arguments("").is_empty());
        assert_eq!(
            split_arguments("-m -c test262.conf -E -a"),
            vec!["-m", "-c", "test262.conf", "-E", "-a"]
        );
    }
}

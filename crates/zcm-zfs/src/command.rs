//! Spawns the real `zfs` binary and hands its output back either fully
//! buffered, as a lazy line stream, or copied straight into a writer.
//!
//! Every invocation is logged with its full argument vector before it runs.

use log::{debug, error, info, warn};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use zcm_core::error::{ZcmError, ZcmResult};

#[derive(Debug, Clone)]
/// Wraps a concrete binary path and an optional timeout for buffered calls.
pub struct CommandRunner {
    path: PathBuf,
    timeout: Option<Duration>,
}

#[derive(Debug)]
/// Collects stdout, stderr, and exit status from a finished command.
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandRunner {
    /// Create a runner for `path`. `None` waits for every buffered call to exit.
    pub fn new(path: PathBuf, timeout: Option<Duration>) -> Self {
        Self { path, timeout }
    }

    /// Return the binary path this runner will execute.
    pub fn binary(&self) -> &Path {
        &self.path
    }

    /// `<verb> [-o opt]... [args]...`
    fn argv(verb: &str, args: &[&str], options: &[&str]) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + options.len() * 2 + args.len());
        argv.push(verb.to_string());
        for option in options {
            argv.push("-o".to_string());
            argv.push(option.to_string());
        }
        argv.extend(args.iter().map(|arg| arg.to_string()));
        argv
    }

    fn spawn(&self, argv: &[String]) -> ZcmResult<Child> {
        info!("exec: {} {}", self.path.display(), argv.join(" "));
        let child = Command::new(&self.path)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(child)
    }

    /// Run to completion and capture both streams without judging the exit code.
    pub fn run(&self, verb: &str, args: &[&str], options: &[&str]) -> ZcmResult<Output> {
        let argv = Self::argv(verb, args, options);
        let mut child = self.spawn(&argv)?;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        self.wait_for_exit(verb, child, stdout_pipe, stderr_pipe)
    }

    /// Run to completion and return stdout, or `CommandFailed` on a non-zero exit.
    pub fn run_checked(&self, verb: &str, args: &[&str], options: &[&str]) -> ZcmResult<String> {
        let out = self.run(verb, args, options)?;
        if out.status != 0 {
            log_lines(verb, &out.stderr, log::Level::Error);
            return Err(ZcmError::command_failed(verb, out.stderr));
        }
        log_lines(verb, &out.stdout, log::Level::Info);
        log_lines(verb, &out.stderr, log::Level::Warn);
        Ok(out.stdout)
    }

    /// Start the command and hand back its stdout as a lazy line iterator.
    pub fn stream(&self, verb: &str, args: &[&str], options: &[&str]) -> ZcmResult<LineStream> {
        let argv = Self::argv(verb, args, options);
        let mut child = self.spawn(&argv)?;
        let stdout = child.stdout.take();
        let stderr = spawn_output_reader(child.stderr.take());
        Ok(LineStream {
            verb: verb.to_string(),
            child: ChildGuard::new(child),
            stdout: stdout.map(BufReader::new),
            stderr: Some(stderr),
            lines_read: 0,
            done: false,
        })
    }

    /// Copy stdout into `writer` as it is produced. Returns the bytes copied.
    pub fn run_to_writer<W: Write>(
        &self,
        verb: &str,
        args: &[&str],
        options: &[&str],
        writer: &mut W,
    ) -> ZcmResult<u64> {
        let argv = Self::argv(verb, args, options);
        let mut child = self.spawn(&argv)?;
        let stdout = child.stdout.take();
        let stderr = spawn_output_reader(child.stderr.take());
        let mut guard = ChildGuard::new(child);

        let copied = match stdout {
            Some(mut pipe) => io::copy(&mut pipe, writer)?,
            None => 0,
        };
        let status = guard.wait()?;
        let stderr = join_reader(stderr)?;

        if !status.success() {
            log_lines(verb, &stderr, log::Level::Error);
            return Err(ZcmError::command_failed(verb, stderr));
        }
        log_lines(verb, &stderr, log::Level::Warn);
        info!("{verb}: wrote {copied} bytes");
        Ok(copied)
    }

    /// Wait for the child, honouring the timeout when one is configured.
    fn wait_for_exit(
        &self,
        verb: &str,
        mut child: Child,
        stdout_pipe: Option<ChildStdout>,
        stderr_pipe: Option<ChildStderr>,
    ) -> ZcmResult<Output> {
        let stdout_handle = spawn_output_reader(stdout_pipe);
        let stderr_handle = spawn_output_reader(stderr_pipe);

        let exit_status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => {
                let start = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ZcmError::command_failed(
                            verb,
                            format!("{} timed out after {:?}", self.path.display(), timeout),
                        ));
                    }
                    thread::sleep(Duration::from_millis(25));
                }
            }
        };

        let stdout = join_reader(stdout_handle)?;
        let stderr = join_reader(stderr_handle)?;

        Ok(Output {
            stdout,
            stderr,
            status: exit_status.code().unwrap_or(-1),
        })
    }
}

/// Owns a running child and kills it if dropped before it was reaped.
struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        match self.child.take() {
            Some(mut child) => child.wait(),
            None => Err(io::Error::new(io::ErrorKind::Other, "child already reaped")),
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                debug!("terminating pid {} before it finished", child.id());
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

/// Lines of a running command's stdout.
///
/// Each line is logged at debug as it arrives; the line count is logged at
/// info once the command has exited successfully. Yields `Err(CommandFailed)`
/// once at the end if the command exits non-zero. Dropping the stream before
/// exhaustion kills the command.
pub struct LineStream {
    verb: String,
    // declared before `child` so the pipe closes before the kill on drop
    stdout: Option<BufReader<ChildStdout>>,
    child: ChildGuard,
    stderr: Option<thread::JoinHandle<ZcmResult<String>>>,
    lines_read: u64,
    done: bool,
}

impl LineStream {
    fn finish(&mut self) -> Option<ZcmResult<String>> {
        self.done = true;
        self.stdout = None;
        let status = match self.child.wait() {
            Ok(status) => status,
            Err(err) => return Some(Err(err.into())),
        };
        let stderr = match self.stderr.take().map(join_reader).transpose() {
            Ok(text) => text.unwrap_or_default(),
            Err(err) => return Some(Err(err)),
        };
        if status.success() {
            log_lines(&self.verb, &stderr, log::Level::Warn);
            info!("{}: streamed {} lines", self.verb, self.lines_read);
            None
        } else {
            log_lines(&self.verb, &stderr, log::Level::Error);
            Some(Err(ZcmError::command_failed(self.verb.clone(), stderr)))
        }
    }
}

impl Iterator for LineStream {
    type Item = ZcmResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(reader) = self.stdout.as_mut() else {
            return self.finish();
        };

        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => self.finish(),
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                self.lines_read += 1;
                debug!("{}: {}", self.verb, line);
                Some(Ok(line))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err.into()))
            }
        }
    }
}

fn log_lines(verb: &str, text: &str, level: log::Level) {
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        match level {
            log::Level::Error => error!("{verb}: {line}"),
            log::Level::Warn => warn!("{verb}: {line}"),
            _ => info!("{verb}: {line}"),
        }
    }
}

/// Spin up a helper thread to drain a pipe and return the collected text.
fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<ZcmResult<String>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || -> ZcmResult<String> {
        if let Some(mut reader) = pipe {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).to_string())
        } else {
            Ok(String::new())
        }
    })
}

fn join_reader(handle: thread::JoinHandle<ZcmResult<String>>) -> ZcmResult<String> {
    handle
        .join()
        .map_err(|_| ZcmError::Io(io::Error::new(io::ErrorKind::Other, "pipe reader thread panicked")))?
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use tempfile::{tempdir, TempDir};

    struct Script {
        _dir: TempDir,
        _guard: MutexGuard<'static, ()>,
    }

    fn test_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn script(body: &str) -> (Script, CommandRunner) {
        let guard = test_lock();
        let dir = tempdir().unwrap();
        let path = dir.path().join("tool.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        let runner = CommandRunner::new(path, None);
        (
            Script {
                _dir: dir,
                _guard: guard,
            },
            runner,
        )
    }

    #[test]
    fn argv_places_options_before_arguments() {
        let argv = CommandRunner::argv("create", &["tank/data"], &["compression=lz4", "mountpoint=/x"]);
        assert_eq!(
            argv,
            vec!["create", "-o", "compression=lz4", "-o", "mountpoint=/x", "tank/data"]
        );
    }

    #[test]
    fn run_checked_returns_stdout_even_with_stderr_warnings() {
        let (_dir, runner) = script("echo \"args: $*\"\necho 'careful' >&2\nexit 0");
        let out = runner.run_checked("get", &["-Hp", "type", "tank"], &[]).unwrap();
        assert_eq!(out, "args: get -Hp type tank\n");
    }

    #[test]
    fn run_checked_maps_nonzero_exit_to_command_failed() {
        let (_dir, runner) = script("echo \"cannot open 'tank/x': dataset does not exist\" >&2\nexit 1");
        match runner.run_checked("get", &["tank/x"], &[]) {
            Err(ZcmError::CommandFailed { verb, stderr }) => {
                assert_eq!(verb, "get");
                assert_eq!(stderr, "cannot open 'tank/x': dataset does not exist\n");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn timeout_kills_slow_commands() {
        let (_dir, runner) = script("sleep 5");
        let runner = CommandRunner::new(runner.binary().to_path_buf(), Some(Duration::from_millis(100)));
        let started = Instant::now();
        let err = runner.run_checked("list", &[], &[]).unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn stream_yields_lines_then_reports_failure() {
        let (_dir, runner) = script("printf 'a\\tb\\nc\\n'\necho boom >&2\nexit 3");
        let mut lines = runner.stream("diff", &[], &[]).unwrap();
        assert_eq!(lines.next().unwrap().unwrap(), "a\tb");
        assert_eq!(lines.next().unwrap().unwrap(), "c");
        match lines.next() {
            Some(Err(ZcmError::CommandFailed { stderr, .. })) => assert_eq!(stderr, "boom\n"),
            other => panic!("expected failure, got {:?}", other.map(|r| r.is_ok())),
        }
        assert!(lines.next().is_none());
        assert_eq!(lines.lines_read, 2);
    }

    #[test]
    fn stream_counts_lines_before_reporting_success() {
        let (_dir, runner) = script("printf 'one\\ntwo\\nthree\\n'");
        let mut lines = runner.stream("list", &[], &[]).unwrap();
        let collected: Vec<String> = lines.by_ref().map(|line| line.unwrap()).collect();
        assert_eq!(collected, vec!["one", "two", "three"]);
        assert_eq!(lines.lines_read, 3);
        assert!(lines.done);
    }

    #[test]
    fn dropping_a_stream_early_terminates_the_child() {
        let (_dir, runner) = script("while true; do echo line; done");
        let started = Instant::now();
        {
            let mut lines = runner.stream("diff", &[], &[]).unwrap();
            for _ in 0..3 {
                assert_eq!(lines.next().unwrap().unwrap(), "line");
            }
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn run_to_writer_copies_stdout() {
        let (_dir, runner) = script("printf 'payload'");
        let mut sink = Vec::new();
        let copied = runner.run_to_writer("send", &["tank@s"], &[], &mut sink).unwrap();
        assert_eq!(copied, 7);
        assert_eq!(sink, b"payload");
    }
}

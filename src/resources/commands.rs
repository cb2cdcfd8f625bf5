use crate::params::bind_shell_params;
use crate::registry::Handler;
use crate::session::Session;
use http::StatusCode;
use may::sync::mpsc;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const WAIT_POLL: Duration = Duration::from_millis(20);

/// Runs the shell code configured under `commands.<group>.<item>`.
///
/// The request body is fed to the command on stdin and stdout becomes the
/// response body. Placeholders in the code resolve against the global
/// parameters first, then the query string, and reach the shell as
/// variables rather than as code.
pub struct CommandServer<'s> {
    sess: &'s mut Session,
}

pub fn new_command_server(sess: &mut Session) -> Box<dyn Handler + '_> {
    Box::new(CommandServer { sess })
}

impl Handler for CommandServer<'_> {
    fn serve(&mut self) {
        let Some(command) = self
            .sess
            .config()
            .command(self.sess.group(), self.sess.item())
            .cloned()
        else {
            let name = format!("{}/{}", self.sess.group(), self.sess.item());
            self.sess
                .error_end(StatusCode::NOT_FOUND, format_args!("command {name} not found"));
            return;
        };

        let method = self.sess.method().as_str().to_string();
        if !command.methods.iter().any(|m| m.eq_ignore_ascii_case(&method)) {
            self.sess.error_end(
                StatusCode::METHOD_NOT_ALLOWED,
                format_args!("method {method} not allowed"),
            );
            return;
        }

        let (code, env) = bind_shell_params(&command.code, self.sess.request_params());
        debug!(session_id = self.sess.id(), code = %code, "running command");
        let job = ShellJob {
            code,
            env,
            input: self.sess.body().to_vec(),
            timeout: command.timeout_secs.map(Duration::from_secs),
        };

        match run_off_worker(job) {
            Ok(Finished::Exited(output)) if output.status.success() => {
                self.sess.set_header("Content-Type", "text/plain");
                self.sess.write_body(&output.stdout);
                self.sess.good_end(format_args!("command exited with {}", output.status));
            }
            Ok(Finished::Exited(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!(session_id = self.sess.id(), stderr = %stderr.trim_end(), "command failed");
                self.sess.error_end(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format_args!("command exited with {}", output.status),
                );
            }
            Ok(Finished::TimedOut) => self.sess.error_end(
                StatusCode::GATEWAY_TIMEOUT,
                format_args!(
                    "command timed out after {}s",
                    command.timeout_secs.unwrap_or_default()
                ),
            ),
            Err(e) => self.sess.error_end(
                StatusCode::INTERNAL_SERVER_ERROR,
                format_args!("command failed to start: {e}"),
            ),
        }
    }
}

struct ShellJob {
    code: String,
    env: Vec<(String, String)>,
    input: Vec<u8>,
    timeout: Option<Duration>,
}

enum Finished {
    Exited(Output),
    /// Killed at the deadline
    TimedOut,
}

/// Run `job` on a plain thread and park the calling coroutine until it ends,
/// so a slow command never holds a `may` worker.
fn run_off_worker(job: ShellJob) -> io::Result<Finished> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("servant-command".to_string())
        .spawn(move || {
            if tx.send(run_shell(job)).is_err() {
                debug!("command result dropped, requester is gone");
            }
        })?;
    rx.recv()
        .map_err(|_| io::Error::other("command thread ended without a result"))?
}

/// Run the job with `sh -c`, writing its input to stdin.
fn run_shell(job: ShellJob) -> io::Result<Finished> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&job.code)
        .envs(job.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdin = child.stdin.take();
    let input = job.input;
    let feeder = thread::spawn(move || feed(stdin, &input));
    let stdout = child.stdout.take();
    let out = thread::spawn(move || drain(stdout));
    let stderr = child.stderr.take();
    let err = thread::spawn(move || drain(stderr));

    let Some(status) = wait_until(&mut child, job.timeout)? else {
        // helpers finish on their own once the pipes close
        return Ok(Finished::TimedOut);
    };
    if let Ok(Err(e)) = feeder.join() {
        debug!(error = %e, "writing command input failed");
    }
    Ok(Finished::Exited(Output {
        status,
        stdout: out.join().unwrap_or_default(),
        stderr: err.join().unwrap_or_default(),
    }))
}

fn feed(stdin: Option<ChildStdin>, input: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    // a command that ignores its input may exit before reading it
    match stdin.write_all(input) {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!(error = %e, "reading command output failed");
        }
    }
    buf
}

/// Wait for the child, killing it at the deadline. `None` means it was killed.
fn wait_until(child: &mut Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(WAIT_POLL);
    }
}

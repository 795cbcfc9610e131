//! External process execution with timeout and output capture.
//!
//! Every tool the harness drives (mutator, compiler, profiler, simulator) goes
//! through [`execute`]. A timeout or a spawn error is an ordinary failed
//! [`Outcome`]; nothing here ever aborts the run.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use regex::Regex;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A command line plus the environment variables injected into it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            env: Vec::new(),
        }
    }

    /// Build an invocation from whitespace-separated tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: tokens.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    /// Shell-like rendering: `KEY=value program args...`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.env {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        for arg in &self.argv {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(arg)?;
            first = false;
        }
        Ok(())
    }
}

/// What to do with the child's stdout/stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capture {
    /// Discard output; a non-zero exit status is a failure.
    Discard,
    /// Collect stdout then stderr; the exit status is not inspected.
    Combined,
}

/// Result of one external invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    /// Captured output on success, the attempted command line on failure.
    pub text: String,
}

impl Outcome {
    fn fail(reason: &str, invocation: &Invocation) -> Self {
        let command = if reason.is_empty() {
            invocation.to_string()
        } else {
            format!("{reason}: {invocation}")
        };
        warn!("! {command} fails");
        Self {
            success: false,
            text: command,
        }
    }
}

/// Remove ANSI color escape sequences.
pub fn strip_color_codes(text: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let regex = ANSI.get_or_init(|| {
        Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("ANSI escape pattern is valid")
    });
    regex.replace_all(text, "").into_owned()
}

/// Run `invocation`, waiting at most `timeout`.
///
/// With [`Capture::Combined`] the cleaned output is also written to
/// `target_file` when one is given.
pub fn execute(
    invocation: &Invocation,
    timeout: Option<Duration>,
    capture: Capture,
    target_file: Option<&Path>,
) -> Outcome {
    debug!("{invocation}");
    let Some((program, args)) = invocation.argv.split_first() else {
        return Outcome::fail("Empty command", invocation);
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null());
    match capture {
        Capture::Discard => command.stdout(Stdio::null()).stderr(Stdio::null()),
        Capture::Combined => command.stdout(Stdio::piped()).stderr(Stdio::piped()),
    };
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!("spawn of {program} failed: {e}");
            return Outcome::fail("", invocation);
        }
    };

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match wait_with_deadline(&mut child, timeout) {
        Some(status) => status,
        None => {
            kill_tree(&mut child);
            join(stdout);
            join(stderr);
            return Outcome::fail("Timeout", invocation);
        }
    };

    let text = match capture {
        Capture::Discard => {
            if !status.success() {
                return Outcome::fail("", invocation);
            }
            String::new()
        }
        Capture::Combined => {
            // Leftover descendants would keep the pipes open past the deadline.
            kill_group(child.id());
            let mut raw = join(stdout);
            raw.extend(join(stderr));
            strip_color_codes(&String::from_utf8_lossy(&raw))
        }
    };

    if let Some(path) = target_file {
        if let Err(e) = std::fs::write(path, &text) {
            warn!("cannot write {}: {e}", path.display());
            return Outcome::fail("Unwritable output", invocation);
        }
    }

    Outcome {
        success: true,
        text,
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> Option<ExitStatus> {
    let Some(timeout) = timeout else {
        return child.wait().ok();
    };
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() >= deadline => return None,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(_) => return None,
        }
    }
}

/// Kill every process of the group led by `leader`, which may already be gone.
fn kill_group(leader: u32) {
    #[cfg(unix)]
    unsafe {
        libc::killpg(leader as libc::pid_t, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = leader;
}

/// Kill the child and everything it spawned (it leads its own process group).
fn kill_tree(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

//! External command execution.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

use crate::error::CommandError;

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command line as a user would type it.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished program left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-blank output line, preferring stderr. Used for short summaries.
    pub fn last_line(&self) -> String {
        [&self.stderr, &self.stdout]
            .iter()
            .find_map(|text| text.lines().rev().find(|l| !l.trim().is_empty()))
            .map(|l| l.trim().to_string())
            .unwrap_or_default()
    }
}

/// Runs external programs on behalf of tasks and collaborators.
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Fails only if the program cannot be started,
    /// cannot be waited on, or exceeds `spec.timeout`.
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult, CommandError>;
}

/// The real thing: `std::process` with a `wait-timeout` deadline.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult, CommandError> {
        debug!(command = %spec.display(), timeout = ?spec.timeout, "spawning");

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Invocation {
                program: spec.program.clone(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (spec.stdin.clone(), child.stdin.take()) {
            // Dropping the pipe at the end of the thread closes the child's stdin.
            thread::spawn(move || {
                let _ = pipe.write_all(input.as_bytes());
            });
        }
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let wait_error = |source| CommandError::Wait {
            program: spec.program.clone(),
            source,
        };
        let status = match spec.timeout {
            Some(limit) => match child.wait_timeout(limit).map_err(wait_error)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::TimedOut {
                        program: spec.program.clone(),
                        timeout: limit,
                    });
                }
            },
            None => child.wait().map_err(wait_error)?,
        };

        let result = CommandResult {
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        debug!(command = %spec.display(), exit_code = ?result.exit_code, "finished");
        Ok(result)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

/// Scripted runner for tests: records every spec and answers from a closure.
#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::{CommandResult, CommandRunner, CommandSpec};
    use crate::error::CommandError;

    pub(crate) enum Scripted {
        Exit(i32, &'static str),
        Missing,
        TimedOut,
    }

    type Script = Box<dyn Fn(&CommandSpec) -> Scripted + Send + Sync>;

    pub(crate) struct FakeRunner {
        calls: Mutex<Vec<CommandSpec>>,
        script: Script,
    }

    impl FakeRunner {
        /// Every command exits 0 with no output.
        pub(crate) fn ok() -> Self {
            Self::with(|_| Scripted::Exit(0, ""))
        }

        pub(crate) fn with(script: impl Fn(&CommandSpec) -> Scripted + Send + Sync + 'static) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                script: Box::new(script),
            }
        }

        pub(crate) fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn command_lines(&self) -> Vec<String> {
            self.calls().iter().map(CommandSpec::display).collect()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandResult, CommandError> {
            self.calls.lock().unwrap().push(spec.clone());
            match (self.script)(spec) {
                Scripted::Exit(code, out) => Ok(CommandResult {
                    exit_code: Some(code),
                    stdout: out.to_string(),
                    stderr: String::new(),
                }),
                Scripted::Missing => Err(CommandError::Invocation {
                    program: spec.program.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                }),
                Scripted::TimedOut => Err(CommandError::TimedOut {
                    program: spec.program.clone(),
                    timeout: spec.timeout.unwrap_or(Duration::from_secs(1)),
                }),
            }
        }
    }
}

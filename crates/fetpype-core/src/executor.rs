//! Container Executor: run one shell command to completion and tee its output.
//!
//! stdout and stderr of the child share a single pipe, so lines arrive in
//! the order the child wrote them. Each line is logged as it arrives and
//! kept for the final result. There is no timeout and no retry.
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::data_model::ExecResult;
use crate::error::{FetpypeError, Result};

/// Shell used to interpret rendered commands
pub const SHELL: &str = "sh";

/// Keeps child output line-oriented: unbuffered Python, UTF-8, no
/// carriage-return progress bars. Only applied when the parent does not
/// define the variable itself.
pub const UNBUFFERED_DEFAULTS: [(&str, &str); 3] = [
    ("PYTHONUNBUFFERED", "1"),
    ("PYTHONIOENCODING", "utf-8"),
    ("TQDM_DISABLE", "1"),
];

#[derive(Debug, Clone, Default)]
pub struct ContainerExecutor {
    prefix: String,
    echo_to_terminal: bool,
    env: BTreeMap<String, String>,
}

impl ContainerExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor configured from an invocation context.
    pub fn for_context(ctx: &ExecutionContext) -> Self {
        Self::new()
            .echo_to_terminal(ctx.echo_to_terminal)
            .envs(ctx.env.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Text put in front of every streamed line
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn echo_to_terminal(mut self, echo: bool) -> Self {
        self.echo_to_terminal = echo;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Variables the child receives on top of the inherited environment.
    pub fn child_env(&self) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = UNBUFFERED_DEFAULTS
            .iter()
            .filter(|(key, _)| std::env::var_os(key).is_none())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Run `command`, streaming each line to the log (and the terminal when
    /// enabled). Non-zero exit is a `ContainerExecutionError`.
    pub fn execute(&self, command: &str) -> Result<ExecResult> {
        self.execute_with(command, |line| {
            info!(target: "fetpype::container", "{}{}", self.prefix, line);
            if self.echo_to_terminal {
                println!("{}{}", self.prefix, line);
            }
        })
    }

    /// Like [`execute`](Self::execute) with a caller-supplied line sink.
    pub fn execute_with<F>(&self, command: &str, mut on_line: F) -> Result<ExecResult>
    where
        F: FnMut(&str),
    {
        let (reader, writer) =
            io::pipe().map_err(|e| FetpypeError::io("create output pipe", e))?;

        // The Command owns the parent's copies of the write end; dropping it
        // right after spawn lets the reader see EOF when the child exits.
        let mut child = {
            let stderr = writer
                .try_clone()
                .map_err(|e| FetpypeError::io("duplicate output pipe", e))?;
            let mut cmd = Command::new(SHELL);
            cmd.arg("-c")
                .arg(command)
                .envs(self.child_env())
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(stderr);
            cmd.spawn()
                .map_err(|e| FetpypeError::io(format!("spawn `{}`", command), e))?
        };

        info!(target: "fetpype::workflow", "Running: {}", command);

        let mut captured = Vec::new();
        let read_result = read_lines(reader, |line| {
            on_line(line);
            captured.push(line.to_string());
        });

        let status = child
            .wait()
            .map_err(|e| FetpypeError::io(format!("wait for `{}`", command), e))?;
        read_result.map_err(|e| FetpypeError::io("read child output", e))?;

        let exit_code = status.code().unwrap_or(-1);
        let output = captured.join("\n");
        debug!(exit_code, lines = captured.len(), "child exited");

        if !status.success() {
            return Err(FetpypeError::ContainerExecutionError {
                exit_code,
                command: command.to_string(),
                output,
            });
        }

        Ok(ExecResult {
            exit_code,
            output,
            success: true,
        })
    }

    /// Execute, then require every `expected` file to exist.
    pub fn execute_checked<'a, I>(&self, command: &str, expected: I) -> Result<ExecResult>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let result = self.execute(command)?;
        check_outputs_exist(expected)?;
        Ok(result)
    }
}

/// `PostconditionError` naming the first declared output that is missing.
pub fn check_outputs_exist<'a, I>(expected: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Path>,
{
    for path in expected {
        if !path.exists() {
            return Err(FetpypeError::PostconditionError {
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn read_lines<R, F>(reader: R, mut on_line: F) -> io::Result<()>
where
    R: io::Read,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\n', '\r']));
    }
}

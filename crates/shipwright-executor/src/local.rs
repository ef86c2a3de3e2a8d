//! Local process executor.

use async_trait::async_trait;
use shipwright_core::executor::{CommandExecutor, CommandOutput, CommandSpec, LogStream};
use shipwright_core::{CancellationToken, Error, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands as child processes of the current process.
///
/// Stdout and stderr are copied concurrently, each line going to the log,
/// to the terminal (unless the command is quiet) and into the captured output.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn execute(&self, spec: CommandSpec, cancel: &CancellationToken) -> Result<CommandOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        debug!(command = %spec, "Executing command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::Environment(format!("{} not found in PATH", spec.program))
            }
            _ => Error::Environment(format!("failed to start {}: {}", spec.program, e)),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Environment("child stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Environment("child stderr not captured".into()))?;

        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = async {
                let (stdout, stderr) = tokio::join!(
                    copy_lines(stdout, LogStream::Stdout, spec.quiet),
                    copy_lines(stderr, LogStream::Stderr, spec.quiet),
                );
                (stdout, stderr, child.wait().await)
            } => Some(result),
        };

        let Some((stdout, stderr, status)) = finished else {
            warn!(command = %spec.program, "Cancelled, killing child process");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill child process");
            }
            return Err(Error::Cancelled);
        };

        let status = status.map_err(|e| {
            Error::Environment(format!("failed to wait for {}: {}", spec.program, e))
        })?;
        debug!(command = %spec.program, exit_code = ?status.code(), "Command finished");

        Ok(CommandOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

async fn copy_lines<R>(reader: R, stream: LogStream, quiet: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut captured = Vec::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(stream = stream.as_str(), "{}", line);
                if !quiet {
                    match stream {
                        LogStream::Stdout => println!("{}", line),
                        LogStream::Stderr => eprintln!("{}", line),
                    }
                }
                captured.push(line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(stream = stream.as_str(), error = %e, "Error reading output");
                break;
            }
        }
    }
    captured.join("\n")
}

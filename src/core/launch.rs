//! # Child process launch.
//!
//! Builds the [`Command`] for a [`ProcessDefinition`], spawns it with all
//! three standard streams piped and starts one reader task per output
//! stream. Each line read is appended to the [`LogStore`] with its channel.
//!
//! ```text
//! spawn(def) ──► Command(argv, cwd, env, piped stdio, own process group, kill on drop)
//!                    ├──► stdout reader ──► LogStore::append(StdOut)
//!                    └──► stderr reader ──► LogStore::append(StdErr)
//! ```
//!
//! Waiting on the child is left to the caller.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};

use crate::error::SupervisorError;
use crate::logs::LogStore;
use crate::model::{DefinitionId, LogSource, ProcessDefinition};

/// A freshly spawned child.
pub(crate) struct Launched {
    pub pid: u32,
    pub child: Child,
    pub stdin: Option<ChildStdin>,
}

pub(crate) fn spawn(def: &ProcessDefinition, logs: &Arc<LogStore>) -> Result<Launched, SupervisorError> {
    if def.command.trim().is_empty() {
        return Err(SupervisorError::EmptyCommand {
            name: def.name.clone(),
        });
    }

    let mut cmd = Command::new(def.command.trim());
    cmd.args(def.argv())
        .envs(&def.environment)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if !def.working_directory.trim().is_empty() {
        cmd.current_dir(def.working_directory.trim());
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| SupervisorError::Launch {
        command: def.command_line(),
        source,
    })?;

    let Some(pid) = child.id() else {
        // Already reaped; nothing to supervise.
        return Err(SupervisorError::Launch {
            command: def.command_line(),
            source: std::io::Error::other("process exited before its pid could be read"),
        });
    };

    if let Some(out) = child.stdout.take() {
        tokio::spawn(pump_lines(out, def.id, LogSource::StdOut, Arc::clone(logs)));
    }
    if let Some(err) = child.stderr.take() {
        tokio::spawn(pump_lines(err, def.id, LogSource::StdErr, Arc::clone(logs)));
    }
    let stdin = child.stdin.take();

    Ok(Launched { pid, child, stdin })
}

/// Reads `stream` line by line until EOF; invalid UTF-8 is replaced.
async fn pump_lines<R>(stream: R, process: DefinitionId, source: LogSource, logs: Arc<LogStore>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                logs.append(process, line, source);
            }
            Err(err) => {
                tracing::debug!(%process, ?source, error = %err, "output stream closed");
                break;
            }
        }
    }
}

//! Child-process transport for talking to a stdio MCP peer.
//!
//! The peer's stdin/stdout carry protocol frames; its stderr is forwarded
//! into the log at debug level.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PeerCommand;
use crate::error::{Error, Result};
use crate::mcp::transport::{FrameReader, FrameWriter};

/// A spawned peer process with framed access to its standard streams.
pub struct ProcessTransport {
    reader: FrameReader,
    writer: FrameWriter,
    process: PeerProcess,
}

impl ProcessTransport {
    /// Launch the peer. The child inherits this process's environment plus
    /// `peer.env`.
    pub fn spawn(peer: &PeerCommand) -> Result<Self> {
        let mut child = Command::new(&peer.command)
            .args(&peer.args)
            .envs(&peer.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: peer.command.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("peer stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("peer stdout is not piped".to_string()))?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_stderr(peer.command.clone(), stderr)));

        info!("Spawned peer process: {} (pid {:?})", peer.command, child.id());

        Ok(Self {
            reader: FrameReader::new(stdout),
            writer: FrameWriter::new(stdin),
            process: PeerProcess {
                child,
                command: peer.command.clone(),
                stderr_task,
            },
        })
    }

    /// Write one frame to the peer's stdin.
    pub async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        self.writer.write_frame(frame).await
    }

    /// Read one frame from the peer's stdout. `None` on EOF.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        self.reader.read_line().await
    }

    /// Close the peer's stdin and wait up to `grace` for it to exit.
    pub async fn close(mut self, grace: Duration) -> Result<()> {
        self.writer.close().await;
        self.process.wait(grace).await
    }

    /// Split into the read half, the write half and the process handle.
    pub fn into_parts(self) -> (FrameReader, FrameWriter, PeerProcess) {
        (self.reader, self.writer, self.process)
    }
}

/// Handle to a running peer process.
pub struct PeerProcess {
    child: Child,
    command: String,
    stderr_task: Option<JoinHandle<()>>,
}

impl PeerProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the peer to exit after its stdin was closed.
    ///
    /// A non-zero exit status is an error. A peer that is still running
    /// after `grace` is killed and reported as an error.
    pub async fn wait(&mut self, grace: Duration) -> Result<()> {
        let outcome = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                debug!("Peer process {} exited cleanly", self.command);
                Ok(())
            }
            Ok(Ok(status)) => Err(Error::ProcessExit(format!(
                "{} exited with {}",
                self.command, status
            ))),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => {
                warn!(
                    "Peer process {} did not exit within {:?}, killing it",
                    self.command, grace
                );
                self.child.kill().await?;
                Err(Error::ProcessExit(format!(
                    "{} did not exit within {:?} and was killed",
                    self.command, grace
                )))
            }
        };

        if let Some(task) = self.stderr_task.take() {
            // stderr reaches EOF once the process is gone
            let _ = tokio::time::timeout(Duration::from_millis(100), task).await;
        }
        outcome
    }
}

async fn forward_stderr(command: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "mcp_bridge::peer", "[{}] {}", command, line),
            Ok(None) => break,
            Err(e) => {
                debug!("Error reading peer stderr: {}", e);
                break;
            }
        }
    }
}

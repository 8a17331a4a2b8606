// --- mpv adapter ----------------------------------------------------------
//
// mpv runs as a child process in idle mode and is driven over its JSON IPC
// socket: one request per line, `{"command": [...], "request_id": n}`, and one
// reply per request carrying the same `request_id`. mpv also writes
// unsolicited event lines on the same socket; those are skipped.
//
// A call that times out in `SharedEngine` is dropped mid-request, so its reply
// can still arrive later. Replies are therefore matched by id, never by order.
// Both directions keep their partial bytes across a dropped call: a request
// half-written is finished before the next one, and a reply half-read is
// completed (and then skipped) by the next reader.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;

use super::PlaybackEngine;
use crate::error::EngineError;
use crate::status::PlaybackStatus;

/// mpv reports this for properties that have no value yet (e.g. `filename`
/// while idle).
const PROPERTY_UNAVAILABLE: &str = "property unavailable";

/// How long `quit` waits for the mpv process to exit before killing it.
const QUIT_GRACE: Duration = Duration::from_secs(2);

pub struct MpvEngine<R, W> {
    reader: BufReader<R>,
    writer: W,
    next_request_id: u64,
    /// Bytes of the current reply line read so far.
    inbound: Vec<u8>,
    /// Request bytes not yet written to the socket.
    outbound: Vec<u8>,
    child: Option<Child>,
}

#[cfg(unix)]
pub type MpvSocketEngine =
    MpvEngine<tokio::net::unix::OwnedReadHalf, tokio::net::unix::OwnedWriteHalf>;

#[cfg(unix)]
impl MpvSocketEngine {
    /// Start mpv and connect to its IPC socket.
    pub async fn spawn(cfg: &crate::config::MpvConfig) -> Result<Self, EngineError> {
        // A socket left over from a previous run would make the connect below
        // succeed against a dead endpoint.
        let _ = std::fs::remove_file(&cfg.socket);

        let mut cmd = tokio::process::Command::new(&cfg.program);
        cmd.arg("--idle=yes")
            .arg("--no-terminal")
            .arg(format!("--input-ipc-server={}", cfg.socket.display()))
            .args(&cfg.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| EngineError::Spawn {
            program: cfg.program.clone(),
            source,
        })?;
        tracing::info!("mpv started (pid {:?}), ipc socket {}", child.id(), cfg.socket.display());

        let stream = connect_with_retry(&cfg.socket).await?;
        let (reader, writer) = stream.into_split();
        let mut engine = Self::attach(reader, writer);
        engine.child = Some(child);
        Ok(engine)
    }
}

#[cfg(unix)]
async fn connect_with_retry(socket: &Path) -> Result<tokio::net::UnixStream, EngineError> {
    // mpv creates the socket shortly after startup.
    const ATTEMPTS: u32 = 50;
    let mut last_err = None;
    for _ in 0..ATTEMPTS {
        match tokio::net::UnixStream::connect(socket).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(EngineError::Connect {
        socket: socket.to_path_buf(),
        source: last_err.unwrap_or_else(|| std::io::ErrorKind::TimedOut.into()),
    })
}

impl<R, W> MpvEngine<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Drive an mpv instance that is already listening on `reader`/`writer`.
    pub fn attach(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            next_request_id: 1,
            inbound: Vec::new(),
            outbound: Vec::new(),
            child: None,
        }
    }

    /// Send one IPC command and wait for its reply's `data`.
    async fn command(&mut self, args: Value) -> Result<Value, EngineError> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = json!({ "command": args, "request_id": request_id }).to_string();
        self.outbound.extend_from_slice(request.as_bytes());
        self.outbound.push(b'\n');
        self.flush_outbound().await?;

        loop {
            let line = self.next_line().await?;
            let reply: Value = match serde_json::from_slice(&line) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::debug!("skipping unreadable mpv line ({e}): {:?}", String::from_utf8_lossy(&line));
                    continue;
                }
            };
            if reply.get("request_id").and_then(Value::as_u64) != Some(request_id) {
                // Event, or the late reply of an abandoned call.
                continue;
            }
            return match reply.get("error").and_then(Value::as_str) {
                Some("success") => Ok(reply.get("data").cloned().unwrap_or(Value::Null)),
                other => Err(EngineError::Command {
                    command: args.to_string(),
                    error: other.unwrap_or("no error field").to_string(),
                }),
            };
        }
    }

    /// Write out pending request bytes. `write` either consumes a prefix or
    /// nothing, so a dropped call leaves the rest queued for the next one.
    async fn flush_outbound(&mut self) -> Result<(), EngineError> {
        while !self.outbound.is_empty() {
            let n = self.writer.write(&self.outbound).await?;
            if n == 0 {
                return Err(EngineError::Disconnected);
            }
            self.outbound.drain(..n);
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Next complete line from mpv, without its newline. Partial bytes stay in
    /// `inbound` if the call is dropped while waiting.
    async fn next_line(&mut self) -> Result<Vec<u8>, EngineError> {
        self.reader.read_until(b'\n', &mut self.inbound).await?;
        if self.inbound.last() != Some(&b'\n') {
            // End of stream, possibly in the middle of a line.
            self.inbound.clear();
            return Err(EngineError::Disconnected);
        }
        let mut line = std::mem::take(&mut self.inbound);
        line.pop();
        Ok(line)
    }

    /// `None` when mpv has no value for the property right now.
    async fn property(&mut self, name: &str) -> Result<Option<Value>, EngineError> {
        match self.command(json!(["get_property", name])).await {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(EngineError::Command { error, .. }) if error == PROPERTY_UNAVAILABLE => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn reap_child(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match tokio::time::timeout(QUIT_GRACE, child.wait()).await {
            Ok(Ok(exit)) => tracing::info!("mpv exited: {exit}"),
            Ok(Err(e)) => tracing::warn!("failed to wait for mpv: {e}"),
            Err(_) => {
                tracing::warn!("mpv did not exit within {QUIT_GRACE:?}, killing it");
                let _ = child.kill().await;
            }
        }
    }
}

#[async_trait]
impl<R, W> PlaybackEngine for MpvEngine<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn play(&mut self, path: &Path) -> Result<(), EngineError> {
        let path = path.to_string_lossy();
        self.command(json!(["loadfile", path, "replace"])).await?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.command(json!(["stop"])).await?;
        Ok(())
    }

    async fn status(&mut self) -> Result<PlaybackStatus, EngineError> {
        let idle = self
            .property("idle-active")
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let file_size = self
            .property("file-size")
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let loaded_file_name = self
            .property("filename")
            .await?
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let percent = self
            .property("percent-pos")
            .await?
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let time_position = self
            .property("time-pos")
            .await?
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let total_duration = self
            .property("duration")
            .await?
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        Ok(PlaybackStatus {
            loaded_file_name,
            file_size,
            idle,
            percent_complete: percent.round().clamp(0.0, 100.0) as i64,
            time_position,
            total_duration,
        })
    }

    async fn quit(&mut self) -> Result<(), EngineError> {
        let sent = match self.command(json!(["quit"])).await {
            // mpv may close the socket before it gets to reply.
            Ok(_) | Err(EngineError::Disconnected) => Ok(()),
            Err(e) => Err(e),
        };
        self.reap_child().await;
        sent
    }
}

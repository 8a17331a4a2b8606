//! Playback engine adapters.
//!
//! Message handlers (play/stop) and the status broadcaster both call into the
//! engine. Every call goes through [`SharedEngine`], which serializes access
//! behind one async mutex and bounds each call (lock wait included) with a
//! timeout. Once `quit` has been requested every later call is refused.

mod dry_run;
mod mpv;

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::status::PlaybackStatus;

pub use dry_run::{DryRunEngine, EngineCall, EngineJournal};
pub use mpv::MpvEngine;
#[cfg(unix)]
pub use mpv::MpvSocketEngine;

#[async_trait]
pub trait PlaybackEngine: Send {
    /// Load `path` and start playing it, replacing whatever is loaded.
    async fn play(&mut self, path: &Path) -> Result<(), EngineError>;

    async fn stop(&mut self) -> Result<(), EngineError>;

    /// Snapshot of what the engine is doing right now.
    async fn status(&mut self) -> Result<PlaybackStatus, EngineError>;

    /// Shut the engine down. Through [`SharedEngine`] this is the last call
    /// the engine sees.
    async fn quit(&mut self) -> Result<(), EngineError>;
}

/// Cloneable, serialized handle to the one engine instance.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<Box<dyn PlaybackEngine>>>,
    quit: Arc<AtomicBool>,
    call_timeout: Duration,
}

impl SharedEngine {
    pub fn new(engine: Box<dyn PlaybackEngine>, call_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
            quit: Arc::new(AtomicBool::new(false)),
            call_timeout,
        }
    }

    pub async fn play(&self, path: &Path) -> Result<(), EngineError> {
        self.bounded("play", async {
            let mut engine = self.inner.lock().await;
            self.check_running()?;
            engine.play(path).await
        })
        .await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.bounded("stop", async {
            let mut engine = self.inner.lock().await;
            self.check_running()?;
            engine.stop().await
        })
        .await
    }

    pub async fn status(&self) -> Result<PlaybackStatus, EngineError> {
        self.bounded("status", async {
            let mut engine = self.inner.lock().await;
            self.check_running()?;
            engine.status().await
        })
        .await
    }

    /// Quit the engine. Calls queued behind this one, and every call made
    /// later, fail with [`EngineError::ShutDown`]. Quitting twice is a no-op.
    pub async fn quit(&self) -> Result<(), EngineError> {
        if self.quit.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bounded("quit", async { self.inner.lock().await.quit().await })
            .await
    }

    /// Checked with the lock held, so nothing slips in after `quit` ran.
    fn check_running(&self) -> Result<(), EngineError> {
        if self.quit.load(Ordering::SeqCst) {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| EngineError::Timeout {
                op,
                after: self.call_timeout,
            })?
    }
}

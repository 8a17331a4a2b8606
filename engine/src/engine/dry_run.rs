use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;

use super::PlaybackEngine;
use crate::error::EngineError;
use crate::status::PlaybackStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Play(PathBuf),
    Stop,
    Status,
    Quit,
}

/// Shared record of the calls a [`DryRunEngine`] received, in order.
#[derive(Debug, Clone, Default)]
pub struct EngineJournal {
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl EngineJournal {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Paths passed to `play`, in call order.
    pub fn played(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Play(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: EngineCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

struct Loaded {
    name: String,
    size: i64,
    started_at: Instant,
}

/// Engine that plays nothing. Lets the service run without mpv.
#[derive(Default)]
pub struct DryRunEngine {
    loaded: Option<Loaded>,
    journal: EngineJournal,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> EngineJournal {
        self.journal.clone()
    }
}

#[async_trait]
impl PlaybackEngine for DryRunEngine {
    async fn play(&mut self, path: &Path) -> Result<(), EngineError> {
        self.journal.record(EngineCall::Play(path.to_path_buf()));
        let size = tokio::fs::metadata(path).await?.len();
        self.loaded = Some(Loaded {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: i64::try_from(size).unwrap_or(i64::MAX),
            started_at: Instant::now(),
        });
        tracing::info!("dry-run: playing {}", path.display());
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.journal.record(EngineCall::Stop);
        self.loaded = None;
        Ok(())
    }

    async fn status(&mut self) -> Result<PlaybackStatus, EngineError> {
        self.journal.record(EngineCall::Status);
        Ok(match &self.loaded {
            None => PlaybackStatus::idle(),
            Some(loaded) => PlaybackStatus {
                loaded_file_name: loaded.name.clone(),
                file_size: loaded.size,
                idle: false,
                percent_complete: 0,
                time_position: loaded.started_at.elapsed().as_secs_f64(),
                total_duration: 0.0,
            },
        })
    }

    async fn quit(&mut self) -> Result<(), EngineError> {
        self.journal.record(EngineCall::Quit);
        self.loaded = None;
        Ok(())
    }
}

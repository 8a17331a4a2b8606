//! Inbound command dispatch.
//!
//! Clients send flat JSON documents such as
//! `{"name":"play","link":"movies/dir/a.mp4"}`. The router looks the `name`
//! up in a table built once at startup and runs the bound handler on the
//! calling connection task. Nothing is ever sent back: every failure is
//! logged and the message is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::SharedEngine;
use crate::error::CommandError;
use crate::paths::FolderMap;

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command. `payload` is the whole decoded message.
    async fn handle(&self, payload: &Value) -> Result<(), CommandError>;
}

/// What happened to one inbound message.
#[derive(Debug)]
pub enum Dispatch {
    Handled(String),
    Dropped(CommandError),
}

pub struct CommandRouter {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandRouter {
    pub fn new<I>(handlers: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Box<dyn CommandHandler>)>,
    {
        Self {
            handlers: handlers.into_iter().collect(),
        }
    }

    /// The `play`/`stop` table served on the player endpoint.
    pub fn player(folders: Arc<FolderMap>, engine: SharedEngine) -> Self {
        Self::new([
            (
                "play",
                Box::new(PlayCommand {
                    folders,
                    engine: engine.clone(),
                }) as Box<dyn CommandHandler>,
            ),
            (
                "stop",
                Box::new(StopCommand { engine }) as Box<dyn CommandHandler>,
            ),
        ])
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> + '_ {
        self.handlers.keys().copied()
    }

    /// Decode `raw` and run the matching handler. Never fails the caller.
    pub async fn dispatch(&self, raw: &str) -> Dispatch {
        match self.try_dispatch(raw).await {
            Ok(name) => Dispatch::Handled(name),
            Err(e) => {
                match &e {
                    CommandError::MalformedMessage(_) => tracing::warn!("message not json {raw:?}: {e}"),
                    CommandError::MissingCommandName => tracing::warn!("{raw} has no name"),
                    _ => tracing::warn!("dropped command {raw}: {e}"),
                }
                Dispatch::Dropped(e)
            }
        }
    }

    async fn try_dispatch(&self, raw: &str) -> Result<String, CommandError> {
        let payload: Value = serde_json::from_str(raw).map_err(CommandError::MalformedMessage)?;
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .ok_or(CommandError::MissingCommandName)?;
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        handler.handle(&payload).await?;
        Ok(name.to_string())
    }
}

/// `{"name":"play","link":"<alias>/<path>"}`
struct PlayCommand {
    folders: Arc<FolderMap>,
    engine: SharedEngine,
}

#[async_trait]
impl CommandHandler for PlayCommand {
    async fn handle(&self, payload: &Value) -> Result<(), CommandError> {
        let link = payload
            .get("link")
            .and_then(Value::as_str)
            .ok_or(CommandError::MissingLink)?;
        let file = self.folders.resolve(link)?;
        tracing::debug!("playing {}", file.display());
        self.engine.play(&file).await?;
        Ok(())
    }
}

struct StopCommand {
    engine: SharedEngine,
}

#[async_trait]
impl CommandHandler for StopCommand {
    async fn handle(&self, _payload: &Value) -> Result<(), CommandError> {
        tracing::debug!("calling stop");
        // Engine trouble is the engine's business; stop itself always succeeds.
        if let Err(e) = self.engine.stop().await {
            tracing::warn!("engine stop failed: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DryRunEngine, EngineCall, EngineJournal, PlaybackEngine};
    use crate::error::{EngineError, ResolveError};
    use crate::status::PlaybackStatus;
    use rstest::rstest;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the payload of every call.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Value>>>);

    #[async_trait]
    impl CommandHandler for Recorder {
        async fn handle(&self, payload: &Value) -> Result<(), CommandError> {
            self.0.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn recording_router() -> (CommandRouter, Recorder, Recorder) {
        let (a, b) = (Recorder::default(), Recorder::default());
        let router = CommandRouter::new([
            ("alpha", Box::new(a.clone()) as Box<dyn CommandHandler>),
            ("beta", Box::new(b.clone()) as Box<dyn CommandHandler>),
        ]);
        (router, a, b)
    }

    #[tokio::test]
    async fn dispatches_to_exactly_the_named_handler_once() {
        let (router, alpha, beta) = recording_router();
        let outcome = router.dispatch(r#"{"name":"beta","extra":[1,2]}"#).await;
        assert!(matches!(outcome, Dispatch::Handled(ref n) if n == "beta"));
        assert!(alpha.0.lock().unwrap().is_empty());
        assert_eq!(
            *beta.0.lock().unwrap(),
            vec![serde_json::json!({"name": "beta", "extra": [1, 2]})]
        );
    }

    #[tokio::test]
    async fn unknown_command_invokes_nothing() {
        let (router, alpha, beta) = recording_router();
        let outcome = router.dispatch(r#"{"name":"pause"}"#).await;
        assert!(matches!(outcome, Dispatch::Dropped(CommandError::UnknownCommand(ref n)) if n == "pause"));
        assert!(alpha.0.lock().unwrap().is_empty());
        assert!(beta.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_messages_are_dropped() {
        let (router, alpha, _) = recording_router();
        assert!(matches!(
            router.dispatch("{not json").await,
            Dispatch::Dropped(CommandError::MalformedMessage(_))
        ));
        for raw in [r#"{"link":"x"}"#, r#"{"name":7}"#, r#"["alpha"]"#, "null"] {
            assert!(
                matches!(
                    router.dispatch(raw).await,
                    Dispatch::Dropped(CommandError::MissingCommandName)
                ),
                "{raw}"
            );
        }
        assert!(alpha.0.lock().unwrap().is_empty());
    }

    struct Player {
        router: CommandRouter,
        journal: EngineJournal,
        media: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    fn player() -> Player {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(media.join("dir")).unwrap();
        std::fs::write(media.join("dir/a.mp4"), b"frames").unwrap();
        std::fs::write(dir.path().join("secret"), b"keep out").unwrap();

        let folders = Arc::new(FolderMap::new([("movies", media.clone())]).unwrap());
        let engine = DryRunEngine::new();
        let journal = engine.journal();
        let engine = SharedEngine::new(Box::new(engine), Duration::from_secs(1));
        Player {
            router: CommandRouter::player(folders, engine),
            journal,
            media,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn player_table_has_play_and_stop() {
        let p = player();
        let mut names: Vec<_> = p.router.commands().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["play", "stop"]);
    }

    #[tokio::test]
    async fn play_resolves_the_link_and_calls_the_engine() {
        let p = player();
        let outcome = p
            .router
            .dispatch(r#"{"name":"play","link":"movies/dir/a.mp4"}"#)
            .await;
        assert!(matches!(outcome, Dispatch::Handled(_)), "{outcome:?}");
        assert_eq!(p.journal.played(), vec![p.media.join("dir/a.mp4")]);
    }

    #[tokio::test]
    async fn play_never_reaches_the_engine_for_bad_links() {
        let p = player();
        let cases = [
            (r#"{"name":"play"}"#, "missing link"),
            (r#"{"name":"play","link":42}"#, "non-string link"),
            (r#"{"name":"play","link":"tv/a.mp4"}"#, "unknown alias"),
            (r#"{"name":"play","link":"movies/../secret"}"#, "escape"),
            (r#"{"name":"play","link":"movies/../../etc/passwd"}"#, "escape"),
            (r#"{"name":"play","link":"movies/dir/b.mp4"}"#, "missing file"),
        ];
        for (raw, why) in cases {
            assert!(matches!(p.router.dispatch(raw).await, Dispatch::Dropped(_)), "{why}");
        }
        assert!(p.journal.calls().is_empty());
    }

    #[tokio::test]
    async fn escape_is_reported_as_such() {
        let p = player();
        let outcome = p
            .router
            .dispatch(r#"{"name":"play","link":"movies/../secret"}"#)
            .await;
        assert!(matches!(
            outcome,
            Dispatch::Dropped(CommandError::Resolve(ResolveError::PathEscape { .. }))
        ));
    }

    #[tokio::test]
    async fn stop_ignores_the_payload() {
        let p = player();
        let outcome = p.router.dispatch(r#"{"name":"stop","link":"junk"}"#).await;
        assert!(matches!(outcome, Dispatch::Handled(ref n) if n == "stop"));
        assert_eq!(p.journal.calls(), vec![EngineCall::Stop]);
    }

    /// `play` fails, or never finishes when `hang` is set. `stop` works and
    /// is counted.
    struct Broken {
        hang: bool,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PlaybackEngine for Broken {
        async fn play(&mut self, path: &Path) -> Result<(), EngineError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(EngineError::Command {
                command: format!("loadfile {}", path.display()),
                error: "loading failed".into(),
            })
        }

        async fn stop(&mut self) -> Result<(), EngineError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn status(&mut self) -> Result<PlaybackStatus, EngineError> {
            Ok(PlaybackStatus::idle())
        }

        async fn quit(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn broken_player(hang: bool) -> (CommandRouter, Arc<AtomicUsize>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        std::fs::write(media.join("a.mp4"), b"frames").unwrap();

        let folders = Arc::new(FolderMap::new([("movies", media)]).unwrap());
        let stops = Arc::new(AtomicUsize::new(0));
        let engine = Broken {
            hang,
            stops: stops.clone(),
        };
        let engine = SharedEngine::new(Box::new(engine), Duration::from_secs(3));
        (CommandRouter::player(folders, engine), stops, dir)
    }

    #[rstest]
    #[case::rejected(false)]
    #[case::hung(true)]
    #[tokio::test(start_paused = true)]
    async fn engine_failure_drops_the_command_and_later_ones_still_run(#[case] hang: bool) {
        let (router, stops, _dir) = broken_player(hang);

        let outcome = router
            .dispatch(r#"{"name":"play","link":"movies/a.mp4"}"#)
            .await;
        match outcome {
            Dispatch::Dropped(CommandError::Engine(EngineError::Timeout { op: "play", .. })) => {
                assert!(hang)
            }
            Dispatch::Dropped(CommandError::Engine(EngineError::Command { .. })) => assert!(!hang),
            other => panic!("unexpected outcome {other:?}"),
        }

        let outcome = router.dispatch(r#"{"name":"stop"}"#).await;
        assert!(matches!(outcome, Dispatch::Handled(ref n) if n == "stop"));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}

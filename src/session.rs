//! Per-consumer session state.
//!
//! A [`Session`] owns everything one visualization consumer needs across
//! runs: the resolved configuration, the trace cache (shared by every run in
//! the session), the outbound update channel, and at most one active run.
//! Starting a new visualization disposes the previous run first — its
//! highlight is removed and its producer stream, if still open, is closed,
//! which kills the tracer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::ReplayConfig;
use crate::errors::StartError;
use crate::playback::{run_controller, PlaybackController};
use crate::render::TextProjector;
use crate::trace_cache::{content_hash, TraceCache};
use crate::trace_producer::spawn_trace;
use crate::types::{PlaybackCommand, UiUpdate};

/// How long to wait for a disposed run's controller task to wind down
/// before abandoning it.
const DISPOSE_TIMEOUT: Duration = Duration::from_secs(5);

struct ActiveRun {
    commands: UnboundedSender<PlaybackCommand>,
    task: JoinHandle<()>,
}

pub struct Session {
    pub config: ReplayConfig,
    cache: Arc<Mutex<TraceCache>>,
    ui_tx: UnboundedSender<UiUpdate>,
    active: Option<ActiveRun>,
}

impl Session {
    pub fn new(config: ReplayConfig, ui_tx: UnboundedSender<UiUpdate>) -> std::io::Result<Self> {
        Ok(Self {
            config,
            cache: Arc::new(Mutex::new(TraceCache::new()?)),
            ui_tx,
            active: None,
        })
    }

    /// Starts visualizing `target`, disposing any previous run first.
    ///
    /// If a completed trace for the file's exact content is already cached,
    /// it replays instantly and no tracer is spawned; otherwise a live run
    /// starts.
    pub async fn start_visualization(&mut self, target: &Path) -> Result<(), StartError> {
        self.dispose().await;

        let content =
            tokio::fs::read_to_string(target)
                .await
                .map_err(|err| StartError::ReadTarget {
                    path: target.to_path_buf(),
                    source: err,
                })?;
        let hash = content_hash(&content);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let projector = Box::new(TextProjector);

        let cached = { self.cache.lock().await.exists(&hash) };
        let (controller, stream) = if cached {
            let trace = { self.cache.lock().await.load(&hash)? };
            info!(
                "replaying cached trace for {} ({} elements)",
                target.display(),
                trace.len()
            );
            (
                PlaybackController::from_cache(hash, trace, projector, self.ui_tx.clone()),
                None,
            )
        } else {
            let stream = spawn_trace(&self.config, target).await?;
            info!("tracing {}", target.display());
            (
                PlaybackController::new_live(hash, projector, self.ui_tx.clone()),
                Some(stream),
            )
        };

        let task = tokio::spawn(run_controller(
            controller,
            stream,
            command_rx,
            self.cache.clone(),
        ));
        self.active = Some(ActiveRun {
            commands: command_tx,
            task,
        });
        Ok(())
    }

    /// Forwards a playback command to the active run.
    ///
    /// Returns `false` if no run is active.
    pub fn send_command(&self, command: PlaybackCommand) -> bool {
        match &self.active {
            Some(run) => run.commands.send(command).is_ok(),
            None => false,
        }
    }

    /// Disposes the active run, if any: the controller clears its highlight
    /// and drops its stream, which cancels a still-running tracer.
    pub async fn dispose(&mut self) {
        if let Some(mut run) = self.active.take() {
            drop(run.commands);
            match timeout(DISPOSE_TIMEOUT, &mut run.task).await {
                Ok(_) => {}
                Err(_elapsed) => {
                    warn!("controller task did not wind down in time, aborting it");
                    run.task.abort();
                }
            }
        }
    }
}

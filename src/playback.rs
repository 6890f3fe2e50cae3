//! The playback state machine.
//!
//! The controller owns the (growing or fixed) trace and the current index,
//! and is the only place either is mutated. It consumes producer events and
//! navigation commands strictly in arrival order, emits buttons / content /
//! highlight updates, and hands the finished trace to the cache store when a
//! live stream completes. Navigation behaves identically whether the trace
//! is still streaming, fully streamed, or was loaded from cache.

use std::sync::Arc;

use log::warn;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::highlight::LineHighlighter;
use crate::render::RenderProjector;
use crate::trace_cache::TraceCache;
use crate::trace_producer::{TraceEvent, TraceStream};
use crate::types::{
    ButtonsState, ContentUpdate, NavigationAction, PlaybackCommand, Trace, UiUpdate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// Live run, nothing delivered yet.
    Empty,
    /// Live run, elements still arriving.
    LiveStreaming,
    /// Live run that completed normally; the trace has been cached.
    LiveComplete,
    /// Fixed trace loaded from the cache store.
    ReplayingFromCache,
    /// Terminal: the run ended without completing (protocol failure or
    /// abnormal tracer exit). Delivered elements stay navigable; nothing is
    /// cached and the trace never counts as complete.
    Failed,
}

pub struct PlaybackController {
    trace: Trace,
    index: usize,
    phase: PlaybackPhase,
    file_hash: String,
    projector: Box<dyn RenderProjector>,
    highlighter: LineHighlighter,
    ui_tx: UnboundedSender<UiUpdate>,
}

impl PlaybackController {
    /// A controller for a live run; elements arrive via `handle_event`.
    pub fn new_live(
        file_hash: String,
        projector: Box<dyn RenderProjector>,
        ui_tx: UnboundedSender<UiUpdate>,
    ) -> Self {
        Self {
            trace: Vec::new(),
            index: 0,
            phase: PlaybackPhase::Empty,
            file_hash,
            projector,
            highlighter: LineHighlighter::new(),
            ui_tx,
        }
    }

    /// A controller over a previously cached trace; the length is fixed up
    /// front and an initial refresh is emitted immediately.
    pub fn from_cache(
        file_hash: String,
        trace: Trace,
        projector: Box<dyn RenderProjector>,
        ui_tx: UnboundedSender<UiUpdate>,
    ) -> Self {
        let mut controller = Self {
            trace,
            index: 0,
            phase: PlaybackPhase::ReplayingFromCache,
            file_hash,
            projector,
            highlighter: LineHighlighter::new(),
            ui_tx,
        };
        controller.emit_buttons();
        if !controller.trace.is_empty() {
            controller.emit_content();
            controller.emit_highlight();
        }
        controller
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    /// Applies one producer event.
    pub fn handle_event(&mut self, event: TraceEvent, cache: &mut TraceCache) {
        match event {
            TraceEvent::Element(element) => {
                let first = self.trace.is_empty();
                if self.phase == PlaybackPhase::Empty {
                    self.phase = PlaybackPhase::LiveStreaming;
                }
                self.trace.push(element);
                self.emit_buttons();
                self.emit_content();
                if first {
                    // Reveal execution start; afterwards the index (and so
                    // the highlight) stays under user control.
                    self.emit_highlight();
                }
            }
            TraceEvent::Complete => {
                self.phase = PlaybackPhase::LiveComplete;
                if let Err(err) = cache.store(&self.file_hash, &self.trace) {
                    warn!("caching completed trace failed: {err}");
                }
                self.emit_content();
            }
            TraceEvent::Failed { reason } => {
                warn!("trace stream failed: {reason}");
                self.phase = PlaybackPhase::Failed;
                self.emit_content();
            }
        }
    }

    pub fn handle_command(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Navigate(action) => self.navigate(action),
            PlaybackCommand::Seek(index) => self.seek(index),
        }
    }

    pub fn navigate(&mut self, action: NavigationAction) {
        let target = match action {
            NavigationAction::First => 0,
            NavigationAction::Prev => self.index.saturating_sub(1),
            NavigationAction::Next => self.index + 1,
            NavigationAction::Last => self.trace.len().saturating_sub(1),
        };
        self.seek(target);
    }

    /// Moves to `index`, clamped into `[0, length-1]`; a no-op at a boundary
    /// stays put, never errors.
    pub fn seek(&mut self, index: usize) {
        if self.trace.is_empty() {
            self.emit_buttons();
            return;
        }
        self.index = index.min(self.trace.len() - 1);
        self.emit_buttons();
        self.emit_content();
        self.emit_highlight();
    }

    pub fn forward_log(&mut self, text: String) {
        let _ = self.ui_tx.send(UiUpdate::Log { text });
    }

    /// Tears the playback surface down: removes any active highlight.
    /// Closing the producer stream is the caller's job (it owns it).
    pub fn dispose(&mut self) {
        self.highlighter.clear(&self.ui_tx);
    }

    fn trace_complete(&self) -> bool {
        matches!(
            self.phase,
            PlaybackPhase::LiveComplete | PlaybackPhase::ReplayingFromCache
        )
    }

    fn emit_buttons(&mut self) {
        let len = self.trace.len();
        let _ = self.ui_tx.send(UiUpdate::ButtonsState(ButtonsState {
            next: len > 0 && self.index < len - 1,
            prev: self.index > 0,
            first: self.index > 0,
            last: len > 0 && self.index != len - 1,
        }));
    }

    fn emit_content(&mut self) {
        let element = match self.trace.get(self.index) {
            Some(element) => element,
            None => return,
        };
        let _ = self.ui_tx.send(UiUpdate::Content(ContentUpdate {
            trace_complete: self.trace_complete(),
            element: self.projector.project(element),
            index: self.index,
            length: self.trace.len(),
        }));
    }

    fn emit_highlight(&mut self) {
        let (path, line) = match self.trace.get(self.index) {
            Some(element) => (element.file_path.clone(), element.line),
            None => return,
        };
        self.highlighter.relocate(&self.ui_tx, &path, line);
    }
}

/// Drives one controller until the consumer drops the command channel.
///
/// Producer events, log text and commands are interleaved strictly in
/// arrival order. Dropping the command sender is the disposal signal: the
/// highlight is cleared and the stream (if still open) is dropped, which
/// cancels the producer run.
pub async fn run_controller(
    mut controller: PlaybackController,
    mut stream: Option<TraceStream>,
    mut commands: UnboundedReceiver<PlaybackCommand>,
    cache: Arc<Mutex<TraceCache>>,
) {
    let mut elements_open = stream.is_some();
    let mut logs_open = stream.is_some();

    loop {
        if stream.is_some() && !elements_open && !logs_open {
            // The producer run is over; only commands remain.
            stream = None;
        }
        match stream.as_mut() {
            Some(active) => {
                tokio::select! {
                    command = commands.recv() => match command {
                        Some(command) => controller.handle_command(command),
                        None => break,
                    },
                    event = active.elements.recv(), if elements_open => match event {
                        Some(event) => {
                            let mut cache = cache.lock().await;
                            controller.handle_event(event, &mut cache);
                        }
                        None => elements_open = false,
                    },
                    text = active.logs.recv(), if logs_open => match text {
                        Some(text) => controller.forward_log(text),
                        None => logs_open = false,
                    },
                }
            }
            None => match commands.recv().await {
                Some(command) => controller.handle_command(command),
                None => break,
            },
        }
    }

    controller.dispose();
    // Dropping `stream` here closes the element channel; a still-running
    // producer treats that as "stop now" and kills the tracer.
}

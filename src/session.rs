use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glam::DVec2;

use crate::catalog::{Answer, Answerer, AskRequest, Catalog};
use crate::distance::DistanceTable;
use crate::error::{FailureClass, Result, VerbumError};
use crate::explorer::{Activation, Explorer};
use crate::geometry::Rect;
use crate::hierarchy::{is_openable_document, HierarchyNode};
use crate::layout::LayoutConfig;
use crate::viewer::DocumentViewer;

/// Progress of the initial hierarchy + root distances load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Failed { message: String },
    Ready,
}

/// What the answer area shows.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerDisplay {
    Empty,
    Answered(Answer),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionOutcome {
    /// Blank text; nothing was sent.
    Ignored,
    /// No document is open; nothing was sent.
    NoDocument,
    Sent { id: u64 },
}

/// A recoverable failure, kept for the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub class: FailureClass,
    pub message: String,
}

impl From<&VerbumError> for Fault {
    fn from(err: &VerbumError) -> Self {
        Self {
            class: err.failure_class(),
            message: err.to_string(),
        }
    }
}

enum SessionEvent {
    Loaded {
        result: Result<(HierarchyNode, DistanceTable)>,
        generation: u64,
    },
    LevelDistances {
        path: Vec<String>,
        result: Result<DistanceTable>,
        generation: u64,
    },
    DocumentShown {
        path: String,
        result: Result<()>,
    },
    Answered {
        id: u64,
        result: Result<Answer>,
    },
    ReloadRequested,
}

/// Cloneable handle that asks a session to reload from another thread.
#[derive(Clone)]
pub struct ReloadHandle {
    tx: Sender<SessionEvent>,
}

impl ReloadHandle {
    pub fn request(&self) {
        // A closed session has nothing left to reload.
        let _ = self.tx.send(SessionEvent::ReloadRequested);
    }
}

/// Event-driven controller tying a catalog, an answerer and a viewer to an explorer.
///
/// Network and disk work runs on background threads; every state change happens
/// on the owner's thread inside [`Session::poll`] or [`Session::wait_idle`].
pub struct Session {
    catalog: Arc<dyn Catalog>,
    answerer: Arc<dyn Answerer>,
    viewer: Arc<dyn DocumentViewer>,
    canvas: Rect,
    config: LayoutConfig,
    state: LoadState,
    explorer: Option<Explorer>,
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
    generation: u64,
    reloading: bool,
    level_requests: HashSet<Vec<String>>,
    pending_documents: usize,
    open_document: Option<String>,
    answer: AnswerDisplay,
    pending_questions: usize,
    next_question: u64,
    fault: Option<Fault>,
}

impl Session {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        answerer: Arc<dyn Answerer>,
        viewer: Arc<dyn DocumentViewer>,
        canvas: Rect,
        config: LayoutConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            catalog,
            answerer,
            viewer,
            canvas,
            config,
            state: LoadState::Idle,
            explorer: None,
            tx,
            rx,
            generation: 0,
            reloading: false,
            level_requests: HashSet::new(),
            pending_documents: 0,
            open_document: None,
            answer: AnswerDisplay::Empty,
            pending_questions: 0,
            next_question: 0,
            fault: None,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn explorer(&self) -> Option<&Explorer> {
        self.explorer.as_ref()
    }

    pub fn source(&self) -> String {
        self.catalog.describe()
    }

    pub fn open_document(&self) -> Option<&str> {
        self.open_document.as_deref()
    }

    pub fn answer(&self) -> &AnswerDisplay {
        &self.answer
    }

    pub fn is_question_pending(&self) -> bool {
        self.pending_questions > 0
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state == LoadState::Loading
            || self.reloading
            || !self.level_requests.is_empty()
            || self.pending_documents > 0
            || self.pending_questions > 0
    }

    /// Fetch the hierarchy and root distances concurrently.
    /// Nothing renders unless both succeed.
    pub fn start(&mut self) {
        if self.state == LoadState::Loading {
            return;
        }
        self.state = LoadState::Loading;
        tracing::info!("Loading catalog from {}", self.catalog.describe());
        self.spawn_load();
    }

    /// Re-fetch everything, keeping the current path when it still resolves.
    pub fn reload(&mut self) {
        if self.explorer.is_none() {
            self.start();
            return;
        }
        if self.reloading {
            return;
        }
        self.reloading = true;
        self.spawn_load();
    }

    fn spawn_load(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let catalog = self.catalog.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = catalog.load();
            let _ = tx.send(SessionEvent::Loaded { result, generation });
        });
    }

    /// Apply every event that has arrived. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Block until no background work is outstanding or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            if !self.is_busy() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return !self.is_busy();
                }
            }
        }
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Loaded { result, generation } => self.on_loaded(result, generation),
            SessionEvent::LevelDistances {
                path,
                result,
                generation,
            } => {
                // A stale reply must not clear the request issued for this generation.
                if generation != self.generation {
                    return;
                }
                self.level_requests.remove(&path);
                let table = result.unwrap_or_else(|err| {
                    tracing::warn!("No distances for /{}: {}", path.join("/"), err);
                    DistanceTable::new()
                });
                if let Some(explorer) = self.explorer.as_mut() {
                    explorer.provide_distances(path, table);
                }
            }
            SessionEvent::DocumentShown { path, result } => {
                self.pending_documents = self.pending_documents.saturating_sub(1);
                if let Err(err) = result {
                    tracing::warn!("Could not show {}: {}", path, err);
                    self.fault = Some(Fault::from(&err));
                }
            }
            SessionEvent::Answered { id, result } => {
                self.pending_questions = self.pending_questions.saturating_sub(1);
                tracing::debug!("Answer {} arrived", id);
                self.answer = match result {
                    Ok(answer) => AnswerDisplay::Answered(answer),
                    Err(err) => {
                        tracing::warn!("Question {} failed: {}", id, err);
                        AnswerDisplay::Failed(err.to_string())
                    }
                };
            }
            SessionEvent::ReloadRequested => self.reload(),
        }
    }

    fn on_loaded(&mut self, result: Result<(HierarchyNode, DistanceTable)>, generation: u64) {
        if generation != self.generation {
            return;
        }
        let was_reload = self.reloading;
        self.reloading = false;

        match (result, self.explorer.as_mut()) {
            (Ok((hierarchy, distances)), Some(explorer)) => {
                tracing::info!("Reloaded hierarchy ({} nodes)", hierarchy.len());
                self.level_requests.clear();
                if let Err(err) = explorer.replace_hierarchy(hierarchy, Some(distances)) {
                    self.fault = Some(Fault::from(&err));
                }
                self.state = LoadState::Ready;
                self.request_missing_distances();
            }
            (Ok((hierarchy, distances)), None) => {
                tracing::info!(
                    "Loaded hierarchy ({} nodes, {} root distances)",
                    hierarchy.len(),
                    distances.len()
                );
                self.explorer = Some(Explorer::new(
                    hierarchy,
                    distances,
                    self.canvas,
                    self.config.clone(),
                ));
                self.state = LoadState::Ready;
            }
            (Err(err), Some(_)) if was_reload => {
                tracing::warn!("Reload failed, keeping current tree: {}", err);
                self.fault = Some(Fault::from(&err));
            }
            (Err(err), _) => {
                tracing::error!("Initial load failed: {}", err);
                self.explorer = None;
                self.fault = Some(Fault::from(&err));
                self.state = LoadState::Failed {
                    message: err.to_string(),
                };
            }
        }
    }

    fn request_missing_distances(&mut self) {
        let Some(path) = self.explorer.as_ref().and_then(Explorer::missing_distances) else {
            return;
        };
        if !self.level_requests.insert(path.clone()) {
            return;
        }
        let catalog = self.catalog.clone();
        let tx = self.tx.clone();
        let generation = self.generation;
        thread::spawn(move || {
            let result = catalog.level_distances(&path);
            let _ = tx.send(SessionEvent::LevelDistances {
                path,
                result,
                generation,
            });
        });
    }

    fn after_activation(&mut self, result: Result<Activation>) -> Option<Activation> {
        match result {
            Ok(activation) => {
                match &activation {
                    Activation::Descended {
                        needs_distances: true,
                        ..
                    } => self.request_missing_distances(),
                    Activation::OpenDocument { path } => self.show_document(path.clone()),
                    Activation::Descended { .. } | Activation::Ignored { .. } => {}
                }
                Some(activation)
            }
            Err(err) => {
                tracing::warn!("Navigation aborted: {}", err);
                self.fault = Some(Fault::from(&err));
                None
            }
        }
    }

    /// Activate the cell under a canvas point.
    pub fn click(&mut self, point: DVec2) -> Option<Activation> {
        let explorer = self.explorer.as_mut()?;
        self.fault = None;
        let result = explorer.click(point).transpose()?;
        self.after_activation(result)
    }

    /// Activate a cell of the current view by index.
    pub fn activate(&mut self, index: usize) -> Option<Activation> {
        let explorer = self.explorer.as_mut()?;
        self.fault = None;
        let result = explorer.activate(index);
        self.after_activation(result)
    }

    fn navigate(&mut self, step: impl FnOnce(&mut Explorer) -> Result<()>) {
        let Some(explorer) = self.explorer.as_mut() else {
            return;
        };
        self.fault = None;
        match step(explorer) {
            Ok(()) => self.request_missing_distances(),
            Err(err) => {
                tracing::warn!("Navigation aborted: {}", err);
                self.fault = Some(Fault::from(&err));
            }
        }
    }

    pub fn jump_to_root(&mut self) {
        self.navigate(|explorer| {
            explorer.jump_to_root();
            Ok(())
        });
    }

    pub fn jump_to_ancestor(&mut self, depth: usize) {
        self.navigate(|explorer| explorer.jump_to_ancestor(depth));
    }

    pub fn jump_to_breadcrumb(&mut self, index: usize) {
        self.navigate(|explorer| explorer.jump_to_breadcrumb(index));
    }

    pub fn ascend(&mut self) {
        self.navigate(Explorer::ascend);
    }

    pub fn resize(&mut self, canvas: Rect) {
        self.canvas = canvas;
        if let Some(explorer) = self.explorer.as_mut() {
            explorer.resize(canvas);
        }
    }

    /// Fetch and display a document. Navigation is unchanged.
    pub fn show_document(&mut self, path: String) {
        if !is_openable_document(&path) {
            tracing::warn!("Not opening unsupported document {}", path);
            self.fault = Some(Fault::from(&VerbumError::UnsupportedDocument { path }));
            return;
        }
        if self.open_document.as_deref() != Some(path.as_str()) {
            self.answer = AnswerDisplay::Empty;
        }
        self.open_document = Some(path.clone());
        self.pending_documents += 1;

        let catalog = self.catalog.clone();
        let viewer = self.viewer.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = catalog
                .document(&path)
                .and_then(|bytes| viewer.show(&path, &bytes));
            let _ = tx.send(SessionEvent::DocumentShown { path, result });
        });
    }

    /// Ask about the open document. Blank text or no open document sends nothing
    /// and leaves the answer area as it was. Submissions may overlap; the last
    /// reply to arrive is the one displayed.
    pub fn submit_question(&mut self, text: &str) -> QuestionOutcome {
        let question = text.trim();
        if question.is_empty() {
            return QuestionOutcome::Ignored;
        }
        let Some(document) = self.open_document.clone() else {
            return QuestionOutcome::NoDocument;
        };

        self.next_question += 1;
        let id = self.next_question;
        self.pending_questions += 1;

        let request = AskRequest {
            question: question.to_string(),
            document,
        };
        let answerer = self.answerer.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = answerer.ask(&request);
            let _ = tx.send(SessionEvent::Answered { id, result });
        });
        QuestionOutcome::Sent { id }
    }
}

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::crawler::LibraryCrawler;
use crate::error::Result;

/// Quiet period after the last change before a reload is requested.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Collapses bursts of changes into one notification per quiet period.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pending: usize,
    last_change: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: 0,
            last_change: None,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.pending += 1;
        self.last_change = Some(now);
    }

    /// Number of changes batched, once the window has passed since the last one.
    pub fn due(&mut self, now: Instant) -> Option<usize> {
        let last = self.last_change?;
        if now.duration_since(last) < self.window {
            return None;
        }
        let batched = self.pending;
        self.pending = 0;
        self.last_change = None;
        Some(batched)
    }
}

/// Whether an event touches visible library content.
fn is_relevant(event: &Event, root: &Path) -> bool {
    let kind_matters = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matters
        && event.paths.iter().any(|path| {
            let relative = path.strip_prefix(root).unwrap_or(path);
            !relative.components().any(|component| match component {
                Component::Normal(part) => LibraryCrawler::is_hidden(&part.to_string_lossy()),
                _ => false,
            })
        })
}

/// Background watcher over a library directory.
pub struct LibraryWatcher {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LibraryWatcher {
    /// Watch `root` recursively and call `on_change` with the batch size after each quiet period.
    pub fn spawn<F>(root: &Path, debounce: Duration, on_change: F) -> Result<Self>
    where
        F: Fn(usize) + Send + 'static,
    {
        // Events arrive with canonical paths on some platforms.
        let root: PathBuf = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            // The receiver is gone once the watcher thread stops.
            let _ = tx.send(res);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!("Watching {} for changes", root.display());

        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();

        let handle = thread::spawn(move || {
            // Keep the watcher alive for the lifetime of the thread.
            let _watcher = watcher;
            let mut debouncer = Debouncer::new(debounce);

            while running_thread.load(Ordering::Relaxed) {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(Ok(event)) => {
                        if is_relevant(&event, &root) {
                            debouncer.record(Instant::now());
                        }
                    }
                    Ok(Err(err)) => tracing::warn!("Watch error: {}", err),
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        tracing::error!("Watcher channel disconnected");
                        break;
                    }
                }

                if let Some(batched) = debouncer.due(Instant::now()) {
                    tracing::info!("Library changed ({} events), reloading", batched);
                    on_change(batched);
                }
            }
        });

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

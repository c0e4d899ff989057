use jwalk::WalkDir;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Result, VerbumError};

/// One file or folder under the library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    /// Path relative to the library root.
    pub relative: PathBuf,
    pub size: u64,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub total_documents: u64,
    pub total_folders: u64,
    pub total_size: u64,
    pub duration_ms: u128,
}

/// Parallel walker over a document library. Hidden entries are never visited.
pub struct LibraryCrawler {
    document_count: Arc<AtomicU64>,
    folder_count: Arc<AtomicU64>,
    total_size: Arc<AtomicU64>,
}

impl LibraryCrawler {
    pub fn new() -> Self {
        Self {
            document_count: Arc::new(AtomicU64::new(0)),
            folder_count: Arc::new(AtomicU64::new(0)),
            total_size: Arc::new(AtomicU64::new(0)),
        }
    }

    fn processing_parallelism() -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cores * 2).clamp(4, 64)
    }

    /// Names starting with a dot are hidden.
    pub fn is_hidden(name: &str) -> bool {
        name.starts_with('.')
    }

    /// Walk `root` and return every visible entry, sorted by relative path.
    pub fn scan<P: AsRef<Path>>(&mut self, root: P) -> Result<(Vec<LibraryEntry>, ScanStats)> {
        let root_path = root.as_ref().to_path_buf();
        if !root_path.is_dir() {
            return Err(VerbumError::MissingPath { path: root_path });
        }
        let start = Instant::now();

        self.document_count.store(0, Ordering::Relaxed);
        self.folder_count.store(0, Ordering::Relaxed);
        self.total_size.store(0, Ordering::Relaxed);

        let scan_threads = Self::processing_parallelism();

        let walker = WalkDir::new(&root_path)
            .skip_hidden(false)
            .sort(true)
            .parallelism(jwalk::Parallelism::RayonNewPool(scan_threads))
            .process_read_dir(|depth, _, _, children| {
                // The root itself arrives with no depth and is always kept.
                if depth.is_none() {
                    return;
                }
                children.retain(|entry| {
                    entry
                        .as_ref()
                        .map(|dir_entry| !Self::is_hidden(&dir_entry.file_name().to_string_lossy()))
                        .unwrap_or(true)
                });
            })
            .into_iter();

        let mut entries = Vec::new();
        for entry in walker {
            match entry {
                // Depth 0 is the root itself.
                Ok(entry) if entry.depth == 0 => {}
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::warn!("Skipping unreadable library entry: {}", err),
            }
        }

        let document_count = self.document_count.clone();
        let folder_count = self.folder_count.clone();
        let total_size = self.total_size.clone();
        let root_for_workers = root_path.clone();

        let process_entries = || {
            entries
                .par_iter()
                .filter_map(|entry| {
                    let path = entry.path();
                    let metadata = entry.metadata().ok()?;
                    let relative = path.strip_prefix(&root_for_workers).ok()?.to_path_buf();

                    let size = metadata.len();
                    let is_dir = metadata.is_dir();

                    if is_dir {
                        folder_count.fetch_add(1, Ordering::Relaxed);
                    } else {
                        document_count.fetch_add(1, Ordering::Relaxed);
                        total_size.fetch_add(size, Ordering::Relaxed);
                    }

                    Some(LibraryEntry {
                        relative,
                        size,
                        is_dir,
                    })
                })
                .collect::<Vec<_>>()
        };

        let mut nodes = ThreadPoolBuilder::new()
            .num_threads(scan_threads)
            .build()
            .map(|pool| pool.install(process_entries))
            .unwrap_or_else(|_| process_entries());
        nodes.sort_by(|a, b| a.relative.cmp(&b.relative));

        let stats = ScanStats {
            total_documents: self.document_count.load(Ordering::Relaxed),
            total_folders: self.folder_count.load(Ordering::Relaxed),
            total_size: self.total_size.load(Ordering::Relaxed),
            duration_ms: start.elapsed().as_millis(),
        };

        tracing::info!(
            "Scanned {}: {} documents in {} folders ({} ms)",
            root_path.display(),
            stats.total_documents,
            stats.total_folders,
            stats.duration_ms
        );

        Ok((nodes, stats))
    }
}

impl Default for LibraryCrawler {
    fn default() -> Self {
        Self::new()
    }
}

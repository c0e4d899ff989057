use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::catalog::Catalog;
use crate::crawler::{LibraryCrawler, ScanStats};
use crate::distance::DistanceTable;
use crate::error::{Result, VerbumError};
use crate::hierarchy::HierarchyNode;
use crate::semantic::SemanticIndex;
use crate::tree::LibraryTree;

/// One scan of the library and the vectors derived from it.
struct Snapshot {
    hierarchy: HierarchyNode,
    index: SemanticIndex,
}

impl Snapshot {
    fn level_distances(&self, path: &[String]) -> Result<DistanceTable> {
        self.index.level_distances(&self.hierarchy, path)
    }
}

/// Catalog over a documents directory on disk.
///
/// Every `hierarchy()` call rescans the directory and replaces the snapshot
/// that level distances are computed from. Rescans are serialized and each
/// snapshot owns its vector cache.
pub struct LocalLibrary {
    root: PathBuf,
    scan_lock: Mutex<()>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    last_stats: RwLock<ScanStats>,
}

impl LocalLibrary {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(VerbumError::MissingPath { path: root });
        }
        Ok(Self {
            root,
            scan_lock: Mutex::new(()),
            snapshot: RwLock::new(None),
            last_stats: RwLock::new(ScanStats::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn last_stats(&self) -> ScanStats {
        self.last_stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn rescan(&self) -> Result<Arc<Snapshot>> {
        let _guard = self.scan_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut crawler = LibraryCrawler::new();
        let (entries, stats) = crawler.scan(&self.root)?;
        let snapshot = Arc::new(Snapshot {
            hierarchy: LibraryTree::from_entries(&entries).to_hierarchy(),
            index: SemanticIndex::new(),
        });

        if let Ok(mut slot) = self.snapshot.write() {
            *slot = Some(snapshot.clone());
        }
        if let Ok(mut slot) = self.last_stats.write() {
            *slot = stats;
        }
        Ok(snapshot)
    }

    fn current(&self) -> Result<Arc<Snapshot>> {
        let cached = self
            .snapshot
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().cloned());
        match cached {
            Some(snapshot) => Ok(snapshot),
            None => self.rescan(),
        }
    }

    /// Resolve a `/`-separated document path inside the library root.
    pub fn resolve_document(&self, relative: &str) -> Result<PathBuf> {
        let escape = || VerbumError::PathEscape {
            path: relative.to_string(),
        };

        let candidate = Path::new(relative);
        let mut resolved = self.root.clone();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(escape())
                }
            }
        }

        if !resolved.is_file() {
            return Err(VerbumError::MissingPath { path: resolved });
        }
        // Symlinks may still point outside.
        let canonical_root = fs::canonicalize(&self.root)?;
        let canonical = fs::canonicalize(&resolved)?;
        if !canonical.starts_with(&canonical_root) {
            return Err(escape());
        }
        Ok(canonical)
    }
}

impl Catalog for LocalLibrary {
    fn hierarchy(&self) -> Result<HierarchyNode> {
        Ok(self.rescan()?.hierarchy.clone())
    }

    fn level_distances(&self, path: &[String]) -> Result<DistanceTable> {
        self.current()?.level_distances(path)
    }

    fn load(&self) -> Result<(HierarchyNode, DistanceTable)> {
        let snapshot = self.rescan()?;
        let distances = snapshot.level_distances(&[])?;
        Ok((snapshot.hierarchy.clone(), distances))
    }

    fn document(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve_document(path)?;
        tracing::info!("Reading document {}", resolved.display());
        Ok(fs::read(resolved)?)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Physics/Quantum")).unwrap();
        fs::create_dir_all(root.join("History")).unwrap();
        fs::write(root.join("Physics/Quantum/fields.pdf"), b"%PDF fields").unwrap();
        fs::write(root.join("Physics/intro.pdf"), b"%PDF intro").unwrap();
        fs::write(root.join("History/rome.pdf"), b"%PDF rome").unwrap();
        fs::write(root.join("loose.pdf"), b"%PDF loose").unwrap();
        dir
    }

    #[test]
    fn test_hierarchy_matches_library_layout() {
        let dir = populated();
        let library = LocalLibrary::open(dir.path()).unwrap();
        let root = library.hierarchy().unwrap();

        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["History", "Physics"]);
        let intro = root.walk(&["Physics", "intro.pdf"]).unwrap();
        assert_eq!(intro.kind.document_path(), Some("Physics/intro.pdf"));
        assert_eq!(library.last_stats().total_documents, 4);
    }

    #[test]
    fn test_level_distances_for_root_and_nested() {
        let dir = populated();
        let library = LocalLibrary::open(dir.path()).unwrap();
        let root_table = library.level_distances(&[]).unwrap();
        assert_eq!(root_table.len(), 1);
        assert!(root_table.get("History", "Physics").is_some());

        let nested = library.level_distances(&["Physics".to_string()]).unwrap();
        assert!(nested.get("Quantum", "intro.pdf").is_some());
    }

    #[test]
    fn test_documents_are_served_from_inside_root() {
        let dir = populated();
        let library = LocalLibrary::open(dir.path()).unwrap();
        assert_eq!(library.document("Physics/intro.pdf").unwrap(), b"%PDF intro");

        assert!(matches!(
            library.document("../etc/passwd"),
            Err(VerbumError::PathEscape { .. })
        ));
        assert!(matches!(
            library.document("/etc/passwd"),
            Err(VerbumError::PathEscape { .. })
        ));
        assert!(matches!(
            library.document("Physics/missing.pdf"),
            Err(VerbumError::MissingPath { .. })
        ));
    }

    #[test]
    fn test_rescan_picks_up_new_folders() {
        let dir = populated();
        let library = LocalLibrary::open(dir.path()).unwrap();
        assert_eq!(library.hierarchy().unwrap().children.len(), 2);
        fs::create_dir_all(dir.path().join("Art")).unwrap();
        assert_eq!(library.hierarchy().unwrap().children.len(), 3);
    }

    #[test]
    fn test_load_distances_cover_folder_added_between_loads() {
        let dir = populated();
        let library = LocalLibrary::open(dir.path()).unwrap();
        let (first, table) = library.load().unwrap();
        assert_eq!(first.children.len(), 2);
        assert_eq!(table.len(), 1);

        fs::create_dir_all(dir.path().join("Art")).unwrap();
        fs::write(dir.path().join("Art/fresco.pdf"), b"%PDF fresco").unwrap();
        let (second, table) = library.load().unwrap();
        let names: Vec<_> = second.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Art", "History", "Physics"]);
        assert_eq!(table.len(), 3);
        assert!(table.get("Art", "Physics").is_some());
        assert!(table.get("Art", "History").is_some());

        let again = library.level_distances(&[]).unwrap();
        assert_eq!(again, table);
    }

    #[test]
    fn test_concurrent_loads_stay_consistent() {
        let dir = populated();
        let library = Arc::new(LocalLibrary::open(dir.path()).unwrap());
        library.load().unwrap();
        fs::create_dir_all(dir.path().join("Art")).unwrap();
        fs::write(dir.path().join("Art/fresco.pdf"), b"%PDF fresco").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let library = library.clone();
                std::thread::spawn(move || library.load().unwrap())
            })
            .collect();
        for handle in handles {
            let (hierarchy, table) = handle.join().unwrap();
            let folders = hierarchy.children.len();
            assert_eq!(table.len(), folders * (folders - 1) / 2);
        }
        let table = library.level_distances(&[]).unwrap();
        assert!(table.get("Art", "History").is_some());
    }

    #[test]
    fn test_open_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalLibrary::open(dir.path().join("nope")).is_err());
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use verbum::catalog::{Answer, Answerer, AskRequest, Catalog};
use verbum::session::{AnswerDisplay, LoadState, QuestionOutcome, Session};
use verbum::viewer::DocumentViewer;
use verbum::{DistanceTable, FailureClass, HierarchyNode, LayoutConfig, LayoutMode, Rect, Result};

const WAIT: Duration = Duration::from_secs(10);

struct MemoryCatalog {
    hierarchy: Mutex<HierarchyNode>,
    levels: Mutex<Vec<(Vec<String>, DistanceTable)>>,
    level_calls: AtomicUsize,
}

impl MemoryCatalog {
    fn new(hierarchy: HierarchyNode) -> Self {
        Self {
            hierarchy: Mutex::new(hierarchy),
            levels: Mutex::new(Vec::new()),
            level_calls: AtomicUsize::new(0),
        }
    }

    fn with_level(self, path: &[&str], table: DistanceTable) -> Self {
        let path = path.iter().map(|s| s.to_string()).collect();
        self.levels.lock().unwrap().push((path, table));
        self
    }

    fn replace(&self, hierarchy: HierarchyNode) {
        *self.hierarchy.lock().unwrap() = hierarchy;
    }
}

impl Catalog for MemoryCatalog {
    fn hierarchy(&self) -> Result<HierarchyNode> {
        Ok(self.hierarchy.lock().unwrap().clone())
    }

    fn level_distances(&self, path: &[String]) -> Result<DistanceTable> {
        self.level_calls.fetch_add(1, Ordering::SeqCst);
        let levels = self.levels.lock().unwrap();
        Ok(levels
            .iter()
            .find(|(level, _)| level.as_slice() == path)
            .map(|(_, table)| table.clone())
            .unwrap_or_default())
    }

    fn document(&self, path: &str) -> Result<Vec<u8>> {
        Ok(format!("%PDF {}", path).into_bytes())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Answers after a per-question delay, counting calls.
#[derive(Default)]
struct ScriptedAnswerer {
    calls: AtomicUsize,
}

impl Answerer for ScriptedAnswerer {
    fn ask(&self, request: &AskRequest) -> Result<Answer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.question.starts_with("slow") {
            thread::sleep(Duration::from_millis(400));
        }
        Ok(Answer::new(format!("re: {}", request.question), 0.75))
    }
}

#[derive(Default)]
struct RecordingViewer {
    shown: Mutex<Vec<(String, Vec<u8>)>>,
}

impl DocumentViewer for RecordingViewer {
    fn show(&self, path: &str, content: &[u8]) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((path.to_string(), content.to_vec()));
        Ok(())
    }
}

fn scenario_tree() -> HierarchyNode {
    HierarchyNode::root(vec![HierarchyNode::folder(
        "A",
        vec![HierarchyNode::document("doc1.pdf", "A/doc1.pdf")],
    )])
}

fn library_tree() -> HierarchyNode {
    HierarchyNode::root(vec![
        HierarchyNode::folder(
            "Physics",
            vec![
                HierarchyNode::folder("Quantum", vec![]),
                HierarchyNode::document("intro.pdf", "Physics/intro.pdf"),
                HierarchyNode::document("notes.txt", "Physics/notes.txt"),
            ],
        ),
        HierarchyNode::folder("History", vec![]),
    ])
}

struct Harness {
    session: Session,
    catalog: Arc<MemoryCatalog>,
    answerer: Arc<ScriptedAnswerer>,
    viewer: Arc<RecordingViewer>,
}

fn harness(catalog: MemoryCatalog) -> Harness {
    let catalog = Arc::new(catalog);
    let answerer = Arc::new(ScriptedAnswerer::default());
    let viewer = Arc::new(RecordingViewer::default());
    let mut session = Session::new(
        catalog.clone(),
        answerer.clone(),
        viewer.clone(),
        Rect::from_size(800.0, 600.0),
        LayoutConfig::default(),
    );
    session.start();
    assert!(session.wait_idle(WAIT));
    assert_eq!(session.state(), &LoadState::Ready);
    Harness {
        session,
        catalog,
        answerer,
        viewer,
    }
}

fn path_of(session: &Session) -> Vec<String> {
    session.explorer().unwrap().path().to_vec()
}

#[test]
fn single_folder_scenario_opens_document_without_moving() {
    let mut h = harness(MemoryCatalog::new(scenario_tree()));
    let canvas = Rect::from_size(800.0, 600.0);

    let view = h.session.explorer().unwrap().view();
    assert_eq!(view.mode, LayoutMode::Circular);
    assert_eq!(view.cells.len(), 1);
    let inset = canvas.inset(LayoutConfig::default().margin);
    assert!((view.cells[0].polygon.area() - inset.area()).abs() < 1e-6);

    h.session.click(canvas.center());
    assert!(h.session.wait_idle(WAIT));
    assert_eq!(path_of(&h.session), vec!["A"]);
    let names: Vec<_> = h
        .session
        .explorer()
        .unwrap()
        .view()
        .cells
        .iter()
        .map(|cell| cell.point.name.clone())
        .collect();
    assert_eq!(names, vec!["doc1.pdf"]);

    h.session.click(canvas.center());
    assert!(h.session.wait_idle(WAIT));
    assert_eq!(path_of(&h.session), vec!["A"]);
    assert_eq!(h.session.open_document(), Some("A/doc1.pdf"));

    let shown = h.viewer.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0, "A/doc1.pdf");
    assert_eq!(shown[0].1, b"%PDF A/doc1.pdf");
}

#[test]
fn descending_fetches_level_distances_once() {
    let mut table = DistanceTable::new();
    table.insert("Quantum", "intro.pdf", 0.4).unwrap();
    let catalog = MemoryCatalog::new(library_tree()).with_level(&["Physics"], table);
    let mut h = harness(catalog);
    assert_eq!(h.catalog.level_calls.load(Ordering::SeqCst), 1);

    let physics = h
        .session
        .explorer()
        .unwrap()
        .view()
        .cells
        .iter()
        .position(|cell| cell.point.name == "Physics")
        .unwrap();
    h.session.activate(physics);
    assert!(h.session.wait_idle(WAIT));
    assert_eq!(h.catalog.level_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.session.explorer().unwrap().view().mode, LayoutMode::Force);

    h.session.jump_to_root();
    h.session.activate(physics);
    assert!(h.session.wait_idle(WAIT));
    assert_eq!(h.catalog.level_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn unsupported_documents_are_not_opened() {
    let mut h = harness(MemoryCatalog::new(library_tree()));
    h.session.jump_to_breadcrumb(0);
    let physics = h
        .session
        .explorer()
        .unwrap()
        .view()
        .cells
        .iter()
        .position(|cell| cell.point.name == "Physics")
        .unwrap();
    h.session.activate(physics);
    assert!(h.session.wait_idle(WAIT));

    let notes = h
        .session
        .explorer()
        .unwrap()
        .view()
        .cells
        .iter()
        .position(|cell| cell.point.name == "notes.txt")
        .unwrap();
    h.session.activate(notes);
    assert!(h.session.wait_idle(WAIT));
    assert!(h.viewer.shown.lock().unwrap().is_empty());
    assert_eq!(h.session.open_document(), None);
    assert_eq!(path_of(&h.session), vec!["Physics"]);
}

#[test]
fn last_answer_received_wins() {
    let mut h = harness(MemoryCatalog::new(scenario_tree()));
    h.session.activate(0);
    h.session.activate(0);
    assert!(h.session.wait_idle(WAIT));

    assert_eq!(h.session.submit_question(""), QuestionOutcome::Ignored);
    assert_eq!(h.answerer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.answer(), &AnswerDisplay::Empty);

    assert!(matches!(
        h.session.submit_question("slow question"),
        QuestionOutcome::Sent { .. }
    ));
    assert!(h.session.is_question_pending());
    assert!(matches!(
        h.session.submit_question("fast question"),
        QuestionOutcome::Sent { .. }
    ));
    assert!(h.session.wait_idle(WAIT));
    assert!(!h.session.is_question_pending());
    assert_eq!(h.answerer.calls.load(Ordering::SeqCst), 2);

    match h.session.answer() {
        AnswerDisplay::Answered(answer) => {
            assert_eq!(answer.text, "re: slow question");
            assert_eq!(answer.percent(), 75);
        }
        other => panic!("unexpected answer display: {:?}", other),
    }
}

#[test]
fn reload_that_drops_current_folder_keeps_view_and_reports() {
    let mut h = harness(MemoryCatalog::new(library_tree()));
    let physics = h
        .session
        .explorer()
        .unwrap()
        .view()
        .cells
        .iter()
        .position(|cell| cell.point.name == "Physics")
        .unwrap();
    h.session.activate(physics);
    assert!(h.session.wait_idle(WAIT));
    let before = h.session.explorer().unwrap().view().clone();

    h.catalog
        .replace(HierarchyNode::root(vec![HierarchyNode::folder("History", vec![])]));
    h.session.reload_handle().request();
    assert!(h.session.wait_idle(WAIT));

    let fault = h.session.fault().unwrap();
    assert_eq!(fault.class, FailureClass::NavigationResolution);
    assert_eq!(h.session.explorer().unwrap().view(), &before);
    assert_eq!(path_of(&h.session), vec!["Physics"]);

    h.session.jump_to_root();
    assert!(h.session.fault().is_none());
    let names: Vec<_> = h
        .session
        .explorer()
        .unwrap()
        .view()
        .cells
        .iter()
        .map(|cell| cell.point.name.clone())
        .collect();
    assert_eq!(names, vec!["History"]);
}

#[test]
fn breadcrumb_index_matches_its_label() {
    let tree = HierarchyNode::root(vec![
        HierarchyNode::folder(
            "Physics",
            vec![HierarchyNode::folder(
                "Quantum",
                vec![HierarchyNode::document("fields.pdf", "Physics/Quantum/fields.pdf")],
            )],
        ),
        HierarchyNode::folder("History", vec![]),
    ]);
    let mut h = harness(MemoryCatalog::new(tree));
    let physics = h
        .session
        .explorer()
        .unwrap()
        .view()
        .cells
        .iter()
        .position(|cell| cell.point.name == "Physics")
        .unwrap();
    h.session.activate(physics);
    assert!(h.session.wait_idle(WAIT));
    let quantum = h
        .session
        .explorer()
        .unwrap()
        .view()
        .cells
        .iter()
        .position(|cell| cell.point.name == "Quantum")
        .unwrap();
    h.session.activate(quantum);
    assert!(h.session.wait_idle(WAIT));
    assert_eq!(path_of(&h.session), vec!["Physics", "Quantum"]);

    let crumbs: Vec<String> = h
        .session
        .explorer()
        .unwrap()
        .breadcrumbs()
        .into_iter()
        .map(String::from)
        .collect();
    h.session.jump_to_breadcrumb(1);
    assert_eq!(path_of(&h.session), vec![crumbs[1].clone()]);

    h.session.jump_to_breadcrumb(0);
    assert!(path_of(&h.session).is_empty());
}

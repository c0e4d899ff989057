use anyhow::Context;
use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use glam::DVec2;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect as UiRect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Line as CanvasLine};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::io::{self, stdout};
use std::sync::Arc;
use std::time::Duration;
use verbum::config::{LogArgs, SourceArgs, SourceConfig};
use verbum::logging::{init_logging, LogSink};
use verbum::session::{AnswerDisplay, LoadState, QuestionOutcome, Session};
use verbum::viewer::SystemViewer;
use verbum::watch::{LibraryWatcher, DEBOUNCE};
use verbum::{Cell, NodeKind, Rect};

/// Canvas units per terminal column and row; rows are about twice as tall as columns.
const UNITS_PER_COLUMN: f64 = 8.0;
const UNITS_PER_ROW: f64 = 16.0;

/// Terminal Voronoi explorer for a document library.
#[derive(Parser)]
#[command(name = "verbum-tui")]
#[command(about = "Drill-down Voronoi explorer for document libraries (terminal)")]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    log: LogArgs,
}

struct App {
    session: Session,
    _watcher: Option<LibraryWatcher>,
    question_input: Option<String>,
    selected: Option<usize>,
    canvas_area: Option<UiRect>,
    status: String,
    should_quit: bool,
}

impl App {
    fn new(session: Session, watcher: Option<LibraryWatcher>) -> Self {
        Self {
            session,
            _watcher: watcher,
            question_input: None,
            selected: None,
            canvas_area: None,
            status: String::from("Loading library..."),
            should_quit: false,
        }
    }

    fn cell_count(&self) -> usize {
        self.session
            .explorer()
            .map(|explorer| explorer.view().cells.len())
            .unwrap_or(0)
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            self.should_quit = true;
            return;
        }

        if let Some(input) = self.question_input.as_mut() {
            match key.code {
                KeyCode::Enter => {
                    let text = std::mem::take(input);
                    self.question_input = None;
                    self.status = match self.session.submit_question(&text) {
                        QuestionOutcome::Sent { .. } => "Question sent".to_string(),
                        QuestionOutcome::Ignored => "Empty question, nothing sent".to_string(),
                        QuestionOutcome::NoDocument => "Open a PDF before asking".to_string(),
                    };
                }
                KeyCode::Esc => self.question_input = None,
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(ch) => input.push(ch),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('r') => {
                self.session.jump_to_root();
                self.selected = None;
            }
            KeyCode::Char('u') | KeyCode::Backspace => {
                self.session.ascend();
                self.selected = None;
            }
            KeyCode::Char('?') => {
                if self.session.is_question_pending() {
                    self.status = "Waiting for the previous answer".to_string();
                } else {
                    self.question_input = Some(String::new());
                }
            }
            KeyCode::Char(digit @ '0'..='9') => {
                if let Some(index) = breadcrumb_for_key(digit) {
                    self.session.jump_to_breadcrumb(index);
                    self.selected = None;
                }
            }
            KeyCode::Tab => self.cycle_selection(1),
            KeyCode::BackTab => self.cycle_selection(-1),
            KeyCode::Enter => {
                if let Some(index) = self.selected {
                    self.session.activate(index);
                    self.selected = None;
                }
            }
            KeyCode::Esc => self.selected = None,
            _ => {}
        }
    }

    fn cycle_selection(&mut self, step: isize) {
        let count = self.cell_count() as isize;
        if count == 0 {
            self.selected = None;
            return;
        }
        let next = match self.selected {
            Some(current) => (current as isize + step).rem_euclid(count),
            None if step >= 0 => 0,
            None => count - 1,
        };
        self.selected = Some(next as usize);
    }

    fn on_mouse(&mut self, event: MouseEvent) {
        let MouseEventKind::Down(MouseButton::Left) = event.kind else {
            return;
        };
        let Some(area) = self.canvas_area else {
            return;
        };
        if !point_in_rect(area, event.column, event.row) {
            return;
        }
        let point = DVec2::new(
            (event.column - area.x) as f64 * UNITS_PER_COLUMN + UNITS_PER_COLUMN / 2.0,
            (event.row - area.y) as f64 * UNITS_PER_ROW + UNITS_PER_ROW / 2.0,
        );
        self.session.click(point);
        self.selected = None;
    }

    fn sync_canvas(&mut self, area: UiRect) {
        if self.canvas_area == Some(area) {
            return;
        }
        self.canvas_area = Some(area);
        if area.width > 2 && area.height > 2 {
            self.session.resize(canvas_rect(area));
        }
    }

    fn status_line(&self) -> String {
        if let Some(fault) = self.session.fault() {
            return format!("{:?}: {}", fault.class, fault.message);
        }
        match self.session.state() {
            LoadState::Idle | LoadState::Loading => "Loading library...".to_string(),
            LoadState::Failed { message } => format!("Load failed: {}", message),
            LoadState::Ready => self.status.clone(),
        }
    }
}

/// Digit keys select the breadcrumb drawn with the same label; 0 is the root.
fn breadcrumb_for_key(ch: char) -> Option<usize> {
    ch.to_digit(10).map(|digit| digit as usize)
}

fn canvas_rect(area: UiRect) -> Rect {
    Rect::from_size(
        area.width as f64 * UNITS_PER_COLUMN,
        area.height as f64 * UNITS_PER_ROW,
    )
}

fn point_in_rect(rect: UiRect, x: u16, y: u16) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

fn cell_color(cell: &Cell, is_selected: bool) -> Color {
    if is_selected {
        return Color::Rgb(246, 211, 101);
    }
    match cell.point.kind {
        NodeKind::Document { .. } => Color::Rgb(245, 158, 11),
        NodeKind::Folder | NodeKind::Root => Color::Rgb(100, 190, 230),
    }
}

fn draw_ui(frame: &mut Frame, app: &mut App) {
    let root = frame.area();
    let split = Layout::horizontal([Constraint::Length(42), Constraint::Min(30)]).split(root);
    let left = split[0];
    let right = split[1];

    let left_block = Block::default().title(" Verbum ").borders(Borders::ALL);
    let left_inner = left_block.inner(left);
    frame.render_widget(left_block, left);

    let left_rows = Layout::vertical([
        Constraint::Length(4),
        Constraint::Length(5),
        Constraint::Min(8),
        Constraint::Length(6),
    ])
    .split(left_inner);

    frame.render_widget(
        Paragraph::new(app.status_line())
            .wrap(Wrap { trim: true })
            .block(Block::default().title(" Status ").borders(Borders::ALL)),
        left_rows[0],
    );

    let path_lines = match app.session.explorer() {
        Some(explorer) => {
            let mut spans = Vec::new();
            for (depth, crumb) in explorer.breadcrumbs().into_iter().enumerate() {
                if depth > 0 {
                    spans.push(Span::styled(" › ", Style::default().fg(Color::Gray)));
                }
                spans.push(Span::styled(format!("{}:", depth), Style::default().fg(Color::Gray)));
                spans.push(Span::raw(crumb.to_string()));
            }
            vec![
                Line::from(spans),
                Line::from(format!(
                    "{} cells, {:?} layout",
                    explorer.view().cells.len(),
                    explorer.view().mode
                )),
            ]
        }
        None => vec![Line::from("(not loaded)")],
    };
    frame.render_widget(
        Paragraph::new(path_lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().title(" Path ").borders(Borders::ALL)),
        left_rows[1],
    );

    let mut document_lines = Vec::new();
    match app.session.open_document() {
        Some(path) => document_lines.push(Line::from(vec![
            Span::styled("Open: ", Style::default().fg(Color::Gray)),
            Span::raw(path.to_string()),
        ])),
        None => document_lines.push(Line::from("No document open")),
    }
    if let Some(input) = app.question_input.as_ref() {
        document_lines.push(Line::from(vec![
            Span::styled("Ask: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{}_", input)),
        ]));
    }
    if app.session.is_question_pending() {
        document_lines.push(Line::from(Span::styled(
            "Waiting for an answer...",
            Style::default().fg(Color::Gray),
        )));
    }
    match app.session.answer() {
        AnswerDisplay::Empty => {}
        AnswerDisplay::Answered(answer) => {
            document_lines.push(Line::from(answer.text.clone()));
            document_lines.push(Line::from(Span::styled(
                format!("Confidence: {}%", answer.percent()),
                Style::default().fg(Color::Gray),
            )));
        }
        AnswerDisplay::Failed(message) => document_lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        ))),
    }
    frame.render_widget(
        Paragraph::new(document_lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().title(" Document ").borders(Borders::ALL)),
        left_rows[2],
    );

    let help_lines = vec![
        Line::from("Click: open cell   Tab/Enter: select"),
        Line::from("r: root   u: up   0-9: jump to depth"),
        Line::from("?: ask about document   q: quit"),
    ];
    frame.render_widget(
        Paragraph::new(help_lines).block(Block::default().title(" Controls ").borders(Borders::ALL)),
        left_rows[3],
    );

    let canvas_block = Block::default()
        .title(" Library (click a folder to descend, a PDF to open) ")
        .borders(Borders::ALL);
    let canvas_inner = canvas_block.inner(right);
    frame.render_widget(canvas_block, right);
    app.sync_canvas(canvas_inner);

    let Some(explorer) = app.session.explorer() else {
        return;
    };
    let cells = &explorer.view().cells;
    if cells.is_empty() {
        frame.render_widget(
            Paragraph::new("Empty folder").style(Style::default().fg(Color::Gray)),
            canvas_inner,
        );
        return;
    }

    let bounds = canvas_rect(canvas_inner);
    let height = bounds.height;
    let selected = app.selected;
    let canvas = Canvas::default()
        .marker(Marker::Braille)
        .x_bounds([0.0, bounds.width])
        .y_bounds([0.0, height])
        .paint(|ctx| {
            for cell in cells {
                let color = cell_color(cell, selected == Some(cell.point.index));
                let vertices = &cell.polygon.vertices;
                for (i, a) in vertices.iter().enumerate() {
                    let b = vertices[(i + 1) % vertices.len()];
                    // Canvas y grows upward.
                    ctx.draw(&CanvasLine::new(a.x, height - a.y, b.x, height - b.y, color));
                }
            }
            ctx.layer();
            for cell in cells {
                let centroid = cell.polygon.centroid();
                let style = Style::default()
                    .fg(cell_color(cell, selected == Some(cell.point.index)))
                    .add_modifier(Modifier::BOLD);
                let marker = if cell.point.kind.is_folder() { "▸" } else { "•" };
                let label = format!("{} {}", marker, cell.point.name);
                let offset = label.chars().count() as f64 * UNITS_PER_COLUMN / 2.0;
                ctx.print(
                    (centroid.x - offset).max(0.0),
                    height - centroid.y,
                    Line::from(Span::styled(label, style)),
                );
            }
        });
    frame.render_widget(canvas, canvas_inner);
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        app.session.poll();

        terminal.draw(|frame| {
            draw_ui(frame, app);
        })?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Mouse(mouse) => app.on_mouse(mouse),
                Event::Resize(_, _) => {}
                Event::FocusGained | Event::FocusLost | Event::Paste(_) => {}
            }
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, LogSink::Discard).context("failed to set up logging")?;

    let config = SourceConfig::from(cli.source);
    let layout = config.layout_config().context("failed to load layout overrides")?;
    let backends = config.connect().context("failed to open the catalog")?;

    let mut session = Session::new(
        backends.catalog,
        backends.answerer,
        Arc::new(SystemViewer::new()),
        Rect::from_size(800.0, 640.0),
        layout,
    );
    session.start();

    let watcher = match (&backends.library_root, config.watch) {
        (Some(root), true) => {
            let handle = session.reload_handle();
            Some(
                LibraryWatcher::spawn(root, DEBOUNCE, move |_| handle.request())
                    .context("failed to watch the library")?,
            )
        }
        _ => None,
    };
    let mut app = App::new(session, watcher);

    enable_raw_mode()?;
    crossterm::execute!(stdout(), EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let app_result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app_result.context("terminal session failed")
}

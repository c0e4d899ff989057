use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use eframe::egui;
use glam::DVec2;

use verbum::config::{LogArgs, SourceArgs, SourceConfig};
use verbum::logging::{init_logging, LogSink};
use verbum::session::{AnswerDisplay, LoadState, Session};
use verbum::viewer::SystemViewer;
use verbum::watch::{LibraryWatcher, DEBOUNCE};
use verbum::{Cell, NodeKind, Rect};

/// Voronoi explorer for a document library.
#[derive(Parser)]
#[command(name = "verbum")]
#[command(about = "Drill-down Voronoi explorer for document libraries")]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    log: LogArgs,
}

const INITIAL_CANVAS: [f32; 2] = [1200.0, 760.0];

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, LogSink::Stderr).context("failed to set up logging")?;

    let config = SourceConfig::from(cli.source);
    let layout = config.layout_config().context("failed to load layout overrides")?;
    let backends = config.connect().context("failed to open the catalog")?;

    let mut session = Session::new(
        backends.catalog,
        backends.answerer,
        Arc::new(SystemViewer::new()),
        Rect::from_size(INITIAL_CANVAS[0] as f64, INITIAL_CANVAS[1] as f64),
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

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("Verbum - Library Explorer"),
        ..Default::default()
    };

    let app = VerbumApp::new(session, watcher);
    eframe::run_native(
        "Verbum",
        options,
        Box::new(|cc| {
            configure_custom_style(&cc.egui_ctx);
            Box::new(app)
        }),
    )
    .map_err(|err| anyhow::anyhow!("window closed with an error: {}", err))
}

fn configure_custom_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = egui::Color32::from_rgba_unmultiplied(30, 41, 59, 240);
    visuals.window_fill = egui::Color32::from_rgba_unmultiplied(30, 41, 59, 230);

    visuals.window_stroke = egui::Stroke::new(1.0, egui::Color32::from_rgba_unmultiplied(255, 255, 255, 26));
    visuals.widgets.noninteractive.bg_stroke = egui::Stroke::new(1.0, egui::Color32::from_rgba_unmultiplied(255, 255, 255, 13));

    visuals.window_rounding = egui::Rounding::same(12.0);
    visuals.widgets.noninteractive.rounding = egui::Rounding::same(8.0);
    visuals.widgets.inactive.rounding = egui::Rounding::same(8.0);
    visuals.widgets.hovered.rounding = egui::Rounding::same(8.0);
    visuals.widgets.active.rounding = egui::Rounding::same(8.0);
    visuals.window_shadow = egui::epaint::Shadow::NONE;

    style.visuals = visuals;
    style.spacing.item_spacing = egui::vec2(12.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(24.0);
    style.spacing.button_padding = egui::vec2(16.0, 8.0);

    ctx.set_style(style);
}

struct VerbumApp {
    session: Session,
    // Dropping it stops the watch thread.
    watcher: Option<LibraryWatcher>,
    question: String,
    canvas_size: egui::Vec2,
}

impl VerbumApp {
    fn new(session: Session, watcher: Option<LibraryWatcher>) -> Self {
        Self {
            session,
            watcher,
            question: String::new(),
            canvas_size: egui::vec2(INITIAL_CANVAS[0], INITIAL_CANVAS[1]),
        }
    }

    /// Folders go from cool blue to violet across the level; documents are amber.
    fn cell_color(kind: &NodeKind, ratio: f32, is_hovered: bool) -> egui::Color32 {
        let (r, g, b) = match kind {
            NodeKind::Document { .. } => (245.0, 158.0 + 33.0 * ratio, 11.0 + 25.0 * ratio),
            NodeKind::Folder | NodeKind::Root => {
                (59.0 + 80.0 * ratio, 130.0 - 38.0 * ratio, 246.0)
            }
        };

        let (r, g, b) = if is_hovered {
            ((r * 1.15).min(255.0), (g * 1.15).min(255.0), (b * 1.15).min(255.0))
        } else {
            (r, g, b)
        };

        egui::Color32::from_rgb(r as u8, g as u8, b as u8)
    }

    /// Background gradient that shifts with folder depth.
    fn draw_aurora_background(&self, painter: &egui::Painter, rect: egui::Rect) {
        let depth = self
            .session
            .explorer()
            .map(|explorer| explorer.path().len())
            .unwrap_or(0) as f32;
        let depth_factor = (depth * 0.1).min(0.3);

        let top_color = egui::Color32::from_rgb(
            (30.0 - depth_factor * 10.0) as u8,
            (41.0 + depth_factor * 35.0) as u8,
            (59.0 + depth_factor * 59.0) as u8,
        );
        let bottom_color = egui::Color32::from_rgb(
            (15.0 - depth_factor * 5.0) as u8,
            (118.0 - depth_factor * 20.0) as u8,
            (110.0 + depth_factor * 8.0) as u8,
        );

        let mut mesh = egui::Mesh::default();
        mesh.colored_vertex(rect.left_top(), top_color);
        mesh.colored_vertex(rect.right_top(), top_color);
        mesh.colored_vertex(rect.right_bottom(), bottom_color);
        mesh.colored_vertex(rect.left_bottom(), bottom_color);
        mesh.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
        painter.add(egui::Shape::Mesh(mesh));
    }

    fn to_screen(origin: egui::Pos2, point: DVec2) -> egui::Pos2 {
        egui::pos2(origin.x + point.x as f32, origin.y + point.y as f32)
    }

    fn to_canvas(origin: egui::Pos2, pos: egui::Pos2) -> DVec2 {
        DVec2::new((pos.x - origin.x) as f64, (pos.y - origin.y) as f64)
    }

    fn paint_cell(
        painter: &egui::Painter,
        origin: egui::Pos2,
        cell: &Cell,
        ratio: f32,
        is_hovered: bool,
    ) {
        let points: Vec<egui::Pos2> = cell
            .polygon
            .vertices
            .iter()
            .map(|vertex| Self::to_screen(origin, *vertex))
            .collect();
        if points.len() < 3 {
            return;
        }

        let fill = Self::cell_color(&cell.point.kind, ratio, is_hovered);
        let stroke = egui::Stroke::new(1.5, egui::Color32::from_rgba_unmultiplied(255, 255, 255, 60));
        painter.add(egui::Shape::convex_polygon(points, fill, stroke));

        let marker = match cell.point.kind {
            NodeKind::Document { .. } => "📄",
            NodeKind::Folder | NodeKind::Root => "📁",
        };
        let label_at = Self::to_screen(origin, cell.polygon.centroid());
        let font_size = if cell.polygon.area() > 40_000.0 { 14.0 } else { 11.0 };
        painter.text(
            label_at,
            egui::Align2::CENTER_CENTER,
            format!("{} {}", marker, cell.point.name),
            egui::FontId::proportional(font_size),
            egui::Color32::WHITE,
        );
    }

    fn top_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Verbum");
            ui.separator();
            ui.label(self.session.source());

            if self.session.is_busy() {
                ui.spinner();
            }
            if let Some(explorer) = self.session.explorer() {
                ui.label(format!("{} cells, {:?} layout", explorer.view().cells.len(), explorer.view().mode));
            }
        });

        let Some(explorer) = self.session.explorer() else {
            return;
        };
        let crumbs: Vec<String> = explorer.breadcrumbs().into_iter().map(str::to_string).collect();
        let at_root = explorer.navigator().is_at_root();

        let mut target = None;
        let mut go_up = false;
        ui.horizontal(|ui| {
            if ui.add_enabled(!at_root, egui::Button::new("⬅ Up")).clicked() {
                go_up = true;
            }
            ui.separator();
            for (index, crumb) in crumbs.iter().enumerate() {
                if index > 0 {
                    ui.label("›");
                }
                if ui.button(crumb).clicked() {
                    target = Some(index);
                }
            }
        });

        if go_up {
            self.session.ascend();
        } else if let Some(index) = target {
            self.session.jump_to_breadcrumb(index);
        }
    }

    fn document_panel(&mut self, ui: &mut egui::Ui) {
        let Some(document) = self.session.open_document().map(str::to_string) else {
            return;
        };
        ui.heading("Document");
        ui.label(&document);
        ui.separator();

        ui.label("Ask about this document:");
        let response = ui.add(
            egui::TextEdit::multiline(&mut self.question)
                .desired_rows(3)
                .desired_width(f32::INFINITY),
        );
        let pending = self.session.is_question_pending();
        let submit_key = response.has_focus()
            && ui.input(|input| input.key_pressed(egui::Key::Enter) && input.modifiers.command);

        ui.horizontal(|ui| {
            let ask = ui.add_enabled(!pending, egui::Button::new("Ask")).clicked();
            if (ask || (submit_key && !pending)) && !self.question.trim().is_empty() {
                self.session.submit_question(&self.question);
            }
            if pending {
                ui.spinner();
                ui.label("Waiting for an answer...");
            }
        });

        ui.separator();
        match self.session.answer() {
            AnswerDisplay::Empty => {}
            AnswerDisplay::Answered(answer) => {
                ui.label(egui::RichText::new(&answer.text).size(14.0));
                ui.label(
                    egui::RichText::new(format!("Confidence: {}%", answer.percent()))
                        .color(egui::Color32::from_rgba_unmultiplied(255, 255, 255, 153)),
                );
            }
            AnswerDisplay::Failed(message) => {
                ui.colored_label(egui::Color32::from_rgb(239, 68, 68), message);
            }
        }
    }

    fn status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| match self.session.fault() {
            Some(fault) => {
                ui.colored_label(
                    egui::Color32::from_rgb(245, 158, 11),
                    format!("{:?}: {}", fault.class, fault.message),
                );
            }
            None => {
                ui.label("Click a folder to descend, a PDF to open it.");
            }
        });
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let available_rect = ui.available_rect_before_wrap();
        if available_rect.width() < 1.0 || available_rect.height() < 1.0 {
            return;
        }
        if available_rect.size() != self.canvas_size {
            self.canvas_size = available_rect.size();
            self.session.resize(Rect::from_size(
                available_rect.width() as f64,
                available_rect.height() as f64,
            ));
        }

        let response = ui.interact(available_rect, ui.id().with("voronoi"), egui::Sense::click());
        let painter = ui.painter_at(available_rect);
        self.draw_aurora_background(&painter, available_rect);

        match self.session.state().clone() {
            LoadState::Idle | LoadState::Loading => {
                painter.text(
                    available_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "Loading library...",
                    egui::FontId::proportional(18.0),
                    egui::Color32::WHITE,
                );
                return;
            }
            LoadState::Failed { message } => {
                painter.text(
                    available_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    format!("Could not load the library: {}", message),
                    egui::FontId::proportional(16.0),
                    egui::Color32::from_rgb(239, 68, 68),
                );
                if response.clicked() {
                    self.session.start();
                }
                return;
            }
            LoadState::Ready => {}
        }

        let origin = available_rect.min;
        let Some(explorer) = self.session.explorer() else {
            return;
        };

        let hovered = response
            .hover_pos()
            .and_then(|pos| explorer.cell_at(Self::to_canvas(origin, pos)))
            .map(|cell| cell.point.index);

        let cells = &explorer.view().cells;
        let count = cells.len().max(1) as f32;
        for (idx, cell) in cells.iter().enumerate() {
            let ratio = idx as f32 / count;
            Self::paint_cell(&painter, origin, cell, ratio, hovered == Some(cell.point.index));
        }
        if cells.is_empty() {
            painter.text(
                available_rect.center(),
                egui::Align2::CENTER_CENTER,
                "Empty folder",
                egui::FontId::proportional(16.0),
                egui::Color32::from_rgba_unmultiplied(255, 255, 255, 153),
            );
        }

        if hovered.is_some() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.session.click(Self::to_canvas(origin, pos));
            }
        }
    }
}

impl eframe::App for VerbumApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.poll();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| self.top_bar(ui));
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| self.status_bar(ui));

        if self.session.open_document().is_some() {
            egui::SidePanel::right("document_panel")
                .default_width(320.0)
                .show(ctx, |ui| self.document_panel(ui));
        }

        egui::CentralPanel::default().show(ctx, |ui| self.canvas(ui));

        if self.session.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(50));
        } else if self.watcher.is_some() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }
}

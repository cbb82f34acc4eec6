use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use pressproof_core::{
    Command, DisplayMode, DocumentPhase, DocumentRef, DocumentState, FlipState, RasterSource,
    Session, SessionEvent, Vec2, ViewUnit, ViewerConfig,
};
use pressproof_fetch::{FetchEvent, FetchPool, HttpRasterSource};
use pressproof_tty::{
    apply_transform, compose_unit_frame, draw_flip_wipe, draw_selection, DrawParams, EventMapper,
    KittyRenderer, UiEvent,
};

#[derive(Debug, Parser)]
#[command(
    name = "pressproof",
    version,
    about = "kitty-native proof viewer for print-shop renders"
)]
struct Args {
    /// Rendering service base URL (overrides the config file)
    #[arg(long = "server")]
    server: Option<String>,

    /// Page to jump to once the document is ready (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<u32>,

    /// Start in book (two-page spread) mode
    #[arg(long = "book")]
    book: bool,

    /// Project identifier at the rendering service
    project_id: String,

    /// Document filename within the project
    filename: String,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let project_dirs = ProjectDirs::from("net", "pressproof", "pressproof")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let mut config = ViewerConfig::load_from(project_dirs.config_dir())?;
    if let Some(server) = args.server.clone() {
        config.server_url = server;
    }
    tracing::info!(
        project = %args.project_id,
        file = %args.filename,
        server = %config.server_url,
        "starting viewer"
    );

    let source: Arc<dyn RasterSource> = Arc::new(HttpRasterSource::new(&config.server_url)?);
    let (pool, mut fetch_rx) = FetchPool::new(source);

    let mut session = Session::new(&config);
    let reference = DocumentRef::new(args.project_id.clone(), args.filename.clone());
    let epoch = session.open(reference.clone());
    pool.spawn_info(epoch, reference);

    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    let mut mapper = EventMapper::new();
    renderer.clear_all()?;

    // Applied once, after the page count arrives.
    let mut startup: Option<(Option<u32>, bool)> = Some((args.page, args.book));
    let mut dirty = true;

    loop {
        let now = Instant::now();

        // Fetch results first so a just-arrived raster is in this redraw.
        while let Ok(fetch_event) = fetch_rx.try_recv() {
            match fetch_event {
                FetchEvent::Info { epoch, outcome } => {
                    session.apply_info(epoch, outcome);
                }
                FetchEvent::Page {
                    epoch,
                    page,
                    outcome,
                } => {
                    if session.apply_raster(epoch, page, outcome) {
                        dirty = true;
                    }
                }
            }
        }

        let mut replan = false;
        for session_event in session.take_events() {
            match session_event {
                SessionEvent::DocumentReady(_) => {
                    if let Some((page, book)) = startup.take() {
                        if book {
                            session.apply(Command::SetMode(DisplayMode::Book), now)?;
                        }
                        if let Some(page) = page {
                            session.apply(Command::GotoPage { page }, now)?;
                        }
                    }
                    replan = true;
                    dirty = true;
                }
                SessionEvent::UnitChanged => {
                    replan = true;
                    dirty = true;
                }
                SessionEvent::DocumentChanged(_)
                | SessionEvent::DocumentFailed(_)
                | SessionEvent::RedrawNeeded => {
                    dirty = true;
                }
            }
        }

        let tick = session.tick(now);
        if tick.advanced {
            replan = true;
        }
        if tick.advanced || tick.animating {
            dirty = true;
        }
        // The mode/goto startup commands above may have moved the unit.
        for session_event in session.take_events() {
            if matches!(session_event, SessionEvent::UnitChanged) {
                replan = true;
            }
            dirty = true;
        }

        if replan {
            spawn_fetches(&mut session, &pool);
        }

        if dirty {
            redraw(&mut renderer, &mut session, &mut mapper, now)?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(50))? {
            let raw = event::read()?;
            match mapper.map_event(raw, Instant::now()) {
                UiEvent::Command(command) => {
                    session.apply(command, Instant::now())?;
                }
                UiEvent::Resized => {
                    renderer.clear_all()?;
                    dirty = true;
                }
                UiEvent::Quit => break,
                UiEvent::None => {}
            }
        }
    }

    renderer.clear_all()?;
    Ok(())
}

fn spawn_fetches(session: &mut Session, pool: &FetchPool) {
    let Some(reference) = session.document().map(|doc| doc.reference.clone()) else {
        return;
    };
    let epoch = session.epoch();
    let plan = session.fetch_plan();
    if !plan.is_empty() {
        pool.spawn_pages(epoch, reference, plan);
    }
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &mut Session,
    mapper: &mut EventMapper,
    now: Instant,
) -> Result<()> {
    let window = terminal::window_size()?;
    let total_cols = u32::from(window.columns).max(1);
    let total_rows = u32::from(window.rows).max(1);
    // Terminals that do not report pixel sizes get a typical cell geometry.
    let pixel_width = if window.width > 0 {
        u32::from(window.width)
    } else {
        total_cols * 8
    };
    let pixel_height = if window.height > 0 {
        u32::from(window.height)
    } else {
        total_rows * 16
    };

    let cell_width = pixel_width as f32 / total_cols as f32;
    let cell_height = pixel_height as f32 / total_rows as f32;
    let image_rows = total_rows.saturating_sub(1).max(1);
    let frame_width = pixel_width.max(1);
    let frame_height = ((cell_height * image_rows as f32).round() as u32).max(1);

    session.set_viewport(Vec2::new(frame_width as f32, frame_height as f32));
    mapper.set_cell_size(Vec2::new(cell_width, cell_height));
    mapper.set_viewport_center(Vec2::new(frame_width as f32 / 2.0, frame_height as f32 / 2.0));

    let Some(doc) = session.document() else {
        return Ok(());
    };

    renderer.begin_sync_update()?;
    if doc.phase == DocumentPhase::Ready {
        let unit = doc.current_unit();
        let composed = compose_unit_frame(&unit, &doc.cache, frame_width, frame_height);
        let mut frame = apply_transform(&composed, &doc.transform);
        if let Some(rect) = doc.gesture.selection() {
            draw_selection(&mut frame, &rect);
        }
        if let FlipState::Flipping(direction) = doc.flip.state() {
            if let Some(progress) = doc.flip.progress(now) {
                draw_flip_wipe(&mut frame, direction, progress);
            }
        }

        {
            let writer = renderer.writer();
            crossterm::execute!(writer, cursor::MoveTo(0, 0))?;
        }
        renderer.draw(&frame, DrawParams::clamped(total_cols, image_rows))?;
    }

    let status = status_line(doc, mapper.pending_input().as_deref());
    draw_status_line(renderer, &status, total_rows)?;
    renderer.end_sync_update()?;
    Ok(())
}

fn status_line(doc: &DocumentState, pending: Option<&str>) -> String {
    let mut status = match doc.phase {
        DocumentPhase::Loading => format!("{} — loading…", doc.reference.filename),
        DocumentPhase::Failed => format!("{} — rendering service unavailable", doc.reference.filename),
        DocumentPhase::Empty => format!("{} — document has no pages", doc.reference.filename),
        DocumentPhase::Ready => {
            let position = match doc.current_unit() {
                ViewUnit::Single(page) => format!("page {}/{}", page, doc.page_count),
                ViewUnit::Spread { index, .. } => format!(
                    "spread {}/{} (page {})",
                    index + 1,
                    pressproof_core::total_spreads(doc.page_count),
                    doc.page
                ),
                // Ready documents always have a navigable unit.
                ViewUnit::Empty => String::from("no pages"),
            };
            let zoom_percent = doc.transform.zoom * 100.0;
            format!(
                "{} — {} — {:.0}%",
                doc.reference.filename, position, zoom_percent
            )
        }
    };
    if let Some(pending) = pending.filter(|s| !s.is_empty()) {
        status.push_str(" | ");
        status.push_str(pending);
    }
    status
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    status: &str,
    total_rows: u32,
) -> Result<()> {
    let status_row = total_rows.saturating_sub(1);
    let writer = renderer.writer();
    crossterm::execute!(
        writer,
        cursor::MoveTo(0, status_row as u16),
        Clear(ClearType::CurrentLine),
        Print(status)
    )?;
    writer.flush()?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pressproof.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // File only: stdout belongs to the kitty protocol stream.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressproof_core::Session;

    fn ready_doc(page_count: u32) -> Session {
        let mut session = Session::new(&ViewerConfig::default());
        let epoch = session.open(DocumentRef::new("proj-9", "catalog.pdf"));
        session.apply_info(epoch, Ok(page_count));
        session.take_events();
        session
    }

    #[test]
    fn status_line_shows_page_position_and_zoom() {
        let session = ready_doc(12);
        let status = status_line(session.document().unwrap(), None);
        assert_eq!(status, "catalog.pdf — page 1/12 — 100%");
    }

    #[test]
    fn status_line_shows_spread_position_in_book_mode() {
        let mut session = ready_doc(12);
        session
            .apply(Command::SetMode(DisplayMode::Book), Instant::now())
            .unwrap();
        let status = status_line(session.document().unwrap(), Some("7"));
        assert_eq!(status, "catalog.pdf — spread 1/7 (page 1) — 100% | 7");
    }

    #[test]
    fn status_line_tracks_the_displayed_spread() {
        let mut session = ready_doc(12);
        let start = Instant::now();
        session
            .apply(Command::SetMode(DisplayMode::Book), start)
            .unwrap();
        session.apply(Command::NextUnit, start).unwrap();
        session.tick(start + Duration::from_millis(600));
        let status = status_line(session.document().unwrap(), None);
        assert_eq!(status, "catalog.pdf — spread 2/7 (page 2) — 100%");
    }

    #[test]
    fn status_line_reports_failed_documents() {
        let mut session = Session::new(&ViewerConfig::default());
        let epoch = session.open(DocumentRef::new("proj-9", "broken.pdf"));
        session.apply_info(epoch, Err(anyhow!("down")));
        let status = status_line(session.document().unwrap(), None);
        assert!(status.contains("rendering service unavailable"));
    }
}

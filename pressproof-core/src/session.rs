//! Single-document viewer session.
//!
//! The session owns the document lifecycle (one document at a time, cache and
//! indices discarded wholesale on change), dispatches `Command`s from the UI,
//! applies fetch results with an epoch check, and plans the speculative
//! fetches for the current and adjacent view units.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{FetchRequest, PageCache, PageRaster, PageSlot};
use crate::config::ViewerConfig;
use crate::flip::{FlipAnimator, FlipDirection};
use crate::gesture::{DragUpdate, GestureOutcome, GestureTracker};
use crate::layout::{
    clamp_page, clamp_spread_index, page_for_spread, spread_for_index, spread_index_for_page,
    total_spreads, DisplayMode, ViewUnit,
};
use crate::transform::{zoom_to_selection, Vec2, ViewportTransform};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3d5a7c02-4f61-5b38-9c1d-8e24ab90f6e7").expect("valid namespace UUID")
});

pub fn document_id_for(project_id: &str, filename: &str) -> DocumentId {
    let rendered = format!("{}/{}", project_id, filename);
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

/// Identifies a document at the rendering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub project_id: String,
    pub filename: String,
}

impl DocumentRef {
    pub fn new(project_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            filename: filename.into(),
        }
    }

    pub fn id(&self) -> DocumentId {
        document_id_for(&self.project_id, &self.filename)
    }
}

/// Boundary to the external rendering service. The viewer never rasterizes
/// anything itself; it is handed encoded page images.
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Page count for a document, fetched once per selection.
    async fn document_info(&self, document: &DocumentRef) -> Result<u32>;

    /// Encoded raster for one page; `width` is a rendering-quality hint.
    async fn fetch_page(&self, document: &DocumentRef, page: u32, width: u32)
        -> Result<PageRaster>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentPhase {
    /// Page count request outstanding.
    Loading,
    Ready,
    /// Zero pages: nothing navigable.
    Empty,
    /// Page count request failed; terminal until the document is reselected.
    Failed,
}

#[derive(Debug)]
pub struct DocumentState {
    pub reference: DocumentRef,
    pub id: DocumentId,
    pub phase: DocumentPhase,
    pub page_count: u32,
    pub mode: DisplayMode,
    /// Current page in single-page addressing (1-based).
    pub page: u32,
    pub spread_index: u32,
    pub cache: PageCache,
    pub flip: FlipAnimator,
    pub transform: ViewportTransform,
    pub gesture: GestureTracker,
}

#[derive(Debug, Clone)]
pub enum Command {
    NextUnit,
    PrevUnit,
    GotoPage { page: u32 },
    SetMode(DisplayMode),
    ToggleMode,
    Wheel { notches: f32, cursor: Vec2 },
    PointerDown { position: Vec2, pan_modifier: bool },
    PointerMove { position: Vec2 },
    PointerUp { position: Vec2 },
    ResetTransform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DocumentChanged(DocumentId),
    DocumentReady(DocumentId),
    DocumentFailed(DocumentId),
    UnitChanged,
    RedrawNeeded,
}

/// Result of driving the flip animator from the event loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickOutcome {
    /// The spread index advanced this tick; fetches should be replanned.
    pub advanced: bool,
    /// A flip is still running; keep redrawing animation frames.
    pub animating: bool,
}

pub struct Session {
    document: Option<DocumentState>,
    epoch: u64,
    viewport: Vec2,
    wheel_zoom_step: f32,
    flip_duration: Duration,
    focused_width: u32,
    prefetch_width: u32,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            document: None,
            epoch: 0,
            viewport: Vec2::new(800.0, 600.0),
            wheel_zoom_step: config.wheel_zoom_step,
            flip_duration: config.flip_duration(),
            focused_width: config.focused_width.max(1),
            prefetch_width: config.prefetch_width.max(1),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn take_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn document(&self) -> Option<&DocumentState> {
        self.document.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn set_viewport(&mut self, viewport: Vec2) {
        if viewport.x > 0.0 && viewport.y > 0.0 {
            self.viewport = viewport;
        }
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    /// Selects a document, discarding the previous one wholesale: cache,
    /// indices, transform and any pending flip. Returns the new fetch epoch;
    /// results tagged with an older epoch are ignored when they arrive.
    pub fn open(&mut self, reference: DocumentRef) -> u64 {
        if let Some(doc) = self.document.as_mut() {
            doc.flip.cancel();
            doc.gesture.cancel();
        }
        self.epoch += 1;
        let id = reference.id();
        debug!(%id, project = %reference.project_id, file = %reference.filename, "opening document");
        self.document = Some(DocumentState {
            reference,
            id,
            phase: DocumentPhase::Loading,
            page_count: 0,
            mode: DisplayMode::Single,
            page: 0,
            spread_index: 0,
            cache: PageCache::new(0),
            flip: FlipAnimator::new(self.flip_duration),
            transform: ViewportTransform::default(),
            gesture: GestureTracker::new(),
        });
        self.events.lock().push(SessionEvent::DocumentChanged(id));
        self.epoch
    }

    /// Applies the page-count result. Stale epochs are dropped silently.
    pub fn apply_info(&mut self, epoch: u64, outcome: Result<u32>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "dropping stale document info");
            return;
        }
        let Some(doc) = self.document.as_mut() else {
            return;
        };
        match outcome {
            Ok(0) => {
                doc.phase = DocumentPhase::Empty;
                doc.page_count = 0;
                self.events.lock().push(SessionEvent::RedrawNeeded);
            }
            Ok(page_count) => {
                doc.phase = DocumentPhase::Ready;
                doc.page_count = page_count;
                doc.cache = PageCache::new(page_count);
                doc.page = 1;
                doc.spread_index = 0;
                let id = doc.id;
                let mut events = self.events.lock();
                events.push(SessionEvent::DocumentReady(id));
                events.push(SessionEvent::UnitChanged);
                events.push(SessionEvent::RedrawNeeded);
            }
            Err(err) => {
                warn!(?err, id = %doc.id, "document info fetch failed");
                doc.phase = DocumentPhase::Failed;
                let id = doc.id;
                let mut events = self.events.lock();
                events.push(SessionEvent::DocumentFailed(id));
                events.push(SessionEvent::RedrawNeeded);
            }
        }
    }

    /// Applies a page raster result. Stale epochs are dropped; live results
    /// are always cached but only report relevance (and request a redraw)
    /// when the page belongs to the currently displayed unit.
    pub fn apply_raster(&mut self, epoch: u64, page: u32, outcome: Result<PageRaster>) -> bool {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, page, "dropping stale raster");
            return false;
        }
        let Some(doc) = self.document.as_mut() else {
            return false;
        };
        match outcome {
            Ok(raster) => doc.cache.complete(page, raster),
            Err(err) => {
                warn!(?err, page, id = %doc.id, "page raster fetch failed");
                doc.cache.fail(page);
            }
        }
        let relevant = doc.current_unit().contains(page);
        if relevant {
            self.events.lock().push(SessionEvent::RedrawNeeded);
        }
        relevant
    }

    /// Fetches wanted for the current unit and its neighbors in both
    /// directions. Missing pages are always requested; failed pages are
    /// re-attempted only when they belong to the current unit, so navigating
    /// back to a failed page retries exactly once. Planned pages are marked
    /// pending, which coalesces duplicate requests.
    pub fn fetch_plan(&mut self) -> Vec<FetchRequest> {
        let Some(doc) = self.document.as_mut() else {
            return Vec::new();
        };
        if doc.phase != DocumentPhase::Ready {
            return Vec::new();
        }

        // Two slots share the viewport in book mode, so halve the hint.
        let divisor = match doc.mode {
            DisplayMode::Single => 1,
            DisplayMode::Book => 2,
        };
        let focused = (self.focused_width / divisor).max(1);
        let prefetch = (self.prefetch_width / divisor).max(1);

        let mut plan = Vec::new();
        for page in doc.current_unit().pages() {
            let retry = matches!(doc.cache.slot(page), PageSlot::Failed);
            let missing = matches!(doc.cache.slot(page), PageSlot::Missing);
            if (missing || retry) && doc.cache.mark_pending(page) {
                plan.push(FetchRequest {
                    page,
                    width: focused,
                });
            }
        }
        for page in doc.neighbor_pages() {
            if matches!(doc.cache.slot(page), PageSlot::Missing) && doc.cache.mark_pending(page) {
                plan.push(FetchRequest {
                    page,
                    width: prefetch,
                });
            }
        }
        plan
    }

    pub fn apply(&mut self, command: Command, now: Instant) -> Result<()> {
        let Some(doc) = self.document.as_mut() else {
            return Ok(());
        };
        match command {
            Command::NextUnit => {
                if doc.phase != DocumentPhase::Ready {
                    return Ok(());
                }
                match doc.mode {
                    DisplayMode::Single => {
                        let next = clamp_page(doc.page + 1, doc.page_count);
                        if next != doc.page {
                            doc.page = next;
                            doc.spread_index =
                                clamp_spread_index(spread_index_for_page(next), doc.page_count);
                            reset_for_unit_change(doc, &self.events);
                        }
                    }
                    DisplayMode::Book => {
                        // Rejected while a flip is active; ignored at the
                        // last spread.
                        if doc.spread_index + 1 < total_spreads(doc.page_count) {
                            doc.flip.request(FlipDirection::Next, now);
                        }
                    }
                }
            }
            Command::PrevUnit => {
                if doc.phase != DocumentPhase::Ready {
                    return Ok(());
                }
                match doc.mode {
                    DisplayMode::Single => {
                        let prev = clamp_page(doc.page.saturating_sub(1).max(1), doc.page_count);
                        if prev != doc.page {
                            doc.page = prev;
                            doc.spread_index =
                                clamp_spread_index(spread_index_for_page(prev), doc.page_count);
                            reset_for_unit_change(doc, &self.events);
                        }
                    }
                    DisplayMode::Book => {
                        if doc.spread_index > 0 {
                            doc.flip.request(FlipDirection::Prev, now);
                        }
                    }
                }
            }
            Command::GotoPage { page } => {
                if doc.phase != DocumentPhase::Ready {
                    return Ok(());
                }
                doc.flip.cancel();
                let target = clamp_page(page, doc.page_count);
                let target_spread =
                    clamp_spread_index(spread_index_for_page(target), doc.page_count);
                if target != doc.page || target_spread != doc.spread_index {
                    doc.page = target;
                    doc.spread_index = target_spread;
                    reset_for_unit_change(doc, &self.events);
                }
            }
            Command::SetMode(mode) => {
                self.switch_mode(mode);
            }
            Command::ToggleMode => {
                let Some(doc) = self.document.as_ref() else {
                    return Ok(());
                };
                let mode = doc.mode.toggled();
                self.switch_mode(mode);
            }
            Command::Wheel { notches, cursor } => {
                if doc.current_unit() == ViewUnit::Empty {
                    return Ok(());
                }
                let next = doc
                    .transform
                    .wheel_zoom(notches, self.wheel_zoom_step, cursor);
                if next != doc.transform {
                    doc.transform = next;
                    self.events.lock().push(SessionEvent::RedrawNeeded);
                }
            }
            Command::PointerDown {
                position,
                pan_modifier,
            } => {
                if doc.current_unit() == ViewUnit::Empty {
                    return Ok(());
                }
                doc.gesture
                    .pointer_down(position, pan_modifier, doc.transform.pan);
            }
            Command::PointerMove { position } => match doc.gesture.pointer_move(position) {
                Some(DragUpdate::Pan { pan }) => {
                    if !doc.transform.is_identity() {
                        doc.transform = doc.transform.with_pan(pan);
                        self.events.lock().push(SessionEvent::RedrawNeeded);
                    }
                }
                Some(DragUpdate::Select { .. }) => {
                    self.events.lock().push(SessionEvent::RedrawNeeded);
                }
                None => {}
            },
            Command::PointerUp { position } => match doc.gesture.pointer_up(position) {
                GestureOutcome::ZoomToSelection(rect) => {
                    // Selection and pan are captured in this one step; no
                    // transform change can interleave.
                    doc.transform = zoom_to_selection(doc.transform, rect, self.viewport);
                    self.events.lock().push(SessionEvent::RedrawNeeded);
                }
                GestureOutcome::PanFinished | GestureOutcome::None => {}
            },
            Command::ResetTransform => {
                if !doc.transform.is_identity() {
                    doc.transform.reset();
                    self.events.lock().push(SessionEvent::RedrawNeeded);
                }
            }
        }
        Ok(())
    }

    fn switch_mode(&mut self, mode: DisplayMode) {
        let Some(doc) = self.document.as_mut() else {
            return;
        };
        if doc.phase != DocumentPhase::Ready || doc.mode == mode {
            return;
        }
        doc.flip.cancel();
        match mode {
            DisplayMode::Book => {
                doc.spread_index =
                    clamp_spread_index(spread_index_for_page(doc.page), doc.page_count);
            }
            DisplayMode::Single => {
                let spread = spread_for_index(doc.spread_index, doc.page_count);
                doc.page = clamp_page(page_for_spread(spread), doc.page_count);
            }
        }
        doc.mode = mode;
        reset_for_unit_change(doc, &self.events);
    }

    /// Drives the flip animator; the event loop is the timer.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let Some(doc) = self.document.as_mut() else {
            return TickOutcome::default();
        };
        let mut outcome = TickOutcome::default();
        if let Some(direction) = doc.flip.tick(now) {
            doc.spread_index = match direction {
                FlipDirection::Next => clamp_spread_index(doc.spread_index + 1, doc.page_count),
                FlipDirection::Prev => doc.spread_index.saturating_sub(1),
            };
            let spread = spread_for_index(doc.spread_index, doc.page_count);
            doc.page = clamp_page(page_for_spread(spread), doc.page_count);
            reset_for_unit_change(doc, &self.events);
            outcome.advanced = true;
        }
        outcome.animating = doc.flip.is_active();
        outcome
    }
}

fn reset_for_unit_change(doc: &mut DocumentState, events: &Mutex<Vec<SessionEvent>>) {
    doc.transform.reset();
    doc.gesture.cancel();
    let mut events = events.lock();
    events.push(SessionEvent::UnitChanged);
    events.push(SessionEvent::RedrawNeeded);
}

impl DocumentState {
    pub fn current_unit(&self) -> ViewUnit {
        if self.phase != DocumentPhase::Ready || self.page_count == 0 {
            return ViewUnit::Empty;
        }
        match self.mode {
            DisplayMode::Single => ViewUnit::Single(self.page),
            DisplayMode::Book => ViewUnit::Spread {
                index: self.spread_index,
                spread: spread_for_index(self.spread_index, self.page_count),
            },
        }
    }

    /// Pages of the adjacent units in both directions.
    fn neighbor_pages(&self) -> Vec<u32> {
        let mut pages = Vec::new();
        match self.mode {
            DisplayMode::Single => {
                if self.page > 1 {
                    pages.push(self.page - 1);
                }
                if self.page < self.page_count {
                    pages.push(self.page + 1);
                }
            }
            DisplayMode::Book => {
                if self.spread_index > 0 {
                    pages.extend(spread_for_index(self.spread_index - 1, self.page_count).pages());
                }
                if self.spread_index + 1 < total_spreads(self.page_count) {
                    pages.extend(spread_for_index(self.spread_index + 1, self.page_count).pages());
                }
            }
        }
        pages
    }
}

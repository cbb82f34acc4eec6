//! Viewer state for print-proof documents.
//!
//! Everything here is deterministic and I/O-free: page/spread addressing,
//! the zoom/pan transform, gesture classification, the flip animator and the
//! per-document raster cache, tied together by [`Session`]. Fetching and
//! drawing live in the companion crates.

pub mod cache;
pub mod config;
pub mod flip;
pub mod gesture;
pub mod layout;
pub mod session;
pub mod transform;

pub use cache::{FetchRequest, PageCache, PageRaster, PageSlot};
pub use config::ViewerConfig;
pub use flip::{eased_progress, FlipAnimator, FlipDirection, FlipState};
pub use gesture::{DragMode, DragUpdate, GestureOutcome, GestureTracker};
pub use layout::{
    clamp_page, clamp_spread_index, page_for_spread, spread_for_index, spread_index_for_page,
    total_spreads, DisplayMode, Spread, ViewUnit,
};
pub use session::{
    document_id_for, Command, DocumentId, DocumentPhase, DocumentRef, DocumentState, RasterSource,
    Session, SessionEvent, TickOutcome,
};
pub use transform::{
    clamp_zoom, zoom_to_selection, SelectionRect, Vec2, ViewportTransform, MAX_ZOOM, MIN_ZOOM,
};

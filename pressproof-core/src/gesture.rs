//! Classifies a pointer-down/move/up sequence as a pan or a rectangular
//! selection.
//!
//! The drag state is a scoped acquisition: taken on pointer-down and released
//! unconditionally on pointer-up or session reset, whichever branch the
//! gesture ends up on. A click that never crosses the drag threshold produces
//! no transform change at all.

use crate::transform::{SelectionRect, Vec2};

/// Movement below this is a click, not a drag.
pub const DRAG_THRESHOLD_PX: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Pan,
    Select,
}

#[derive(Debug, Clone, Copy)]
struct ActiveDrag {
    mode: DragMode,
    start: Vec2,
    current: Vec2,
    pan_at_start: Vec2,
    dragged: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum DragUpdate {
    Pan { pan: Vec2 },
    Select { rect: SelectionRect },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureOutcome {
    /// No active gesture, or a click: nothing to apply.
    None,
    /// A pan drag ended; increments were already applied during the moves.
    PanFinished,
    /// A genuine select drag meeting the minimum size.
    ZoomToSelection(SelectionRect),
}

#[derive(Debug, Default)]
pub struct GestureTracker {
    drag: Option<ActiveDrag>,
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins tracking. `pan_modifier` selects pan mode (Ctrl held); the pan
    /// at drag start is captured so moves can be absolute.
    pub fn pointer_down(&mut self, position: Vec2, pan_modifier: bool, pan_at_start: Vec2) {
        self.drag = Some(ActiveDrag {
            mode: if pan_modifier {
                DragMode::Pan
            } else {
                DragMode::Select
            },
            start: position,
            current: position,
            pan_at_start,
            dragged: false,
        });
    }

    pub fn pointer_move(&mut self, position: Vec2) -> Option<DragUpdate> {
        let drag = self.drag.as_mut()?;
        drag.current = position;
        if !drag.dragged && (position - drag.start).length() > DRAG_THRESHOLD_PX {
            drag.dragged = true;
        }
        if !drag.dragged {
            return None;
        }
        match drag.mode {
            DragMode::Pan => Some(DragUpdate::Pan {
                pan: drag.pan_at_start + (position - drag.start),
            }),
            DragMode::Select => Some(DragUpdate::Select {
                rect: SelectionRect::from_corners(drag.start, position),
            }),
        }
    }

    /// Ends the gesture. The drag state is released on every branch.
    pub fn pointer_up(&mut self, position: Vec2) -> GestureOutcome {
        let Some(mut drag) = self.drag.take() else {
            return GestureOutcome::None;
        };
        drag.current = position;
        if !drag.dragged && (position - drag.start).length() > DRAG_THRESHOLD_PX {
            drag.dragged = true;
        }
        if !drag.dragged {
            return GestureOutcome::None;
        }
        match drag.mode {
            DragMode::Pan => GestureOutcome::PanFinished,
            DragMode::Select => {
                let rect = SelectionRect::from_corners(drag.start, position);
                if rect.meets_minimum() {
                    GestureOutcome::ZoomToSelection(rect)
                } else {
                    GestureOutcome::None
                }
            }
        }
    }

    /// Drops any active drag without applying anything. Called on view-unit
    /// change, mode change and teardown.
    pub fn cancel(&mut self) {
        self.drag = None;
    }

    /// Live selection rectangle for rendering, only while a genuine select
    /// drag is in progress.
    pub fn selection(&self) -> Option<SelectionRect> {
        let drag = self.drag.as_ref()?;
        if drag.mode == DragMode::Select && drag.dragged {
            Some(SelectionRect::from_corners(drag.start, drag.current))
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.drag.is_some()
    }
}

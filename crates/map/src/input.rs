//! Drag handling with per-frame coalescing.
//!
//! Pointer moves only overwrite a single pending pan target; `tick` applies
//! whatever is pending exactly once. Intermediate targets are dropped, which
//! loses nothing because each target is absolute (drag start pan plus the
//! total pointer offset).

use crate::geom::Point2;
use crate::viewport::Viewport;

const PRIMARY_BUTTON: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragPhase {
    Idle,
    Dragging {
        pointer_id: u32,
        origin: Point2,
        pan_at_start: Point2,
    },
}

#[derive(Debug, Clone)]
pub struct DragCoalescer {
    phase: DragPhase,
    pending: Option<Point2>,
}

impl Default for DragCoalescer {
    fn default() -> Self {
        Self {
            phase: DragPhase::Idle,
            pending: None,
        }
    }
}

impl DragCoalescer {
    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DragPhase::Dragging { .. })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts a drag for the primary button. Returns false when ignored.
    pub fn pointer_down(&mut self, pointer_id: u32, button: u8, at: Point2, pan: Point2) -> bool {
        if button != PRIMARY_BUTTON || !at.is_finite() {
            return false;
        }
        self.phase = DragPhase::Dragging {
            pointer_id,
            origin: at,
            pan_at_start: pan,
        };
        self.pending = None;
        true
    }

    /// Records the latest pan target. Returns true when a tick is now needed.
    pub fn pointer_move(&mut self, pointer_id: u32, at: Point2) -> bool {
        let DragPhase::Dragging {
            pointer_id: active,
            origin,
            pan_at_start,
        } = self.phase
        else {
            return false;
        };
        if active != pointer_id || !at.is_finite() {
            return false;
        }
        self.pending = Some(pan_at_start + (at - origin));
        true
    }

    /// Applies the pending target, if any, and clears it.
    pub fn tick(&mut self, viewport: &mut Viewport) -> bool {
        match self.pending.take() {
            Some(pan) => {
                viewport.set_pan(pan);
                true
            }
            None => false,
        }
    }

    /// Ends the drag, flushing the last target immediately.
    pub fn pointer_up(&mut self, pointer_id: u32, viewport: &mut Viewport) -> bool {
        match self.phase {
            DragPhase::Dragging {
                pointer_id: active, ..
            } if active == pointer_id => {
                self.phase = DragPhase::Idle;
                self.tick(viewport);
                true
            }
            _ => false,
        }
    }

    pub fn pointer_cancel(&mut self, pointer_id: u32, viewport: &mut Viewport) -> bool {
        self.pointer_up(pointer_id, viewport)
    }

    /// Drops any drag in progress without touching the viewport.
    pub fn reset(&mut self) {
        self.phase = DragPhase::Idle;
        self.pending = None;
    }
}

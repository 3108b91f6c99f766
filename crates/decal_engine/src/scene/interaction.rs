//! Pointer interaction state
//!
//! Dragging a decal captures the pointer and suspends camera orbiting. Both
//! are held by a [`DragGuard`] so they are released on every exit path:
//! pointer up, pointer cancel, model unload, or the controller going away.
//!
//! Pointer moves during a drag are coalesced by a [`FrameScheduler`] so at
//! most one raycast runs per animation frame.

use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::collections::DecalId;
use crate::foundation::math::Vec2;

/// Movement below this distance (pixels) still counts as a click
pub const DRAG_THRESHOLD: f32 = 5.0;

/// Pointer position and button state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointerState {
    /// Current position in logical pixels
    pub position: Vec2,
    /// Where the current press started
    pub press_start: Option<Vec2>,
    /// Set once the press has travelled past [`DRAG_THRESHOLD`]
    moved: bool,
}

impl PointerState {
    /// Record a press at `position`
    pub fn press(&mut self, position: Vec2) {
        self.position = position;
        self.press_start = Some(position);
        self.moved = false;
    }

    /// Record a move
    pub fn move_to(&mut self, position: Vec2) {
        self.position = position;
        if let Some(start) = self.press_start {
            self.moved |= (position - start).norm() >= DRAG_THRESHOLD;
        }
    }

    /// Clear the press
    pub fn release(&mut self) {
        self.press_start = None;
        self.moved = false;
    }

    /// Whether the press has turned into a drag
    ///
    /// Latches: coming back near the press point keeps dragging.
    pub fn is_dragging(&self) -> bool {
        self.press_start.is_some() && self.moved
    }
}

/// State shared with the host's camera controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionState {
    /// Pointer events are routed to the decal being dragged
    pub pointer_captured: bool,
    /// Camera orbiting is allowed
    pub orbit_enabled: bool,
    /// Decal currently being dragged
    pub dragging: Option<DecalId>,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self { pointer_captured: false, orbit_enabled: true, dragging: None }
    }
}

/// Shared handle to the interaction state
pub type SharedInteraction = Rc<RefCell<InteractionState>>;

/// Holds pointer capture and orbit suppression for the duration of a drag
#[derive(Debug)]
pub struct DragGuard {
    state: SharedInteraction,
    decal: DecalId,
}

impl DragGuard {
    /// Capture the pointer and disable orbiting for a drag of `decal`
    pub fn acquire(state: &SharedInteraction, decal: DecalId) -> Self {
        {
            let mut s = state.borrow_mut();
            s.pointer_captured = true;
            s.orbit_enabled = false;
            s.dragging = Some(decal);
        }
        log::debug!("Drag started for decal {:?}", decal);
        Self { state: Rc::clone(state), decal }
    }

    /// Decal being dragged
    pub fn decal(&self) -> DecalId {
        self.decal
    }
}

impl Drop for DragGuard {
    fn drop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.pointer_captured = false;
        s.orbit_enabled = true;
        s.dragging = None;
        log::debug!("Drag released for decal {:?}", self.decal);
    }
}

/// Coalesces pointer moves to one update per frame
#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    latest: Option<Vec2>,
    scheduled: bool,
}

impl FrameScheduler {
    /// Create an idle scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest position; returns true if this scheduled a new frame
    pub fn schedule(&mut self, position: Vec2) -> bool {
        self.latest = Some(position);
        let newly = !self.scheduled;
        self.scheduled = true;
        newly
    }

    /// Whether an update is waiting for the next frame
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Take the pending position for this frame, if any
    pub fn take(&mut self) -> Option<Vec2> {
        if !self.scheduled {
            return None;
        }
        self.scheduled = false;
        self.latest.take()
    }

    /// Drop any pending update
    pub fn cancel(&mut self) {
        self.scheduled = false;
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_coalesces_moves() {
        let mut scheduler = FrameScheduler::new();
        assert!(scheduler.schedule(Vec2::new(1.0, 1.0)));
        assert!(!scheduler.schedule(Vec2::new(2.0, 2.0)));
        assert!(!scheduler.schedule(Vec2::new(3.0, 3.0)));

        assert_eq!(scheduler.take(), Some(Vec2::new(3.0, 3.0)));
        assert_eq!(scheduler.take(), None);
    }

    #[test]
    fn test_scheduler_cancel() {
        let mut scheduler = FrameScheduler::new();
        scheduler.schedule(Vec2::new(1.0, 1.0));
        scheduler.cancel();
        assert!(!scheduler.is_scheduled());
        assert_eq!(scheduler.take(), None);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let state: SharedInteraction = Rc::default();
        {
            let guard = DragGuard::acquire(&state, DecalId::default());
            assert!(state.borrow().pointer_captured);
            assert!(!state.borrow().orbit_enabled);
            assert_eq!(state.borrow().dragging, Some(guard.decal()));
        }
        assert_eq!(*state.borrow(), InteractionState::default());
    }

    #[test]
    fn test_drag_threshold() {
        let mut pointer = PointerState::default();
        pointer.press(Vec2::new(10.0, 10.0));
        pointer.move_to(Vec2::new(12.0, 11.0));
        assert!(!pointer.is_dragging());
        pointer.move_to(Vec2::new(20.0, 10.0));
        assert!(pointer.is_dragging());
        pointer.move_to(Vec2::new(11.0, 10.0));
        assert!(pointer.is_dragging());
        pointer.release();
        assert!(!pointer.is_dragging());

        pointer.move_to(Vec2::new(40.0, 40.0));
        assert!(!pointer.is_dragging());
        pointer.press(Vec2::new(40.0, 40.0));
        assert!(!pointer.is_dragging());
    }
}

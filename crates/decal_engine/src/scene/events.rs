//! Outbound scene events
//!
//! The controller never calls into the UI. It queues typed events which the
//! host drains once per frame, or forwards to registered handlers.
//! Key principles:
//! - Typed payloads (no string keys)
//! - Handler returns bool (true = consumed, stops forwarding)
//! - Deferred delivery: events queue until the host drains them

use image::RgbaImage;

use crate::decal::{Strategy, TextureHandle, UvReport};
use crate::foundation::collections::{AssetId, DecalId, MaterialId};
use crate::foundation::color::Rgba;
use crate::foundation::math::Aabb;

/// Editable fields of a decal, as shown in the UI
#[derive(Debug, Clone, PartialEq)]
pub struct DecalSummary {
    /// Decal id
    pub id: DecalId,
    /// Source asset
    pub asset: AssetId,
    /// Strategy the decal uses
    pub strategy: Strategy,
    /// Size in world units or atlas pixels
    pub size: f32,
    /// Rotation in degrees
    pub rotation_deg: f32,
    /// Text, for text decals
    pub text: Option<String>,
    /// Font family, for text decals
    pub font_family: Option<String>,
    /// Fill color or tint
    pub color: Option<Rgba>,
    /// Small preview of the decal canvas
    pub thumbnail: RgbaImage,
}

/// Something the host may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A model finished importing
    ModelReady {
        /// Model name
        name: String,
        /// Number of mesh nodes
        mesh_count: usize,
        /// Materials in import order, by id and name
        materials: Vec<(MaterialId, String)>,
        /// Bounds in container space after normalization
        bounds: Aabb,
    },
    /// UV analysis finished; `needs_decision` means placement waits for the gate
    UvReportReady {
        /// Analysis results
        report: UvReport,
        /// Whether the user must accept or reject before placing
        needs_decision: bool,
    },
    /// The placement strategy for the current model is settled
    StrategySelected(Strategy),
    /// A new decal was placed
    DecalPlaced(DecalSummary),
    /// A decal changed
    DecalUpdated(DecalSummary),
    /// A decal was deleted
    DecalRemoved(DecalId),
    /// The model and all dependent state were discarded
    ModelCleared,
    /// All assets were discarded
    AssetsCleared,
    /// An asset was removed
    AssetRemoved(AssetId),
    /// An atlas texture changed and needs re-upload
    AtlasDirty(TextureHandle),
}

/// Event handler trait
/// Returns true if event was consumed (stops forwarding)
pub trait SceneEventHandler {
    /// Handle an event, return true if consumed
    fn on_event(&mut self, event: &SceneEvent) -> bool;
}

/// Event queue with optional handler chain
#[derive(Default)]
pub struct EventQueue {
    queue: Vec<SceneEvent>,
    handlers: Vec<Box<dyn SceneEventHandler>>,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event
    pub fn send(&mut self, event: SceneEvent) {
        log::trace!("Queued event: {:?}", std::mem::discriminant(&event));
        self.queue.push(event);
    }

    /// Register a handler; handlers see events in registration order
    pub fn register_handler(&mut self, handler: Box<dyn SceneEventHandler>) {
        self.handlers.push(handler);
    }

    /// Take every queued event without running handlers
    pub fn drain(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.queue)
    }

    /// Run queued events through the handler chain
    ///
    /// Returns the events no handler consumed.
    pub fn dispatch(&mut self) -> Vec<SceneEvent> {
        let events = std::mem::take(&mut self.queue);
        let mut unconsumed = Vec::new();
        for event in events {
            let consumed = self.handlers.iter_mut().any(|h| h.on_event(&event));
            if !consumed {
                unconsumed.push(event);
            }
        }
        unconsumed
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("queued", &self.queue.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct ConsumeCleared(Rc<RefCell<usize>>);

    impl SceneEventHandler for ConsumeCleared {
        fn on_event(&mut self, event: &SceneEvent) -> bool {
            if matches!(event, SceneEvent::ModelCleared) {
                *self.0.borrow_mut() += 1;
                return true;
            }
            false
        }
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = EventQueue::new();
        queue.send(SceneEvent::AssetsCleared);
        queue.send(SceneEvent::ModelCleared);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec![SceneEvent::AssetsCleared, SceneEvent::ModelCleared]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_handlers_consume_events() {
        let seen = Rc::new(RefCell::new(0));
        let mut queue = EventQueue::new();
        queue.register_handler(Box::new(ConsumeCleared(Rc::clone(&seen))));

        queue.send(SceneEvent::ModelCleared);
        queue.send(SceneEvent::AssetsCleared);
        let rest = queue.dispatch();

        assert_eq!(*seen.borrow(), 1);
        assert_eq!(rest, vec![SceneEvent::AssetsCleared]);
    }
}

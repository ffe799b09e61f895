//! DOM Level 2 mutation events
//!
//! Every node may carry an [`EventDispatcher`] holding its listeners. A
//! dispatch walks the ancestors of the target three times: capturing from
//! the root down to the parent, at the target itself, then bubbling back up
//! if the event bubbles.
//!
//! Listeners can add or remove listeners while a dispatch is running.
//! Removal during a dispatch only marks the entry; marked entries are
//! skipped and purged when the outermost dispatch finishes.

use std::cell::RefCell;
use std::rc::Rc;

use super::node::NodeId;

/// Event type names
pub mod event_types {
    pub const SUBTREE_MODIFIED: &str = "DOMSubtreeModified";
    pub const NODE_INSERTED: &str = "DOMNodeInserted";
    pub const NODE_REMOVED: &str = "DOMNodeRemoved";
    pub const NODE_REMOVED_FROM_DOCUMENT: &str = "DOMNodeRemovedFromDocument";
    pub const NODE_INSERTED_INTO_DOCUMENT: &str = "DOMNodeInsertedIntoDocument";
    pub const ATTR_MODIFIED: &str = "DOMAttrModified";
    pub const CHARACTER_DATA_MODIFIED: &str = "DOMCharacterDataModified";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capturing = 1,
    AtTarget = 2,
    Bubbling = 3,
}

/// Kind of change carried by `DOMAttrModified`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrChange {
    Modification = 1,
    Addition = 2,
    Removal = 3,
}

/// A mutation event in flight
#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub event_type: &'static str,
    pub target: NodeId,
    pub current_target: NodeId,
    pub phase: Phase,
    pub bubbles: bool,
    pub cancelable: bool,
    pub related_node: Option<NodeId>,
    pub prev_value: String,
    pub new_value: String,
    pub attr_name: String,
    pub attr_change: Option<AttrChange>,
    stopped: bool,
    canceled: bool,
}

impl MutationEvent {
    pub fn new(event_type: &'static str, target: NodeId, bubbles: bool) -> Self {
        MutationEvent {
            event_type,
            target,
            current_target: target,
            phase: Phase::AtTarget,
            bubbles,
            cancelable: false,
            related_node: None,
            prev_value: String::new(),
            new_value: String::new(),
            attr_name: String::new(),
            attr_change: None,
            stopped: false,
            canceled: false,
        }
    }

    pub fn with_related(mut self, node: NodeId) -> Self {
        self.related_node = Some(node);
        self
    }

    pub fn with_values(mut self, prev_value: impl Into<String>, new_value: impl Into<String>) -> Self {
        self.prev_value = prev_value.into();
        self.new_value = new_value.into();
        self
    }

    /// Stop propagation to further nodes; listeners of the current node still run
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.canceled = true;
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }
}

pub trait EventListener {
    fn handle_event(&mut self, event: &mut MutationEvent);
}

impl<F> EventListener for F
where
    F: FnMut(&mut MutationEvent),
{
    fn handle_event(&mut self, event: &mut MutationEvent) {
        self(event)
    }
}

pub type ListenerRef = Rc<RefCell<dyn EventListener>>;

struct ListenerEntry {
    id: u64,
    event_type: String,
    listener: ListenerRef,
    use_capture: bool,
    removed: bool,
}

/// Listener list of one node
#[derive(Default)]
pub struct EventDispatcher {
    entries: Vec<ListenerEntry>,
    next_id: u64,
    in_dispatch: usize,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .field("in_dispatch", &self.in_dispatch)
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; registering the same listener twice for the
    /// same type and phase has no effect
    pub fn add_event_listener(&mut self, event_type: &str, listener: ListenerRef, use_capture: bool) {
        let exists = self.entries.iter().any(|e| {
            !e.removed && e.use_capture == use_capture && e.event_type == event_type && Rc::ptr_eq(&e.listener, &listener)
        });
        if exists {
            return;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(ListenerEntry {
            id,
            event_type: event_type.to_string(),
            listener,
            use_capture,
            removed: false,
        });
    }

    pub fn remove_event_listener(&mut self, event_type: &str, listener: &ListenerRef, use_capture: bool) {
        let matches = |e: &ListenerEntry| {
            e.use_capture == use_capture && e.event_type == event_type && Rc::ptr_eq(&e.listener, listener)
        };
        if self.in_dispatch > 0 {
            for entry in self.entries.iter_mut().filter(|e| matches(e)) {
                entry.removed = true;
            }
        } else {
            self.entries.retain(|e| !matches(e));
        }
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.removed).count()
    }

    fn is_live(&self, id: u64) -> bool {
        self.entries.iter().any(|e| e.id == id && !e.removed)
    }

    /// Run the listeners of this node that apply to the event's current phase
    pub fn dispatch(this: &Rc<RefCell<EventDispatcher>>, event: &mut MutationEvent) {
        let snapshot: Vec<(u64, ListenerRef)> = {
            let mut d = this.borrow_mut();
            d.in_dispatch += 1;
            d.entries
                .iter()
                .filter(|e| !e.removed && e.event_type == event.event_type)
                .filter(|e| match event.phase {
                    Phase::Capturing => e.use_capture,
                    Phase::AtTarget => true,
                    Phase::Bubbling => !e.use_capture,
                })
                .map(|e| (e.id, e.listener.clone()))
                .collect()
        };

        for (id, listener) in snapshot {
            if !this.borrow().is_live(id) {
                continue;
            }
            // A listener that triggers a nested dispatch of itself is skipped
            if let Ok(mut l) = listener.try_borrow_mut() {
                l.handle_event(event);
            }
        }

        let mut d = this.borrow_mut();
        d.in_dispatch -= 1;
        if d.in_dispatch == 0 {
            d.entries.retain(|e| !e.removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(i: u32) -> NodeId {
        NodeId::new(1, i)
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let mut d = EventDispatcher::new();
        let l: ListenerRef = Rc::new(RefCell::new(|_: &mut MutationEvent| {}));
        d.add_event_listener(event_types::NODE_INSERTED, l.clone(), false);
        d.add_event_listener(event_types::NODE_INSERTED, l.clone(), false);
        d.add_event_listener(event_types::NODE_INSERTED, l.clone(), true);
        assert_eq!(d.listener_count(), 2);
        d.remove_event_listener(event_types::NODE_INSERTED, &l, false);
        assert_eq!(d.listener_count(), 1);
    }

    #[test]
    fn test_phase_filtering() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let d = Rc::new(RefCell::new(EventDispatcher::new()));
        let h = hits.clone();
        let capture: ListenerRef = Rc::new(RefCell::new(move |_: &mut MutationEvent| h.borrow_mut().push("capture")));
        let h = hits.clone();
        let bubble: ListenerRef = Rc::new(RefCell::new(move |_: &mut MutationEvent| h.borrow_mut().push("bubble")));
        d.borrow_mut().add_event_listener(event_types::SUBTREE_MODIFIED, capture, true);
        d.borrow_mut().add_event_listener(event_types::SUBTREE_MODIFIED, bubble, false);

        let mut event = MutationEvent::new(event_types::SUBTREE_MODIFIED, node(2), true);
        event.phase = Phase::Capturing;
        EventDispatcher::dispatch(&d, &mut event);
        event.phase = Phase::Bubbling;
        EventDispatcher::dispatch(&d, &mut event);
        event.phase = Phase::AtTarget;
        EventDispatcher::dispatch(&d, &mut event);
        assert_eq!(*hits.borrow(), vec!["capture", "bubble", "capture", "bubble"]);
    }

    #[test]
    fn test_removal_during_dispatch_is_deferred() {
        let d = Rc::new(RefCell::new(EventDispatcher::new()));
        let count = Rc::new(RefCell::new(0));

        let c = count.clone();
        let second: ListenerRef = Rc::new(RefCell::new(move |_: &mut MutationEvent| *c.borrow_mut() += 1));
        let dd = d.clone();
        let victim = second.clone();
        let first: ListenerRef = Rc::new(RefCell::new(move |_: &mut MutationEvent| {
            dd.borrow_mut()
                .remove_event_listener(event_types::NODE_INSERTED, &victim, false);
        }));
        d.borrow_mut().add_event_listener(event_types::NODE_INSERTED, first, false);
        d.borrow_mut().add_event_listener(event_types::NODE_INSERTED, second, false);

        let mut event = MutationEvent::new(event_types::NODE_INSERTED, node(1), true);
        EventDispatcher::dispatch(&d, &mut event);
        assert_eq!(*count.borrow(), 0);
        assert_eq!(d.borrow().listener_count(), 1);
        assert_eq!(d.borrow().entries.len(), 1);
    }

    #[test]
    fn test_prevent_default_requires_cancelable() {
        let mut event = MutationEvent::new(event_types::NODE_REMOVED, node(1), true);
        event.prevent_default();
        assert!(!event.is_canceled());
        event.cancelable = true;
        event.prevent_default();
        assert!(event.is_canceled());
    }
}

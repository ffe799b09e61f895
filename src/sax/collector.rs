//! Event Collector
//!
//! Sink that records every event it receives, for batch inspection after
//! a parse.

use super::events::ParseEvent;
use super::handlers::EventSink;
use crate::error::XmlError;

/// Collector that gathers events during parsing
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<ParseEvent>,
}

impl EventCollector {
    /// Create a new collector
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(256),
        }
    }

    /// Get the collected events as a slice
    pub fn events(&self) -> &[ParseEvent] {
        &self.events
    }

    /// Take the collected events
    pub fn take_events(&mut self) -> Vec<ParseEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn into_events(self) -> Vec<ParseEvent> {
        self.events
    }

    /// Get number of collected events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Concatenated character data, coalesced across events
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Characters(t) | ParseEvent::IgnorableWhitespace(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for EventCollector {
    fn event(&mut self, event: ParseEvent) -> Result<(), XmlError> {
        self.events.push(event);
        Ok(())
    }
}

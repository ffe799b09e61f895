//! Whitespace filter
//!
//! Sink adapter that drops runs of whitespace-only character data standing
//! between markup, so that indentation does not turn into text. Character
//! data is buffered until the next non-character event; runs containing
//! anything but whitespace are forwarded unchanged, in a single event.

use super::events::ParseEvent;
use super::handlers::{EventSink, Locator};
use crate::core::unicode::is_all_whitespace;
use crate::error::XmlError;

pub struct WhitespaceFilter<'a> {
    inner: &'a mut dyn EventSink,
    pending: String,
    /// Inside a CDATA section: text is always kept
    in_cdata: bool,
}

impl<'a> WhitespaceFilter<'a> {
    pub fn new(inner: &'a mut dyn EventSink) -> Self {
        WhitespaceFilter {
            inner,
            pending: String::new(),
            in_cdata: false,
        }
    }

    fn flush(&mut self) -> Result<(), XmlError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.pending);
        if is_all_whitespace(&text) {
            return Ok(());
        }
        self.inner.event(ParseEvent::Characters(text))
    }
}

impl EventSink for WhitespaceFilter<'_> {
    fn event(&mut self, event: ParseEvent) -> Result<(), XmlError> {
        match event {
            ParseEvent::Characters(text) if !self.in_cdata => {
                self.pending.push_str(&text);
                Ok(())
            }
            ParseEvent::IgnorableWhitespace(_) => Ok(()),
            other => {
                self.flush()?;
                match other {
                    ParseEvent::StartCdata => self.in_cdata = true,
                    ParseEvent::EndCdata => self.in_cdata = false,
                    _ => {}
                }
                self.inner.event(other)
            }
        }
    }

    fn set_locator(&mut self, locator: Locator) {
        self.inner.set_locator(locator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sax::collector::EventCollector;
    use crate::sax::engine::Engine;
    use crate::sax::input_source::InputSource;

    #[test]
    fn test_drops_indentation() {
        let mut collector = EventCollector::new();
        {
            let mut filter = WhitespaceFilter::new(&mut collector);
            let mut engine = Engine::new();
            engine
                .parse(InputSource::from_text("<a>\n  <b>x y</b>\n  <c> </c><![CDATA[ ]]></a>"), &mut filter)
                .unwrap();
        }
        let texts: Vec<&str> = collector.events().iter().filter_map(ParseEvent::text).collect();
        assert_eq!(texts, vec!["x y", " "]);
    }
}

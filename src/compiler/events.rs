//! Change tracking for optimization passes.
//!
//! Passes record what they did as [`Event`]s in an [`EventLog`]. The log is
//! backed by `boxcar::Vec`, so events can be appended through a shared
//! reference from parallel pass invocations without locking.
//!
//! Passes usually collect into a local log and merge it into the context
//! only when they actually changed something:
//!
//! ```rust
//! use builderfold::compiler::{EventKind, EventLog, MethodId};
//!
//! let shared = EventLog::new();
//!
//! let changes = EventLog::new();
//! changes
//!     .record(EventKind::ConstantFolded)
//!     .at(MethodId::new(1), 4)
//!     .message("\"a\" + \"b\" => \"ab\"");
//!
//! if !changes.is_empty() {
//!     shared.merge(changes);
//! }
//! assert_eq!(shared.count(EventKind::ConstantFolded), 1);
//! ```

use std::fmt::{self, Write};

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::compiler::MethodId;

/// Kind of change recorded by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum EventKind {
    /// A builder's construct/init/append/materialize chain was removed entirely.
    BuilderRemoved,

    /// A materialize call was replaced by a constant string.
    ConstantFolded,

    /// Two constant appends (or an init and an append) were merged into one.
    AppendsMerged,

    /// A materialize call was replaced by an existing string or a `concat`.
    ConcatCreated,

    /// An instruction was deleted.
    InstructionRemoved,

    /// A phi node became unused and was removed.
    PhiRemoved,

    /// Informational message.
    Info,

    /// Something unexpected that did not stop the pipeline.
    Warning,

    /// A pass failed on a method.
    Error,
}

impl EventKind {
    /// Returns a human-readable description of the event kind.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::BuilderRemoved => "builder removed",
            Self::ConstantFolded => "materialize folded to constant",
            Self::AppendsMerged => "appends merged",
            Self::ConcatCreated => "materialize replaced by concat",
            Self::InstructionRemoved => "instruction removed",
            Self::PhiRemoved => "phi removed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns `true` for kinds that describe an IR change.
    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The method it happened in, if any.
    pub method: Option<MethodId>,
    /// Pass-specific location (usually an instruction index).
    pub location: Option<usize>,
    /// Free-form detail.
    pub message: String,
}

impl Event {
    /// Creates an event with no method, location or message.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            method: None,
            location: None,
            message: String::new(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(method) = self.method {
            write!(f, " {method}")?;
            if let Some(location) = self.location {
                write!(f, "@{location}")?;
            }
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Builder returned by [`EventLog::record`]; the event is logged when it drops.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl EventBuilder<'_> {
    /// Attributes the event to a method.
    pub fn method(mut self, method: MethodId) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.method = Some(method);
        }
        self
    }

    /// Attributes the event to a location within a method.
    pub fn at(mut self, method: MethodId, location: usize) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.method = Some(method);
            event.location = Some(location);
        }
        self
    }

    /// Sets the message. Consumes the builder, which records the event.
    pub fn message(mut self, message: impl Into<String>) {
        if let Some(event) = self.event.as_mut() {
            event.message = message.into();
        }
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.push(event);
        }
    }
}

/// Aggregate counts derived from an [`EventLog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Builders removed entirely.
    pub builders_removed: usize,
    /// Materialize calls folded to constants.
    pub constants_folded: usize,
    /// Append merges.
    pub appends_merged: usize,
    /// Materialize calls replaced by existing strings or concatenations.
    pub concats_created: usize,
    /// Instructions deleted.
    pub instructions_removed: usize,
    /// Phi nodes removed.
    pub phis_removed: usize,
    /// Distinct methods with at least one change.
    pub methods_changed: usize,
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} method(s) changed: {} builder(s) removed, {} constant(s) folded, \
             {} append merge(s), {} concat(s), {} instruction(s) and {} phi(s) removed",
            self.methods_changed,
            self.builders_removed,
            self.constants_folded,
            self.appends_merged,
            self.concats_created,
            self.instructions_removed,
            self.phis_removed
        )
    }
}

/// Thread-safe, append-only log of events.
pub struct EventLog {
    entries: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Starts recording an event of `kind`.
    ///
    /// The event is logged when the returned builder is dropped, so a bare
    /// `log.record(kind);` records immediately.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Some(Event::new(kind)),
        }
    }

    /// Appends a fully built event.
    pub fn push(&self, event: Event) {
        self.entries.push(event);
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.record(EventKind::Info).message(message);
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.record(EventKind::Warning).message(message);
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    /// Returns `true` if no event was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.count() == 0
    }

    /// Iterates over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter().map(|(_, event)| event)
    }

    /// Returns the number of events of `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.iter().filter(|event| event.kind == kind).count()
    }

    /// Returns `true` if an event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|event| event.kind == kind)
    }

    /// Copies every event of `other` into this log.
    pub fn merge(&self, other: EventLog) {
        for (_, event) in other.entries.iter() {
            self.entries.push(event.clone());
        }
    }

    /// Takes all events, leaving this log empty.
    #[must_use]
    pub fn take(&mut self) -> EventLog {
        std::mem::take(self)
    }

    /// Computes aggregate counts over the log.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        let mut methods = rustc_hash::FxHashSet::default();
        let mut stats = DerivedStats::default();
        for event in self.iter() {
            match event.kind {
                EventKind::BuilderRemoved => stats.builders_removed += 1,
                EventKind::ConstantFolded => stats.constants_folded += 1,
                EventKind::AppendsMerged => stats.appends_merged += 1,
                EventKind::ConcatCreated => stats.concats_created += 1,
                EventKind::InstructionRemoved => stats.instructions_removed += 1,
                EventKind::PhiRemoved => stats.phis_removed += 1,
                _ => {}
            }
            if event.kind.is_change() {
                if let Some(method) = event.method {
                    methods.insert(method);
                }
            }
        }
        stats.methods_changed = methods.len();
        stats
    }

    /// Formats a per-kind summary for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Events: {} total", self.len());
        for kind in EventKind::iter() {
            let count = self.count(kind);
            if count > 0 {
                let _ = writeln!(output, "  {:<32} {count}", kind.description());
            }
        }
        output
    }
}

impl fmt::Display for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_on_drop() {
        let log = EventLog::new();
        log.record(EventKind::InstructionRemoved);
        log.record(EventKind::ConstantFolded)
            .method(MethodId::new(2))
            .message("x");
        assert_eq!(log.len(), 2);
        let folded = log.iter().nth(1).expect("second event");
        assert_eq!(folded.method, Some(MethodId::new(2)));
        assert_eq!(folded.message, "x");
    }

    #[test]
    fn test_merge_and_take() {
        let mut shared = EventLog::new();
        let local = EventLog::new();
        local.info("hello");
        local.warn("careful");
        shared.merge(local);
        assert!(shared.has(EventKind::Warning));

        let taken = shared.take();
        assert_eq!(taken.len(), 2);
        assert!(shared.is_empty());
    }

    #[test]
    fn test_stats_count_distinct_methods() {
        let log = EventLog::new();
        log.record(EventKind::BuilderRemoved).at(MethodId::new(1), 0);
        log.record(EventKind::ConstantFolded).at(MethodId::new(1), 3);
        log.record(EventKind::AppendsMerged).at(MethodId::new(4), 1);
        log.record(EventKind::Warning).method(MethodId::new(9));

        let stats = log.stats();
        assert_eq!(stats.builders_removed, 1);
        assert_eq!(stats.constants_folded, 1);
        assert_eq!(stats.appends_merged, 1);
        assert_eq!(stats.methods_changed, 2);
    }

    #[test]
    fn test_every_kind_has_description() {
        assert_eq!(EventKind::iter().count(), EventKind::COUNT);
        for kind in EventKind::iter() {
            assert!(!kind.description().is_empty());
        }
    }

    #[test]
    fn test_event_display() {
        let mut event = Event::new(EventKind::ConcatCreated);
        event.method = Some(MethodId::new(3));
        event.location = Some(7);
        event.message = "v4".to_string();
        assert_eq!(event.to_string(), "[materialize replaced by concat] M0003@7: v4");
    }
}

//! Diagnostic sink for installation and runtime anomalies.
//!
//! Everything noteworthy that happens while patches are installed or while hooks run is
//! recorded in an [`EventLog`]: passes that matched, patterns that were not found, targets
//! that were skipped or installed, registrations that retired. Events can be inspected by the
//! embedding application or ignored.
//!
//! Every recorded event is also forwarded to the [`log`] facade, one line per event, so a host
//! that installs a logger sees the same information without querying the log.
//!
//! # Deduplication
//!
//! Anomalies that can repeat every frame are recorded through [`EventLog::record_once`] with
//! a stable identifier. Only the first event for an identifier is kept and forwarded.
//!
//! # Example
//!
//! ```rust
//! use ilweave::diagnostics::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.info("installing camera patches");
//!
//! for _ in 0..3 {
//!     if let Some(event) = log.record_once("null-driver", EventKind::Error) {
//!         event.message("Unexpected null camera driver");
//!     }
//! }
//!
//! assert_eq!(log.count_kind(EventKind::Error), 1);
//! assert_eq!(log.len(), 2);
//! ```

use std::{collections::HashMap, fmt};

use dashmap::DashSet;

use crate::patching::TargetKey;

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A rewrite pass matched and transformed a body.
    PassApplied,
    /// A rewrite pass never found its pattern.
    PatternNotFound,
    /// A target's rewritten body and hooks were installed.
    TargetInstalled,
    /// A registration was skipped (disabled or target absent).
    TargetSkipped,
    /// A registration retired and its hooks were unlinked.
    HookRetired,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::PassApplied => "pass applied",
            Self::PatternNotFound => "pattern not found",
            Self::TargetInstalled => "target installed",
            Self::TargetSkipped => "target skipped",
            Self::HookRetired => "hook retired",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this is a diagnostic event (info/warning/error/pattern not found).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(
            self,
            Self::PatternNotFound | Self::Info | Self::Warning | Self::Error
        )
    }

    fn level(self) -> log::Level {
        match self {
            Self::PatternNotFound | Self::Error => log::Level::Error,
            Self::Warning | Self::TargetSkipped => log::Level::Warn,
            Self::TargetInstalled | Self::HookRetired | Self::Info => log::Level::Info,
            Self::PassApplied => log::Level::Debug,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The patched method the event concerns (if applicable).
    pub target: Option<TargetKey>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            target: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(target) = &self.target {
            write!(f, " {target}")?;
        }
        if let Some(pass) = &self.pass {
            write!(f, " ({pass})")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log, and forwarded to the `log`
/// facade, when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    target: Option<TargetKey>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            target: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the target method the event concerns.
    pub fn target(mut self, target: &TargetKey) -> Self {
        self.target = Some(target.clone());
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.push(Event {
            kind: self.kind,
            target: self.target.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Collection of events from installation and hook execution.
///
/// This type is thread-safe: events can be appended concurrently from multiple threads using
/// shared references (`&self`).
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
    seen: DashSet<String>,
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    fn push(&self, event: Event) {
        log::log!(target: "ilweave", event.kind.level(), "{event}");
        self.events.push(event);
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Starts building an event unless one was already recorded under `id`.
    ///
    /// Returns `None` for every call after the first with the same identifier.
    pub fn record_once(&self, id: impl Into<String>, kind: EventKind) -> Option<EventBuilder<'_>> {
        if self.seen.insert(id.into()) {
            Some(EventBuilder::new(self, kind))
        } else {
            None
        }
    }

    /// Returns true if an event was recorded under the stable identifier `id`.
    #[must_use]
    pub fn seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.push(Event::new(EventKind::Error, message));
    }

    /// Records an error message at most once per identifier.
    pub fn error_once(&self, id: impl Into<String>, message: impl Into<String>) {
        if let Some(event) = self.record_once(id, EventKind::Error) {
            event.message(message);
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Returns an iterator over events for a specific target.
    pub fn filter_target<'a>(&'a self, target: &'a TargetKey) -> impl Iterator<Item = &'a Event> {
        self.events
            .iter()
            .filter_map(move |(_, e)| (e.target.as_ref() == Some(target)).then_some(e))
    }

    /// Returns an iterator over diagnostic events only.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(|(_, e)| e.kind.is_diagnostic().then_some(e))
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();
        parts.sort();
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_commits_on_drop() {
        let log = EventLog::new();
        let target = TargetKey::method("CameraDriver", "Update");

        log.record(EventKind::PassApplied)
            .target(&target)
            .pass("root-size-setter")
            .message("1 match");

        let event = log.iter().next().unwrap();
        assert_eq!(event.kind, EventKind::PassApplied);
        assert_eq!(event.pass.as_deref(), Some("root-size-setter"));
        assert_eq!(
            event.to_string(),
            "[pass applied] CameraDriver::Update() (root-size-setter): 1 match"
        );
    }

    #[test]
    fn test_default_message() {
        let log = EventLog::new();
        drop(log.record(EventKind::HookRetired));
        assert_eq!(log.iter().next().unwrap().message, "hook retired");
    }

    #[test]
    fn test_record_once_deduplicates() {
        let log = EventLog::new();
        for _ in 0..5 {
            log.error_once("506973465", "Unexpected null camera driver");
        }
        log.error_once("other", "something else");

        assert_eq!(log.count_kind(EventKind::Error), 2);
        assert!(log.seen("506973465"));
        assert!(!log.seen("never"));
    }

    #[test]
    fn test_queries() {
        let log = EventLog::new();
        let update = TargetKey::method("CameraDriver", "Update");
        let zoom = TargetKey::getter("CameraDriver", "CurrentZoom");

        drop(log.record(EventKind::TargetInstalled).target(&update));
        drop(log.record(EventKind::TargetInstalled).target(&zoom));
        drop(log.record(EventKind::PatternNotFound).target(&update));
        log.warn("odd");

        assert_eq!(log.filter_target(&update).count(), 2);
        assert_eq!(log.filter_kind(EventKind::TargetInstalled).count(), 2);
        assert_eq!(log.diagnostics().count(), 2);
        assert!(log.has(EventKind::Warning));
        assert_eq!(
            log.summary(),
            "1 pattern not found, 1 warning, 2 target installed"
        );
        assert_eq!(EventLog::new().summary(), "no events");
    }
}

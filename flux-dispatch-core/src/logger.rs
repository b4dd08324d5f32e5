//! Payload logging with pattern-based filtering and in-memory storage
//!
//! Observes a [`Dispatcher`] and logs every payload that passes a glob
//! filter, either to `tracing` only or also into a ring buffer that can be
//! inspected or exported as JSON.
//!
//! # Example
//!
//! ```ignore
//! use flux_dispatch::logger::{PayloadLogConfig, PayloadLogger, PayloadLoggerConfig};
//!
//! // Log everything except lifecycle noise (tracing only)
//! let logger = PayloadLogger::new(PayloadLoggerConfig::new(None, Some("DidExecute,WillExecute")));
//! logger.observe(&dispatcher);
//!
//! // Keep the last 50 payloads around
//! let logger = PayloadLogger::with_log(PayloadLogConfig::with_capacity(50));
//! let subscription = logger.observe(&dispatcher);
//!
//! if let Some(entries) = logger.recent(10) {
//!     for entry in entries {
//!         println!("{}: {}", entry.elapsed_display(), entry.summary);
//!     }
//! }
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use serde::Serialize;

use crate::dispatcher::{Dispatchable, Dispatcher};
use crate::meta::DispatcherPayloadMeta;
use crate::payload::{AnyPayload, Payload};
use crate::subscription::Subscription;

/// Glob filter applied to payload kinds.
///
/// Patterns support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
///
/// # Examples
///
/// - `Todo*` matches TodoAdded, TodoRemoved, etc.
/// - `*Execute` matches WillExecute and DidExecute
/// - `Error` matches only Error payloads
#[derive(Debug, Clone, Default)]
pub struct PayloadLoggerConfig {
    /// If non-empty, only log payloads matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude payloads matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
}

impl PayloadLoggerConfig {
    /// Create a config from comma-separated pattern strings.
    ///
    /// ```
    /// use flux_dispatch_core::logger::PayloadLoggerConfig;
    ///
    /// let config = PayloadLoggerConfig::new(Some("Todo*,Error"), Some("TodoTicked"));
    /// assert!(config.should_log("TodoAdded"));
    /// assert!(config.should_log("Error"));
    /// assert!(!config.should_log("TodoTicked"));
    /// assert!(!config.should_log("Complete"));
    /// ```
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_default(),
        }
    }

    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// Check if a payload kind passes the include/exclude patterns
    pub fn should_log(&self, kind: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|p| glob_match(p, kind))
        {
            return false;
        }

        !self.exclude_patterns.iter().any(|p| glob_match(p, kind))
    }
}

fn split_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// An entry in the payload log
#[derive(Debug, Clone, Serialize)]
pub struct PayloadLogEntry {
    /// Payload kind (from `AnyPayload::kind`)
    pub kind: &'static str,
    /// One-line summary (from `AnyPayload::summary`)
    pub summary: String,
    /// Producing use case, rendered as `Name#id`
    pub use_case: Option<String>,
    pub parent_use_case: Option<String>,
    pub is_trusted: bool,
    pub is_use_case_finished: bool,
    /// Elapsed time recorded on the meta, in microseconds
    pub elapsed_us: Option<u128>,
    /// Sequence number for ordering
    pub sequence: u64,
    /// When the entry was logged
    #[serde(skip)]
    pub timestamp: Instant,
}

impl PayloadLogEntry {
    pub fn new<P: Payload>(
        payload: &AnyPayload<P>,
        meta: &DispatcherPayloadMeta,
        sequence: u64,
    ) -> Self {
        Self {
            kind: payload.kind(),
            summary: payload.summary(),
            use_case: meta.use_case.as_ref().map(ToString::to_string),
            parent_use_case: meta.parent_use_case.as_ref().map(ToString::to_string),
            is_trusted: meta.is_trusted,
            is_use_case_finished: meta.is_use_case_finished,
            elapsed_us: meta.elapsed.map(|elapsed| elapsed.as_micros()),
            sequence,
            timestamp: Instant::now(),
        }
    }

    /// Time since this payload was logged
    pub fn elapsed(&self) -> std::time::Duration {
        self.timestamp.elapsed()
    }

    /// Format the elapsed time for display (e.g., "2.3s", "150ms")
    pub fn elapsed_display(&self) -> String {
        let elapsed = self.elapsed();
        if elapsed.as_secs() >= 1 {
            format!("{:.1}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        }
    }
}

/// Configuration for the payload log ring buffer
#[derive(Debug, Clone)]
pub struct PayloadLogConfig {
    /// Maximum number of entries to keep
    pub capacity: usize,
    pub filter: PayloadLoggerConfig,
}

impl Default for PayloadLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: PayloadLoggerConfig::default(),
        }
    }
}

impl PayloadLogConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn new(capacity: usize, filter: PayloadLoggerConfig) -> Self {
        Self { capacity, filter }
    }
}

/// In-memory ring buffer of recent payloads.
///
/// Older entries are discarded once capacity is reached.
#[derive(Debug, Clone)]
pub struct PayloadLog {
    entries: VecDeque<PayloadLogEntry>,
    config: PayloadLogConfig,
    next_sequence: u64,
}

impl Default for PayloadLog {
    fn default() -> Self {
        Self::new(PayloadLogConfig::default())
    }
}

impl PayloadLog {
    pub fn new(config: PayloadLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Log a payload (if it passes the filter)
    ///
    /// Returns the entry if it was logged, None if filtered out.
    pub fn log<P: Payload>(
        &mut self,
        payload: &AnyPayload<P>,
        meta: &DispatcherPayloadMeta,
    ) -> Option<&PayloadLogEntry> {
        if self.config.capacity == 0 || !self.config.filter.should_log(payload.kind()) {
            return None;
        }

        let entry = PayloadLogEntry::new(payload, meta, self.next_sequence);
        self.next_sequence += 1;

        if self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }

        self.entries.push_back(entry);
        self.entries.back()
    }

    /// All entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &PayloadLogEntry> {
        self.entries.iter()
    }

    /// The most recent `count` entries, newest first
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &PayloadLogEntry> {
        self.entries.iter().rev().take(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &PayloadLogConfig {
        &self.config
    }

    /// Export the entries (oldest first) as a JSON array
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

/// Dispatcher observer that logs payloads.
///
/// Two modes:
/// - **Tracing only** (default): logs via `tracing::debug!()`
/// - **With storage**: also records into a [`PayloadLog`]
///
/// Cheap to clone; clones share the same log.
#[derive(Debug, Clone)]
pub struct PayloadLogger {
    config: PayloadLoggerConfig,
    log: Option<Rc<RefCell<PayloadLog>>>,
    active: bool,
}

impl Default for PayloadLogger {
    fn default() -> Self {
        Self::log_all()
    }
}

impl PayloadLogger {
    /// Tracing only, no in-memory storage
    pub fn new(config: PayloadLoggerConfig) -> Self {
        Self {
            config,
            log: None,
            active: true,
        }
    }

    /// Tracing plus in-memory storage
    pub fn with_log(config: PayloadLogConfig) -> Self {
        Self {
            config: config.filter.clone(),
            log: Some(Rc::new(RefCell::new(PayloadLog::new(config)))),
            active: true,
        }
    }

    /// No filtering, tracing only
    pub fn log_all() -> Self {
        Self::new(PayloadLoggerConfig::default())
    }

    /// Set whether the logger is active.
    ///
    /// An inactive logger does not subscribe at all, e.g. when a `--debug`
    /// flag was not passed.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &PayloadLoggerConfig {
        &self.config
    }

    /// Start logging payloads sent on `dispatcher`.
    pub fn observe<P: Payload>(&self, dispatcher: &Dispatcher<P>) -> Subscription {
        if !self.active {
            return Subscription::noop();
        }

        let logger = self.clone();
        dispatcher.on_dispatch(move |payload, meta| logger.record(payload, meta))
    }

    /// Log one payload.
    pub fn record<P: Payload>(&self, payload: &AnyPayload<P>, meta: &DispatcherPayloadMeta) {
        if !self.active {
            return;
        }

        let kind = payload.kind();
        if self.config.should_log(kind) {
            tracing::debug!(
                payload = %kind,
                use_case = ?meta.use_case.as_ref().map(ToString::to_string),
                trusted = meta.is_trusted,
                "payload"
            );
        }

        if let Some(log) = &self.log {
            log.borrow_mut().log(payload, meta);
        }
    }

    /// Snapshot of the most recent `count` entries, newest first.
    ///
    /// `None` when storage is disabled.
    pub fn recent(&self, count: usize) -> Option<Vec<PayloadLogEntry>> {
        self.log
            .as_ref()
            .map(|log| log.borrow().recent(count).cloned().collect())
    }

    /// Snapshot of the stored log, if storage is enabled.
    pub fn log(&self) -> Option<PayloadLog> {
        self.log.as_ref().map(|log| log.borrow().clone())
    }

    pub fn to_json(&self) -> Option<serde_json::Result<String>> {
        self.log.as_ref().map(|log| log.borrow().to_json())
    }
}

/// Simple glob pattern matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == text[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    star = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

// ── Bounded diagnostic log ring ──
//
// The last-100 entries are the primary diagnostic surface: every state
// transition, inbound event, and outbound command lands here. Entries
// are mirrored to `tracing` at the matching level so a subscriber sees
// the same stream.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Retention bound; the oldest entry is evicted past this.
pub const LOG_CAPACITY: usize = 100;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One immutable diagnostic entry, stamped with the tenant active at
/// logging time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub level: LogLevel,
    pub message: String,
    /// `"unknown"` when no tenant was active.
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Newest-first ring of the last [`LOG_CAPACITY`] entries.
pub struct LogBuffer {
    entries: Mutex<VecDeque<Arc<LogEntry>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)),
        }
    }

    /// Append an entry, evicting the oldest beyond capacity.
    ///
    /// Returns the entry so the caller can publish it on the event bus.
    pub fn push(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        tenant_id: Option<&str>,
    ) -> Arc<LogEntry> {
        let entry = Arc::new(LogEntry {
            id: Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            tenant_id: tenant_id.unwrap_or("unknown").to_owned(),
            timestamp: Utc::now(),
        });

        match level {
            LogLevel::Error => {
                tracing::error!(tenant = %entry.tenant_id, "{}", entry.message);
            }
            LogLevel::Warning => {
                tracing::warn!(tenant = %entry.tenant_id, "{}", entry.message);
            }
            LogLevel::Success | LogLevel::Info => {
                tracing::info!(tenant = %entry.tenant_id, "{}", entry.message);
            }
        }

        if let Ok(mut entries) = self.entries.lock() {
            entries.push_front(Arc::clone(&entry));
            entries.truncate(LOG_CAPACITY);
        }

        entry
    }

    /// All retained entries, newest first.
    pub fn entries(&self) -> Vec<Arc<LogEntry>> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries filtered by level (newest first), capped at `limit`.
    pub fn filtered(&self, level: Option<LogLevel>, limit: usize) -> Vec<Arc<LogEntry>> {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| level.is_none_or(|l| e.level == l))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn entries_come_back_newest_first() {
        let buf = LogBuffer::new();
        buf.push(LogLevel::Info, "first", Some("t1"));
        buf.push(LogLevel::Error, "second", Some("t1"));

        let entries = buf.entries();
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "first");
    }

    #[test]
    fn capacity_evicts_oldest() {
        let buf = LogBuffer::new();
        for i in 0..(LOG_CAPACITY + 1) {
            buf.push(LogLevel::Info, format!("entry {i}"), Some("t1"));
        }

        assert_eq!(buf.len(), LOG_CAPACITY);
        let entries = buf.entries();
        // "entry 0" was the oldest and must be gone.
        assert_eq!(entries.last().unwrap().message, "entry 1");
        assert_eq!(entries[0].message, format!("entry {LOG_CAPACITY}"));
    }

    #[test]
    fn missing_tenant_is_stamped_unknown() {
        let buf = LogBuffer::new();
        let entry = buf.push(LogLevel::Warning, "no tenant yet", None);
        assert_eq!(entry.tenant_id, "unknown");
    }

    #[test]
    fn filtered_respects_level_and_limit() {
        let buf = LogBuffer::new();
        buf.push(LogLevel::Info, "a", Some("t1"));
        buf.push(LogLevel::Error, "b", Some("t1"));
        buf.push(LogLevel::Error, "c", Some("t1"));
        buf.push(LogLevel::Error, "d", Some("t1"));

        let errors = buf.filtered(Some(LogLevel::Error), 2);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "d");
        assert_eq!(errors[1].message, "c");

        let all = buf.filtered(None, 10);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn clear_empties_the_ring() {
        let buf = LogBuffer::new();
        buf.push(LogLevel::Info, "x", None);
        buf.clear();
        assert!(buf.is_empty());
    }
}

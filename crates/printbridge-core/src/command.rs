// ── Outbound command identity ──
//
// Every dispatched command carries a fresh command id, the active tenant,
// and a timestamp. The envelope is the correlation handle: results come
// back asynchronously as `print_result`/`command_response` events and are
// matched by command id at the consumer layer. There is no timeout or
// retry on commands themselves -- only connection-level retries exist.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What an outbound command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Print,
    OpenDrawer,
    StatusUpdate,
    Ack,
}

/// Identity stamped onto one outbound dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub command_id: String,
    pub printer_id: String,
    pub kind: CommandKind,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

impl CommandEnvelope {
    /// Stamp a new command with a fresh id.
    pub fn new(
        kind: CommandKind,
        printer_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            printer_id: printer_id.into(),
            kind,
            tenant_id: tenant_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Stamp an acknowledgment that correlates back to a command id the
    /// gateway handed us.
    pub fn ack(
        command_id: impl Into<String>,
        printer_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            printer_id: printer_id.into(),
            kind: CommandKind::Ack,
            tenant_id: tenant_id.into(),
            timestamp: Utc::now(),
        }
    }
}

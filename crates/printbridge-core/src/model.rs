// ── Printer domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printbridge_api::message::PrinterInfo;
use printbridge_api::{PrinterKind, PrinterStatus};

/// A printer known to the registry for the active tenant.
///
/// Created on a `printer_registered` acknowledgment or a roster push,
/// never on a local registration send -- the gateway's ack is
/// authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterRecord {
    /// Unique within the tenant.
    pub printer_id: String,
    pub display_name: String,
    pub kind: PrinterKind,
    pub location: String,
    pub status: PrinterStatus,
    pub last_error: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl PrinterRecord {
    pub fn is_online(&self) -> bool {
        self.status.is_online()
    }

    /// Build a record from a gateway descriptor, filling gaps the way the
    /// gateway itself does for sparse registrations.
    pub fn from_info(info: &PrinterInfo, now: DateTime<Utc>) -> Self {
        Self {
            printer_id: info.printer_id.clone(),
            display_name: info
                .printer_name
                .clone()
                .unwrap_or_else(|| "Unknown Printer".to_owned()),
            kind: info.printer_type.unwrap_or(PrinterKind::Thermal),
            location: info
                .location
                .clone()
                .unwrap_or_else(|| "Unknown Location".to_owned()),
            status: info.status.unwrap_or(PrinterStatus::Online),
            last_error: info.last_error.clone(),
            registered_at: now,
            last_update: now,
        }
    }
}

/// Durable per-tenant printer configuration, read on connect to drive
/// auto re-registration and written when the user registers or edits a
/// printer. Registration is a per-socket-session concept on the gateway,
/// so this record is the only thing that survives a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub printer_id: String,
    /// Connection endpoint of the physical device (IP or metadata).
    pub connection_info: String,
}

//! Typed message set for the print-gateway wire protocol.
//!
//! Every frame on the socket is a JSON envelope `{"event": <name>,
//! "data": {...}}`. Outbound messages serialize through [`Outbound`]
//! (adjacently tagged, so the enum IS the envelope). Inbound frames go
//! through a two-stage parse: the envelope first, then the payload for
//! the matched event name -- unrecognized events come back as
//! [`Inbound::Unknown`] so nothing from the gateway is silently dropped.
//!
//! Field names on the wire are camelCase; this is the contract the
//! gateway exposes to its JavaScript-facing peers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ── Device enums ─────────────────────────────────────────────────────

/// Printer hardware class, as carried in registration payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterKind {
    Thermal,
    Inkjet,
    Laser,
    DotMatrix,
}

/// Printer operational status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterStatus {
    Online,
    Offline,
    Error,
    Busy,
}

impl PrinterStatus {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }

    /// Wire spelling, also used in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
            Self::Busy => "busy",
        }
    }
}

// ── Outbound messages ────────────────────────────────────────────────

/// Everything this client sends to the gateway.
///
/// Serializes to the wire envelope directly: the variant name becomes the
/// `event` field, the payload lands under `data`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    PrinterRegister(RegisterPrinter),
    PrintCommand(PrintRequest),
    OpenDrawer(DrawerRequest),
    PrinterStatus(StatusReport),
    CommandResponse(CommandResponse),
    GetPrintersList(PrintersListRequest),
}

impl Outbound {
    /// Serialize to a wire frame.
    pub fn to_frame(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// The `event` name this message carries on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PrinterRegister(_) => "printer_register",
            Self::PrintCommand(_) => "print_command",
            Self::OpenDrawer(_) => "open_drawer",
            Self::PrinterStatus(_) => "printer_status",
            Self::CommandResponse(_) => "command_response",
            Self::GetPrintersList(_) => "get_printers_list",
        }
    }
}

/// `printer_register` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPrinter {
    pub printer_id: String,
    /// Connection endpoint of the physical device (IP or metadata blob).
    pub printer_ip: String,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `print_command` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    pub printer_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_data: Option<Value>,
    pub command_id: String,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `open_drawer` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawerRequest {
    pub printer_id: String,
    pub command_id: String,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `printer_status` payload (this process acting as a device bridge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub printer_id: String,
    pub status: PrinterStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `command_response` payload, correlating back to a received command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub command_id: String,
    pub printer_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `get_printers_list` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintersListRequest {
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

// ── Inbound messages ─────────────────────────────────────────────────

/// Everything the gateway pushes to this client.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Handshake acknowledgment carrying the session id.
    Connect(ConnectAck),
    /// Transport-level disconnect (remote close or network drop).
    Disconnect(DisconnectNotice),
    /// The gateway refused or aborted the session at the application level.
    ConnectError(GatewayRefusal),
    /// Registration acknowledgment for a printer.
    PrinterRegistered(PrinterInfo),
    /// A printer-side agent dropped off the gateway.
    PrinterDisconnected(PrinterDrop),
    /// Status push for a registered printer.
    PrinterStatus(PrinterStatusUpdate),
    /// Relayed print command (legacy event name).
    PrintCommand(ExecuteCommand),
    /// Print command addressed to this process as a device bridge.
    ExecutePrint(ExecuteCommand),
    /// Drawer command addressed to this process as a device bridge.
    ExecuteDrawer(ExecuteCommand),
    /// Outcome of a previously dispatched command.
    PrintResult(PrintResult),
    /// Full printer roster for the tenant.
    PrintersList(PrintersList),
    /// Anything the gateway sends that this client does not model.
    Unknown { event: String, data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAck {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectNotice {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRefusal {
    pub message: String,
}

/// Printer descriptor used by `printer_registered` and `printers_list`.
///
/// Most fields are optional: the gateway fills what it knows, and older
/// gateway builds omit the descriptive ones entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterInfo {
    pub printer_id: String,
    #[serde(default)]
    pub printer_name: Option<String>,
    #[serde(default)]
    pub printer_type: Option<PrinterKind>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: Option<PrinterStatus>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterDrop {
    pub printer_id: String,
    #[serde(default)]
    pub printer_name: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterStatusUpdate {
    pub printer_id: String,
    pub status: PrinterStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommand {
    #[serde(default)]
    pub command_id: Option<String>,
    pub command: String,
    #[serde(default)]
    pub print_data: Option<Value>,
    #[serde(default)]
    pub printer_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResult {
    pub command_id: String,
    #[serde(default)]
    pub printer_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintersList {
    #[serde(default)]
    pub printers: Vec<PrinterInfo>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub total_connected: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Raw envelope shape, before the event name is matched.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Parse one text frame into a typed [`Inbound`] message.
///
/// A frame that is not a JSON envelope is an [`Error::Envelope`]; a known
/// event with an undecodable payload is an [`Error::Payload`]. Events this
/// client does not model come back as [`Inbound::Unknown`] for the caller
/// to log.
pub fn parse_frame(text: &str) -> Result<Inbound, Error> {
    fn payload<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, Error> {
        serde_json::from_value(data).map_err(|e| Error::Payload {
            event: event.to_owned(),
            message: e.to_string(),
        })
    }

    let envelope: RawEnvelope = serde_json::from_str(text)?;
    let event = envelope.event.as_str();
    let msg = match event {
        "connect" => Inbound::Connect(payload(event, envelope.data)?),
        "disconnect" => Inbound::Disconnect(payload(event, envelope.data)?),
        "connect_error" => Inbound::ConnectError(payload(event, envelope.data)?),
        "printer_registered" => Inbound::PrinterRegistered(payload(event, envelope.data)?),
        "printer_disconnected" => Inbound::PrinterDisconnected(payload(event, envelope.data)?),
        "printer_status_updated" => Inbound::PrinterStatus(payload(event, envelope.data)?),
        "print_command" => Inbound::PrintCommand(payload(event, envelope.data)?),
        "execute_print" => Inbound::ExecutePrint(payload(event, envelope.data)?),
        "execute_drawer" => Inbound::ExecuteDrawer(payload(event, envelope.data)?),
        "print_result" => Inbound::PrintResult(payload(event, envelope.data)?),
        "printers_list" => Inbound::PrintersList(payload(event, envelope.data)?),
        _ => Inbound::Unknown {
            event: envelope.event,
            data: envelope.data,
        },
    };

    Ok(msg)
}

// ── Tests ────────────────────────────────────────────────────────────

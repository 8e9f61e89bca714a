// ── Core error types ──
//
// Domain-facing errors from printbridge-core. Public manager operations
// report preconditions as boolean-false returns plus a log entry (the
// caller decides UX); these variants carry the detail for log messages,
// storage failures, and the transport boundary.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Preconditions ────────────────────────────────────────────────
    #[error("No authentication token available")]
    MissingToken,

    #[error("No tenant selected")]
    MissingTenant,

    #[error("Not connected to print gateway")]
    NotConnected,

    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    // ── Storage ──────────────────────────────────────────────────────
    #[error("Printer store failure: {message}")]
    Storage { message: String },

    // ── Transport (wrapped, not exposed raw) ─────────────────────────
    #[error("Gateway transport error: {0}")]
    Transport(#[from] printbridge_api::Error),
}

impl CoreError {
    /// Returns `true` when the gateway explicitly refused the handshake
    /// credentials -- surfaced distinctly rather than retried silently.
    pub fn is_handshake_rejection(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_rejection())
    }
}

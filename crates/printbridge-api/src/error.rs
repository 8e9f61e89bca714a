use thiserror::Error;

/// Top-level error type for the `printbridge-api` crate.
///
/// Covers every failure mode of the transport layer: URL construction,
/// the WebSocket upgrade, the handshake acknowledgment, and frame codec
/// errors. `printbridge-core` maps these into domain-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Handshake ───────────────────────────────────────────────────
    /// Transport-level connect failure (refused, DNS, TLS, reset).
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    /// The gateway admitted the socket but rejected the credentials
    /// (missing/expired token, tenant mismatch).
    #[error("Gateway rejected handshake: {message}")]
    HandshakeRejected { message: String },

    /// No `connect` acknowledgment arrived within the handshake window.
    #[error("Handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// URL parsing error.
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Codec ───────────────────────────────────────────────────────
    /// A frame that is not a valid `{event, data}` envelope.
    #[error("Malformed frame: {0}")]
    Envelope(#[from] serde_json::Error),

    /// A recognized event whose payload failed to deserialize.
    #[error("Bad `{event}` payload: {message}")]
    Payload { event: String, message: String },

    // ── Connection ──────────────────────────────────────────────────
    /// The socket closed while the connection was still wanted.
    #[error("Connection closed: {reason}")]
    Closed { reason: String },
}

impl Error {
    /// Returns `true` if this is a transient failure worth retrying.
    ///
    /// Handshake rejections are deliberate server decisions and are not
    /// transient; callers surface them distinctly instead of looping.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::HandshakeTimeout { .. } | Self::Closed { .. }
        )
    }

    /// Returns `true` if the gateway explicitly refused the credentials.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::HandshakeRejected { .. })
    }
}

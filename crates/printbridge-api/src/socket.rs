//! WebSocket transport to the print gateway.
//!
//! [`WsConnector`] performs the upgrade with handshake-time credentials
//! (`token` and `tenantId` as query parameters, so the gateway admits or
//! rejects the socket before any application event flows), waits for the
//! gateway's `connect` acknowledgment, then bridges the socket to a pair
//! of bounded channels. The transport is plain WebSocket text frames --
//! there is no protocol upgrade negotiation beyond the HTTP upgrade
//! itself.
//!
//! The [`Connector`] trait is the seam the connection manager is written
//! against; tests substitute a scripted implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use url::Url;

use crate::error::Error;
use crate::message::{DisconnectNotice, Inbound, Outbound, parse_frame};

// ── Channel capacities ───────────────────────────────────────────────

pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;
pub const INBOUND_CHANNEL_CAPACITY: usize = 256;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// ── Handshake credentials ────────────────────────────────────────────

/// Connection-time credentials carried on the upgrade request.
#[derive(Debug, Clone)]
pub struct HandshakeAuth {
    pub token: SecretString,
    pub tenant_id: String,
}

/// Append the handshake credentials to the gateway URL.
fn handshake_url(url: &Url, auth: &HandshakeAuth) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair("token", auth.token.expose_secret())
        .append_pair("tenantId", &auth.tenant_id);
    url
}

// ── Connection handle ────────────────────────────────────────────────

/// An established, acknowledged gateway session.
///
/// Dropping `outbound` closes the socket from this side; the reader side
/// delivers a final [`Inbound::Disconnect`] when the socket goes away,
/// then closes `inbound`.
pub struct GatewayConnection {
    /// Session id assigned by the gateway in its `connect` acknowledgment.
    pub session_id: String,
    pub outbound: mpsc::Sender<Outbound>,
    pub inbound: mpsc::Receiver<Inbound>,
}

/// Transport seam: anything that can produce an authenticated
/// [`GatewayConnection`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url, auth: &HandshakeAuth) -> Result<GatewayConnection, Error>;
}

// ── Production connector ─────────────────────────────────────────────

/// The tokio-tungstenite connector used outside of tests.
#[derive(Debug, Clone)]
pub struct WsConnector {
    /// How long to wait for the gateway's `connect` acknowledgment.
    pub handshake_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url, auth: &HandshakeAuth) -> Result<GatewayConnection, Error> {
        let target = handshake_url(url, auth);
        tracing::info!(url = %url, "connecting to print gateway");

        let uri: tungstenite::http::Uri = target
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::Connect(e.to_string()))?;

        let request = ClientRequestBuilder::new(uri);
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        // The gateway speaks first: a `connect` ack with the session id,
        // or a `connect_error` refusal. Application events that race the
        // ack are buffered and redelivered in order.
        let timeout_ms = u64::try_from(self.handshake_timeout.as_millis()).unwrap_or(u64::MAX);
        let (session_id, pending) =
            tokio::time::timeout(self.handshake_timeout, await_session_ack(&mut read))
                .await
                .map_err(|_| Error::HandshakeTimeout { timeout_ms })??;

        tracing::info!(session_id = %session_id, "gateway handshake acknowledged");

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(INBOUND_CHANNEL_CAPACITY);

        // Writer: drain the outbound channel onto the sink.
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                match msg.to_frame() {
                    Ok(frame) => {
                        if let Err(e) = write.send(Message::text(frame)).await {
                            tracing::warn!(error = %e, "gateway send failed, stopping writer");
                            return;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to encode outbound frame"),
                }
            }
            // All senders dropped: the session owner is done with the socket.
            let _ = write.send(Message::Close(None)).await;
        });

        // Reader: frames to typed messages, with a terminal Disconnect.
        tokio::spawn(async move {
            for msg in pending {
                if inbound_tx.send(msg).await.is_err() {
                    return;
                }
            }

            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Ok(msg) => {
                            if inbound_tx.send(msg).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "skipping undecodable frame"),
                    },
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers pings on the shared socket
                        tracing::trace!("gateway ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        let _ = inbound_tx
                            .send(Inbound::Disconnect(DisconnectNotice { reason }))
                            .await;
                        return;
                    }
                    Some(Err(e)) => {
                        let _ = inbound_tx
                            .send(Inbound::Disconnect(DisconnectNotice {
                                reason: Some(e.to_string()),
                            }))
                            .await;
                        return;
                    }
                    None => {
                        let _ = inbound_tx
                            .send(Inbound::Disconnect(DisconnectNotice { reason: None }))
                            .await;
                        return;
                    }
                    _ => {
                        // Binary, Pong, raw Frame -- not part of the protocol
                    }
                }
            }
        });

        Ok(GatewayConnection {
            session_id,
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Read until the gateway acknowledges or refuses the session.
async fn await_session_ack<S>(read: &mut S) -> Result<(String, Vec<Inbound>), Error>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut pending = Vec::new();

    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                Ok(Inbound::Connect(ack)) => return Ok((ack.session_id, pending)),
                Ok(Inbound::ConnectError(refusal)) => {
                    return Err(Error::HandshakeRejected {
                        message: refusal.message,
                    });
                }
                Ok(other) => pending.push(other),
                Err(e) => tracing::debug!(error = %e, "skipping undecodable handshake frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "closed during handshake".to_owned());
                return Err(Error::Connect(reason));
            }
            Some(Err(e)) => return Err(Error::Connect(e.to_string())),
            None => return Err(Error::Connect("stream ended during handshake".to_owned())),
            _ => {}
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn auth() -> HandshakeAuth {
        HandshakeAuth {
            token: SecretString::from("bearer-abc".to_owned()),
            tenant_id: "unit-42".to_owned(),
        }
    }

    #[test]
    fn handshake_url_carries_credentials() {
        let base = Url::parse("ws://localhost:9000").unwrap();
        let url = handshake_url(&base, &auth());

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("token".to_owned(), "bearer-abc".to_owned())));
        assert!(pairs.contains(&("tenantId".to_owned(), "unit-42".to_owned())));
    }

    #[test]
    fn handshake_url_preserves_existing_path() {
        let base = Url::parse("wss://gateway.example.com/socket").unwrap();
        let url = handshake_url(&base, &auth());
        assert_eq!(url.path(), "/socket");
        assert_eq!(url.scheme(), "wss");
    }

    #[tokio::test]
    async fn session_ack_buffers_racing_events() {
        let frames = vec![
            Ok(Message::text(
                r#"{"event":"printers_list","data":{"printers":[]}}"#,
            )),
            Ok(Message::text(
                r#"{"event":"connect","data":{"sessionId":"s-1"}}"#,
            )),
        ];
        let mut stream = futures_util::stream::iter(frames);

        let (session_id, pending) = await_session_ack(&mut stream).await.unwrap();
        assert_eq!(session_id, "s-1");
        assert_eq!(pending.len(), 1);
        assert!(matches!(pending[0], Inbound::PrintersList(_)));
    }

    #[tokio::test]
    async fn session_refusal_is_a_rejection() {
        let frames = vec![Ok(Message::text(
            r#"{"event":"connect_error","data":{"message":"Unit ID is required"}}"#,
        ))];
        let mut stream = futures_util::stream::iter(frames);

        let err = await_session_ack(&mut stream).await.unwrap_err();
        assert!(err.is_rejection());
        assert!(err.to_string().contains("Unit ID is required"));
    }

    #[tokio::test]
    async fn stream_end_before_ack_is_a_connect_error() {
        let mut stream =
            futures_util::stream::iter(Vec::<Result<Message, tungstenite::Error>>::new());
        let err = await_session_ack(&mut stream).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
        assert!(err.is_transient());
    }
}

use crate::error::{Result, SpdyError};
use crate::frame::{Frame, PingFrame};
use crate::session::SessionInner;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A record of one PING sent or received.
///
/// Ping identifiers follow the stream parity rule (even for the server,
/// odd for the client) but are permitted to wrap after exhaustion.
#[derive(Debug, Clone)]
pub struct Ping {
    pub(crate) sent_at: Instant,
    pub(crate) rtt: Option<Duration>,
}

impl Ping {
    pub(crate) fn started() -> Self {
        Self {
            sent_at: Instant::now(),
            rtt: None,
        }
    }

    /// Round-trip time, once the echo has arrived.
    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }
}

impl SessionInner {
    /// Record a new ping and hand the frame to the serializer. Does not
    /// wait for the echo; the RTT lands on the record when it arrives.
    pub(crate) async fn send_ping(&self) -> Result<u32> {
        if self.state.is_closed() {
            return Err(SpdyError::SessionClosed);
        }
        let id = self.ids.allocate_ping();
        // Identifiers wrap, so a very old outstanding ping could collide.
        // Refuse rather than overwrite its record.
        if self.pings.contains_key(&id) {
            return Err(SpdyError::PingInUse(id));
        }
        self.pings.insert(id, Ping::started());
        tracing::trace!(id, "sending ping");
        if self.frame_tx.send_async(Frame::ping(id)).await.is_err() {
            self.pings.remove(&id);
            return Err(SpdyError::SessionClosed);
        }
        Ok(id)
    }

    /// A PING arrived: echo the peer's probes, record the RTT of our own.
    pub(crate) async fn handle_ping(&self, frame: PingFrame) -> Result<()> {
        let id = frame.id;
        if self.ids.is_local(id) {
            // Echo of one of our pings.
            match self.pings.get_mut(&id) {
                None => tracing::debug!(id, "echo for unknown ping, ignoring"),
                Some(mut ping) => {
                    if ping.rtt.is_some() {
                        tracing::debug!(id, "duplicate ping echo, ignoring");
                    } else {
                        ping.rtt = Some(ping.sent_at.elapsed());
                        tracing::trace!(id, rtt = ?ping.rtt, "ping echoed");
                    }
                }
            }
        } else {
            // New ping from the peer: echo it right back.
            if self.pings.contains_key(&id) {
                tracing::debug!(id, "duplicate ping from peer, ignoring");
                return Ok(());
            }
            self.frame_tx
                .send_async(Frame::ping(id))
                .await
                .map_err(|_| SpdyError::SessionClosed)?;
            self.pings.insert(id, Ping::started());
        }
        Ok(())
    }
}

/// Probe the peer on a fixed cadence until the session dies. A failed
/// ping write is the liveness timeout: it tears the session down.
pub(crate) async fn ping_loop(inner: Arc<SessionInner>) {
    let mut ticker = tokio::time::interval(inner.config.ping_interval);
    loop {
        let shutdown = inner.state.die.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();
        if inner.state.is_closed() {
            break;
        }
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => match inner.send_ping().await {
                Ok(_) => {}
                Err(err) if err.is_fatal() => {
                    tracing::debug!(%err, "ping failed, closing session");
                    inner.close_with_error(err);
                    break;
                }
                Err(err) => {
                    // Typically a wrapped ping id colliding with one still
                    // outstanding; the next tick tries again.
                    tracing::warn!(%err, "skipping probe");
                }
            },
        }
    }
}

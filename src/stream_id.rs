use crate::error::{Result, SpdyError};
use crate::frame::MAX_STREAM_ID;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier policy for one session.
///
/// The 31-bit identifier space is split by parity: the server owns even
/// identifiers, the client odd ones. Local allocations step by two and
/// never wrap; inbound identifiers must mirror the same progression from
/// the peer's side. Ping identifiers share the parity rule but are allowed
/// to wrap once the space is exhausted.
#[derive(Debug)]
pub struct StreamIds {
    server: bool,
    last_local: AtomicU32,
    last_remote: AtomicU32,
    last_ping: AtomicU32,
}

impl StreamIds {
    pub fn new(server: bool) -> Self {
        Self {
            server,
            last_local: AtomicU32::new(0),
            last_remote: AtomicU32::new(0),
            last_ping: AtomicU32::new(0),
        }
    }

    fn first_local(&self) -> u32 {
        if self.server { 2 } else { 1 }
    }

    fn first_remote(&self) -> u32 {
        if self.server { 1 } else { 2 }
    }

    /// True if `id` has the parity this endpoint allocates from.
    pub fn is_local(&self, id: u32) -> bool {
        if self.server {
            id % 2 == 0
        } else {
            id % 2 != 0
        }
    }

    /// Allocate the next local stream identifier.
    ///
    /// Fails with `IdExhausted` once the next step would leave the 31-bit
    /// space; stream identifiers do not wrap.
    pub fn allocate_local(&self) -> Result<u32> {
        let prev = self
            .last_local
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                let next = if last == 0 { self.first_local() } else { last + 2 };
                (next <= MAX_STREAM_ID).then_some(next)
            })
            .map_err(|_| SpdyError::IdExhausted)?;
        Ok(if prev == 0 { self.first_local() } else { prev + 2 })
    }

    /// The identifier the peer's next SYN_STREAM must carry.
    pub fn expected_remote(&self) -> u32 {
        let last = self.last_remote.load(Ordering::Relaxed);
        if last == 0 {
            self.first_remote()
        } else {
            last + 2
        }
    }

    /// Validate and record an inbound SYN_STREAM identifier.
    ///
    /// The identifier must have the peer's parity and continue the peer's
    /// progression exactly; anything else is a protocol error on that id.
    pub fn accept_remote(&self, id: u32) -> Result<()> {
        if id == 0 || id > MAX_STREAM_ID || self.is_local(id) || id != self.expected_remote() {
            return Err(SpdyError::InvalidStreamId(id));
        }
        self.last_remote.store(id, Ordering::Relaxed);
        Ok(())
    }

    /// Allocate the next ping identifier; wraps back to the starting value
    /// after exhausting the 31-bit space.
    pub fn allocate_ping(&self) -> u32 {
        let step = |last: u32| {
            let next = if last == 0 { self.first_local() } else { last + 2 };
            if next > MAX_STREAM_ID {
                self.first_local()
            } else {
                next
            }
        };
        let prev = self
            .last_ping
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| Some(step(last)))
            .expect("ping id update is infallible");
        step(prev)
    }

    #[cfg(test)]
    pub(crate) fn force_last_local(&self, id: u32) {
        self.last_local.store(id, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn force_last_ping(&self, id: u32) {
        self.last_ping.store(id, Ordering::Relaxed);
    }
}

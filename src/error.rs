use crate::frame::StatusCode;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Convenient type alias for `Result<T, SpdyError>`.
pub type Result<T> = std::result::Result<T, SpdyError>;

/// Error types for the spdy-mux library.
///
/// Transport and decode errors are fatal to the session; the remaining
/// variants are stream-local or returned synchronously to the caller.
/// The type is `Clone` so a single terminal error can be delivered to
/// every stream waiting on the session.
#[derive(Debug, Clone, Error)]
pub enum SpdyError {
    #[error("i/o error: {0}")]
    Io(#[source] Arc<io::Error>),

    #[error("frame decode error: {0}")]
    Decode(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("stream output is closed")]
    StreamClosed,

    #[error("frame carries stream id {got}, expected {expected}")]
    WrongStreamId { expected: u32, got: u32 },

    #[error("first frame must be SYN_STREAM or SYN_REPLY")]
    IllegalFirstFrame,

    #[error("SYN_STREAM is only valid as the first frame of a locally opened stream")]
    IllegalSynStream,

    #[error("SYN_REPLY is only valid as the first frame of a remotely opened stream")]
    IllegalSynReply,

    #[error("frame type {0} is not valid on a stream")]
    UnknownFrameType(&'static str),

    #[error("invalid stream id: {0}")]
    InvalidStreamId(u32),

    #[error("stream ids exhausted")]
    IdExhausted,

    #[error("no such stream: {0}")]
    NoSuchStream(u32),

    #[error("ping id {0} is still outstanding")]
    PingInUse(u32),

    #[error("queue is closed")]
    QueueClosed,

    #[error("queue is already being watched")]
    AlreadyWatched,

    #[error("stream reset: {0}")]
    StreamReset(StatusCode),

    #[error("protocol error: {0}")]
    Protocol(&'static str),
}

impl From<io::Error> for SpdyError {
    fn from(err: io::Error) -> Self {
        SpdyError::Io(Arc::new(err))
    }
}

impl SpdyError {
    /// True for errors that tear down the whole session rather than a
    /// single stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SpdyError::Io(_) | SpdyError::Decode(_) | SpdyError::SessionClosed
        )
    }
}

use crate::headers::Headers;
use bytes::Bytes;
use std::fmt;

/// Highest stream identifier representable on the wire (31 bits).
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// RST_STREAM status codes defined by SPDY/2 (plus STREAM_ALREADY_CLOSED,
/// which later drafts introduced and which this implementation emits for
/// traffic on a closed stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    ProtocolError,
    InvalidStream,
    RefusedStream,
    UnsupportedVersion,
    Cancel,
    InternalError,
    FlowControlError,
    StreamInUse,
    StreamAlreadyClosed,
}

impl StatusCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(StatusCode::ProtocolError),
            2 => Some(StatusCode::InvalidStream),
            3 => Some(StatusCode::RefusedStream),
            4 => Some(StatusCode::UnsupportedVersion),
            5 => Some(StatusCode::Cancel),
            6 => Some(StatusCode::InternalError),
            7 => Some(StatusCode::FlowControlError),
            8 => Some(StatusCode::StreamInUse),
            9 => Some(StatusCode::StreamAlreadyClosed),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            StatusCode::ProtocolError => 1,
            StatusCode::InvalidStream => 2,
            StatusCode::RefusedStream => 3,
            StatusCode::UnsupportedVersion => 4,
            StatusCode::Cancel => 5,
            StatusCode::InternalError => 6,
            StatusCode::FlowControlError => 7,
            StatusCode::StreamInUse => 8,
            StatusCode::StreamAlreadyClosed => 9,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::ProtocolError => "PROTOCOL_ERROR",
            StatusCode::InvalidStream => "INVALID_STREAM",
            StatusCode::RefusedStream => "REFUSED_STREAM",
            StatusCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            StatusCode::Cancel => "CANCEL",
            StatusCode::InternalError => "INTERNAL_ERROR",
            StatusCode::FlowControlError => "FLOW_CONTROL_ERROR",
            StatusCode::StreamInUse => "STREAM_IN_USE",
            StatusCode::StreamAlreadyClosed => "STREAM_ALREADY_CLOSED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: u32,
    pub data: Bytes,
    pub fin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStreamFrame {
    pub stream_id: u32,
    /// Push-association; carried on the wire, ignored by the session core.
    pub associated_stream_id: u32,
    /// Two-bit priority; recognized, not scheduled.
    pub priority: u8,
    pub headers: Headers,
    pub fin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReplyFrame {
    pub stream_id: u32,
    pub headers: Headers,
    pub fin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: u32,
    pub headers: Headers,
    pub fin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: u32,
    pub status: StatusCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_good_stream_id: u32,
}

/// One decoded SPDY/2 frame.
///
/// SETTINGS, NOOP and GOAWAY are recognized so codecs can hand them over,
/// but the session discards them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    SynStream(SynStreamFrame),
    SynReply(SynReplyFrame),
    Headers(HeadersFrame),
    RstStream(RstStreamFrame),
    Ping(PingFrame),
    Settings,
    Noop,
    GoAway(GoAwayFrame),
}

impl Frame {
    pub fn data(stream_id: u32, data: Bytes, fin: bool) -> Self {
        Frame::Data(DataFrame { stream_id, data, fin })
    }

    pub fn syn_stream(stream_id: u32, headers: Headers, fin: bool) -> Self {
        Frame::SynStream(SynStreamFrame {
            stream_id,
            associated_stream_id: 0,
            priority: 0,
            headers,
            fin,
        })
    }

    pub fn syn_reply(stream_id: u32, headers: Headers, fin: bool) -> Self {
        Frame::SynReply(SynReplyFrame { stream_id, headers, fin })
    }

    pub fn headers(stream_id: u32, headers: Headers, fin: bool) -> Self {
        Frame::Headers(HeadersFrame { stream_id, headers, fin })
    }

    pub fn rst(stream_id: u32, status: StatusCode) -> Self {
        Frame::RstStream(RstStreamFrame { stream_id, status })
    }

    pub fn ping(id: u32) -> Self {
        Frame::Ping(PingFrame { id })
    }

    /// The stream this frame addresses; 0 for session-scope frames.
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Data(f) => f.stream_id,
            Frame::SynStream(f) => f.stream_id,
            Frame::SynReply(f) => f.stream_id,
            Frame::Headers(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::Ping(_) | Frame::Settings | Frame::Noop | Frame::GoAway(_) => 0,
        }
    }

    /// Whether the FIN flag is set (half-closes the sender's direction).
    pub fn fin(&self) -> bool {
        match self {
            Frame::Data(f) => f.fin,
            Frame::SynStream(f) => f.fin,
            Frame::SynReply(f) => f.fin,
            Frame::Headers(f) => f.fin,
            _ => false,
        }
    }

    /// The headers carried by this frame, if the kind can carry any.
    pub fn carried_headers(&self) -> Option<&Headers> {
        match self {
            Frame::SynStream(f) => Some(&f.headers),
            Frame::SynReply(f) => Some(&f.headers),
            Frame::Headers(f) => Some(&f.headers),
            _ => None,
        }
    }

    pub fn is_rst(&self) -> bool {
        matches!(self, Frame::RstStream(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Data(_) => "DATA",
            Frame::SynStream(_) => "SYN_STREAM",
            Frame::SynReply(_) => "SYN_REPLY",
            Frame::Headers(_) => "HEADERS",
            Frame::RstStream(_) => "RST_STREAM",
            Frame::Ping(_) => "PING",
            Frame::Settings => "SETTINGS",
            Frame::Noop => "NOOP",
            Frame::GoAway(_) => "GOAWAY",
        }
    }
}

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod headers;
pub mod mq;
pub mod ping;
pub mod session;
pub mod stream;
pub mod stream_id;

pub use codec::{frame_pipe, FrameCodec, FramePipe};
pub use config::{Config, ConfigBuilder};
pub use error::{Result, SpdyError};
pub use frame::{Frame, StatusCode, MAX_STREAM_ID};
pub use headers::Headers;
pub use mq::MessageQueue;
pub use ping::Ping;
pub use session::{FrameTransport, Handler, Refuse, Session};
pub use stream::{BodyReader, BodyWriter, Stream};
pub use stream_id::StreamIds;

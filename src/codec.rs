use crate::error::SpdyError;
use crate::frame::Frame;
use futures::{Sink, Stream};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::codec::{Decoder, Encoder};

/// The contract a SPDY/2 wire codec must satisfy to drive a session.
///
/// The codec owns all bit-level concerns, including the per-connection
/// zlib header-compression context (stateful across frames); the session
/// only ever sees decoded [`Frame`]s. Wrap a transport with
/// `tokio_util::codec::Framed::new(transport, codec)` and hand the result
/// to [`Session::client`](crate::Session::client) or
/// [`Session::server`](crate::Session::server).
pub trait FrameCodec:
    Decoder<Item = Frame, Error = SpdyError> + Encoder<Frame, Error = SpdyError>
{
}

impl<C> FrameCodec for C where
    C: Decoder<Item = Frame, Error = SpdyError> + Encoder<Frame, Error = SpdyError>
{
}

/// One endpoint of an in-memory, frame-level duplex.
///
/// Implements the same `Stream`/`Sink` shape as a `Framed` transport, so
/// two sessions can be wired back to back without any byte-level codec.
pub struct FramePipe {
    tx: flume::r#async::SendSink<'static, Frame>,
    rx: flume::r#async::RecvStream<'static, Frame>,
}

/// Create a connected pair of frame-level endpoints, each direction
/// buffering up to `capacity` frames.
pub fn frame_pipe(capacity: usize) -> (FramePipe, FramePipe) {
    let (a_tx, a_rx) = flume::bounded(capacity);
    let (b_tx, b_rx) = flume::bounded(capacity);
    (
        FramePipe {
            tx: a_tx.into_sink(),
            rx: b_rx.into_stream(),
        },
        FramePipe {
            tx: b_tx.into_sink(),
            rx: a_rx.into_stream(),
        },
    )
}

fn pipe_closed() -> SpdyError {
    SpdyError::Io(Arc::new(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "frame pipe closed",
    )))
}

impl Stream for FramePipe {
    type Item = Result<Frame, SpdyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx).map(|frame| frame.map(Ok))
    }
}

impl Sink<Frame> for FramePipe {
    type Error = SpdyError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.tx).poll_ready(cx).map_err(|_| pipe_closed())
    }

    fn start_send(mut self: Pin<&mut Self>, frame: Frame) -> Result<(), Self::Error> {
        Pin::new(&mut self.tx).start_send(frame).map_err(|_| pipe_closed())
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.tx).poll_flush(cx).map_err(|_| pipe_closed())
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.tx).poll_close(cx).map_err(|_| pipe_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StatusCode;
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};

    #[tokio::test]
    async fn frames_cross_the_pipe_in_order() {
        let (mut left, mut right) = frame_pipe(8);

        left.send(Frame::ping(1)).await.unwrap();
        left.send(Frame::data(3, Bytes::from_static(b"x"), false))
            .await
            .unwrap();

        assert_eq!(right.next().await.unwrap().unwrap(), Frame::ping(1));
        assert_eq!(
            right.next().await.unwrap().unwrap(),
            Frame::data(3, Bytes::from_static(b"x"), false)
        );
    }

    #[tokio::test]
    async fn both_directions_are_independent() {
        let (mut left, mut right) = frame_pipe(8);
        left.send(Frame::ping(1)).await.unwrap();
        right.send(Frame::ping(2)).await.unwrap();
        assert_eq!(right.next().await.unwrap().unwrap(), Frame::ping(1));
        assert_eq!(left.next().await.unwrap().unwrap(), Frame::ping(2));
    }

    #[tokio::test]
    async fn dropping_an_end_terminates_the_peer() {
        let (mut left, right) = frame_pipe(8);
        drop(right);
        assert!(left.next().await.is_none());
        assert!(left.send(Frame::rst(1, StatusCode::Cancel)).await.is_err());
    }
}

use crate::error::{Result, SpdyError};
use crate::frame::{DataFrame, Frame, StatusCode};
use crate::headers::Headers;
use crate::mq::{MessageQueue, TryRecv};
use bytes::Bytes;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// What the session should do with a stream after routing a frame into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputOutcome {
    /// The stream stays in the table.
    Continue,
    /// The stream is fully closed (or errored) and must leave the table.
    Deregister,
}

pub(crate) enum TryWrite {
    Done,
    /// The mailbox was full; the frame is handed back for a later retry.
    Full(Frame),
}

/// One bidirectional logical channel within a session.
///
/// A stream is a pair of half-streams. The input half owns the ordered
/// queue of DATA frames the session delivers plus the accumulated headers
/// the peer has sent; the output half feeds the session's shared mailbox
/// and enforces the frame-ordering rules symmetrically, returning typed
/// errors to the caller instead of resetting.
///
/// Handles are cheap to clone; the session keeps one in its table and the
/// application task holds another.
#[derive(Debug, Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

#[derive(Debug)]
struct StreamInner {
    id: u32,
    /// Whether this endpoint opened the stream.
    local: bool,
    input: InputHalf,
    output: OutputHalf,
}

#[derive(Debug)]
struct InputHalf {
    frames: MessageQueue<DataFrame>,
    headers: Mutex<Headers>,
    n_frames: AtomicU32,
    closed: AtomicBool,
}

#[derive(Debug)]
struct OutputHalf {
    mailbox: flume::Sender<Frame>,
    headers: Mutex<Headers>,
    n_frames: AtomicU32,
    closed: AtomicBool,
}

impl Stream {
    pub(crate) fn new(id: u32, local: bool, buffer: usize, mailbox: flume::Sender<Frame>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id,
                local,
                input: InputHalf {
                    frames: MessageQueue::new(buffer),
                    headers: Mutex::new(Headers::new()),
                    n_frames: AtomicU32::new(0),
                    closed: AtomicBool::new(false),
                },
                output: OutputHalf {
                    mailbox,
                    headers: Mutex::new(Headers::new()),
                    n_frames: AtomicU32::new(0),
                    closed: AtomicBool::new(false),
                },
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Whether this endpoint opened the stream (as opposed to the peer).
    pub fn is_local(&self) -> bool {
        self.inner.local
    }

    pub fn input_closed(&self) -> bool {
        self.inner.input.closed.load(Ordering::Relaxed)
    }

    pub fn output_closed(&self) -> bool {
        self.inner.output.closed.load(Ordering::Relaxed)
    }

    /// Both directions closed; the session drops such streams from its table.
    pub fn is_closed(&self) -> bool {
        self.input_closed() && self.output_closed()
    }

    /// Headers accumulated from the peer so far.
    pub fn input_headers(&self) -> Headers {
        self.inner.input.headers.lock().unwrap().clone()
    }

    /// Headers this endpoint has sent so far.
    pub fn output_headers(&self) -> Headers {
        self.inner.output.headers.lock().unwrap().clone()
    }

    /// Next frame delivered by the session, end-of-stream, or the terminal
    /// stream error. Only DATA frames travel through the queue; headers are
    /// folded into [`input_headers`](Self::input_headers) as they arrive.
    pub async fn read_frame(&self) -> Result<Option<Frame>> {
        Ok(self.inner.input.frames.receive().await?.map(Frame::Data))
    }

    /// Next DATA payload, `None` at end-of-stream.
    pub async fn read_data(&self) -> Result<Option<Bytes>> {
        Ok(self.inner.input.frames.receive().await?.map(|f| f.data))
    }

    /// Enqueue one frame for transmission, enforcing the ordering rules:
    /// the first frame must be SYN_STREAM (local streams) or SYN_REPLY
    /// (remote streams), HEADERS/DATA may only follow it, and nothing but
    /// a reset may follow a local FIN. Violations are returned to the
    /// caller; nothing is sent to the peer.
    pub async fn write_frame(&self, frame: Frame) -> Result<()> {
        if let Frame::RstStream(f) = &frame {
            if f.stream_id != self.inner.id {
                return Err(SpdyError::WrongStreamId {
                    expected: self.inner.id,
                    got: f.stream_id,
                });
            }
            return self.reset(f.status).await;
        }
        self.check_output(&frame)?;
        // Bookkeeping happens before the mailbox send so the serializer's
        // fully-closed check observes the final flags.
        let carried = frame.carried_headers().cloned();
        self.note_sent(carried.as_ref(), frame.fin());
        self.inner
            .output
            .mailbox
            .send_async(frame)
            .await
            .map_err(|_| SpdyError::SessionClosed)
    }

    /// Open the exchange on a locally created stream.
    pub async fn syn(&self, headers: Headers, fin: bool) -> Result<()> {
        self.write_frame(Frame::syn_stream(self.inner.id, headers, fin)).await
    }

    /// Accept the exchange on a remotely created stream.
    pub async fn reply(&self, headers: Headers, fin: bool) -> Result<()> {
        self.write_frame(Frame::syn_reply(self.inner.id, headers, fin)).await
    }

    /// Send additional headers.
    pub async fn write_headers(&self, headers: Headers, fin: bool) -> Result<()> {
        self.write_frame(Frame::headers(self.inner.id, headers, fin)).await
    }

    pub async fn write_data(&self, data: Bytes, fin: bool) -> Result<()> {
        self.write_frame(Frame::data(self.inner.id, data, fin)).await
    }

    /// Abort the stream with `status`.
    ///
    /// Unlike [`write_frame`](Self::write_frame) this is permitted after a
    /// local FIN: it goes straight to the session mailbox. Both directions
    /// close and the session drops the stream once the frame is on the wire.
    pub async fn reset(&self, status: StatusCode) -> Result<()> {
        let inner = &self.inner;
        inner.output.closed.store(true, Ordering::Relaxed);
        inner.input.closed.store(true, Ordering::Relaxed);
        inner.input.frames.close_with_error(SpdyError::StreamReset(status));
        inner
            .output
            .mailbox
            .send_async(Frame::rst(inner.id, status))
            .await
            .map_err(|_| SpdyError::SessionClosed)
    }

    /// The DATA payloads of this stream, concatenated, as an `AsyncRead`.
    pub fn read_body(&self) -> BodyReader {
        BodyReader {
            stream: self.clone(),
            chunk: None,
            done: false,
        }
    }

    /// An `AsyncWrite` that turns writes into DATA frames (sending the
    /// opening SYN_STREAM/SYN_REPLY first if the caller has not).
    pub fn write_body(&self) -> BodyWriter {
        BodyWriter { stream: self.clone() }
    }

    fn check_output(&self, frame: &Frame) -> Result<()> {
        let inner = &self.inner;
        let id = frame.stream_id();
        if id != inner.id {
            return Err(SpdyError::WrongStreamId { expected: inner.id, got: id });
        }
        if inner.output.mailbox.is_disconnected() {
            return Err(SpdyError::SessionClosed);
        }
        if inner.output.closed.load(Ordering::Relaxed) {
            return Err(SpdyError::StreamClosed);
        }
        let n = inner.output.n_frames.load(Ordering::Relaxed);
        match frame {
            Frame::SynStream(_) if n == 0 && inner.local => Ok(()),
            Frame::SynStream(_) => Err(SpdyError::IllegalSynStream),
            Frame::SynReply(_) if n == 0 && !inner.local => Ok(()),
            Frame::SynReply(_) => Err(SpdyError::IllegalSynReply),
            Frame::Headers(_) | Frame::Data(_) if n > 0 => Ok(()),
            Frame::Headers(_) | Frame::Data(_) => Err(SpdyError::IllegalFirstFrame),
            Frame::RstStream(_) => Ok(()),
            other => Err(SpdyError::UnknownFrameType(other.kind())),
        }
    }

    fn note_sent(&self, headers: Option<&Headers>, fin: bool) {
        let out = &self.inner.output;
        out.n_frames.fetch_add(1, Ordering::Relaxed);
        if let Some(h) = headers {
            out.headers.lock().unwrap().merge(h);
        }
        if fin {
            out.closed.store(true, Ordering::Relaxed);
        }
    }

    /// Non-blocking variant of [`write_frame`] for poll contexts. Does not
    /// handle RST_STREAM.
    ///
    /// [`write_frame`]: Self::write_frame
    pub(crate) fn try_write_frame(&self, frame: Frame) -> Result<TryWrite> {
        self.check_output(&frame)?;
        let carried = frame.carried_headers().cloned();
        let fin = frame.fin();
        let out = &self.inner.output;
        out.n_frames.fetch_add(1, Ordering::Relaxed);
        if fin {
            out.closed.store(true, Ordering::Relaxed);
        }
        match out.mailbox.try_send(frame) {
            Ok(()) => {
                if let Some(h) = carried {
                    out.headers.lock().unwrap().merge(&h);
                }
                Ok(TryWrite::Done)
            }
            Err(flume::TrySendError::Full(frame)) => {
                out.n_frames.fetch_sub(1, Ordering::Relaxed);
                if fin {
                    out.closed.store(false, Ordering::Relaxed);
                }
                Ok(TryWrite::Full(frame))
            }
            Err(flume::TrySendError::Disconnected(_)) => Err(SpdyError::SessionClosed),
        }
    }

    /// Route one inbound frame through the input gate.
    ///
    /// Called by the session's receive loop only. Legal frames update the
    /// accumulator/queue; illegal ones answer the peer with a RST and close
    /// the stream. The returned outcome tells the session whether to drop
    /// the stream from its table.
    pub(crate) async fn accept(&self, frame: Frame) -> InputOutcome {
        let inner = &self.inner;
        let input = &inner.input;

        if input.closed.load(Ordering::Relaxed) {
            // "An endpoint MUST NOT send a RST_STREAM in response to an
            // RST_STREAM, as doing so would lead to RST_STREAM loops."
            if !frame.is_rst() {
                tracing::debug!(stream = inner.id, kind = frame.kind(), "frame for closed input");
                let _ = inner
                    .output
                    .mailbox
                    .send_async(Frame::rst(inner.id, StatusCode::StreamAlreadyClosed))
                    .await;
            }
            return InputOutcome::Continue;
        }

        let n = input.n_frames.load(Ordering::Relaxed);
        let legal = match &frame {
            Frame::SynStream(_) => n == 0 && !inner.local,
            Frame::SynReply(_) => n == 0 && inner.local,
            Frame::Headers(_) | Frame::Data(_) => n > 0,
            // A reset may follow the opening frame at any point, never
            // precede it.
            Frame::RstStream(_) => n > 0,
            _ => false,
        };
        if !legal {
            return self.input_protocol_error(frame.kind()).await;
        }

        if let Frame::RstStream(f) = &frame {
            tracing::debug!(stream = inner.id, status = %f.status, "stream reset by peer");
            input.closed.store(true, Ordering::Relaxed);
            inner.output.closed.store(true, Ordering::Relaxed);
            input.frames.close_with_error(SpdyError::StreamReset(f.status));
            return InputOutcome::Deregister;
        }

        input.n_frames.fetch_add(1, Ordering::Relaxed);
        if let Some(headers) = frame.carried_headers() {
            input.headers.lock().unwrap().merge(headers);
        }
        let fin = frame.fin();
        if let Frame::Data(data) = frame {
            if input.frames.send(data).await.is_err() {
                // Queue torn down under us; the session is closing this stream.
                return InputOutcome::Continue;
            }
        }
        if fin {
            input.closed.store(true, Ordering::Relaxed);
            input.frames.close();
            if inner.output.closed.load(Ordering::Relaxed) {
                return InputOutcome::Deregister;
            }
        }
        InputOutcome::Continue
    }

    async fn input_protocol_error(&self, kind: &'static str) -> InputOutcome {
        let inner = &self.inner;
        tracing::debug!(stream = inner.id, kind, "protocol error on stream input");
        let _ = inner
            .output
            .mailbox
            .send_async(Frame::rst(inner.id, StatusCode::ProtocolError))
            .await;
        inner.output.closed.store(true, Ordering::Relaxed);
        inner.input.closed.store(true, Ordering::Relaxed);
        inner
            .input
            .frames
            .close_with_error(SpdyError::Protocol("invalid frame sequence"));
        InputOutcome::Deregister
    }

    /// Close both directions and end the input queue cleanly.
    pub(crate) fn close_local(&self) {
        self.inner.input.closed.store(true, Ordering::Relaxed);
        self.inner.output.closed.store(true, Ordering::Relaxed);
        self.inner.input.frames.close();
    }

    /// Close both directions, delivering `err` to the input consumer.
    pub(crate) fn close_with_error(&self, err: SpdyError) {
        self.inner.input.closed.store(true, Ordering::Relaxed);
        self.inner.output.closed.store(true, Ordering::Relaxed);
        self.inner.input.frames.close_with_error(err);
    }
}

/// `AsyncRead` over the concatenated DATA payloads of a stream.
#[derive(Debug)]
pub struct BodyReader {
    stream: Stream,
    /// Remainder of a partially consumed payload.
    chunk: Option<Bytes>,
    done: bool,
}

fn into_io(err: SpdyError) -> io::Error {
    match &err {
        SpdyError::SessionClosed | SpdyError::StreamClosed => {
            io::Error::new(io::ErrorKind::BrokenPipe, err)
        }
        _ => io::Error::other(err),
    }
}

impl AsyncRead for BodyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if let Some(chunk) = &mut this.chunk {
                let to_copy = chunk.len().min(buf.remaining());
                let data = chunk.split_to(to_copy);
                buf.put_slice(&data);
                if chunk.is_empty() {
                    this.chunk = None;
                }
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }
            match this.stream.inner.input.frames.try_receive() {
                Ok(TryRecv::Item(frame)) => {
                    // Zero-length payloads (a bare FIN) carry no bytes.
                    if !frame.data.is_empty() {
                        this.chunk = Some(frame.data);
                    }
                }
                Ok(TryRecv::Empty) => {
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                Ok(TryRecv::Closed) => {
                    this.done = true;
                    return Poll::Ready(Ok(()));
                }
                Err(err) => return Poll::Ready(Err(into_io(err))),
            }
        }
    }
}

/// `AsyncWrite` that frames written bytes as DATA on a stream.
#[derive(Debug)]
pub struct BodyWriter {
    stream: Stream,
}

impl AsyncWrite for BodyWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let stream = &self.get_mut().stream;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if let Err(err) = ready_first_frame(stream, false) {
            return match err {
                FirstFrame::Full => {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
                FirstFrame::Failed(err) => Poll::Ready(Err(into_io(err))),
            };
        }
        let frame = Frame::data(stream.id(), Bytes::copy_from_slice(buf), false);
        match stream.try_write_frame(frame) {
            Ok(TryWrite::Done) => Poll::Ready(Ok(buf.len())),
            Ok(TryWrite::Full(_)) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(err) => Poll::Ready(Err(into_io(err))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Frames go straight to the session mailbox; nothing is buffered here.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let stream = &self.get_mut().stream;
        if stream.output_closed() {
            return Poll::Ready(Ok(()));
        }
        if stream.inner.output.n_frames.load(Ordering::Relaxed) == 0 {
            // Nothing sent yet: a single FIN-flagged opening frame closes us.
            return match ready_first_frame(stream, true) {
                Ok(()) => Poll::Ready(Ok(())),
                Err(FirstFrame::Full) => {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
                Err(FirstFrame::Failed(SpdyError::SessionClosed)) => Poll::Ready(Ok(())),
                Err(FirstFrame::Failed(err)) => Poll::Ready(Err(into_io(err))),
            };
        }
        match stream.try_write_frame(Frame::data(stream.id(), Bytes::new(), true)) {
            Ok(TryWrite::Done) => Poll::Ready(Ok(())),
            Ok(TryWrite::Full(_)) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            // The session is gone; there is no wire left to close.
            Err(SpdyError::SessionClosed) => Poll::Ready(Ok(())),
            Err(err) => Poll::Ready(Err(into_io(err))),
        }
    }
}

enum FirstFrame {
    Full,
    Failed(SpdyError),
}

/// Send the opening SYN_STREAM/SYN_REPLY if no frame has gone out yet.
fn ready_first_frame(stream: &Stream, fin: bool) -> std::result::Result<(), FirstFrame> {
    if stream.inner.output.n_frames.load(Ordering::Relaxed) != 0 {
        return Ok(());
    }
    let first = if stream.is_local() {
        Frame::syn_stream(stream.id(), Headers::new(), fin)
    } else {
        Frame::syn_reply(stream.id(), Headers::new(), fin)
    };
    match stream.try_write_frame(first) {
        Ok(TryWrite::Done) => Ok(()),
        Ok(TryWrite::Full(_)) => Err(FirstFrame::Full),
        Err(err) => Err(FirstFrame::Failed(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_stream(local: bool) -> (Stream, flume::Receiver<Frame>) {
        let (tx, rx) = flume::bounded(64);
        (Stream::new(1, local, 16, tx), rx)
    }

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn output_requires_an_opening_frame() {
        let (stream, _rx) = test_stream(true);
        let err = stream.write_data(Bytes::from_static(b"x"), false).await;
        assert!(matches!(err, Err(SpdyError::IllegalFirstFrame)));
        let err = stream.write_headers(Headers::new(), false).await;
        assert!(matches!(err, Err(SpdyError::IllegalFirstFrame)));
    }

    #[tokio::test]
    async fn local_streams_open_with_syn_only() {
        let (stream, rx) = test_stream(true);
        assert!(matches!(
            stream.reply(Headers::new(), false).await,
            Err(SpdyError::IllegalSynReply)
        ));
        stream.syn(headers(&[("method", "GET")]), false).await.unwrap();
        assert!(matches!(
            stream.syn(Headers::new(), false).await,
            Err(SpdyError::IllegalSynStream)
        ));
        assert!(matches!(rx.recv().unwrap(), Frame::SynStream(_)));
        assert_eq!(stream.output_headers().get("method"), Some("GET"));
    }

    #[tokio::test]
    async fn remote_streams_open_with_reply_only() {
        let (stream, rx) = test_stream(false);
        assert!(matches!(
            stream.syn(Headers::new(), false).await,
            Err(SpdyError::IllegalSynStream)
        ));
        stream.reply(Headers::new(), false).await.unwrap();
        assert!(matches!(rx.recv().unwrap(), Frame::SynReply(_)));
    }

    #[tokio::test]
    async fn wrong_stream_id_is_rejected() {
        let (stream, _rx) = test_stream(true);
        let err = stream.write_frame(Frame::syn_stream(9, Headers::new(), false)).await;
        assert!(matches!(err, Err(SpdyError::WrongStreamId { expected: 1, got: 9 })));
    }

    #[tokio::test]
    async fn session_scope_frames_are_rejected_on_streams() {
        let (stream, _rx) = test_stream(true);
        assert!(matches!(
            stream.write_frame(Frame::ping(1)).await,
            Err(SpdyError::WrongStreamId { .. })
        ));
    }

    #[tokio::test]
    async fn fin_closes_the_output() {
        let (stream, rx) = test_stream(true);
        stream.syn(Headers::new(), false).await.unwrap();
        stream.write_data(Bytes::from_static(b"bye"), true).await.unwrap();
        assert!(stream.output_closed());
        assert!(matches!(
            stream.write_data(Bytes::new(), false).await,
            Err(SpdyError::StreamClosed)
        ));
        // The reset escape hatch still works after FIN.
        stream.reset(StatusCode::Cancel).await.unwrap();
        let kinds: Vec<&str> = rx.drain().map(|f| f.kind()).collect();
        assert_eq!(kinds, ["SYN_STREAM", "DATA", "RST_STREAM"]);
    }

    #[tokio::test]
    async fn input_gate_accepts_the_canonical_sequence() {
        let (stream, _rx) = test_stream(false);
        let outcome = stream.accept(Frame::syn_stream(1, headers(&[("foo", "bar")]), false)).await;
        assert_eq!(outcome, InputOutcome::Continue);
        assert_eq!(stream.input_headers().get("foo"), Some("bar"));

        let outcome = stream.accept(Frame::data(1, Bytes::from_static(b"hi"), false)).await;
        assert_eq!(outcome, InputOutcome::Continue);
        assert_eq!(stream.read_data().await.unwrap(), Some(Bytes::from_static(b"hi")));

        let outcome = stream.accept(Frame::headers(1, headers(&[("x", "y")]), true)).await;
        assert_eq!(outcome, InputOutcome::Continue);
        assert!(stream.input_closed());
        assert_eq!(stream.input_headers().get("x"), Some("y"));
        assert_eq!(stream.read_data().await.unwrap(), None);
    }

    #[tokio::test]
    async fn data_before_the_first_frame_is_a_protocol_error() {
        let (stream, rx) = test_stream(false);
        let outcome = stream.accept(Frame::data(1, Bytes::from_static(b"x"), false)).await;
        assert_eq!(outcome, InputOutcome::Deregister);
        match rx.recv().unwrap() {
            Frame::RstStream(f) => assert_eq!(f.status, StatusCode::ProtocolError),
            other => panic!("expected RST_STREAM, got {other:?}"),
        }
        assert!(matches!(stream.read_frame().await, Err(SpdyError::Protocol(_))));
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn second_syn_stream_is_a_protocol_error() {
        let (stream, rx) = test_stream(false);
        stream.accept(Frame::syn_stream(1, Headers::new(), false)).await;
        let outcome = stream.accept(Frame::syn_stream(1, Headers::new(), false)).await;
        assert_eq!(outcome, InputOutcome::Deregister);
        match rx.recv().unwrap() {
            Frame::RstStream(f) => assert_eq!(f.status, StatusCode::ProtocolError),
            other => panic!("expected RST_STREAM, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rst_before_the_first_frame_is_a_protocol_error() {
        // A reset may only follow the opening frame; on a fresh input it is
        // an illegal first frame like any other.
        let (stream, rx) = test_stream(true);
        let outcome = stream.accept(Frame::rst(1, StatusCode::RefusedStream)).await;
        assert_eq!(outcome, InputOutcome::Deregister);
        match rx.recv().unwrap() {
            Frame::RstStream(f) => assert_eq!(f.status, StatusCode::ProtocolError),
            other => panic!("expected RST_STREAM, got {other:?}"),
        }
        assert!(stream.is_closed());
        assert!(matches!(stream.read_frame().await, Err(SpdyError::Protocol(_))));
    }

    #[tokio::test]
    async fn rst_after_the_first_frame_closes_both_directions() {
        let (stream, rx) = test_stream(false);
        stream.accept(Frame::syn_stream(1, Headers::new(), false)).await;
        let outcome = stream.accept(Frame::rst(1, StatusCode::Cancel)).await;
        assert_eq!(outcome, InputOutcome::Deregister);
        assert!(rx.is_empty(), "a legal reset is not answered");
        assert!(stream.is_closed());
        assert!(matches!(
            stream.read_frame().await,
            Err(SpdyError::StreamReset(StatusCode::Cancel))
        ));
    }

    #[tokio::test]
    async fn traffic_on_a_closed_input_is_reset() {
        let (stream, rx) = test_stream(false);
        stream.accept(Frame::syn_stream(1, Headers::new(), true)).await;
        assert!(stream.input_closed());

        let outcome = stream.accept(Frame::data(1, Bytes::from_static(b"late"), false)).await;
        assert_eq!(outcome, InputOutcome::Continue);
        match rx.recv().unwrap() {
            Frame::RstStream(f) => assert_eq!(f.status, StatusCode::StreamAlreadyClosed),
            other => panic!("expected RST_STREAM, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rst_on_a_closed_input_is_dropped_silently() {
        let (stream, rx) = test_stream(false);
        stream.accept(Frame::syn_stream(1, Headers::new(), true)).await;
        let outcome = stream.accept(Frame::rst(1, StatusCode::Cancel)).await;
        assert_eq!(outcome, InputOutcome::Continue);
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn fin_on_both_sides_fully_closes() {
        let (stream, _rx) = test_stream(false);
        stream.accept(Frame::syn_stream(1, Headers::new(), false)).await;
        stream.reply(Headers::new(), true).await.unwrap();
        let outcome = stream.accept(Frame::data(1, Bytes::new(), true)).await;
        assert_eq!(outcome, InputOutcome::Deregister);
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn body_reader_concatenates_payloads() {
        let (stream, _rx) = test_stream(false);
        stream.accept(Frame::syn_stream(1, Headers::new(), false)).await;
        stream.accept(Frame::data(1, Bytes::from_static(b"hello "), false)).await;
        stream.accept(Frame::data(1, Bytes::from_static(b"world"), true)).await;

        let mut body = String::new();
        stream.read_body().read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "hello world");
    }

    #[tokio::test]
    async fn body_reader_surfaces_resets_as_errors() {
        let (stream, _rx) = test_stream(false);
        stream.accept(Frame::syn_stream(1, Headers::new(), false)).await;
        stream.accept(Frame::rst(1, StatusCode::Cancel)).await;

        let mut body = Vec::new();
        let err = stream.read_body().read_to_end(&mut body).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[tokio::test]
    async fn body_writer_opens_the_stream_itself() {
        let (stream, rx) = test_stream(true);
        let mut body = stream.write_body();
        body.write_all(b"payload").await.unwrap();
        body.shutdown().await.unwrap();

        let frames: Vec<Frame> = rx.drain().collect();
        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[0], Frame::SynStream(f) if !f.fin));
        assert!(matches!(&frames[1], Frame::Data(f) if f.data.as_ref() == b"payload" && !f.fin));
        assert!(matches!(&frames[2], Frame::Data(f) if f.data.is_empty() && f.fin));
        assert!(stream.output_closed());
    }

    #[tokio::test]
    async fn body_writer_shutdown_without_writes_sends_one_frame() {
        let (stream, rx) = test_stream(false);
        stream.write_body().shutdown().await.unwrap();
        let frames: Vec<Frame> = rx.drain().collect();
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Frame::SynReply(f) if f.fin));
    }
}

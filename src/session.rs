use crate::config::Config;
use crate::error::{Result, SpdyError};
use crate::frame::{Frame, StatusCode, SynStreamFrame};
use crate::ping::{ping_loop, Ping};
use crate::stream::{InputOutcome, Stream};
use crate::stream_id::StreamIds;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// The frame-level transport a session runs over: anything that yields
/// decoded frames and accepts frames for transmission. Both
/// `tokio_util::codec::Framed` around a real SPDY/2 codec and the in-memory
/// [`frame_pipe`](crate::codec::frame_pipe) endpoints qualify.
pub trait FrameTransport:
    futures::Stream<Item = Result<Frame>>
    + futures::Sink<Frame, Error = SpdyError>
    + Send
    + Unpin
    + 'static
{
}

impl<T> FrameTransport for T where
    T: futures::Stream<Item = Result<Frame>>
        + futures::Sink<Frame, Error = SpdyError>
        + Send
        + Unpin
        + 'static
{
}

/// Serves streams the peer opens.
///
/// One task is spawned per remote stream; when `serve` returns, the
/// session closes the output (if the handler has not) and drains any
/// remaining input. Plain async closures implement the trait:
///
/// ```rust,no_run
/// # use spdy_mux::{frame_pipe, Config, Session, Stream};
/// let (end, _peer) = frame_pipe(64);
/// let session = Session::server(
///     end,
///     |stream: Stream| async move {
///         let _ = stream.reply(Default::default(), true).await;
///     },
///     Config::default(),
/// );
/// ```
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, stream: Stream) -> BoxFuture<'static, ()>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Stream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn serve(&self, stream: Stream) -> BoxFuture<'static, ()> {
        Box::pin(self(stream))
    }
}

/// A handler that refuses every incoming stream. Useful for pure clients.
pub struct Refuse;

impl Handler for Refuse {
    fn serve(&self, stream: Stream) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = stream.reset(StatusCode::RefusedStream).await;
        })
    }
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) die: Notify,
    closed: AtomicBool,
    error: Mutex<Option<SpdyError>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            die: Notify::new(),
            closed: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Returns true for the caller that performed the transition.
    fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::Relaxed);
        if first {
            self.die.notify_waiters();
        }
        first
    }

    fn error(&self) -> Option<SpdyError> {
        self.error.lock().unwrap().clone()
    }
}

/// Internal session state shared between the loops and every handle.
pub(crate) struct SessionInner {
    /// Live streams by identifier.
    pub(crate) streams: DashMap<u32, Stream>,
    /// Outstanding and answered pings by identifier.
    pub(crate) pings: DashMap<u32, Ping>,
    pub(crate) ids: StreamIds,
    pub(crate) config: Arc<Config>,
    /// Producer side of the output mailbox the serializer drains.
    pub(crate) frame_tx: flume::Sender<Frame>,
    pub(crate) state: SessionState,
    handler: Arc<dyn Handler>,
}

/// A SPDY connection: one transport carrying many logical streams.
///
/// The session owns the transport. It runs a receive loop (demultiplexing
/// inbound frames onto streams), a serializer (the only writer to the
/// transport, draining a shared mailbox in submission order) and, unless
/// disabled, a liveness ping loop. Handles are cheap to clone.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("streams", &self.n_streams())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Start the client side of a connection; local streams get odd ids.
    pub fn client<F: FrameTransport>(
        frames: F,
        handler: impl Handler,
        config: Config,
    ) -> Result<Self> {
        Self::new(frames, handler, false, config)
    }

    /// Start the server side of a connection; local streams get even ids.
    pub fn server<F: FrameTransport>(
        frames: F,
        handler: impl Handler,
        config: Config,
    ) -> Result<Self> {
        Self::new(frames, handler, true, config)
    }

    fn new<F: FrameTransport>(
        frames: F,
        handler: impl Handler,
        server: bool,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (frame_tx, frame_rx) = flume::bounded(config.mailbox_buffer);

        let inner = Arc::new(SessionInner {
            streams: DashMap::new(),
            pings: DashMap::new(),
            ids: StreamIds::new(server),
            config: Arc::clone(&config),
            frame_tx,
            state: SessionState::new(),
            handler: Arc::new(handler),
        });

        let (sink, stream) = frames.split();
        tokio::spawn(recv_loop(stream, Arc::clone(&inner)));
        tokio::spawn(send_loop(sink, frame_rx, Arc::clone(&inner)));
        if config.enable_ping {
            tokio::spawn(ping_loop(Arc::clone(&inner)));
        }

        Ok(Session { inner })
    }

    /// Allocate the next local stream identifier and register a fresh
    /// stream under it. No frame is sent: the caller opens the exchange
    /// with [`Stream::syn`].
    pub fn open_stream(&self) -> Result<Stream> {
        if self.is_closed() {
            return Err(SpdyError::SessionClosed);
        }
        let id = self.inner.ids.allocate_local()?;
        let stream = Stream::new(id, true, self.inner.config.stream_buffer, self.inner.frame_tx.clone());
        self.inner.streams.insert(id, stream.clone());
        tracing::debug!(stream = id, "stream opened");
        Ok(stream)
    }

    /// Drop `id` from the stream table, closing both directions and
    /// signaling end-of-stream to its reader.
    pub fn close_stream(&self, id: u32) -> Result<()> {
        match self.inner.streams.remove(&id) {
            Some((_, stream)) => {
                stream.close_local();
                Ok(())
            }
            None => Err(SpdyError::NoSuchStream(id)),
        }
    }

    /// Number of live streams.
    pub fn n_streams(&self) -> usize {
        self.inner.streams.len()
    }

    /// Send one liveness probe and return its identifier immediately; the
    /// round-trip time appears via [`ping_rtt`](Self::ping_rtt) once the
    /// peer echoes it.
    pub async fn ping(&self) -> Result<u32> {
        self.inner.send_ping().await
    }

    /// Round-trip time recorded for ping `id`, if its echo has arrived.
    pub fn ping_rtt(&self, id: u32) -> Option<Duration> {
        self.inner.pings.get(&id).and_then(|p| p.rtt())
    }

    /// Close the session: every stream's reader sees end-of-stream, the
    /// loops stop, and the transport is released.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }

    /// The error that tore the session down, if it did not close cleanly.
    pub fn error(&self) -> Option<SpdyError> {
        self.inner.state.error()
    }
}

impl SessionInner {
    pub(crate) fn close(&self) {
        if self.state.close() {
            tracing::debug!("session closed");
            for entry in self.streams.iter() {
                entry.value().close_local();
            }
            self.streams.clear();
        }
    }

    pub(crate) fn close_with_error(&self, err: SpdyError) {
        if self.state.is_closed() {
            return;
        }
        // Record the cause before the closed flag becomes visible.
        *self.state.error.lock().unwrap() = Some(err.clone());
        if self.state.close() {
            tracing::debug!(%err, "session closed with error");
            for entry in self.streams.iter() {
                entry.value().close_with_error(err.clone());
            }
            self.streams.clear();
        }
    }

    /// Called by the serializer after a FIN or RST leaves for the peer:
    /// if that made the stream fully closed, drop it from the table.
    fn maybe_deregister(&self, id: u32) {
        if id == 0 {
            return;
        }
        let fully_closed = self.streams.get(&id).map(|s| s.is_closed()).unwrap_or(false);
        if fully_closed {
            tracing::debug!(stream = id, "stream fully closed, deregistering");
            self.streams.remove(&id);
        }
    }

    fn spawn_handler(&self, stream: Stream) {
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            handler.serve(stream.clone()).await;
            // Close our side if the handler did not, then drain whatever
            // the peer still has in flight so its writes are not stranded.
            if !stream.output_closed() {
                let _ = stream.write_data(Bytes::new(), true).await;
            }
            while let Ok(Some(_)) = stream.read_frame().await {}
        });
    }
}

/// Read frames off the transport and route them until the transport ends,
/// fails, or the session closes.
async fn recv_loop<R>(mut frames: R, inner: Arc<SessionInner>)
where
    R: futures::Stream<Item = Result<Frame>> + Send + Unpin + 'static,
{
    tracing::debug!("receive loop started");
    let result = loop {
        let shutdown = inner.state.die.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();
        if inner.state.is_closed() {
            break Ok(());
        }
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            next = frames.next() => match next {
                Some(Ok(frame)) => {
                    if dispatch_frame(frame, &inner).await.is_err() {
                        // The mailbox is gone; the serializer is tearing down.
                        break Ok(());
                    }
                }
                Some(Err(err)) if err.is_fatal() => break Err(err),
                Some(Err(err)) => {
                    // Stream-local errors from the frame source do not
                    // desynchronize the connection; keep reading.
                    tracing::warn!(%err, "dropping errored frame");
                }
                None => {
                    tracing::debug!("transport ended");
                    break Ok(());
                }
            },
        }
    };
    match result {
        Ok(()) => inner.close(),
        Err(err) => {
            tracing::error!(%err, "transport read failed");
            inner.close_with_error(err);
        }
    }
}

/// Drain the output mailbox into the transport, in submission order. This
/// is the only code path that writes frames.
async fn send_loop<W>(mut sink: W, frame_rx: flume::Receiver<Frame>, inner: Arc<SessionInner>)
where
    W: futures::Sink<Frame, Error = SpdyError> + Send + Unpin + 'static,
{
    let result = loop {
        let shutdown = inner.state.die.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();
        if inner.state.is_closed() {
            break Ok(());
        }
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            next = frame_rx.recv_async() => match next {
                Ok(frame) => {
                    tracing::trace!(kind = frame.kind(), stream = frame.stream_id(), "frame sent");
                    let id = frame.stream_id();
                    let ends_stream = frame.fin() || frame.is_rst();
                    if let Err(err) = sink.send(frame).await {
                        break Err(err);
                    }
                    if ends_stream {
                        inner.maybe_deregister(id);
                    }
                }
                Err(_) => break Ok(()),
            },
        }
    };
    // Remaining mailbox frames are discarded; close the writer behind them.
    let _ = sink.close().await;
    match result {
        Ok(()) => inner.close(),
        Err(err) => {
            tracing::error!(%err, "transport write failed");
            inner.close_with_error(err);
        }
    }
}

async fn dispatch_frame(frame: Frame, inner: &Arc<SessionInner>) -> Result<()> {
    tracing::trace!(kind = frame.kind(), stream = frame.stream_id(), "frame received");
    match frame {
        Frame::Ping(f) => inner.handle_ping(f).await,
        f @ (Frame::Settings | Frame::Noop | Frame::GoAway(_)) => {
            tracing::debug!(kind = f.kind(), "session-scope frame ignored");
            Ok(())
        }
        Frame::SynStream(f) => handle_syn_stream(f, inner).await,
        frame => handle_stream_frame(frame, inner).await,
    }
}

async fn handle_syn_stream(frame: SynStreamFrame, inner: &Arc<SessionInner>) -> Result<()> {
    let id = frame.stream_id;
    if id == 0 {
        tracing::debug!("SYN_STREAM carrying stream id 0, dropping");
        return Ok(());
    }
    if let Err(err) = inner.ids.accept_remote(id) {
        tracing::debug!(%err, stream = id, "rejecting SYN_STREAM");
        return inner
            .frame_tx
            .send_async(Frame::rst(id, StatusCode::ProtocolError))
            .await
            .map_err(|_| SpdyError::SessionClosed);
    }
    let stream = Stream::new(id, false, inner.config.stream_buffer, inner.frame_tx.clone());
    inner.streams.insert(id, stream.clone());
    if stream.accept(Frame::SynStream(frame)).await == InputOutcome::Deregister {
        inner.streams.remove(&id);
        return Ok(());
    }
    inner.spawn_handler(stream);
    Ok(())
}

async fn handle_stream_frame(frame: Frame, inner: &Arc<SessionInner>) -> Result<()> {
    let id = frame.stream_id();
    if id == 0 {
        tracing::debug!(kind = frame.kind(), "stream frame carrying id 0, dropping");
        return Ok(());
    }
    // Clone the handle out so the table is not held across the gate.
    let Some(stream) = inner.streams.get(&id).map(|s| s.value().clone()) else {
        tracing::debug!(stream = id, kind = frame.kind(), "frame for unknown stream, dropping");
        return Ok(());
    };
    if stream.accept(frame).await == InputOutcome::Deregister {
        inner.streams.remove(&id);
    }
    Ok(())
}

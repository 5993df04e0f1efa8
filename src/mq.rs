use crate::error::{Result, SpdyError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Outcome of a non-blocking receive attempt.
#[derive(Debug)]
pub enum TryRecv<T> {
    Item(T),
    Empty,
    Closed,
}

/// A bounded FIFO carrying per-stream messages.
///
/// The queue is `open` until one of two terminal transitions: [`close`]
/// moves it to end-of-stream (buffered items drain, then receives report
/// end-of-stream), [`close_with_error`] discards the buffer and makes every
/// subsequent receive return the error. Any number of producers may send
/// concurrently; sends block while the queue is full. Only one consumer may
/// wait at a time.
///
/// [`close`]: MessageQueue::close
/// [`close_with_error`]: MessageQueue::close_with_error
#[derive(Debug)]
pub struct MessageQueue<T> {
    /// Producer handle; taken on close so the channel disconnects.
    tx: Mutex<Option<flume::Sender<T>>>,
    rx: flume::Receiver<T>,
    error: Mutex<Option<SpdyError>>,
    watched: AtomicBool,
}

struct WatchGuard<'a>(&'a AtomicBool);

impl Drop for WatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> MessageQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            error: Mutex::new(None),
            watched: AtomicBool::new(false),
        }
    }

    /// Append one item, waiting while the queue is full.
    pub async fn send(&self, item: T) -> Result<()> {
        // Clone out of the lock: the send may park, and close() must be
        // able to take the slot meanwhile.
        let tx = self.tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx
                .send_async(item)
                .await
                .map_err(|_| SpdyError::QueueClosed),
            None => Err(SpdyError::QueueClosed),
        }
    }

    /// Next item, waiting for one to arrive or for a terminal transition.
    /// `Ok(None)` is end-of-stream.
    pub async fn receive(&self) -> Result<Option<T>> {
        if self.watched.swap(true, Ordering::Acquire) {
            return Err(SpdyError::AlreadyWatched);
        }
        let _guard = WatchGuard(&self.watched);

        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        match self.rx.recv_async().await {
            Ok(item) => Ok(Some(item)),
            Err(flume::RecvError::Disconnected) => {
                match self.error.lock().unwrap().clone() {
                    Some(err) => Err(err),
                    None => Ok(None),
                }
            }
        }
    }

    /// Non-blocking receive for poll-based consumers.
    pub fn try_receive(&self) -> Result<TryRecv<T>> {
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        match self.rx.try_recv() {
            Ok(item) => Ok(TryRecv::Item(item)),
            Err(flume::TryRecvError::Empty) => Ok(TryRecv::Empty),
            Err(flume::TryRecvError::Disconnected) => {
                match self.error.lock().unwrap().clone() {
                    Some(err) => Err(err),
                    None => Ok(TryRecv::Closed),
                }
            }
        }
    }

    /// Transition to end-of-stream: buffered items remain receivable,
    /// further sends fail.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    /// Transition to the error state: the buffer is discarded and every
    /// subsequent receive returns `err`.
    pub fn close_with_error(&self, err: SpdyError) {
        {
            let mut slot = self.error.lock().unwrap();
            if slot.is_some() {
                return;
            }
            *slot = Some(err);
        }
        self.tx.lock().unwrap().take();
        self.rx.drain().for_each(drop);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }
}

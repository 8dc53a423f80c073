//! Server-sent event channels.
//!
//! Each browser connection gets a [`LiveSender`] / [`LiveStream`] pair. The
//! stream is handed to the HTTP response body; the sender is kept in a
//! [`SubscriberSet`] and used to push JSON messages. When the connection goes
//! away the body is dropped, which revokes the sender and removes it from the
//! set.
//!
//! Every message is a full snapshot of the live state, so a channel holds at
//! most one unread frame. A newer frame replaces one the browser has not read
//! yet, which bounds memory for stalled connections.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::Stream;
use futures::task::AtomicWaker;
use serde::Serialize;

/// Comment-only frame sent first to open the stream.
const PREAMBLE: &[u8] = b":\n\n";

/// Single pending frame shared by both ends of a channel.
#[derive(Debug, Default)]
struct Mailbox {
    frame: Mutex<Option<String>>,
    waker: AtomicWaker,
}

impl Mailbox {
    /// Store `frame`, returning whether an unread frame was replaced.
    fn put(&self, frame: String) -> bool {
        let replaced = self.frame.lock().unwrap().replace(frame).is_some();
        self.waker.wake();
        replaced
    }

    fn take(&self) -> Option<String> {
        self.frame.lock().unwrap().take()
    }
}

/// Write side of one live channel.
///
/// Cloning shares the channel; revoking one clone revokes all of them.
#[derive(Clone, Debug)]
pub struct LiveSender {
    id: u64,
    mailbox: Arc<Mailbox>,
    open: Arc<AtomicBool>,
}

impl LiveSender {
    /// Channel identifier, unique within a process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Serialize `message` as JSON and queue it as one event frame,
    /// replacing any frame not yet read.
    ///
    /// Returns `false` without writing if the channel has been shut down.
    /// A `true` result means the write was attempted, not that the browser
    /// received it.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        if !self.is_open() {
            return false;
        }
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize live message");
                return false;
            }
        };
        if self.mailbox.put(format!("data: {json}\n\n")) {
            tracing::debug!(id = self.id, "Replaced unread live frame");
        }
        true
    }

    /// Whether the channel still accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Permanently disable writes.
    pub fn revoke(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// The set of connected live channels.
#[derive(Debug, Default)]
pub struct SubscriberSet {
    members: Mutex<HashMap<u64, LiveSender>>,
    next_id: AtomicU64,
}

impl SubscriberSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a channel.
    pub fn insert(&self, sender: LiveSender) {
        self.members.lock().unwrap().insert(sender.id, sender);
    }

    /// Remove a channel by id.
    pub fn remove(&self, id: u64) -> bool {
        self.members.lock().unwrap().remove(&id).is_some()
    }

    /// Number of connected channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `message` to every member. Returns the number of writes attempted.
    ///
    /// The member lock is held for the whole loop, so no other broadcast
    /// interleaves with this one.
    pub fn broadcast<T: Serialize>(&self, message: &T) -> usize {
        let members = self.members.lock().unwrap();
        members.values().filter(|s| s.send(message)).count()
    }
}

/// Read side of one live channel, used as a streaming response body.
pub struct LiveStream {
    preamble_sent: bool,
    sender: LiveSender,
    set: Option<Weak<SubscriberSet>>,
}

impl IntoResponse for LiveStream {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

impl Stream for LiveStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.preamble_sent {
            self.preamble_sent = true;
            return Poll::Ready(Some(Ok(Bytes::from_static(PREAMBLE))));
        }
        // Register before taking so a frame put in between still wakes us.
        self.sender.mailbox.waker.register(cx.waker());
        match self.sender.mailbox.take() {
            Some(frame) => Poll::Ready(Some(Ok(Bytes::from(frame)))),
            None => Poll::Pending,
        }
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.sender.revoke();
        if let Some(set) = self.set.as_ref().and_then(Weak::upgrade) {
            set.remove(self.sender.id);
        }
        tracing::debug!(id = self.sender.id, "Live channel closed");
    }
}

/// Open a live channel, registering it in `set` when given.
pub fn open_channel(set: Option<&Arc<SubscriberSet>>) -> (LiveSender, LiveStream) {
    static STANDALONE_IDS: AtomicU64 = AtomicU64::new(0);

    let id = set.map_or_else(
        || STANDALONE_IDS.fetch_add(1, Ordering::Relaxed) | (1 << 63),
        |set| set.next_id(),
    );
    let sender = LiveSender {
        id,
        mailbox: Arc::new(Mailbox::default()),
        open: Arc::new(AtomicBool::new(true)),
    };
    if let Some(set) = set {
        set.insert(sender.clone());
    }
    tracing::debug!(id, "Live channel opened");

    let stream = LiveStream {
        preamble_sent: false,
        sender: sender.clone(),
        set: set.map(Arc::downgrade),
    };
    (sender, stream)
}

//! Admin inbox: transport callback to admin task.
//!
//! The broker client delivers messages on its own thread. Each message is
//! copied into a fixed-capacity [`InboundMessage`] and pushed into a
//! bounded `embassy-sync` channel; the admin task pulls them one at a time
//! and runs each to completion before taking the next.
//!
//! ```text
//! ┌──────────────┐ InboundMessage ┌─────────────┐
//! │ MQTT callback│───────────────▶│ Admin task  │── Dispatcher::handle
//! │ (try_send)   │   depth 4      │ (receive)   │
//! └──────────────┘                └─────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::{String, Vec};
use log::warn;

use super::engine::{AdminContext, DispatchOutcome, Dispatcher};

/// Inbox depth. Messages beyond this are dropped at the callback.
pub const INBOX_DEPTH: usize = 4;

/// Largest accepted command payload.
pub const MAX_PAYLOAD: usize = 2048;

/// Largest accepted topic name.
pub const MAX_TOPIC: usize = 128;

/// One message as received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String<MAX_TOPIC>,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

impl InboundMessage {
    /// `None` when the topic or payload exceeds its buffer.
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        let mut t = String::new();
        t.push_str(topic).ok()?;
        Some(Self {
            topic: t,
            payload: Vec::from_slice(payload).ok()?,
        })
    }
}

pub type Inbox = Channel<CriticalSectionRawMutex, InboundMessage, INBOX_DEPTH>;

/// Inbox shared by the transport callback and the admin task.
pub static INBOX: Inbox = Channel::new();

/// Non-blocking push from the transport callback. Returns `false` if the
/// message was dropped.
pub fn enqueue(inbox: &Inbox, topic: &str, payload: &[u8]) -> bool {
    let Some(message) = InboundMessage::new(topic, payload) else {
        warn!(
            "admin: dropping oversized message on '{topic}' ({} bytes)",
            payload.len()
        );
        return false;
    };
    if inbox.try_send(message).is_err() {
        warn!("admin: inbox full, dropping message on '{topic}'");
        return false;
    }
    true
}

/// Wait for the next message and dispatch it.
pub async fn serve_one(
    inbox: &Inbox,
    dispatcher: &mut Dispatcher<'_>,
    ctx: &mut AdminContext<'_>,
) -> DispatchOutcome {
    let message = inbox.receive().await;
    dispatcher.handle(&message.topic, &message.payload, ctx)
}

/// Admin task body. Never returns; only a device reset ends it.
pub async fn serve(inbox: &Inbox, dispatcher: &mut Dispatcher<'_>, ctx: &mut AdminContext<'_>) {
    loop {
        serve_one(inbox, dispatcher, ctx).await;
    }
}

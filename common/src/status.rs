use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::storage::types::document::DocumentStatus;

/// Capacity of each per-document event buffer. Status events are tiny and a
/// document only ever sees a handful of them, so a small buffer suffices.
const EVENT_BUFFER: usize = 16;

/// A single event on a document's status stream.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Synthetic first event confirming the subscription is live.
    Connected { document_id: String },
    /// A lifecycle status change for the document.
    Status {
        document_id: String,
        status: DocumentStatus,
        timestamp: DateTime<Utc>,
    },
}

struct SubscriberSlot {
    generation: u64,
    sender: mpsc::Sender<StatusEvent>,
}

#[derive(Default)]
struct ChannelInner {
    slots: Mutex<HashMap<String, SubscriberSlot>>,
    next_generation: AtomicU64,
}

/// In-process fanout of document status changes. At most one subscriber per
/// document: a new subscription supersedes the previous one, whose stream
/// then ends. Publishing a terminal status delivers the event and closes the
/// stream.
///
/// This is a notification overlay only; the document record in the database
/// remains the source of truth for status.
#[derive(Clone, Default)]
pub struct StatusChannel {
    inner: Arc<ChannelInner>,
}

fn recover<'a, T>(
    result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl StatusChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a status stream for `document_id`. The stream yields a
    /// `Connected` event first, then every status published for the document
    /// until a terminal status closes it. Any previous subscriber for the
    /// same document is superseded and its stream ends.
    pub fn subscribe(&self, document_id: &str) -> impl Stream<Item = StatusEvent> {
        let (sender, mut receiver) = mpsc::channel(EVENT_BUFFER);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        // Queue the synthetic event before the slot becomes visible so it is
        // always the first thing the subscriber sees.
        let _ = sender.try_send(StatusEvent::Connected {
            document_id: document_id.to_owned(),
        });

        {
            let mut slots = recover(self.inner.slots.lock());
            if slots
                .insert(
                    document_id.to_owned(),
                    SubscriberSlot { generation, sender },
                )
                .is_some()
            {
                debug!(document_id, "superseding existing status subscriber");
            }
        }

        let guard = SlotGuard {
            inner: Arc::clone(&self.inner),
            document_id: document_id.to_owned(),
            generation,
        };

        async_stream::stream! {
            let _guard = guard;
            while let Some(event) = receiver.recv().await {
                yield event;
            }
        }
    }

    /// Publish a status change for `document_id`. A no-op when nobody is
    /// subscribed. Terminal statuses close the subscriber's stream after the
    /// event is queued.
    pub fn publish(&self, document_id: &str, status: DocumentStatus) {
        let event = StatusEvent::Status {
            document_id: document_id.to_owned(),
            status,
            timestamp: Utc::now(),
        };

        let mut slots = recover(self.inner.slots.lock());
        let Some(slot) = slots.get(document_id) else {
            return;
        };

        if slot.sender.try_send(event).is_err() {
            // Receiver gone or wedged; drop the slot so the stream ends.
            debug!(document_id, "dropping unresponsive status subscriber");
            slots.remove(document_id);
            return;
        }

        if status.is_terminal() {
            slots.remove(document_id);
        }
    }

    pub fn has_subscriber(&self, document_id: &str) -> bool {
        recover(self.inner.slots.lock()).contains_key(document_id)
    }
}

/// Removes the subscriber slot when the stream is dropped, but only if the
/// slot still belongs to this subscription. A superseding subscriber bumps
/// the generation, so a stale guard leaves the new slot alone.
struct SlotGuard {
    inner: Arc<ChannelInner>,
    document_id: String,
    generation: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slots = recover(self.inner.slots.lock());
        if slots
            .get(&self.document_id)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            slots.remove(&self.document_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn connected(document_id: &str) -> StatusEvent {
        StatusEvent::Connected {
            document_id: document_id.to_owned(),
        }
    }

    fn status_of(event: &StatusEvent) -> Option<DocumentStatus> {
        match event {
            StatusEvent::Status { status, .. } => Some(*status),
            StatusEvent::Connected { .. } => None,
        }
    }

    #[tokio::test]
    async fn test_connected_event_arrives_first() {
        let channel = StatusChannel::new();
        let mut stream = Box::pin(channel.subscribe("doc-1"));

        let first = stream.next().await.expect("first event");
        assert_eq!(first, connected("doc-1"));
    }

    #[tokio::test]
    async fn test_events_delivered_in_publish_order() {
        let channel = StatusChannel::new();
        let mut stream = Box::pin(channel.subscribe("doc-1"));

        channel.publish("doc-1", DocumentStatus::Processing);
        channel.publish("doc-1", DocumentStatus::Processed);

        assert_eq!(stream.next().await, Some(connected("doc-1")));
        assert_eq!(
            stream.next().await.as_ref().and_then(status_of),
            Some(DocumentStatus::Processing)
        );
        assert_eq!(
            stream.next().await.as_ref().and_then(status_of),
            Some(DocumentStatus::Processed)
        );
    }

    #[tokio::test]
    async fn test_terminal_status_closes_stream() {
        let channel = StatusChannel::new();
        let mut stream = Box::pin(channel.subscribe("doc-1"));

        channel.publish("doc-1", DocumentStatus::Failed);

        assert_eq!(stream.next().await, Some(connected("doc-1")));
        assert_eq!(
            stream.next().await.as_ref().and_then(status_of),
            Some(DocumentStatus::Failed)
        );
        assert_eq!(stream.next().await, None);
        assert!(!channel.has_subscriber("doc-1"));
    }

    #[tokio::test]
    async fn test_new_subscriber_supersedes_old() {
        let channel = StatusChannel::new();
        let mut first = Box::pin(channel.subscribe("doc-1"));
        assert_eq!(first.next().await, Some(connected("doc-1")));

        let mut second = Box::pin(channel.subscribe("doc-1"));

        // The superseded stream ends once its queued events drain.
        assert_eq!(first.next().await, None);

        channel.publish("doc-1", DocumentStatus::Processing);
        assert_eq!(second.next().await, Some(connected("doc-1")));
        assert_eq!(
            second.next().await.as_ref().and_then(status_of),
            Some(DocumentStatus::Processing)
        );
    }

    #[tokio::test]
    async fn test_superseded_drop_leaves_new_slot() {
        let channel = StatusChannel::new();
        let first = Box::pin(channel.subscribe("doc-1"));
        let _second = Box::pin(channel.subscribe("doc-1"));

        drop(first);
        assert!(channel.has_subscriber("doc-1"));
    }

    #[tokio::test]
    async fn test_dropping_subscriber_releases_slot() {
        let channel = StatusChannel::new();
        let stream = Box::pin(channel.subscribe("doc-1"));
        assert!(channel.has_subscriber("doc-1"));

        drop(stream);
        assert!(!channel.has_subscriber("doc-1"));
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_noop() {
        let channel = StatusChannel::new();
        channel.publish("doc-unseen", DocumentStatus::Processed);
        assert!(!channel.has_subscriber("doc-unseen"));
    }

    #[tokio::test]
    async fn test_documents_are_independent() {
        let channel = StatusChannel::new();
        let mut stream_a = Box::pin(channel.subscribe("doc-a"));
        let mut stream_b = Box::pin(channel.subscribe("doc-b"));

        channel.publish("doc-a", DocumentStatus::Processed);

        assert_eq!(stream_a.next().await, Some(connected("doc-a")));
        assert_eq!(
            stream_a.next().await.as_ref().and_then(status_of),
            Some(DocumentStatus::Processed)
        );

        assert_eq!(stream_b.next().await, Some(connected("doc-b")));
        let pending = tokio::time::timeout(Duration::from_millis(50), stream_b.next()).await;
        assert!(pending.is_err(), "doc-b saw no events");
        assert!(channel.has_subscriber("doc-b"));
    }
}

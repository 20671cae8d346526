//! Announcement pipeline: poll step → bounded queue → fanout.
//!
//! ```text
//! ticker ──► AnnouncementPoller::poll ──► mpsc (bounded) ──► run_fanout ──► one task per recipient
//! ```
//!
//! The queue is the only coupling between the two halves. When it is
//! full, [`AnnouncementPoller::poll`] waits, which stalls the ticker that
//! drives it; nothing is dropped. Delivery is fire-and-forget: a failed
//! send is logged and doesn't affect the other recipients.

use std::sync::Arc;

use hall_protocol::ConnectionId;
use hall_session::SessionRegistry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::{AnnouncementSource, ConnectionSender};

/// Route of the frame an announcement is pushed with.
pub const ANNOUNCE_ROUTE: &str = "ANNOUNCE";

/// Default number of announcements the queue buffers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// One queued announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Announcement text as UTF-8.
    pub payload: Vec<u8>,
    /// Connections registered when the announcement was picked up.
    pub recipients: Vec<ConnectionId>,
    pub reply_route: String,
}

/// Creates the bounded queue between poller and fanout.
pub fn announcement_queue(
    capacity: usize,
) -> (mpsc::Sender<Announcement>, mpsc::Receiver<Announcement>) {
    mpsc::channel(capacity.max(1))
}

/// What one poll step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing new, or the source failed (logged).
    Idle,
    /// An announcement was queued for this many recipients.
    Enqueued { recipients: usize },
    /// The fanout side is gone; the source was left untouched.
    Closed,
}

/// Reads the announcement source and feeds the queue.
pub struct AnnouncementPoller<S> {
    source: Arc<S>,
    registry: Arc<SessionRegistry>,
    queue: mpsc::Sender<Announcement>,
}

impl<S: AnnouncementSource> AnnouncementPoller<S> {
    pub fn new(
        source: Arc<S>,
        registry: Arc<SessionRegistry>,
        queue: mpsc::Sender<Announcement>,
    ) -> Self {
        Self {
            source,
            registry,
            queue,
        }
    }

    /// One poll step. Never fails: source errors are logged and the next
    /// step simply tries again.
    ///
    /// Waits while the queue is full. The queue slot is reserved before
    /// the source is read, so cancelling a waiting step loses nothing: the
    /// announcement stays in the source for the next step.
    pub async fn poll(&self) -> PollOutcome {
        let Ok(slot) = self.queue.reserve().await else {
            warn!("announcement queue closed, not polling");
            return PollOutcome::Closed;
        };

        let text = match self.source.poll_next().await {
            Ok(Some(text)) => text,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => {
                warn!(error = %e, "failed to poll announcements");
                return PollOutcome::Idle;
            }
        };

        let recipients = self.registry.list_connection_ids();
        let count = recipients.len();
        slot.send(Announcement {
            payload: text.into_bytes(),
            recipients,
            reply_route: ANNOUNCE_ROUTE.to_string(),
        });
        debug!(recipients = count, "announcement queued");
        PollOutcome::Enqueued { recipients: count }
    }
}

/// Spawns [`run_fanout`] onto the runtime.
pub fn spawn_fanout<D: ConnectionSender>(
    queue: mpsc::Receiver<Announcement>,
    sender: Arc<D>,
) -> JoinHandle<()> {
    tokio::spawn(run_fanout(queue, sender))
}

/// Drains the queue in order until every sender is dropped.
///
/// Each recipient gets its own task, so a slow or dead connection holds
/// up neither the others nor the next announcement.
pub async fn run_fanout<D: ConnectionSender>(
    mut queue: mpsc::Receiver<Announcement>,
    sender: Arc<D>,
) {
    info!("announcement fanout started");

    while let Some(announcement) = queue.recv().await {
        let Announcement {
            payload,
            recipients,
            reply_route,
        } = announcement;
        let payload: Arc<[u8]> = payload.into();
        let route: Arc<str> = reply_route.into();

        debug!(recipients = recipients.len(), "fanning out announcement");

        for connection_id in recipients {
            let sender = Arc::clone(&sender);
            let payload = Arc::clone(&payload);
            let route = Arc::clone(&route);
            tokio::spawn(async move {
                if let Err(e) = sender.send_to(&connection_id, &route, &payload).await {
                    warn!(connection_id = %connection_id, error = %e, "announcement delivery failed");
                }
            });
        }
    }

    info!("announcement queue closed, fanout stopped");
}

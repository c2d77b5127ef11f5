use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::notification::Notification;

const CHANNEL_CAPACITY: usize = 64;

/// In-process push channels for live notification delivery, one broadcast
/// channel per watched user. Cheap to clone; all clones share the registry.
#[derive(Clone, Default)]
pub struct NotificationHub {
    channels: Arc<DashMap<i64, broadcast::Sender<Notification>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a subscription for one user. Messages arrive in publish order;
    /// a slow consumer that lags past the channel capacity loses the
    /// oldest messages (last-value-wins, no replay). Dropping the returned
    /// guard unsubscribes.
    pub fn subscribe(&self, user_id: i64) -> Subscription {
        let receiver = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        Subscription {
            user_id,
            receiver,
            channels: self.channels.clone(),
        }
    }

    /// Deliver to every live subscription of the addressee, if any.
    pub fn publish(&self, notification: &Notification) {
        if let Some(sender) = self.channels.get(&notification.user_id) {
            let _ = sender.send(notification.clone());
        }
    }

    pub fn watcher_count(&self, user_id: i64) -> usize {
        self.channels
            .get(&user_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

/// A live notification channel; unsubscribes on drop.
pub struct Subscription {
    user_id: i64,
    receiver: broadcast::Receiver<Notification>,
    channels: Arc<DashMap<i64, broadcast::Sender<Notification>>>,
}

impl Subscription {
    /// Next pushed notification, or `None` once the hub side is gone.
    /// Lagged messages are skipped, not errored.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // our receiver is still alive here, so a count of 1 means we are
        // the last subscriber for this user
        self.channels
            .remove_if(&self.user_id, |_, sender| sender.receiver_count() <= 1);
    }
}

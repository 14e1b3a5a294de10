//! Notification hub
//!
//! A single task owns the subscriber set. Everything else talks to it through a
//! bounded command inbox: subscribing, unsubscribing, publishing and counting.
//! Publishing never waits. A full inbox drops the new event, and a subscriber
//! whose own buffer is full misses that event while the others still get it.

use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::notify::publisher::MatchPublisher;
use crate::types::MatchEvent;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identifier handed out to each subscriber
pub type SubscriberId = u64;

/// Drop reason label when the hub inbox is full
pub const DROP_HUB_FULL: &str = "hub_full";

/// Drop reason label when a subscriber's buffer is full
pub const DROP_SUBSCRIBER_FULL: &str = "subscriber_full";

/// Hub sizing
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the command inbox
    pub inbox_capacity: usize,
    /// Per-subscriber outbound buffer
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 64,
            subscriber_buffer: 32,
        }
    }
}

/// A registered subscriber's end of the hub
///
/// Each message is one serialized `MatchEvent`. The stream ends when the hub
/// shuts down.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event payload
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    /// Take an already buffered payload without waiting
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.receiver.try_recv().ok()
    }
}

enum HubCommand {
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
    Unsubscribe {
        id: SubscriberId,
    },
    Publish {
        payload: Arc<str>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable handle to the hub task
#[derive(Clone)]
pub struct NotificationHub {
    commands: mpsc::Sender<HubCommand>,
    metrics: Arc<MetricsCollector>,
}

impl NotificationHub {
    /// Start the hub task. It runs until `cancel` fires or every handle is dropped.
    pub fn spawn(
        config: HubConfig,
        metrics: Arc<MetricsCollector>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (commands, inbox) = mpsc::channel(config.inbox_capacity);

        let task = HubTask {
            inbox,
            subscribers: HashMap::new(),
            next_id: 0,
            subscriber_buffer: config.subscriber_buffer,
            metrics: metrics.clone(),
        };
        let handle = tokio::spawn(task.run(cancel));

        (Self { commands, metrics }, handle)
    }

    /// Register a new subscriber
    pub async fn subscribe(&self) -> Result<Subscription> {
        let (reply, response) = oneshot::channel();
        self.send(HubCommand::Subscribe { reply }).await?;
        response
            .await
            .map_err(|_| MatchmakingError::NotificationChannelClosed.into())
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<()> {
        self.send(HubCommand::Unsubscribe { id }).await
    }

    /// Number of currently registered subscribers
    pub async fn subscriber_count(&self) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.send(HubCommand::Count { reply }).await?;
        response
            .await
            .map_err(|_| MatchmakingError::NotificationChannelClosed.into())
    }

    /// Whether the hub task has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: HubCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MatchmakingError::NotificationChannelClosed.into())
    }
}

#[async_trait]
impl MatchPublisher for NotificationHub {
    async fn publish_match_found(&self, event: MatchEvent) -> Result<()> {
        let payload: Arc<str> = serde_json::to_string(&event)
            .context("Failed to serialize match event")?
            .into();

        match self.commands.try_send(HubCommand::Publish { payload }) {
            Ok(()) => {
                self.metrics.record_notification_published();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Notification hub inbox full, dropping {} event",
                    event.event_type()
                );
                self.metrics.record_notification_dropped(DROP_HUB_FULL, 1);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(MatchmakingError::NotificationChannelClosed.into()),
        }
    }
}

struct HubTask {
    inbox: mpsc::Receiver<HubCommand>,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<str>>>,
    next_id: SubscriberId,
    subscriber_buffer: usize,
    metrics: Arc<MetricsCollector>,
}

impl HubTask {
    async fn run(mut self, cancel: CancellationToken) {
        info!("Notification hub started");

        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.inbox.recv() => command,
            };

            match command {
                Some(command) => self.handle(command),
                None => break,
            }
        }

        let remaining = self.subscribers.len();
        self.subscribers.clear();
        self.metrics.set_subscribers(0);
        info!(
            "Notification hub stopped, released {} subscriber(s)",
            remaining
        );
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Subscribe { reply } => {
                let id = self.next_id;
                self.next_id += 1;

                let (sender, receiver) = mpsc::channel(self.subscriber_buffer);
                if reply.send(Subscription { id, receiver }).is_ok() {
                    self.subscribers.insert(id, sender);
                    debug!("Subscriber {} registered", id);
                }
            }
            HubCommand::Unsubscribe { id } => {
                if self.subscribers.remove(&id).is_some() {
                    debug!("Subscriber {} unregistered", id);
                }
            }
            HubCommand::Publish { payload } => self.fan_out(payload),
            HubCommand::Count { reply } => {
                let _ = reply.send(self.subscribers.len());
            }
        }

        self.metrics.set_subscribers(self.subscribers.len());
    }

    fn fan_out(&mut self, payload: Arc<str>) {
        let mut dropped = 0u64;

        self.subscribers
            .retain(|id, sender| match sender.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Pruning closed subscriber {}", id);
                    false
                }
            });

        if dropped > 0 {
            warn!("{} subscriber(s) too slow, event dropped for them", dropped);
            self.metrics
                .record_notification_dropped(DROP_SUBSCRIBER_FULL, dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Match, WaitingPlayer};
    use crate::utils::{current_timestamp, generate_match_id};

    fn sample_event(player: &str) -> MatchEvent {
        MatchEvent::MatchFound(Match {
            match_id: generate_match_id(),
            players: vec![WaitingPlayer {
                id: player.to_string(),
                rating: 1200.0,
                joined_at: current_timestamp(),
            }],
            formed_at: current_timestamp(),
        })
    }

    fn spawn_hub(config: HubConfig) -> (NotificationHub, Arc<MetricsCollector>, CancellationToken) {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let cancel = CancellationToken::new();
        let (hub, _handle) = NotificationHub::spawn(config, metrics.clone(), cancel.clone());
        (hub, metrics, cancel)
    }

    #[tokio::test]
    async fn test_event_reaches_every_subscriber() {
        let (hub, metrics, _cancel) = spawn_hub(HubConfig::default());

        let mut first = hub.subscribe().await.unwrap();
        let mut second = hub.subscribe().await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(hub.subscriber_count().await.unwrap(), 2);

        hub.publish_match_found(sample_event("p1")).await.unwrap();

        for subscription in [&mut first, &mut second] {
            let payload = subscription.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(value["type"], "match_found");
            assert_eq!(value["payload"]["players"][0]["player_id"], "p1");
        }
        assert_eq!(metrics.notifications().published_total.get(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_nothing_retroactively() {
        let (hub, _metrics, _cancel) = spawn_hub(HubConfig::default());

        hub.publish_match_found(sample_event("early")).await.unwrap();
        let mut late = hub.subscribe().await.unwrap();

        // Count round-trips through the inbox, so the publish has been handled
        hub.subscriber_count().await.unwrap();
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let (hub, metrics, _cancel) = spawn_hub(HubConfig {
            inbox_capacity: 16,
            subscriber_buffer: 1,
        });

        let mut slow = hub.subscribe().await.unwrap();
        let mut fast = hub.subscribe().await.unwrap();

        hub.publish_match_found(sample_event("a")).await.unwrap();
        assert!(fast.recv().await.is_some());

        hub.publish_match_found(sample_event("b")).await.unwrap();
        assert!(fast.recv().await.is_some());

        // The slow subscriber only holds the first event
        hub.subscriber_count().await.unwrap();
        assert!(slow.try_recv().is_some());
        assert!(slow.try_recv().is_none());
        assert_eq!(
            metrics
                .notifications()
                .dropped_total
                .with_label_values(&[DROP_SUBSCRIBER_FULL])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_full_inbox_drops_newest() {
        let (hub, metrics, _cancel) = spawn_hub(HubConfig {
            inbox_capacity: 1,
            subscriber_buffer: 8,
        });

        // No await point yields to the hub task, so the inbox never drains
        for player in ["a", "b", "c"] {
            assert!(hub.publish_match_found(sample_event(player)).await.is_ok());
        }

        assert_eq!(metrics.notifications().published_total.get(), 1);
        assert_eq!(
            metrics
                .notifications()
                .dropped_total
                .with_label_values(&[DROP_HUB_FULL])
                .get(),
            2
        );
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_pruned() {
        let (hub, _metrics, _cancel) = spawn_hub(HubConfig::default());

        let gone = hub.subscribe().await.unwrap();
        let _kept = hub.subscribe().await.unwrap();
        drop(gone);

        hub.publish_match_found(sample_event("p1")).await.unwrap();
        assert_eq!(hub.subscriber_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (hub, metrics, _cancel) = spawn_hub(HubConfig::default());

        let subscription = hub.subscribe().await.unwrap();
        hub.unsubscribe(subscription.id()).await.unwrap();
        hub.unsubscribe(999).await.unwrap();

        assert_eq!(hub.subscriber_count().await.unwrap(), 0);
        assert_eq!(metrics.notifications().subscribers.get(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_hub_closes_subscriptions() {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let cancel = CancellationToken::new();
        let (hub, handle) = NotificationHub::spawn(HubConfig::default(), metrics, cancel.clone());

        let mut subscription = hub.subscribe().await.unwrap();
        cancel.cancel();
        handle.await.unwrap();

        assert!(subscription.recv().await.is_none());
        assert!(hub.is_closed());
        assert!(hub.publish_match_found(sample_event("p1")).await.is_err());
        assert!(hub.subscribe().await.is_err());
    }
}

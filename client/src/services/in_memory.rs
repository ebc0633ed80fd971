use actix::Recipient;
use async_trait::async_trait;
use colored::Color;
use common::errors::FetchError;
use common::logger::Logger;
use common::messages::tracking_messages::{FeedNotice, OrderFeed, SubscriptionHandle};
use common::types::dtos::{OrderEventDTO, OrderSnapshotDTO, PartnerDTO};
use common::types::order_status::OrderStatus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::services::{OrderFeedSource, OrderService};

struct Subscriber {
    order_id: String,
    feed: Recipient<OrderFeed>,
}

#[derive(Default)]
struct BackendState {
    /// Orders by id.
    orders: HashMap<String, OrderSnapshotDTO>,
    /// Partners by id.
    partners: HashMap<String, PartnerDTO>,
    subscribers: HashMap<SubscriptionHandle, Subscriber>,
    next_handle: u64,
    snapshot_delay: Duration,
    partner_delay: Duration,
    /// Partner lookups that will fail with a transport error before succeeding again.
    failing_partner_lookups: usize,
    /// Every partner id requested, in request order.
    partner_requests: Vec<String>,
}

/// Order store, partner directory and change feed kept in process memory.
///
/// Backs the demo binary and the tracker tests. Latency and partner failures are
/// configurable so tests can reproduce late and failed resolutions.
#[derive(Clone)]
pub struct InMemoryOrderBackend {
    state: Arc<Mutex<BackendState>>,
    logger: Logger,
}

impl Default for InMemoryOrderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
            logger: Logger::new("Backend", Color::Magenta),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Books a new pickup: a pending order with a fresh UUID.
    pub fn book_pickup(&self) -> OrderSnapshotDTO {
        let snapshot = OrderSnapshotDTO {
            order_id: Uuid::new_v4().to_string(),
            status: OrderStatus::Pending,
            partner_id: None,
            otp_verified: false,
        };
        self.insert_order(snapshot.clone());
        self.logger
            .info(format!("Booked pickup {}", snapshot.order_id));
        snapshot
    }

    pub fn insert_order(&self, snapshot: OrderSnapshotDTO) {
        self.lock()
            .orders
            .insert(snapshot.order_id.clone(), snapshot);
    }

    pub fn insert_partner(&self, partner_id: impl Into<String>, partner: PartnerDTO) {
        self.lock().partners.insert(partner_id.into(), partner);
    }

    pub fn order(&self, order_id: &str) -> Option<OrderSnapshotDTO> {
        self.lock().orders.get(order_id).cloned()
    }

    pub fn set_snapshot_delay(&self, delay: Duration) {
        self.lock().snapshot_delay = delay;
    }

    pub fn set_partner_delay(&self, delay: Duration) {
        self.lock().partner_delay = delay;
    }

    pub fn fail_next_partner_lookups(&self, count: usize) {
        self.lock().failing_partner_lookups = count;
    }

    /// Number of lookups issued for `partner_id`.
    pub fn partner_requests(&self, partner_id: &str) -> usize {
        self.lock()
            .partner_requests
            .iter()
            .filter(|id| id.as_str() == partner_id)
            .count()
    }

    pub fn active_subscriptions(&self, order_id: &str) -> usize {
        self.lock()
            .subscribers
            .values()
            .filter(|s| s.order_id == order_id)
            .count()
    }

    /// Stores the change and notifies every subscriber of the order.
    /// Returns how many subscribers were notified.
    pub fn publish(&self, order_id: &str, event: OrderEventDTO) -> usize {
        {
            let mut state = self.lock();
            if let Some(order) = state.orders.get_mut(order_id) {
                order.status = event.status;
                order.otp_verified |= event.otp_verified;
                if order.partner_id.is_none() {
                    order.partner_id = event.partner_id.clone();
                }
            } else {
                self.logger
                    .warn(format!("Publishing change for unknown order {}", order_id));
            }
        }
        self.deliver(order_id, FeedNotice::Changed(event))
    }

    /// Notifies subscribers without touching the stored order, as a replayed or
    /// out-of-order delivery would.
    pub fn replay(&self, order_id: &str, event: OrderEventDTO) -> usize {
        self.deliver(order_id, FeedNotice::Changed(event))
    }

    /// Drops every subscription of the order, telling each subscriber first.
    pub fn disconnect(&self, order_id: &str) -> usize {
        let dropped: Vec<(SubscriptionHandle, Recipient<OrderFeed>)> = {
            let mut state = self.lock();
            let handles: Vec<SubscriptionHandle> = state
                .subscribers
                .iter()
                .filter(|(_, s)| s.order_id == order_id)
                .map(|(handle, _)| *handle)
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| {
                    state
                        .subscribers
                        .remove(&handle)
                        .map(|s| (handle, s.feed))
                })
                .collect()
        };
        for (handle, feed) in &dropped {
            feed.do_send(OrderFeed {
                subscription: *handle,
                notice: FeedNotice::Disconnected,
            });
        }
        self.logger.warn(format!(
            "Disconnected {} subscriber(s) of order {}",
            dropped.len(),
            order_id
        ));
        dropped.len()
    }

    fn deliver(&self, order_id: &str, notice: FeedNotice) -> usize {
        let targets: Vec<(SubscriptionHandle, Recipient<OrderFeed>)> = self
            .lock()
            .subscribers
            .iter()
            .filter(|(_, s)| s.order_id == order_id)
            .map(|(handle, s)| (*handle, s.feed.clone()))
            .collect();
        for (handle, feed) in &targets {
            feed.do_send(OrderFeed {
                subscription: *handle,
                notice: notice.clone(),
            });
        }
        targets.len()
    }
}

#[async_trait]
impl OrderService for InMemoryOrderBackend {
    async fn get_order_snapshot(&self, order_id: &str) -> Result<OrderSnapshotDTO, FetchError> {
        let delay = self.lock().snapshot_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.lock()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("order {}", order_id)))
    }

    async fn get_partner(&self, partner_id: &str) -> Result<PartnerDTO, FetchError> {
        let (delay, fail) = {
            let mut state = self.lock();
            state.partner_requests.push(partner_id.to_string());
            let fail = state.failing_partner_lookups > 0;
            if fail {
                state.failing_partner_lookups -= 1;
            }
            (state.partner_delay, fail)
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if fail {
            return Err(FetchError::Transport(format!(
                "partner directory unavailable for {}",
                partner_id
            )));
        }
        self.lock()
            .partners
            .get(partner_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("partner {}", partner_id)))
    }
}

impl OrderFeedSource for InMemoryOrderBackend {
    fn subscribe(&self, order_id: &str, feed: Recipient<OrderFeed>) -> SubscriptionHandle {
        let mut state = self.lock();
        state.next_handle += 1;
        let handle = SubscriptionHandle(state.next_handle);
        state.subscribers.insert(
            handle,
            Subscriber {
                order_id: order_id.to_string(),
                feed,
            },
        );
        self.logger
            .debug(format!("Subscribed {} to order {}", handle, order_id));
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if self.lock().subscribers.remove(&handle).is_some() {
            self.logger.debug(format!("Released {}", handle));
        }
    }
}

//! Contracts of the collaborators the tracker observes but does not own: the order store,
//! the partner directory and the live change feed.

pub mod in_memory;

use actix::Recipient;
use async_trait::async_trait;
use common::errors::FetchError;
use common::messages::tracking_messages::{OrderFeed, SubscriptionHandle};
use common::types::dtos::{OrderSnapshotDTO, PartnerDTO};

/// One-shot reads of orders and partners.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Fails with [`FetchError::NotFound`] when the order id does not resolve.
    async fn get_order_snapshot(&self, order_id: &str) -> Result<OrderSnapshotDTO, FetchError>;

    async fn get_partner(&self, partner_id: &str) -> Result<PartnerDTO, FetchError>;
}

/// Live change feed for single orders.
pub trait OrderFeedSource: Send + Sync {
    /// Starts delivering [`OrderFeed`] notices for `order_id` to `feed`, each stamped with the
    /// returned handle.
    fn subscribe(&self, order_id: &str, feed: Recipient<OrderFeed>) -> SubscriptionHandle;

    /// Stops delivery for `handle`. Unknown or already released handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

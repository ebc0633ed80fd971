use actix::fut;
use actix::prelude::*;
use colored::Color;
use common::errors::{FetchError, TrackerError};
use common::logger::Logger;
use common::messages::tracking_messages::{
    FeedNotice, OrderFeed, ProjectionChanged, SubscriptionHandle,
};
use common::types::dtos::{
    ConnectionState, OrderEventDTO, OrderSnapshotDTO, PartnerDTO, ProjectionDTO,
};
use common::types::verification_code::VerificationCode;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::messages::internal_messages::{
    Dispose, GetProjection, Observe, Resubscribe, RetryPartner, StartTracking,
};
use crate::services::{OrderFeedSource, OrderService};
use crate::tracker::projection::project;
use crate::tracker::state::TrackerState;

enum Phase {
    /// No tracking session.
    Idle,
    /// Subscribed, snapshot not resolved yet. Feed events wait here in arrival order.
    AwaitingSnapshot { queued: VecDeque<OrderEventDTO> },
    Live(TrackerState),
    /// Torn down. The last state stays readable but is never mutated again.
    Disposed(Option<TrackerState>),
}

struct PartnerFetch {
    partner_id: String,
    handle: SpawnHandle,
}

/// The `OrderTracker` actor follows one order through its pickup lifecycle.
///
/// ## Responsibilities
/// - Owns the feed subscription of the tracked order (acquired on start, released on dispose).
/// - Seeds [`TrackerState`] from a snapshot and folds every feed event into it.
/// - Loads the partner's contact details once per session.
/// - Publishes a fresh [`ProjectionDTO`] to observers after every change.
///
/// The mailbox serializes every delivery, so the fold never runs re-entrantly. Async
/// results carry the session generation they were started under and are dropped once
/// that session is gone.
pub struct OrderTracker {
    service: Arc<dyn OrderService>,
    feed_source: Arc<dyn OrderFeedSource>,
    config: TrackerConfig,
    phase: Phase,
    order_id: Option<String>,
    verification_code: Option<VerificationCode>,
    generation: u64,
    subscription: Option<SubscriptionHandle>,
    partner_fetch: Option<PartnerFetch>,
    /// Partner id whose last lookup failed, kept for [`RetryPartner`].
    failed_partner: Option<String>,
    connection: ConnectionState,
    /// Feed events received since the current subscription was opened.
    events_since_subscribe: u64,
    observers: Vec<Recipient<ProjectionChanged>>,
    base_logger: Logger,
    logger: Logger,
}

impl OrderTracker {
    pub fn new(
        service: Arc<dyn OrderService>,
        feed_source: Arc<dyn OrderFeedSource>,
        config: TrackerConfig,
    ) -> Self {
        let base_logger = Logger::new("Tracker", Color::Cyan).with_level(config.log_level);
        Self {
            service,
            feed_source,
            config,
            phase: Phase::Idle,
            order_id: None,
            verification_code: None,
            generation: 0,
            subscription: None,
            partner_fetch: None,
            failed_partner: None,
            connection: ConnectionState::Closed,
            events_since_subscribe: 0,
            observers: Vec::new(),
            logger: base_logger.clone(),
            base_logger,
        }
    }

    /// Uses one backend as both the order service and the feed source.
    pub fn with_backend<B>(backend: B, config: TrackerConfig) -> Self
    where
        B: OrderService + OrderFeedSource + 'static,
    {
        let backend = Arc::new(backend);
        Self::new(backend.clone(), backend, config)
    }

    fn is_active(&self) -> bool {
        matches!(self.phase, Phase::AwaitingSnapshot { .. } | Phase::Live(_))
    }

    fn projection(&self) -> Option<ProjectionDTO> {
        let state = match &self.phase {
            Phase::Live(state) | Phase::Disposed(Some(state)) => state,
            _ => return None,
        };
        Some(project(
            state,
            self.connection,
            self.verification_code.as_ref(),
        ))
    }

    fn notify_observers(&mut self) {
        self.observers.retain(|observer| observer.connected());
        if self.observers.is_empty() {
            return;
        }
        if let Some(projection) = self.projection() {
            for observer in &self.observers {
                observer.do_send(ProjectionChanged {
                    projection: projection.clone(),
                });
            }
        }
    }

    fn subscribe(&mut self, ctx: &mut Context<Self>) {
        let Some(order_id) = self.order_id.clone() else {
            return;
        };
        let handle = self
            .feed_source
            .subscribe(&order_id, ctx.address().recipient());
        self.logger
            .info(format!("Subscribed to order feed ({})", handle));
        self.subscription = Some(handle);
        self.events_since_subscribe = 0;
        self.connection = ConnectionState::Live;
    }

    fn release_subscription(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.feed_source.unsubscribe(handle);
            self.logger
                .info(format!("Released order feed ({})", handle));
        }
    }

    /// Ends the active session, if any. Returns whether there was one.
    fn teardown(&mut self, ctx: &mut Context<Self>) -> bool {
        if !self.is_active() {
            return false;
        }
        if let Some(fetch) = self.partner_fetch.take() {
            ctx.cancel_future(fetch.handle);
            self.logger.debug(format!(
                "Cancelled in-flight lookup of partner {}",
                fetch.partner_id
            ));
        }
        self.release_subscription();
        self.generation += 1;
        self.failed_partner = None;
        self.connection = ConnectionState::Closed;
        self.phase = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Live(state) => Phase::Disposed(Some(state)),
            _ => Phase::Disposed(None),
        };
        self.notify_observers();
        true
    }

    fn seed_session(
        &mut self,
        generation: u64,
        order_id: String,
        result: Result<OrderSnapshotDTO, FetchError>,
        ctx: &mut Context<Self>,
    ) -> Result<ProjectionDTO, TrackerError> {
        if generation != self.generation {
            self.logger.warn(format!(
                "Discarding snapshot of superseded session for order {}",
                order_id
            ));
            return Err(TrackerError::SessionSuperseded(order_id));
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(source) => {
                let error = TrackerError::SnapshotFetch { order_id, source };
                self.logger.error(error.to_string());
                self.release_subscription();
                self.generation += 1;
                self.order_id = None;
                self.phase = Phase::Idle;
                self.connection = ConnectionState::Closed;
                return Err(error);
            }
        };
        if snapshot.order_id != order_id {
            self.logger.warn(format!(
                "Snapshot reports order id {}, tracking it as {}",
                snapshot.order_id, order_id
            ));
        }

        let seeded = Phase::Live(TrackerState::seed(&order_id, &snapshot));
        let queued = match std::mem::replace(&mut self.phase, seeded) {
            Phase::AwaitingSnapshot { queued } => queued,
            _ => VecDeque::new(),
        };
        self.logger.info(format!(
            "Snapshot loaded at stage {} ({} queued event(s))",
            snapshot.status,
            queued.len()
        ));

        self.ensure_partner(snapshot.partner_id.as_deref(), ctx);
        for event in queued {
            self.apply_event(event, ctx);
        }
        self.notify_observers();
        self.projection().ok_or(TrackerError::NotTracking)
    }

    fn apply_event(&mut self, event: OrderEventDTO, ctx: &mut Context<Self>) {
        let outcome = match &mut self.phase {
            Phase::AwaitingSnapshot { queued } => {
                queued.push_back(event);
                self.logger.debug(format!(
                    "Snapshot pending, queued event ({} waiting)",
                    queued.len()
                ));
                return;
            }
            Phase::Live(state) => state.apply(&event, self.config.regression_policy),
            Phase::Idle | Phase::Disposed(_) => {
                self.logger
                    .warn("Dropping order event received without a live session");
                return;
            }
        };

        if outcome.regression_rejected {
            self.logger.warn(format!(
                "Ignoring regression {} -> {} not flagged as a correction",
                outcome.previous, event.status
            ));
        } else if outcome.regressed() {
            self.logger.warn(format!(
                "Stage moved back {} -> {}",
                outcome.previous, outcome.current
            ));
        } else if outcome.previous != outcome.current {
            self.logger.info(format!(
                "Stage {} -> {}",
                outcome.previous, outcome.current
            ));
        }
        if outcome.otp_confirmed {
            self.logger.info("Verification code confirmed");
        }

        self.ensure_partner(event.partner_id.as_deref(), ctx);
        if outcome.changed() {
            self.notify_observers();
        }
    }

    /// Starts a partner lookup unless the partner is known, a lookup is in flight or the
    /// last one failed. A failed lookup is only retried through [`RetryPartner`].
    fn ensure_partner(&mut self, partner_id: Option<&str>, ctx: &mut Context<Self>) {
        let wanted = match &self.phase {
            Phase::Live(state) => state.missing_partner(partner_id),
            _ => None,
        };
        let Some(partner_id) = wanted else {
            return;
        };
        if let Some(fetch) = &self.partner_fetch {
            self.logger.debug(format!(
                "Lookup of partner {} already in flight",
                fetch.partner_id
            ));
            return;
        }
        if let Some(failed) = &self.failed_partner {
            self.logger.debug(format!(
                "Lookup of partner {} failed earlier, waiting for a retry",
                failed
            ));
            return;
        }

        self.logger.info(format!("Fetching partner {}", partner_id));
        let generation = self.generation;
        let service = self.service.clone();
        let lookup_id = partner_id.clone();
        let handle = ctx.spawn(
            async move { service.get_partner(&lookup_id).await }
                .into_actor(self)
                .map(move |result, act, _ctx| act.on_partner(generation, result)),
        );
        self.partner_fetch = Some(PartnerFetch { partner_id, handle });
    }

    fn on_partner(&mut self, generation: u64, result: Result<PartnerDTO, FetchError>) {
        if generation != self.generation {
            self.logger
                .warn("Discarding partner lookup of a superseded session");
            return;
        }
        let Some(fetch) = self.partner_fetch.take() else {
            return;
        };
        match result {
            Ok(partner) => {
                let name = partner.name.clone();
                let stored = match &mut self.phase {
                    Phase::Live(state) => state.set_partner(partner),
                    _ => false,
                };
                if stored {
                    self.logger
                        .info(format!("Partner {} ({}) loaded", name, fetch.partner_id));
                    self.notify_observers();
                }
            }
            Err(source) => {
                let error = TrackerError::PartnerFetch {
                    partner_id: fetch.partner_id.clone(),
                    source,
                };
                self.logger
                    .warn(format!("{}; partner contact stays hidden", error));
                self.failed_partner = Some(fetch.partner_id);
            }
        }
    }

    fn reconcile(
        &mut self,
        generation: u64,
        order_id: String,
        result: Result<OrderSnapshotDTO, FetchError>,
        ctx: &mut Context<Self>,
    ) -> Result<(), TrackerError> {
        if generation != self.generation {
            return Err(TrackerError::SessionSuperseded(order_id));
        }
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(source) => {
                let error = TrackerError::SnapshotFetch { order_id, source };
                self.logger
                    .warn(format!("{}; keeping last known state", error));
                return Err(error);
            }
        };
        if self.events_since_subscribe > 0 {
            self.logger
                .debug("Feed already delivered newer events, refresh snapshot skipped");
            return Ok(());
        }
        self.logger.info(format!(
            "Reconciling with refreshed snapshot at stage {}",
            snapshot.status
        ));
        self.apply_event(
            OrderEventDTO {
                status: snapshot.status,
                otp_verified: snapshot.otp_verified,
                partner_id: snapshot.partner_id,
                correction: false,
            },
            ctx,
        );
        Ok(())
    }
}

impl Actor for OrderTracker {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        self.logger.info("OrderTracker started");
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.teardown(ctx);
    }
}

impl Handler<StartTracking> for OrderTracker {
    type Result = ResponseActFuture<Self, Result<ProjectionDTO, TrackerError>>;

    fn handle(&mut self, msg: StartTracking, ctx: &mut Self::Context) -> Self::Result {
        let order_id = msg.order_id.trim().to_string();
        if order_id.is_empty() {
            self.logger.error("Refusing to track an empty order id");
            return Box::pin(fut::ready(Err(TrackerError::InvalidOrderId)));
        }
        if self.teardown(ctx) {
            self.logger.info("Previous tracking session replaced");
        }

        self.generation += 1;
        let generation = self.generation;
        self.logger = self.base_logger.scoped(&order_id);
        self.order_id = Some(order_id.clone());
        self.verification_code = msg.verification_code;
        self.failed_partner = None;
        self.phase = Phase::AwaitingSnapshot {
            queued: VecDeque::new(),
        };
        self.subscribe(ctx);
        self.logger.info("Fetching order snapshot");

        let service = self.service.clone();
        let lookup_id = order_id.clone();
        Box::pin(
            async move { service.get_order_snapshot(&lookup_id).await }
                .into_actor(self)
                .map(move |result, act, ctx| act.seed_session(generation, order_id, result, ctx)),
        )
    }
}

impl Handler<OrderFeed> for OrderTracker {
    type Result = ();

    fn handle(&mut self, msg: OrderFeed, ctx: &mut Self::Context) -> Self::Result {
        if self.subscription != Some(msg.subscription) {
            self.logger.debug(format!(
                "Dropping notice from inactive subscription {}",
                msg.subscription
            ));
            return;
        }
        match msg.notice {
            FeedNotice::Changed(event) => {
                self.events_since_subscribe += 1;
                self.apply_event(event, ctx);
            }
            FeedNotice::Disconnected => {
                let order_id = self.order_id.clone().unwrap_or_default();
                self.logger
                    .warn(TrackerError::StreamDisconnected(order_id).to_string());
                self.release_subscription();
                self.connection = ConnectionState::Reconnecting;
                self.notify_observers();
            }
        }
    }
}

impl Handler<Dispose> for OrderTracker {
    type Result = ();

    fn handle(&mut self, _msg: Dispose, ctx: &mut Self::Context) -> Self::Result {
        if self.teardown(ctx) {
            self.logger.info("Tracking disposed");
        } else {
            self.logger.debug("Dispose without an active session, nothing to do");
        }
    }
}

impl Handler<GetProjection> for OrderTracker {
    type Result = MessageResult<GetProjection>;

    fn handle(&mut self, _msg: GetProjection, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.projection())
    }
}

impl Handler<Resubscribe> for OrderTracker {
    type Result = ResponseActFuture<Self, Result<(), TrackerError>>;

    fn handle(&mut self, _msg: Resubscribe, ctx: &mut Self::Context) -> Self::Result {
        if !self.is_active() {
            return Box::pin(fut::ready(Err(TrackerError::NotTracking)));
        }
        if self.subscription.is_some() {
            self.logger.debug("Feed still attached, resubscribe ignored");
            return Box::pin(fut::ready(Ok(())));
        }
        self.subscribe(ctx);
        self.notify_observers();

        // Until the first snapshot lands the session has nothing to reconcile.
        let Some(order_id) = self
            .order_id
            .clone()
            .filter(|_| matches!(self.phase, Phase::Live(_)))
        else {
            return Box::pin(fut::ready(Ok(())));
        };
        let generation = self.generation;
        let service = self.service.clone();
        let lookup_id = order_id.clone();
        Box::pin(
            async move { service.get_order_snapshot(&lookup_id).await }
                .into_actor(self)
                .map(move |result, act, ctx| act.reconcile(generation, order_id, result, ctx)),
        )
    }
}

impl Handler<RetryPartner> for OrderTracker {
    type Result = Result<(), TrackerError>;

    fn handle(&mut self, _msg: RetryPartner, ctx: &mut Self::Context) -> Self::Result {
        if !matches!(self.phase, Phase::Live(_)) {
            return Err(TrackerError::NotTracking);
        }
        match self.failed_partner.take() {
            Some(partner_id) => {
                self.logger
                    .info(format!("Retrying lookup of partner {}", partner_id));
                self.ensure_partner(Some(&partner_id), ctx);
            }
            None => self.logger.debug("No failed partner lookup to retry"),
        }
        Ok(())
    }
}

impl Handler<Observe> for OrderTracker {
    type Result = ();

    fn handle(&mut self, msg: Observe, _ctx: &mut Self::Context) -> Self::Result {
        if let Some(projection) = self.projection() {
            msg.observer.do_send(ProjectionChanged { projection });
        }
        self.observers.push(msg.observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegressionPolicy;
    use crate::services::in_memory::InMemoryOrderBackend;
    use common::types::order_status::OrderStatus;
    use common::types::step_state::StepState;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(3);

    fn partner() -> PartnerDTO {
        PartnerDTO {
            name: "Ravi".to_string(),
            phone: "+91 98765 43210".to_string(),
        }
    }

    fn backend_with_order(
        order_id: &str,
        status: OrderStatus,
        partner_id: Option<&str>,
    ) -> InMemoryOrderBackend {
        let backend = InMemoryOrderBackend::new();
        backend.insert_order(OrderSnapshotDTO {
            order_id: order_id.to_string(),
            status,
            partner_id: partner_id.map(str::to_string),
            otp_verified: false,
        });
        backend.insert_partner("p1", partner());
        backend
    }

    fn start_tracker(backend: &InMemoryOrderBackend, config: TrackerConfig) -> Addr<OrderTracker> {
        OrderTracker::with_backend(backend.clone(), config).start()
    }

    fn start(order_id: &str) -> StartTracking {
        StartTracking {
            order_id: order_id.to_string(),
            verification_code: None,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(WAIT, async {
            while !condition() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn wait_for_projection(
        tracker: &Addr<OrderTracker>,
        predicate: impl Fn(&ProjectionDTO) -> bool,
    ) -> ProjectionDTO {
        timeout(WAIT, async {
            loop {
                if let Some(projection) = tracker.send(GetProjection).await.unwrap() {
                    if predicate(&projection) {
                        return projection;
                    }
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("projection not reached in time")
    }

    struct Collector(Arc<Mutex<Vec<ProjectionDTO>>>);

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<ProjectionChanged> for Collector {
        type Result = ();

        fn handle(&mut self, msg: ProjectionChanged, _ctx: &mut Self::Context) {
            self.0.lock().unwrap().push(msg.projection);
        }
    }

    #[actix_rt::test]
    async fn test_pending_snapshot_shows_only_pending_as_current() {
        let backend = backend_with_order("o-a", OrderStatus::Pending, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());

        let projection = tracker.send(start("o-a")).await.unwrap().unwrap();

        assert_eq!(projection.current_stage(), Some(OrderStatus::Pending));
        for stage in &OrderStatus::ALL[1..] {
            assert_eq!(projection.state_of(*stage), Some(StepState::Upcoming));
        }
        assert!(projection.partner.is_none());
        assert!(!projection.can_show_partner_contact);
        assert!(!projection.is_complete);
        assert_eq!(projection.connection, ConnectionState::Live);
        assert_eq!(backend.active_subscriptions("o-a"), 1);
    }

    #[actix_rt::test]
    async fn test_assigned_event_completes_pending_and_loads_partner() {
        let backend = backend_with_order("o-b", OrderStatus::Pending, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-b")).await.unwrap().unwrap();

        backend.publish(
            "o-b",
            OrderEventDTO::new(OrderStatus::Assigned).with_partner("p1"),
        );

        let projection = wait_for_projection(&tracker, |p| p.partner.is_some()).await;
        assert_eq!(projection.current_stage(), Some(OrderStatus::Assigned));
        assert_eq!(
            projection.state_of(OrderStatus::Pending),
            Some(StepState::Completed)
        );
        assert_eq!(projection.stages[1].annotation.as_deref(), Some("Ravi"));
        assert_eq!(backend.partner_requests("p1"), 1);
    }

    #[actix_rt::test]
    async fn test_otp_confirmation_hides_code_without_stage_change() {
        let backend = backend_with_order("o-c", OrderStatus::Arrived, Some("p1"));
        let tracker = start_tracker(&backend, TrackerConfig::default());
        let code = VerificationCode::parse("482913").unwrap();
        tracker
            .send(StartTracking {
                order_id: "o-c".to_string(),
                verification_code: Some(code),
            })
            .await
            .unwrap()
            .unwrap();

        backend.publish("o-c", OrderEventDTO::new(OrderStatus::Verifying));
        let showing = wait_for_projection(&tracker, |p| p.can_show_otp).await;
        assert_eq!(showing.otp_digits, Some(vec![4, 8, 2, 9, 1, 3]));

        backend.publish(
            "o-c",
            OrderEventDTO::new(OrderStatus::Verifying).with_otp_verified(true),
        );
        let hidden = wait_for_projection(&tracker, |p| !p.can_show_otp).await;
        assert_eq!(hidden.current_stage(), Some(OrderStatus::Verifying));
        assert_eq!(hidden.otp_digits, None);

        // A stale replay cannot bring the code back.
        backend.replay("o-c", OrderEventDTO::new(OrderStatus::Verifying));
        sleep(Duration::from_millis(50)).await;
        let after = tracker.send(GetProjection).await.unwrap().unwrap();
        assert!(!after.can_show_otp);
    }

    #[actix_rt::test]
    async fn test_partner_lookup_resolving_after_dispose_is_discarded() {
        let backend = backend_with_order("o-d", OrderStatus::Assigned, Some("p1"));
        backend.set_partner_delay(Duration::from_millis(200));
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-d")).await.unwrap().unwrap();
        wait_until(|| backend.partner_requests("p1") == 1).await;

        tracker.send(Dispose).await.unwrap();
        let disposed = tracker.send(GetProjection).await.unwrap().unwrap();
        assert_eq!(disposed.connection, ConnectionState::Closed);

        sleep(Duration::from_millis(400)).await;
        let later = tracker.send(GetProjection).await.unwrap().unwrap();
        assert_eq!(later, disposed);
        assert!(later.partner.is_none());
        assert_eq!(backend.active_subscriptions("o-d"), 0);
    }

    #[actix_rt::test]
    async fn test_event_before_snapshot_is_applied_after_seeding() {
        let backend = backend_with_order("o-e", OrderStatus::Pending, None);
        backend.set_snapshot_delay(Duration::from_millis(200));
        let tracker = start_tracker(&backend, TrackerConfig::default());

        let request = actix_rt::spawn(tracker.send(start("o-e")));
        wait_until(|| backend.active_subscriptions("o-e") == 1).await;
        assert!(tracker.send(GetProjection).await.unwrap().is_none());

        backend.replay("o-e", OrderEventDTO::new(OrderStatus::Arrived));

        let projection = request.await.unwrap().unwrap().unwrap();
        assert_eq!(projection.current_stage(), Some(OrderStatus::Arrived));
        assert_eq!(backend.order("o-e").unwrap().status, OrderStatus::Pending);
    }

    #[actix_rt::test]
    async fn test_unknown_order_fails_without_entering_tracking() {
        let backend = InMemoryOrderBackend::new();
        let tracker = start_tracker(&backend, TrackerConfig::default());

        let error = tracker.send(start("missing")).await.unwrap().unwrap_err();

        assert!(matches!(
            error,
            TrackerError::SnapshotFetch {
                source: FetchError::NotFound(_),
                ..
            }
        ));
        assert!(error.is_fatal());
        assert_eq!(backend.active_subscriptions("missing"), 0);
        assert!(tracker.send(GetProjection).await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn test_empty_order_id_is_rejected() {
        let backend = InMemoryOrderBackend::new();
        let tracker = start_tracker(&backend, TrackerConfig::default());

        let error = tracker.send(start("   ")).await.unwrap().unwrap_err();
        assert_eq!(error, TrackerError::InvalidOrderId);
    }

    #[actix_rt::test]
    async fn test_partner_is_fetched_once_across_events() {
        let backend = backend_with_order("o-f", OrderStatus::Pending, None);
        backend.set_partner_delay(Duration::from_millis(100));
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-f")).await.unwrap().unwrap();

        for status in [
            OrderStatus::Assigned,
            OrderStatus::OnTheWay,
            OrderStatus::Arrived,
        ] {
            backend.publish("o-f", OrderEventDTO::new(status).with_partner("p1"));
        }
        let projection = wait_for_projection(&tracker, |p| p.can_show_partner_contact).await;
        assert_eq!(projection.partner, Some(partner()));

        backend.publish(
            "o-f",
            OrderEventDTO::new(OrderStatus::Verifying).with_partner("p1"),
        );
        wait_for_projection(&tracker, |p| p.can_show_otp).await;
        assert_eq!(backend.partner_requests("p1"), 1);
    }

    #[actix_rt::test]
    async fn test_duplicate_event_yields_same_projection() {
        let backend = backend_with_order("o-g", OrderStatus::Assigned, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-g")).await.unwrap().unwrap();

        let event = OrderEventDTO::new(OrderStatus::OnTheWay);
        backend.publish("o-g", event.clone());
        let once =
            wait_for_projection(&tracker, |p| p.current_stage() == Some(OrderStatus::OnTheWay))
                .await;
        backend.publish("o-g", event);
        sleep(Duration::from_millis(50)).await;
        let twice = tracker.send(GetProjection).await.unwrap().unwrap();
        assert_eq!(once, twice);
    }

    #[actix_rt::test]
    async fn test_regression_overwrites_by_default() {
        let backend = backend_with_order("o-h", OrderStatus::Arrived, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-h")).await.unwrap().unwrap();

        backend.replay("o-h", OrderEventDTO::new(OrderStatus::Pending));
        let projection =
            wait_for_projection(&tracker, |p| p.current_stage() == Some(OrderStatus::Pending))
                .await;
        assert!(
            projection
                .stages
                .iter()
                .skip(1)
                .all(|v| v.state == StepState::Upcoming)
        );
    }

    #[actix_rt::test]
    async fn test_reject_policy_ignores_uncorrected_regressions() {
        let backend = backend_with_order("o-i", OrderStatus::Arrived, None);
        let config = TrackerConfig {
            regression_policy: RegressionPolicy::RejectUnlessCorrection,
            ..TrackerConfig::default()
        };
        let tracker = start_tracker(&backend, config);
        tracker.send(start("o-i")).await.unwrap().unwrap();

        backend.replay("o-i", OrderEventDTO::new(OrderStatus::Pending));
        sleep(Duration::from_millis(50)).await;
        let kept = tracker.send(GetProjection).await.unwrap().unwrap();
        assert_eq!(kept.current_stage(), Some(OrderStatus::Arrived));

        backend.publish(
            "o-i",
            OrderEventDTO::new(OrderStatus::OnTheWay).as_correction(),
        );
        wait_for_projection(&tracker, |p| p.current_stage() == Some(OrderStatus::OnTheWay)).await;
    }

    #[actix_rt::test]
    async fn test_disconnect_then_resubscribe_reconciles_missed_changes() {
        let backend = backend_with_order("o-j", OrderStatus::OnTheWay, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-j")).await.unwrap().unwrap();

        backend.disconnect("o-j");
        let reconnecting =
            wait_for_projection(&tracker, |p| p.connection == ConnectionState::Reconnecting).await;
        assert_eq!(reconnecting.current_stage(), Some(OrderStatus::OnTheWay));

        // Nobody is subscribed, so this change is only visible through a snapshot.
        assert_eq!(
            backend.publish("o-j", OrderEventDTO::new(OrderStatus::Arrived)),
            0
        );

        tracker.send(Resubscribe).await.unwrap().unwrap();
        let projection = tracker.send(GetProjection).await.unwrap().unwrap();
        assert_eq!(projection.connection, ConnectionState::Live);
        assert_eq!(projection.current_stage(), Some(OrderStatus::Arrived));
        assert_eq!(backend.active_subscriptions("o-j"), 1);
    }

    #[actix_rt::test]
    async fn test_notice_from_inactive_subscription_is_ignored() {
        let backend = backend_with_order("o-k", OrderStatus::Pending, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        let before = tracker.send(start("o-k")).await.unwrap().unwrap();

        tracker
            .send(OrderFeed {
                subscription: SubscriptionHandle(999),
                notice: FeedNotice::Changed(OrderEventDTO::new(OrderStatus::Completed)),
            })
            .await
            .unwrap();

        let after = tracker.send(GetProjection).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[actix_rt::test]
    async fn test_failed_partner_lookup_can_be_retried() {
        let backend = backend_with_order("o-l", OrderStatus::Arrived, Some("p1"));
        backend.fail_next_partner_lookups(1);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-l")).await.unwrap().unwrap();

        wait_until(|| backend.partner_requests("p1") == 1).await;
        sleep(Duration::from_millis(50)).await;
        let degraded = tracker.send(GetProjection).await.unwrap().unwrap();
        assert!(degraded.partner.is_none());
        assert!(!degraded.can_show_partner_contact);

        tracker.send(RetryPartner).await.unwrap().unwrap();
        let projection = wait_for_projection(&tracker, |p| p.can_show_partner_contact).await;
        assert_eq!(projection.partner, Some(partner()));
        assert_eq!(backend.partner_requests("p1"), 2);
    }

    #[actix_rt::test]
    async fn test_new_session_releases_previous_subscription() {
        let backend = backend_with_order("o-m", OrderStatus::Pending, None);
        backend.insert_order(OrderSnapshotDTO {
            order_id: "o-n".to_string(),
            status: OrderStatus::Assigned,
            partner_id: None,
            otp_verified: false,
        });
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-m")).await.unwrap().unwrap();
        tracker.send(start("o-n")).await.unwrap().unwrap();

        assert_eq!(backend.active_subscriptions("o-m"), 0);
        assert_eq!(backend.active_subscriptions("o-n"), 1);

        assert_eq!(
            backend.publish("o-m", OrderEventDTO::new(OrderStatus::Completed)),
            0
        );
        let projection = tracker.send(GetProjection).await.unwrap().unwrap();
        assert_eq!(projection.order_id, "o-n");
        assert_eq!(projection.current_stage(), Some(OrderStatus::Assigned));
    }

    #[actix_rt::test]
    async fn test_dispose_is_idempotent() {
        let backend = backend_with_order("o-o", OrderStatus::Completed, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(Dispose).await.unwrap();

        let projection = tracker.send(start("o-o")).await.unwrap().unwrap();
        assert!(projection.is_complete);

        tracker.send(Dispose).await.unwrap();
        tracker.send(Dispose).await.unwrap();
        assert_eq!(backend.active_subscriptions("o-o"), 0);
        let last = tracker.send(GetProjection).await.unwrap().unwrap();
        assert!(last.is_complete);
        assert_eq!(
            tracker.send(Resubscribe).await.unwrap(),
            Err(TrackerError::NotTracking)
        );
    }

    #[actix_rt::test]
    async fn test_dispose_during_snapshot_supersedes_start() {
        let backend = backend_with_order("o-p", OrderStatus::Pending, None);
        backend.set_snapshot_delay(Duration::from_millis(150));
        let tracker = start_tracker(&backend, TrackerConfig::default());

        let request = actix_rt::spawn(tracker.send(start("o-p")));
        wait_until(|| backend.active_subscriptions("o-p") == 1).await;
        tracker.send(Dispose).await.unwrap();

        let result = request.await.unwrap().unwrap();
        assert_eq!(
            result,
            Err(TrackerError::SessionSuperseded("o-p".to_string()))
        );
        assert!(tracker.send(GetProjection).await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn test_observers_receive_every_change() {
        let backend = backend_with_order("o-q", OrderStatus::Pending, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collector = Collector(seen.clone()).start();
        tracker
            .send(Observe {
                observer: collector.recipient(),
            })
            .await
            .unwrap();

        tracker.send(start("o-q")).await.unwrap().unwrap();
        backend.publish("o-q", OrderEventDTO::new(OrderStatus::Assigned));
        backend.publish("o-q", OrderEventDTO::new(OrderStatus::Completed));

        wait_until(|| {
            seen.lock()
                .unwrap()
                .iter()
                .any(|p| p.is_complete)
        })
        .await;
        let stages: Vec<Option<OrderStatus>> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.current_stage())
            .collect();
        assert_eq!(stages.first(), Some(&Some(OrderStatus::Pending)));
        assert!(stages.contains(&Some(OrderStatus::Assigned)));
    }

    #[actix_rt::test]
    async fn test_failed_partner_lookup_waits_for_explicit_retry() {
        let backend = backend_with_order("o-r", OrderStatus::Pending, None);
        backend.fail_next_partner_lookups(1);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        tracker.send(start("o-r")).await.unwrap().unwrap();

        backend.publish(
            "o-r",
            OrderEventDTO::new(OrderStatus::Assigned).with_partner("p1"),
        );
        wait_until(|| backend.partner_requests("p1") == 1).await;
        sleep(Duration::from_millis(50)).await;
        for status in [OrderStatus::OnTheWay, OrderStatus::Arrived] {
            backend.publish("o-r", OrderEventDTO::new(status).with_partner("p1"));
        }
        let arrived =
            wait_for_projection(&tracker, |p| p.current_stage() == Some(OrderStatus::Arrived))
                .await;
        sleep(Duration::from_millis(50)).await;
        assert!(arrived.partner.is_none());
        assert_eq!(backend.partner_requests("p1"), 1);

        tracker.send(RetryPartner).await.unwrap().unwrap();
        wait_for_projection(&tracker, |p| p.can_show_partner_contact).await;
        assert_eq!(backend.partner_requests("p1"), 2);
    }

    #[actix_rt::test]
    async fn test_dispose_pushes_closed_projection_to_observers() {
        let backend = backend_with_order("o-s", OrderStatus::OnTheWay, None);
        let tracker = start_tracker(&backend, TrackerConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collector = Collector(seen.clone()).start();
        tracker
            .send(Observe {
                observer: collector.recipient(),
            })
            .await
            .unwrap();
        tracker.send(start("o-s")).await.unwrap().unwrap();

        tracker.send(Dispose).await.unwrap();

        wait_until(|| {
            seen.lock()
                .unwrap()
                .iter()
                .any(|p| p.connection == ConnectionState::Closed)
        })
        .await;
        let last = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.connection, ConnectionState::Closed);
        assert_eq!(last.current_stage(), Some(OrderStatus::OnTheWay));
    }

    struct ShortLived;

    impl Actor for ShortLived {
        type Context = Context<Self>;

        fn started(&mut self, ctx: &mut Self::Context) {
            ctx.stop();
        }
    }

    impl Handler<ProjectionChanged> for ShortLived {
        type Result = ();

        fn handle(&mut self, _msg: ProjectionChanged, _ctx: &mut Self::Context) {}
    }

    #[actix_rt::test]
    async fn test_stopped_observers_are_dropped_on_notify() {
        let backend = backend_with_order("o-t", OrderStatus::Pending, None);
        let mut tracker = OrderTracker::with_backend(backend, TrackerConfig::default());

        let gone = ShortLived.start().recipient::<ProjectionChanged>();
        wait_until(|| !gone.connected()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let live = Collector(seen).start();
        tracker.observers.push(gone);
        tracker.observers.push(live.recipient());

        tracker.notify_observers();

        assert_eq!(tracker.observers.len(), 1);
        assert!(tracker.observers[0].connected());
    }
}

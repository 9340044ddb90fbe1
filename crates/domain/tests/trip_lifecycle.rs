use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use dropoff_domain::DomainResult;
use dropoff_domain::error::DomainError;
use dropoff_domain::memory::InMemoryTripStore;
use dropoff_domain::phase::{Phase, PhaseKind, TripCommand};
use dropoff_domain::ports::BoxFuture;
use dropoff_domain::ports::clock::Clock;
use dropoff_domain::ports::trips::TripStore;
use dropoff_domain::rows::{
    EventLocationRow, EventRouteRow, EventRow, NewEvent, NewRoute, RawTripRows,
};
use dropoff_domain::service::TripService;
use dropoff_domain::transaction::TripAggregate;

struct StepClock(AtomicI64);

impl Clock for StepClock {
    fn now_ms(&self) -> i64 {
        self.0.fetch_add(1_000, Ordering::SeqCst)
    }
}

fn service(store: Arc<dyn TripStore>) -> TripService {
    TripService::with_clock(store, Arc::new(StepClock(AtomicI64::new(1_000))))
}

async fn drive(service: &TripService, trip: &mut TripAggregate, commands: Vec<TripCommand>) {
    for command in commands {
        service.execute(trip, &command).await.unwrap();
    }
}

fn to_daycare() -> Vec<TripCommand> {
    vec![
        TripCommand::SelectOrigin("home".into()),
        TripCommand::Start,
        TripCommand::Stoplight,
        TripCommand::Go,
        TripCommand::Destination,
        TripCommand::SelectDestination("daycare".into()),
        TripCommand::SelectRoute("main street".into()),
    ]
}

#[tokio::test]
async fn persisted_trip_reconstructs_to_the_same_snapshot() {
    let store = Arc::new(InMemoryTripStore::new());
    let service = service(store.clone());

    let mut trip = service.load_active().await.unwrap();
    assert_eq!(trip.phase_kind(), PhaseKind::OriginSelection);
    drive(&service, &mut trip, to_daycare()).await;
    assert_eq!(trip.phase_kind(), PhaseKind::AtDestination);

    let reloaded = service.load_trip(trip.current().id()).await.unwrap();
    assert_eq!(reloaded.current(), trip.current());
    assert!(trip.current().events().iter().all(|event| event.id.is_some()));
    assert!(trip.current().routes().unsaved().is_empty());
}

#[tokio::test]
async fn completed_trip_rolls_over_to_a_new_one() {
    let store = Arc::new(InMemoryTripStore::new());
    let service = service(store.clone());

    let mut trip = service.load_active().await.unwrap();
    let first_id = trip.current().id();
    let mut commands = to_daycare();
    commands.push(TripCommand::Complete);
    drive(&service, &mut trip, commands).await;
    assert_eq!(trip.phase_kind(), PhaseKind::Complete);

    let next = service.load_active().await.unwrap();
    assert_ne!(next.current().id(), first_id);
    assert_eq!(next.phase_kind(), PhaseKind::OriginSelection);
    assert_eq!(next.current().locations().len(), 2);
    assert_eq!(next.current().routes().get("home", "daycare").len(), 1);

    let last = service.load_last_completed().await.unwrap().unwrap();
    assert_eq!(last.current().id(), first_id);

    let history = service.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trip_id, first_id);
    assert_eq!(history[0].summary.count.stoplight, 1);
}

#[tokio::test]
async fn reused_route_is_not_inserted_again() {
    let store = Arc::new(InMemoryTripStore::new());
    let service = service(store.clone());

    for _ in 0..2 {
        let mut trip = service.load_active().await.unwrap();
        let mut commands = to_daycare();
        commands.push(TripCommand::Complete);
        drive(&service, &mut trip, commands).await;
    }

    let rows = store.load_rows(2).await.unwrap();
    assert_eq!(rows.locations.len(), 2);
    assert_eq!(rows.routes.len(), 1);
    assert_eq!(service.history(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn stale_action_is_a_protocol_error() {
    let store = Arc::new(InMemoryTripStore::new());
    let service = service(store);

    let mut trip = service.load_active().await.unwrap();
    let Phase::OriginSelection(phase) = trip.phase() else {
        panic!("expected origin selection");
    };
    let action = phase.select_origin("home").unwrap();
    service.apply(&mut trip, &action).await.unwrap();

    let err = service.apply(&mut trip, &action).await.unwrap_err();
    assert!(matches!(err, DomainError::Protocol(_)));
}

/// Delegates to an in-memory store but can be told to fail route junction writes.
struct FlakyStore {
    inner: InMemoryTripStore,
    fail_event_routes: AtomicBool,
}

impl TripStore for FlakyStore {
    fn latest_trip_id(&self) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        self.inner.latest_trip_id()
    }

    fn latest_event(&self, trip_id: i64) -> BoxFuture<'_, DomainResult<Option<EventRow>>> {
        self.inner.latest_event(trip_id)
    }

    fn completed_trip_ids(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<i64>>> {
        self.inner.completed_trip_ids(limit)
    }

    fn create_trip(&self) -> BoxFuture<'_, DomainResult<i64>> {
        self.inner.create_trip()
    }

    fn load_rows(&self, trip_id: i64) -> BoxFuture<'_, DomainResult<RawTripRows>> {
        self.inner.load_rows(trip_id)
    }

    fn begin(&self) -> BoxFuture<'_, DomainResult<()>> {
        self.inner.begin()
    }

    fn insert_location(&self, name: &str) -> BoxFuture<'_, DomainResult<i64>> {
        self.inner.insert_location(name)
    }

    fn insert_route(&self, route: &NewRoute) -> BoxFuture<'_, DomainResult<i64>> {
        self.inner.insert_route(route)
    }

    fn insert_event(&self, event: &NewEvent) -> BoxFuture<'_, DomainResult<i64>> {
        self.inner.insert_event(event)
    }

    fn insert_event_location(&self, link: &EventLocationRow) -> BoxFuture<'_, DomainResult<()>> {
        self.inner.insert_event_location(link)
    }

    fn insert_event_route(&self, link: &EventRouteRow) -> BoxFuture<'_, DomainResult<()>> {
        if self.fail_event_routes.load(Ordering::SeqCst) {
            return Box::pin(async { Err(DomainError::Persistence("disk full".into())) });
        }
        self.inner.insert_event_route(link)
    }

    fn commit(&self) -> BoxFuture<'_, DomainResult<()>> {
        self.inner.commit()
    }

    fn rollback(&self) -> BoxFuture<'_, DomainResult<()>> {
        self.inner.rollback()
    }
}

#[tokio::test]
async fn failed_write_leaves_storage_and_trip_untouched() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryTripStore::new(),
        fail_event_routes: AtomicBool::new(true),
    });
    let service = service(store.clone());

    let mut trip = service.load_active().await.unwrap();
    let mut commands = to_daycare();
    let route = commands.pop().unwrap();
    drive(&service, &mut trip, commands).await;
    let before = trip.current().clone();

    let err = service.execute(&mut trip, &route).await.unwrap_err();
    assert_eq!(err, DomainError::Persistence("disk full".into()));
    assert_eq!(trip.current(), &before);
    assert_eq!(trip.phase_kind(), PhaseKind::RouteSelection);
    assert!(trip.open_transaction().is_none());

    let rows = store.load_rows(before.id()).await.unwrap();
    assert!(rows.routes.is_empty());
    assert_eq!(rows.events.len(), before.events().len());

    store.fail_event_routes.store(false, Ordering::SeqCst);
    let phase = service.execute(&mut trip, &route).await.unwrap();
    assert_eq!(phase, PhaseKind::AtDestination);
    let reloaded = service.load_trip(before.id()).await.unwrap();
    assert_eq!(reloaded.current(), trip.current());
}

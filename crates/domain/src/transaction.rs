use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::DomainResult;
use crate::error::DomainError;
use crate::model::{
    Event, EventState, Location, LocationKind, RouteKey, SimpleState, TripSnapshot,
};
use crate::phase::{PhaseKind, StagedAction};
use crate::ports::clock::{Clock, SystemClock};
use crate::rows::{EventLocationRow, EventRouteRow, NewEvent, NewRoute};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdAssignment {
    Location { name: String, id: i64 },
    Route { key: RouteKey, id: i64 },
    Event { order: i64, id: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsavedLocation {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsavedRoute {
    pub key: RouteKey,
    pub location_one_id: i64,
    pub location_two_id: i64,
}

impl UnsavedRoute {
    pub fn new_route(&self) -> NewRoute {
        NewRoute {
            name: self.key.name.clone(),
            location_one_id: self.location_one_id,
            location_two_id: self.location_two_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventLink {
    Location(EventLocationRow),
    Route(EventRouteRow),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnsavedEvent {
    Simple {
        order: i64,
        timestamp: i64,
        state: SimpleState,
    },
    Location {
        order: i64,
        timestamp: i64,
        name: String,
        kind: LocationKind,
    },
    Route {
        order: i64,
        timestamp: i64,
        key: RouteKey,
    },
}

impl UnsavedEvent {
    pub fn order(&self) -> i64 {
        match self {
            Self::Simple { order, .. } | Self::Location { order, .. } | Self::Route { order, .. } => {
                *order
            }
        }
    }

    pub fn new_event(&self, trip_id: i64) -> NewEvent {
        let (state, timestamp, order) = match self {
            Self::Simple {
                order,
                timestamp,
                state,
            } => (EventState::simple(*state), *timestamp, *order),
            Self::Location {
                order,
                timestamp,
                name,
                kind,
            } => (
                EventState::LocationSelection {
                    name: name.clone(),
                    kind: *kind,
                },
                *timestamp,
                *order,
            ),
            Self::Route {
                order,
                timestamp,
                key,
            } => (EventState::route(key.name.clone()), *timestamp, *order),
        };
        NewEvent {
            trip_id,
            state: state.storage_state().to_string(),
            timestamp,
            order,
        }
    }

    /// Only usable once the event and the location or route it references
    /// have ids; otherwise fails with `MissingReference`.
    pub fn link(&self, snapshot: &TripSnapshot) -> DomainResult<Option<EventLink>> {
        let event_id = || {
            snapshot
                .events
                .iter()
                .find(|event| event.order == self.order())
                .and_then(|event| event.id)
                .ok_or_else(|| {
                    DomainError::missing(format!("event {} has not been saved", self.order()))
                })
        };

        match self {
            Self::Simple { .. } => Ok(None),
            Self::Location { name, .. } => {
                let location_id = snapshot
                    .location(name)
                    .and_then(|location| location.id)
                    .ok_or_else(|| {
                        DomainError::missing(format!("location '{name}' has not been saved"))
                    })?;
                Ok(Some(EventLink::Location(EventLocationRow {
                    event_id: event_id()?,
                    location_id,
                })))
            }
            Self::Route { key, .. } => {
                let route_id = snapshot
                    .routes
                    .find(key)
                    .and_then(|route| route.id)
                    .ok_or_else(|| DomainError::missing(format!("route {key} has not been saved")))?;
                Ok(Some(EventLink::Route(EventRouteRow {
                    event_id: event_id()?,
                    route_id,
                })))
            }
        }
    }
}

/// Origin and destination for a route selected after `before_order`: the two
/// most recent distinct location names, earlier one first.
pub(crate) fn route_pair(events: &[Event], before_order: i64) -> DomainResult<(String, String)> {
    let mut names = events
        .iter()
        .filter(|event| event.order < before_order)
        .filter_map(|event| event.state.location_name());
    let destination = names.next();
    let origin = destination.and_then(|destination| names.find(|name| *name != destination));
    match (origin, destination) {
        (Some(origin), Some(destination)) => Ok((origin.to_string(), destination.to_string())),
        _ => Err(DomainError::ConstraintViolation(
            "a route selection needs two distinct prior location selections".into(),
        )),
    }
}

impl TripSnapshot {
    pub fn unsaved_locations(&self) -> Vec<UnsavedLocation> {
        self.locations
            .iter()
            .filter(|location| location.id.is_none())
            .map(|location| UnsavedLocation {
                name: location.name.clone(),
            })
            .collect()
    }

    pub fn unsaved_routes(&self) -> DomainResult<Vec<UnsavedRoute>> {
        self.routes
            .unsaved()
            .into_iter()
            .map(|key| {
                let resolve = |name: &str| {
                    self.location(name)
                        .and_then(|location| location.id)
                        .ok_or_else(|| {
                            DomainError::missing(format!(
                                "location '{name}' for route {key} has no id"
                            ))
                        })
                };
                let location_one_id = resolve(&key.origin)?;
                let location_two_id = resolve(&key.destination)?;
                Ok(UnsavedRoute {
                    key,
                    location_one_id,
                    location_two_id,
                })
            })
            .collect()
    }

    pub fn unsaved_events(&self) -> DomainResult<Vec<UnsavedEvent>> {
        let mut unsaved = self
            .events
            .iter()
            .filter(|event| event.id.is_none())
            .map(|event| {
                Ok(match &event.state {
                    EventState::Simple { state } => UnsavedEvent::Simple {
                        order: event.order,
                        timestamp: event.timestamp,
                        state: *state,
                    },
                    EventState::LocationSelection { name, kind } => UnsavedEvent::Location {
                        order: event.order,
                        timestamp: event.timestamp,
                        name: name.clone(),
                        kind: *kind,
                    },
                    EventState::RouteSelection { name } => {
                        let (origin, destination) = route_pair(&self.events, event.order)?;
                        UnsavedEvent::Route {
                            order: event.order,
                            timestamp: event.timestamp,
                            key: RouteKey::new(origin, destination, name.clone()),
                        }
                    }
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        unsaved.sort_by_key(UnsavedEvent::order);
        Ok(unsaved)
    }

    fn apply_assignment(&mut self, assignment: &IdAssignment) -> DomainResult<()> {
        match assignment {
            IdAssignment::Location { name, id } => {
                let location = self
                    .locations
                    .iter_mut()
                    .find(|location| &location.name == name)
                    .ok_or_else(|| DomainError::missing(format!("location '{name}'")))?;
                location.id = Some(*id);
            }
            IdAssignment::Route { key, id } => self.routes.assign_id(key, *id)?,
            IdAssignment::Event { order, id } => {
                let event = self
                    .events
                    .iter_mut()
                    .find(|event| event.order == *order)
                    .ok_or_else(|| DomainError::missing(format!("event with order {order}")))?;
                event.id = Some(*id);
            }
        }
        Ok(())
    }
}

struct OpenTransaction {
    id: TransactionId,
    staged: TripSnapshot,
}

pub struct TripAggregate {
    current: TripSnapshot,
    last: Option<TripSnapshot>,
    open: Option<OpenTransaction>,
    next_transaction: u64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TripAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripAggregate")
            .field("current", &self.current)
            .field("last", &self.last)
            .field("open", &self.open.as_ref().map(|open| open.id))
            .finish_non_exhaustive()
    }
}

impl TripAggregate {
    pub fn new(snapshot: TripSnapshot) -> Self {
        Self::with_clock(snapshot, Arc::new(SystemClock))
    }

    pub fn with_clock(snapshot: TripSnapshot, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: snapshot,
            last: None,
            open: None,
            next_transaction: 1,
            clock,
        }
    }

    pub fn current(&self) -> &TripSnapshot {
        &self.current
    }

    pub fn last(&self) -> Option<&TripSnapshot> {
        self.last.as_ref()
    }

    pub fn open_transaction(&self) -> Option<TransactionId> {
        self.open.as_ref().map(|open| open.id)
    }

    pub fn open(&mut self) -> DomainResult<TransactionId> {
        if let Some(open) = &self.open {
            return Err(DomainError::Protocol(format!(
                "transaction {} is already open",
                open.id
            )));
        }
        let id = TransactionId(self.next_transaction);
        self.next_transaction += 1;
        self.open = Some(OpenTransaction {
            id,
            staged: self.current.clone(),
        });
        Ok(id)
    }

    fn open_mut(&mut self, tx: TransactionId) -> DomainResult<&mut OpenTransaction> {
        match self.open.as_mut() {
            Some(open) if open.id == tx => Ok(open),
            _ => Err(DomainError::Protocol(format!("transaction {tx} is not open"))),
        }
    }

    pub fn staged(&self, tx: TransactionId) -> DomainResult<&TripSnapshot> {
        match self.open.as_ref() {
            Some(open) if open.id == tx => Ok(&open.staged),
            _ => Err(DomainError::Protocol(format!("transaction {tx} is not open"))),
        }
    }

    /// Prepends a new event to the staged snapshot, adding the location or
    /// route it introduces. The staged snapshot is left unchanged on error.
    pub fn stage(&mut self, tx: TransactionId, state: EventState) -> DomainResult<()> {
        let timestamp = self.clock.now_ms();
        let open = self.open_mut(tx)?;
        let mut next = open.staged.clone();
        let order = next.max_order() + 1;

        match &state {
            EventState::RouteSelection { name } => {
                let (origin, destination) = route_pair(&next.events, order)?;
                next.routes
                    .add_unsaved(&RouteKey::new(origin, destination, name.clone()));
            }
            EventState::LocationSelection { name, .. } => {
                if next.location(name).is_none() {
                    next.locations.push(Location {
                        id: None,
                        name: name.clone(),
                    });
                }
            }
            EventState::Simple { .. } => {}
        }

        next.events.insert(
            0,
            Event {
                id: None,
                state,
                timestamp,
                order,
            },
        );
        next.refresh_summary()?;
        open.staged = next;
        Ok(())
    }

    pub fn assign_ids(
        &mut self,
        tx: TransactionId,
        assignments: &[IdAssignment],
    ) -> DomainResult<()> {
        let open = self.open_mut(tx)?;
        for assignment in assignments {
            open.staged.apply_assignment(assignment)?;
        }
        Ok(())
    }

    pub fn commit(&mut self, tx: TransactionId) -> DomainResult<()> {
        self.open_mut(tx)?;
        if let Some(open) = self.open.take() {
            let previous = std::mem::replace(&mut self.current, open.staged);
            self.last = Some(previous);
            tracing::debug!(trip_id = self.current.id, transaction = %tx, "transaction committed");
        }
        Ok(())
    }

    pub fn rollback(&mut self, tx: TransactionId) -> DomainResult<()> {
        self.open_mut(tx)?;
        self.open = None;
        tracing::debug!(trip_id = self.current.id, transaction = %tx, "transaction rolled back");
        Ok(())
    }

    pub(crate) fn stage_action(
        &mut self,
        state: EventState,
        next: PhaseKind,
    ) -> DomainResult<StagedAction> {
        let transaction = self.open()?;
        if let Err(err) = self.stage(transaction, state) {
            self.rollback(transaction)?;
            return Err(err);
        }
        Ok(StagedAction { transaction, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct StepClock(AtomicI64);

    impl Clock for StepClock {
        fn now_ms(&self) -> i64 {
            self.0.fetch_add(10, Ordering::SeqCst)
        }
    }

    fn aggregate() -> TripAggregate {
        let locations = vec![Location {
            id: Some(1),
            name: "home".into(),
        }];
        TripAggregate::with_clock(
            TripSnapshot::empty(1, locations, Default::default()),
            Arc::new(StepClock(AtomicI64::new(0))),
        )
    }

    #[test]
    fn second_open_is_a_protocol_error() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        let err = trip.open().unwrap_err();
        assert!(matches!(err, DomainError::Protocol(msg) if msg.contains(&tx.to_string())));
    }

    #[test]
    fn staged_changes_are_invisible_until_commit() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("home")).unwrap();

        assert!(trip.current().events().is_empty());
        assert_eq!(trip.staged(tx).unwrap().events().len(), 1);

        trip.commit(tx).unwrap();
        assert_eq!(trip.current().events().len(), 1);
        assert!(trip.last().unwrap().events().is_empty());
        assert!(trip.open_transaction().is_none());
    }

    #[test]
    fn committing_twice_is_a_protocol_error() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.commit(tx).unwrap();
        assert!(matches!(trip.commit(tx), Err(DomainError::Protocol(_))));
        assert!(matches!(
            trip.stage(tx, EventState::simple(SimpleState::Moving)),
            Err(DomainError::Protocol(_))
        ));
    }

    #[test]
    fn rollback_discards_staged_snapshot() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("school")).unwrap();
        trip.rollback(tx).unwrap();

        assert!(trip.current().events().is_empty());
        assert_eq!(trip.current().locations().len(), 1);
        assert!(trip.open().is_ok());
    }

    #[test]
    fn orders_increase_and_events_are_newest_first() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("home")).unwrap();
        trip.stage(tx, EventState::simple(SimpleState::Moving))
            .unwrap();
        let staged = trip.staged(tx).unwrap();
        assert_eq!(staged.events()[0].order, 2);
        assert_eq!(staged.events()[1].order, 1);
        assert_eq!(staged.events()[0].timestamp, 10);
        assert_eq!(staged.summary().start_time.trip, Some(10));
    }

    #[test]
    fn new_location_is_added_once() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("home")).unwrap();
        trip.stage(tx, EventState::destination("daycare"))
            .unwrap();
        let staged = trip.staged(tx).unwrap();
        assert_eq!(
            staged.unsaved_locations(),
            vec![UnsavedLocation {
                name: "daycare".into()
            }]
        );
    }

    #[test]
    fn route_requires_two_location_selections() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("home")).unwrap();
        let err = trip.stage(tx, EventState::route("main street")).unwrap_err();
        assert!(matches!(err, DomainError::ConstraintViolation(_)));
        assert_eq!(trip.staged(tx).unwrap().events().len(), 1);
    }

    #[test]
    fn route_is_keyed_by_latest_two_locations() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("home")).unwrap();
        trip.stage(tx, EventState::destination("daycare"))
            .unwrap();
        trip.stage(tx, EventState::route("main street")).unwrap();

        let staged = trip.staged(tx).unwrap();
        assert_eq!(staged.routes().get("home", "daycare").len(), 1);
        assert!(staged.routes().get("daycare", "home").is_empty());
    }

    #[test]
    fn repeated_destination_keeps_the_earlier_distinct_origin() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        for state in [
            EventState::origin("home"),
            EventState::simple(SimpleState::Moving),
            EventState::simple(SimpleState::Destination),
            EventState::destination("daycare"),
            EventState::route("main street"),
            EventState::simple(SimpleState::Moving),
            EventState::simple(SimpleState::Destination),
            EventState::destination("daycare"),
            EventState::route("loop"),
        ] {
            trip.stage(tx, state).unwrap();
        }

        let staged = trip.staged(tx).unwrap();
        assert!(staged.routes().get("daycare", "daycare").is_empty());
        let names: Vec<&str> = staged
            .routes()
            .get("home", "daycare")
            .iter()
            .map(|route| route.name.as_str())
            .collect();
        assert_eq!(names, vec!["main street", "loop"]);

        let unsaved = staged.unsaved_events().unwrap();
        let Some(UnsavedEvent::Route { key, .. }) = unsaved.last() else {
            panic!("expected a route event last");
        };
        assert_eq!(key, &RouteKey::new("home", "daycare", "loop"));
    }

    #[test]
    fn same_location_twice_is_not_a_route() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("home")).unwrap();
        trip.stage(tx, EventState::destination("home")).unwrap();
        let err = trip.stage(tx, EventState::route("driveway")).unwrap_err();
        assert!(matches!(err, DomainError::ConstraintViolation(_)));
    }

    #[test]
    fn unsaved_routes_need_saved_locations() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("home")).unwrap();
        trip.stage(tx, EventState::destination("daycare"))
            .unwrap();
        trip.stage(tx, EventState::route("main street")).unwrap();

        let err = trip.staged(tx).unwrap().unsaved_routes().unwrap_err();
        assert!(matches!(err, DomainError::MissingReference(_)));

        trip.assign_ids(
            tx,
            &[IdAssignment::Location {
                name: "daycare".into(),
                id: 2,
            }],
        )
        .unwrap();
        let routes = trip.staged(tx).unwrap().unsaved_routes().unwrap();
        assert_eq!(
            routes,
            vec![UnsavedRoute {
                key: RouteKey::new("home", "daycare", "main street"),
                location_one_id: 1,
                location_two_id: 2,
            }]
        );
    }

    #[test]
    fn event_links_resolve_only_after_ids_are_assigned() {
        let mut trip = aggregate();
        let tx = trip.open().unwrap();
        trip.stage(tx, EventState::origin("home")).unwrap();

        let unsaved = trip.staged(tx).unwrap().unsaved_events().unwrap();
        assert_eq!(unsaved.len(), 1);
        let err = unsaved[0].link(trip.staged(tx).unwrap()).unwrap_err();
        assert!(matches!(err, DomainError::MissingReference(_)));

        trip.assign_ids(tx, &[IdAssignment::Event { order: 1, id: 40 }])
            .unwrap();
        let link = unsaved[0].link(trip.staged(tx).unwrap()).unwrap();
        assert_eq!(
            link,
            Some(EventLink::Location(EventLocationRow {
                event_id: 40,
                location_id: 1
            }))
        );
        assert!(trip.staged(tx).unwrap().unsaved_events().unwrap().is_empty());
    }

    #[test]
    fn new_event_uses_storage_state() {
        let unsaved = UnsavedEvent::Route {
            order: 7,
            timestamp: 99,
            key: RouteKey::new("home", "daycare", "main street"),
        };
        assert_eq!(
            unsaved.new_event(3),
            NewEvent {
                trip_id: 3,
                state: "route-selection".into(),
                timestamp: 99,
                order: 7,
            }
        );
    }

    #[test]
    fn failed_action_releases_the_transaction() {
        let mut trip = aggregate();
        let err = trip
            .stage_action(EventState::route("main street"), PhaseKind::AtDestination)
            .unwrap_err();
        assert!(matches!(err, DomainError::ConstraintViolation(_)));
        assert!(trip.open_transaction().is_none());
    }
}

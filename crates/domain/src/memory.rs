use std::sync::{Arc, Mutex, MutexGuard};

use crate::DomainResult;
use crate::error::DomainError;
use crate::model::SimpleState;
use crate::ports::BoxFuture;
use crate::ports::trips::TripStore;
use crate::rows::{
    EventLocationRow, EventRouteRow, EventRow, JoinedEventRow, LocationRow, NewEvent, NewRoute,
    RawTripRows, RouteRow,
};

#[derive(Clone, Debug, Default)]
struct Tables {
    locations: Vec<LocationRow>,
    routes: Vec<RouteRow>,
    trips: Vec<i64>,
    events: Vec<EventRow>,
    event_locations: Vec<EventLocationRow>,
    event_routes: Vec<EventRouteRow>,
}

impl Tables {
    fn insert_location(&mut self, name: String) -> DomainResult<i64> {
        if self.locations.iter().any(|location| location.name == name) {
            return Err(conflict(format!("location '{name}' already exists")));
        }
        let id = self.locations.len() as i64 + 1;
        self.locations.push(LocationRow { id, name });
        Ok(id)
    }

    fn insert_route(&mut self, route: NewRoute) -> DomainResult<i64> {
        for location_id in [route.location_one_id, route.location_two_id] {
            if !self.locations.iter().any(|location| location.id == location_id) {
                return Err(conflict(format!("location {location_id} does not exist")));
            }
        }
        if self.routes.iter().any(|existing| {
            existing.location_one_id == route.location_one_id
                && existing.location_two_id == route.location_two_id
                && existing.name == route.name
        }) {
            return Err(conflict(format!("route '{}' already exists", route.name)));
        }
        let id = self.routes.len() as i64 + 1;
        self.routes.push(RouteRow {
            id,
            name: route.name,
            location_one_id: route.location_one_id,
            location_two_id: route.location_two_id,
        });
        Ok(id)
    }

    fn insert_event(&mut self, event: NewEvent) -> DomainResult<i64> {
        if !self.trips.contains(&event.trip_id) {
            return Err(conflict(format!("trip {} does not exist", event.trip_id)));
        }
        let id = self.events.len() as i64 + 1;
        self.events.push(EventRow {
            id,
            trip_id: event.trip_id,
            state: event.state,
            timestamp: event.timestamp,
            order: event.order,
        });
        Ok(id)
    }

    fn has_event(&self, event_id: i64) -> bool {
        self.events.iter().any(|event| event.id == event_id)
    }

    fn joined_events(&self, trip_id: i64) -> Vec<JoinedEventRow> {
        self.events
            .iter()
            .filter(|event| event.trip_id == trip_id)
            .map(|event| JoinedEventRow {
                id: event.id,
                trip_id: event.trip_id,
                state: event.state.clone(),
                timestamp: event.timestamp,
                order: event.order,
                location_id: self
                    .event_locations
                    .iter()
                    .find(|link| link.event_id == event.id)
                    .map(|link| link.location_id),
                route_id: self
                    .event_routes
                    .iter()
                    .find(|link| link.event_id == event.id)
                    .map(|link| link.route_id),
            })
            .collect()
    }
}

fn conflict(message: String) -> DomainError {
    DomainError::Persistence(message)
}

#[derive(Debug, Default)]
struct State {
    committed: Tables,
    pending: Option<Tables>,
}

impl State {
    fn tables_mut(&mut self) -> &mut Tables {
        match self.pending.as_mut() {
            Some(pending) => pending,
            None => &mut self.committed,
        }
    }

    fn tables(&self) -> &Tables {
        self.pending.as_ref().unwrap_or(&self.committed)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryTripStore {
    inner: Arc<Mutex<State>>,
}

impl InMemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(inner: &Mutex<State>) -> DomainResult<MutexGuard<'_, State>> {
        inner
            .lock()
            .map_err(|_| DomainError::Persistence("memory store lock poisoned".into()))
    }

    fn write<T: Send + 'static>(
        &self,
        op: impl FnOnce(&mut Tables) -> DomainResult<T> + Send + 'static,
    ) -> BoxFuture<'_, DomainResult<T>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = Self::lock(&inner)?;
            op(state.tables_mut())
        })
    }

    fn read<T: Send + 'static>(
        &self,
        op: impl FnOnce(&Tables) -> T + Send + 'static,
    ) -> BoxFuture<'_, DomainResult<T>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = Self::lock(&inner)?;
            Ok(op(state.tables()))
        })
    }
}

impl TripStore for InMemoryTripStore {
    fn latest_trip_id(&self) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        self.read(|tables| tables.trips.iter().max().copied())
    }

    fn latest_event(&self, trip_id: i64) -> BoxFuture<'_, DomainResult<Option<EventRow>>> {
        self.read(move |tables| {
            tables
                .events
                .iter()
                .filter(|event| event.trip_id == trip_id)
                .max_by_key(|event| event.order)
                .cloned()
        })
    }

    fn completed_trip_ids(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<i64>>> {
        self.read(move |tables| {
            let mut completed: Vec<&EventRow> = tables
                .events
                .iter()
                .filter(|event| event.state == SimpleState::Complete.as_str())
                .collect();
            completed.sort_by(|left, right| {
                right
                    .timestamp
                    .cmp(&left.timestamp)
                    .then_with(|| right.id.cmp(&left.id))
            });
            completed
                .into_iter()
                .map(|event| event.trip_id)
                .take(limit)
                .collect()
        })
    }

    fn create_trip(&self) -> BoxFuture<'_, DomainResult<i64>> {
        self.write(|tables| {
            let id = tables.trips.len() as i64 + 1;
            tables.trips.push(id);
            Ok(id)
        })
    }

    fn load_rows(&self, trip_id: i64) -> BoxFuture<'_, DomainResult<RawTripRows>> {
        self.read(move |tables| RawTripRows {
            locations: tables.locations.clone(),
            routes: tables.routes.clone(),
            events: tables.joined_events(trip_id),
        })
    }

    fn begin(&self) -> BoxFuture<'_, DomainResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = Self::lock(&inner)?;
            if state.pending.is_some() {
                return Err(DomainError::Persistence(
                    "a storage transaction is already open".into(),
                ));
            }
            state.pending = Some(state.committed.clone());
            Ok(())
        })
    }

    fn insert_location(&self, name: &str) -> BoxFuture<'_, DomainResult<i64>> {
        let name = name.to_string();
        self.write(move |tables| tables.insert_location(name))
    }

    fn insert_route(&self, route: &NewRoute) -> BoxFuture<'_, DomainResult<i64>> {
        let route = route.clone();
        self.write(move |tables| tables.insert_route(route))
    }

    fn insert_event(&self, event: &NewEvent) -> BoxFuture<'_, DomainResult<i64>> {
        let event = event.clone();
        self.write(move |tables| tables.insert_event(event))
    }

    fn insert_event_location(&self, link: &EventLocationRow) -> BoxFuture<'_, DomainResult<()>> {
        let link = link.clone();
        self.write(move |tables| {
            if !tables.has_event(link.event_id) {
                return Err(conflict(format!("event {} does not exist", link.event_id)));
            }
            if !tables
                .locations
                .iter()
                .any(|location| location.id == link.location_id)
            {
                return Err(conflict(format!(
                    "location {} does not exist",
                    link.location_id
                )));
            }
            tables.event_locations.push(link);
            Ok(())
        })
    }

    fn insert_event_route(&self, link: &EventRouteRow) -> BoxFuture<'_, DomainResult<()>> {
        let link = link.clone();
        self.write(move |tables| {
            if !tables.has_event(link.event_id) {
                return Err(conflict(format!("event {} does not exist", link.event_id)));
            }
            if !tables.routes.iter().any(|route| route.id == link.route_id) {
                return Err(conflict(format!("route {} does not exist", link.route_id)));
            }
            tables.event_routes.push(link);
            Ok(())
        })
    }

    fn commit(&self) -> BoxFuture<'_, DomainResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = Self::lock(&inner)?;
            let pending = state.pending.take().ok_or_else(|| {
                DomainError::Persistence("no storage transaction is open".into())
            })?;
            state.committed = pending;
            Ok(())
        })
    }

    fn rollback(&self) -> BoxFuture<'_, DomainResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::lock(&inner)?.pending = None;
            Ok(())
        })
    }
}

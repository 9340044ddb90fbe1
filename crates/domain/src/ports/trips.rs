use crate::DomainResult;
use crate::ports::BoxFuture;
use crate::rows::{EventLocationRow, EventRouteRow, EventRow, NewEvent, NewRoute, RawTripRows};

/// Trip storage. Write calls between `begin` and `commit` form one storage
/// transaction; `rollback` undoes all of them.
pub trait TripStore: Send + Sync {
    fn latest_trip_id(&self) -> BoxFuture<'_, DomainResult<Option<i64>>>;

    fn latest_event(&self, trip_id: i64) -> BoxFuture<'_, DomainResult<Option<EventRow>>>;

    fn completed_trip_ids(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<i64>>>;

    fn create_trip(&self) -> BoxFuture<'_, DomainResult<i64>>;

    fn load_rows(&self, trip_id: i64) -> BoxFuture<'_, DomainResult<RawTripRows>>;

    fn begin(&self) -> BoxFuture<'_, DomainResult<()>>;

    fn insert_location(&self, name: &str) -> BoxFuture<'_, DomainResult<i64>>;

    fn insert_route(&self, route: &NewRoute) -> BoxFuture<'_, DomainResult<i64>>;

    fn insert_event(&self, event: &NewEvent) -> BoxFuture<'_, DomainResult<i64>>;

    fn insert_event_location(&self, link: &EventLocationRow) -> BoxFuture<'_, DomainResult<()>>;

    fn insert_event_route(&self, link: &EventRouteRow) -> BoxFuture<'_, DomainResult<()>>;

    fn commit(&self) -> BoxFuture<'_, DomainResult<()>>;

    fn rollback(&self) -> BoxFuture<'_, DomainResult<()>>;
}

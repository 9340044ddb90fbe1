use crate::DomainResult;
use crate::builders::{build_events, build_locations, build_routes};
use crate::model::{RouteMap, TripSnapshot};
use crate::normalize::normalize;
use crate::rows::{LocationRow, RawTripRows, RouteRow};

pub fn reconstruct(trip_id: i64, rows: RawTripRows) -> DomainResult<TripSnapshot> {
    let rows = normalize(rows)?;
    let locations = build_locations(&rows.locations);
    let routes = build_routes(&rows.routes, &locations)?;
    let events = build_events(&rows, &locations)?;

    let mut snapshot = TripSnapshot::empty(trip_id, locations, routes);
    snapshot.events = events;
    snapshot.refresh_summary()?;
    Ok(snapshot)
}

pub fn empty_trip(
    trip_id: i64,
    locations: &[LocationRow],
    routes: &[RouteRow],
) -> DomainResult<TripSnapshot> {
    let locations = build_locations(locations);
    let routes: RouteMap = build_routes(routes, &locations)?;
    Ok(TripSnapshot::empty(trip_id, locations, routes))
}

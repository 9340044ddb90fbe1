use crate::DomainResult;
use crate::error::DomainError;
use crate::model::{
    DESTINATION_SELECTION, Event, EventState, LocationKind, Location, ORIGIN_SELECTION,
    ROUTE_SELECTION, Route, RouteMap, SimpleState,
};
use crate::rows::{EventRow, LocationRow, NormalizedRows, RouteRow};

pub fn build_locations(rows: &[LocationRow]) -> Vec<Location> {
    rows.iter()
        .map(|row| Location {
            id: Some(row.id),
            name: row.name.clone(),
        })
        .collect()
}

fn location_name(locations: &[Location], id: i64) -> DomainResult<&str> {
    locations
        .iter()
        .find(|location| location.id == Some(id))
        .map(|location| location.name.as_str())
        .ok_or_else(|| DomainError::missing(format!("location {id}")))
}

pub fn build_routes(rows: &[RouteRow], locations: &[Location]) -> DomainResult<RouteMap> {
    let mut routes = RouteMap::new();
    for row in rows {
        let origin = location_name(locations, row.location_one_id)?;
        let destination = location_name(locations, row.location_two_id)?;
        routes.insert(
            origin,
            destination,
            Route {
                id: Some(row.id),
                name: row.name.clone(),
            },
        );
    }
    Ok(routes)
}

fn build_event_state(
    row: &EventRow,
    rows: &NormalizedRows,
    locations: &[Location],
) -> DomainResult<EventState> {
    if let Some(state) = SimpleState::parse(&row.state) {
        return Ok(EventState::simple(state));
    }

    match row.state.as_str() {
        ORIGIN_SELECTION | DESTINATION_SELECTION => {
            let link = rows
                .event_locations
                .iter()
                .find(|link| link.event_id == row.id)
                .ok_or_else(|| {
                    DomainError::missing(format!("location selection for event {}", row.id))
                })?;
            let name = location_name(locations, link.location_id)?.to_string();
            let kind = if row.state == ORIGIN_SELECTION {
                LocationKind::Origin
            } else {
                LocationKind::Destination
            };
            Ok(EventState::LocationSelection { name, kind })
        }
        ROUTE_SELECTION => {
            let link = rows
                .event_routes
                .iter()
                .find(|link| link.event_id == row.id)
                .ok_or_else(|| {
                    DomainError::missing(format!("route selection for event {}", row.id))
                })?;
            let route = rows
                .routes
                .iter()
                .find(|route| route.id == link.route_id)
                .ok_or_else(|| DomainError::missing(format!("route {}", link.route_id)))?;
            Ok(EventState::route(route.name.clone()))
        }
        other => Err(DomainError::UnknownState(other.to_string())),
    }
}

pub fn build_events(rows: &NormalizedRows, locations: &[Location]) -> DomainResult<Vec<Event>> {
    let mut events = rows
        .events
        .iter()
        .map(|row| {
            Ok(Event {
                id: Some(row.id),
                state: build_event_state(row, rows, locations)?,
                timestamp: row.timestamp,
                order: row.order,
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;
    events.sort_by(|left, right| right.order.cmp(&left.order));
    Ok(events)
}

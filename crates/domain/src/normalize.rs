use crate::DomainResult;
use crate::error::DomainError;
use crate::rows::{
    EventLocationRow, EventRouteRow, EventRow, JoinedEventRow, NormalizedRows, RawTripRows,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NormalizedRecord {
    Event(EventRow),
    EventLocation(EventLocationRow),
    EventRoute(EventRouteRow),
}

pub fn normalize_event(row: JoinedEventRow) -> DomainResult<Vec<NormalizedRecord>> {
    let event = EventRow {
        id: row.id,
        trip_id: row.trip_id,
        state: row.state,
        timestamp: row.timestamp,
        order: row.order,
    };
    let event_id = event.id;

    match (row.location_id, row.route_id) {
        (None, None) => Ok(vec![NormalizedRecord::Event(event)]),
        (Some(location_id), None) => Ok(vec![
            NormalizedRecord::Event(event),
            NormalizedRecord::EventLocation(EventLocationRow {
                event_id,
                location_id,
            }),
        ]),
        (None, Some(route_id)) => Ok(vec![
            NormalizedRecord::Event(event),
            NormalizedRecord::EventRoute(EventRouteRow { event_id, route_id }),
        ]),
        (Some(_), Some(_)) => Err(DomainError::InvalidData(
            "an event cannot be both a location and a route selection".into(),
        )),
    }
}

pub fn normalize(rows: RawTripRows) -> DomainResult<NormalizedRows> {
    let mut normalized = NormalizedRows {
        locations: rows.locations,
        routes: rows.routes,
        ..NormalizedRows::default()
    };

    for row in rows.events {
        for record in normalize_event(row)? {
            match record {
                NormalizedRecord::Event(event) => normalized.events.push(event),
                NormalizedRecord::EventLocation(link) => normalized.event_locations.push(link),
                NormalizedRecord::EventRoute(link) => normalized.event_routes.push(link),
            }
        }
    }

    Ok(normalized)
}

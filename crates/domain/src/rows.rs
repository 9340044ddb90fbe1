use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationRow {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteRow {
    pub id: i64,
    pub name: String,
    pub location_one_id: i64,
    pub location_two_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinedEventRow {
    pub id: i64,
    pub trip_id: i64,
    pub state: String,
    pub timestamp: i64,
    pub order: i64,
    pub location_id: Option<i64>,
    pub route_id: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRow {
    pub id: i64,
    pub trip_id: i64,
    pub state: String,
    pub timestamp: i64,
    pub order: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventLocationRow {
    pub event_id: i64,
    pub location_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRouteRow {
    pub event_id: i64,
    pub route_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawTripRows {
    pub locations: Vec<LocationRow>,
    pub routes: Vec<RouteRow>,
    pub events: Vec<JoinedEventRow>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedRows {
    pub locations: Vec<LocationRow>,
    pub routes: Vec<RouteRow>,
    pub events: Vec<EventRow>,
    pub event_locations: Vec<EventLocationRow>,
    pub event_routes: Vec<EventRouteRow>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRoute {
    pub name: String,
    pub location_one_id: i64,
    pub location_two_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    pub trip_id: i64,
    pub state: String,
    pub timestamp: i64,
    pub order: i64,
}

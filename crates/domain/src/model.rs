use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::summary::{TripSummary, summarize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteKey {
    pub origin: String,
    pub destination: String,
    pub name: String,
}

impl RouteKey {
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -> {})", self.name, self.origin, self.destination)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RouteEntry {
    pub origin: String,
    pub destination: String,
    pub route: Route,
}

/// origin name -> destination name -> routes, in insertion order per pair.
///
/// `Clone` is a deep copy; a cloned map shares nothing with the source.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct RouteMap(BTreeMap<String, BTreeMap<String, Vec<Route>>>);

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, origin: &str, destination: &str) -> &[Route] {
        self.0
            .get(origin)
            .and_then(|destinations| destinations.get(destination))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find(&self, key: &RouteKey) -> Option<&Route> {
        self.get(&key.origin, &key.destination)
            .iter()
            .find(|route| route.name == key.name)
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.find(key).is_some()
    }

    pub fn insert(&mut self, origin: &str, destination: &str, route: Route) {
        self.0
            .entry(origin.to_string())
            .or_default()
            .entry(destination.to_string())
            .or_default()
            .push(route);
    }

    pub fn add_unsaved(&mut self, key: &RouteKey) -> bool {
        if self.contains(key) {
            return false;
        }
        self.insert(
            &key.origin,
            &key.destination,
            Route {
                id: None,
                name: key.name.clone(),
            },
        );
        true
    }

    pub fn assign_id(&mut self, key: &RouteKey, id: i64) -> DomainResult<()> {
        let route = self
            .0
            .get_mut(&key.origin)
            .and_then(|destinations| destinations.get_mut(&key.destination))
            .and_then(|routes| routes.iter_mut().find(|route| route.name == key.name))
            .ok_or_else(|| DomainError::missing(format!("route {key}")))?;
        route.id = Some(id);
        Ok(())
    }

    pub fn unsaved(&self) -> Vec<RouteKey> {
        self.entries()
            .filter(|entry| entry.route.id.is_none())
            .map(|entry| RouteKey::new(entry.origin, entry.destination, entry.route.name))
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = RouteEntry> + '_ {
        self.0.iter().flat_map(|(origin, destinations)| {
            destinations.iter().flat_map(move |(destination, routes)| {
                routes.iter().map(move |route| RouteEntry {
                    origin: origin.clone(),
                    destination: destination.clone(),
                    route: route.clone(),
                })
            })
        })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = RouteEntry>) -> Self {
        let mut map = Self::new();
        for entry in entries {
            map.insert(&entry.origin, &entry.destination, entry.route);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.0
            .values()
            .flat_map(|destinations| destinations.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SimpleState {
    Moving,
    Stoplight,
    Train,
    Destination,
    Complete,
}

impl SimpleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moving => "moving",
            Self::Stoplight => "stoplight",
            Self::Train => "train",
            Self::Destination => "destination",
            Self::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "moving" => Some(Self::Moving),
            "stoplight" => Some(Self::Stoplight),
            "train" => Some(Self::Train),
            "destination" => Some(Self::Destination),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Origin,
    Destination,
}

pub const ORIGIN_SELECTION: &str = "origin-selection";
pub const DESTINATION_SELECTION: &str = "destination-selection";
pub const ROUTE_SELECTION: &str = "route-selection";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EventState {
    Simple { state: SimpleState },
    LocationSelection { name: String, kind: LocationKind },
    RouteSelection { name: String },
}

impl EventState {
    pub fn simple(state: SimpleState) -> Self {
        Self::Simple { state }
    }

    pub fn origin(name: impl Into<String>) -> Self {
        Self::LocationSelection {
            name: name.into(),
            kind: LocationKind::Origin,
        }
    }

    pub fn destination(name: impl Into<String>) -> Self {
        Self::LocationSelection {
            name: name.into(),
            kind: LocationKind::Destination,
        }
    }

    pub fn route(name: impl Into<String>) -> Self {
        Self::RouteSelection { name: name.into() }
    }

    pub fn storage_state(&self) -> &'static str {
        match self {
            Self::Simple { state } => state.as_str(),
            Self::LocationSelection {
                kind: LocationKind::Origin,
                ..
            } => ORIGIN_SELECTION,
            Self::LocationSelection {
                kind: LocationKind::Destination,
                ..
            } => DESTINATION_SELECTION,
            Self::RouteSelection { .. } => ROUTE_SELECTION,
        }
    }

    pub fn location_name(&self) -> Option<&str> {
        match self {
            Self::LocationSelection { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: Option<i64>,
    pub state: EventState,
    pub timestamp: i64,
    pub order: i64,
}

/// Immutable view of one trip. Events are kept newest first.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TripSnapshot {
    pub(crate) id: i64,
    pub(crate) locations: Vec<Location>,
    pub(crate) routes: RouteMap,
    pub(crate) events: Vec<Event>,
    pub(crate) summary: TripSummary,
}

impl TripSnapshot {
    pub fn empty(id: i64, locations: Vec<Location>, routes: RouteMap) -> Self {
        Self {
            id,
            locations,
            routes,
            events: Vec::new(),
            summary: TripSummary::default(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn routes(&self) -> &RouteMap {
        &self.routes
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn summary(&self) -> &TripSummary {
        &self.summary
    }

    pub fn latest_event(&self) -> Option<&Event> {
        self.events.first()
    }

    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.iter().find(|location| location.name == name)
    }

    pub fn max_order(&self) -> i64 {
        self.events.iter().map(|event| event.order).max().unwrap_or(0)
    }

    pub fn events_ascending(&self) -> Vec<Event> {
        let mut events = self.events.clone();
        events.sort_by_key(|event| event.order);
        events
    }

    pub(crate) fn refresh_summary(&mut self) -> DomainResult<()> {
        self.summary = summarize(&self.events_ascending())?;
        Ok(())
    }
}

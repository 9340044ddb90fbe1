use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::model::{EventState, Location, LocationKind, Route, SimpleState, TripSnapshot};
use crate::summary::TripSummary;
use crate::transaction::{TransactionId, TripAggregate, route_pair};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    OriginSelection,
    Pending,
    Moving,
    Stoplight,
    Stopped,
    DestinationSelection,
    RouteSelection,
    AtDestination,
    Complete,
}

impl PhaseKind {
    pub fn of(snapshot: &TripSnapshot) -> Self {
        let Some(latest) = snapshot.latest_event() else {
            return Self::OriginSelection;
        };
        match &latest.state {
            EventState::LocationSelection {
                kind: LocationKind::Origin,
                ..
            } => Self::Pending,
            EventState::LocationSelection {
                kind: LocationKind::Destination,
                ..
            } => Self::RouteSelection,
            EventState::RouteSelection { .. } => Self::AtDestination,
            EventState::Simple { state } => match state {
                SimpleState::Moving => Self::Moving,
                SimpleState::Stoplight => Self::Stoplight,
                SimpleState::Train => Self::Stopped,
                SimpleState::Destination => Self::DestinationSelection,
                SimpleState::Complete => Self::Complete,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OriginSelection => "origin_selection",
            Self::Pending => "pending",
            Self::Moving => "moving",
            Self::Stoplight => "stoplight",
            Self::Stopped => "stopped",
            Self::DestinationSelection => "destination_selection",
            Self::RouteSelection => "route_selection",
            Self::AtDestination => "at_destination",
            Self::Complete => "complete",
        }
    }

    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Self::OriginSelection => &["select_origin"],
            Self::Pending => &["start"],
            Self::Moving => &["stoplight", "train", "destination"],
            Self::Stoplight => &["go", "train"],
            Self::Stopped => &["go"],
            Self::DestinationSelection => &["select_destination"],
            Self::RouteSelection => &["select_route"],
            Self::AtDestination => &["go", "complete"],
            Self::Complete => &[],
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staged but not yet persisted action. `next` becomes the trip's phase
/// only once `transaction` is committed.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct StagedAction {
    pub transaction: TransactionId,
    pub next: PhaseKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TripCommand {
    SelectOrigin(String),
    Start,
    Stoplight,
    Train,
    Go,
    Destination,
    SelectDestination(String),
    SelectRoute(String),
    Complete,
}

impl TripCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectOrigin(_) => "select_origin",
            Self::Start => "start",
            Self::Stoplight => "stoplight",
            Self::Train => "train",
            Self::Go => "go",
            Self::Destination => "destination",
            Self::SelectDestination(_) => "select_destination",
            Self::SelectRoute(_) => "select_route",
            Self::Complete => "complete",
        }
    }
}

fn clean_name(name: &str, what: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation(format!("{what} name is required")));
    }
    Ok(name.to_string())
}

macro_rules! phase_handle {
    ($name:ident) => {
        pub struct $name<'a> {
            trip: &'a mut TripAggregate,
        }

        impl $name<'_> {
            pub fn snapshot(&self) -> &TripSnapshot {
                self.trip.current()
            }

            pub fn summary(&self) -> &TripSummary {
                self.trip.current().summary()
            }
        }
    };
}

phase_handle!(OriginSelection);
phase_handle!(Pending);
phase_handle!(Moving);
phase_handle!(Stoplight);
phase_handle!(Stopped);
phase_handle!(DestinationSelection);
phase_handle!(RouteSelection);
phase_handle!(AtDestination);
phase_handle!(Complete);

impl OriginSelection<'_> {
    pub fn known_locations(&self) -> &[Location] {
        self.trip.current().locations()
    }

    pub fn select_origin(self, name: &str) -> DomainResult<StagedAction> {
        let name = clean_name(name, "origin")?;
        self.trip
            .stage_action(EventState::origin(name), PhaseKind::Pending)
    }
}

impl Pending<'_> {
    pub fn start(self) -> DomainResult<StagedAction> {
        self.trip
            .stage_action(EventState::simple(SimpleState::Moving), PhaseKind::Moving)
    }
}

impl Moving<'_> {
    pub fn stoplight(self) -> DomainResult<StagedAction> {
        self.trip.stage_action(
            EventState::simple(SimpleState::Stoplight),
            PhaseKind::Stoplight,
        )
    }

    pub fn train(self) -> DomainResult<StagedAction> {
        self.trip
            .stage_action(EventState::simple(SimpleState::Train), PhaseKind::Stopped)
    }

    pub fn destination(self) -> DomainResult<StagedAction> {
        self.trip.stage_action(
            EventState::simple(SimpleState::Destination),
            PhaseKind::DestinationSelection,
        )
    }
}

impl Stoplight<'_> {
    pub fn go(self) -> DomainResult<StagedAction> {
        self.trip
            .stage_action(EventState::simple(SimpleState::Moving), PhaseKind::Moving)
    }

    pub fn train(self) -> DomainResult<StagedAction> {
        self.trip
            .stage_action(EventState::simple(SimpleState::Train), PhaseKind::Stopped)
    }
}

impl Stopped<'_> {
    pub fn go(self) -> DomainResult<StagedAction> {
        self.trip
            .stage_action(EventState::simple(SimpleState::Moving), PhaseKind::Moving)
    }
}

impl DestinationSelection<'_> {
    pub fn known_locations(&self) -> &[Location] {
        self.trip.current().locations()
    }

    pub fn select_destination(self, name: &str) -> DomainResult<StagedAction> {
        let name = clean_name(name, "destination")?;
        self.trip
            .stage_action(EventState::destination(name), PhaseKind::RouteSelection)
    }
}

impl RouteSelection<'_> {
    pub fn known_routes(&self) -> DomainResult<&[Route]> {
        let snapshot = self.trip.current();
        let (origin, destination) = route_pair(snapshot.events(), snapshot.max_order() + 1)?;
        Ok(snapshot.routes().get(&origin, &destination))
    }

    pub fn select_route(self, name: &str) -> DomainResult<StagedAction> {
        let name = clean_name(name, "route")?;
        self.trip
            .stage_action(EventState::route(name), PhaseKind::AtDestination)
    }
}

impl AtDestination<'_> {
    pub fn go(self) -> DomainResult<StagedAction> {
        self.trip
            .stage_action(EventState::simple(SimpleState::Moving), PhaseKind::Moving)
    }

    pub fn complete(self) -> DomainResult<StagedAction> {
        self.trip.stage_action(
            EventState::simple(SimpleState::Complete),
            PhaseKind::Complete,
        )
    }
}

pub enum Phase<'a> {
    OriginSelection(OriginSelection<'a>),
    Pending(Pending<'a>),
    Moving(Moving<'a>),
    Stoplight(Stoplight<'a>),
    Stopped(Stopped<'a>),
    DestinationSelection(DestinationSelection<'a>),
    RouteSelection(RouteSelection<'a>),
    AtDestination(AtDestination<'a>),
    Complete(Complete<'a>),
}

impl Phase<'_> {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Self::OriginSelection(_) => PhaseKind::OriginSelection,
            Self::Pending(_) => PhaseKind::Pending,
            Self::Moving(_) => PhaseKind::Moving,
            Self::Stoplight(_) => PhaseKind::Stoplight,
            Self::Stopped(_) => PhaseKind::Stopped,
            Self::DestinationSelection(_) => PhaseKind::DestinationSelection,
            Self::RouteSelection(_) => PhaseKind::RouteSelection,
            Self::AtDestination(_) => PhaseKind::AtDestination,
            Self::Complete(_) => PhaseKind::Complete,
        }
    }

    pub fn dispatch(self, command: &TripCommand) -> DomainResult<StagedAction> {
        match (self, command) {
            (Self::OriginSelection(phase), TripCommand::SelectOrigin(name)) => {
                phase.select_origin(name)
            }
            (Self::Pending(phase), TripCommand::Start) => phase.start(),
            (Self::Moving(phase), TripCommand::Stoplight) => phase.stoplight(),
            (Self::Moving(phase), TripCommand::Train) => phase.train(),
            (Self::Moving(phase), TripCommand::Destination) => phase.destination(),
            (Self::Stoplight(phase), TripCommand::Go) => phase.go(),
            (Self::Stoplight(phase), TripCommand::Train) => phase.train(),
            (Self::Stopped(phase), TripCommand::Go) => phase.go(),
            (Self::DestinationSelection(phase), TripCommand::SelectDestination(name)) => {
                phase.select_destination(name)
            }
            (Self::RouteSelection(phase), TripCommand::SelectRoute(name)) => {
                phase.select_route(name)
            }
            (Self::AtDestination(phase), TripCommand::Go) => phase.go(),
            (Self::AtDestination(phase), TripCommand::Complete) => phase.complete(),
            (phase, command) => Err(DomainError::IllegalAction {
                phase: phase.kind().to_string(),
                action: command.as_str().to_string(),
            }),
        }
    }
}

impl TripAggregate {
    pub fn phase_kind(&self) -> PhaseKind {
        PhaseKind::of(self.current())
    }

    pub fn phase(&mut self) -> Phase<'_> {
        let trip = self;
        match PhaseKind::of(trip.current()) {
            PhaseKind::OriginSelection => Phase::OriginSelection(OriginSelection { trip }),
            PhaseKind::Pending => Phase::Pending(Pending { trip }),
            PhaseKind::Moving => Phase::Moving(Moving { trip }),
            PhaseKind::Stoplight => Phase::Stoplight(Stoplight { trip }),
            PhaseKind::Stopped => Phase::Stopped(Stopped { trip }),
            PhaseKind::DestinationSelection => {
                Phase::DestinationSelection(DestinationSelection { trip })
            }
            PhaseKind::RouteSelection => Phase::RouteSelection(RouteSelection { trip }),
            PhaseKind::AtDestination => Phase::AtDestination(AtDestination { trip }),
            PhaseKind::Complete => Phase::Complete(Complete { trip }),
        }
    }
}

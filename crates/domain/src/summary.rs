use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::model::{Event, EventState, LocationKind, SimpleState};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartTimes {
    pub trip: Option<i64>,
    pub last_leg: Option<i64>,
    pub last_event: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Durations {
    pub stoplight: i64,
    pub train: i64,
    pub origin: i64,
    pub destination: i64,
    pub moving: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counts {
    pub stoplight: u32,
    pub train: u32,
    pub destination: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripSummary {
    pub start_time: StartTimes,
    pub duration: Durations,
    pub count: Counts,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Origin,
    Moving,
    Stoplight,
    Train,
    Destination,
    Complete,
}

impl Milestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Moving => "moving",
            Self::Stoplight => "stoplight",
            Self::Train => "train",
            Self::Destination => "destination",
            Self::Complete => "complete",
        }
    }

    fn of(event: &Event) -> Option<Self> {
        match &event.state {
            EventState::Simple { state } => Some(match state {
                SimpleState::Moving => Self::Moving,
                SimpleState::Stoplight => Self::Stoplight,
                SimpleState::Train => Self::Train,
                SimpleState::Destination => Self::Destination,
                SimpleState::Complete => Self::Complete,
            }),
            EventState::LocationSelection {
                kind: LocationKind::Origin,
                ..
            } => Some(Self::Origin),
            EventState::LocationSelection { .. } | EventState::RouteSelection { .. } => None,
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TRANSITIONS: [(Milestone, Milestone); 9] = [
    (Milestone::Origin, Milestone::Moving),
    (Milestone::Moving, Milestone::Stoplight),
    (Milestone::Moving, Milestone::Train),
    (Milestone::Moving, Milestone::Destination),
    (Milestone::Stoplight, Milestone::Moving),
    (Milestone::Stoplight, Milestone::Train),
    (Milestone::Train, Milestone::Moving),
    (Milestone::Destination, Milestone::Moving),
    (Milestone::Destination, Milestone::Complete),
];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    pub from: Milestone,
    pub to: Milestone,
    pub duration: i64,
    pub timestamp: i64,
}

/// `events` must be sorted oldest first.
pub fn transitions(events: &[Event]) -> DomainResult<Vec<Transition>> {
    let milestones: Vec<(Milestone, i64)> = events
        .iter()
        .filter_map(|event| Milestone::of(event).map(|milestone| (milestone, event.timestamp)))
        .collect();

    milestones
        .windows(2)
        .map(|pair| {
            let (from, from_ts) = pair[0];
            let (to, to_ts) = pair[1];
            let matches = TRANSITIONS
                .iter()
                .filter(|(rule_from, rule_to)| *rule_from == from && *rule_to == to)
                .count();
            if matches != 1 {
                return Err(DomainError::InvalidTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            Ok(Transition {
                from,
                to,
                duration: to_ts - from_ts,
                timestamp: to_ts,
            })
        })
        .collect()
}

/// `events` must be sorted oldest first.
pub fn summarize(events: &[Event]) -> DomainResult<TripSummary> {
    let mut summary = TripSummary::default();

    for transition in transitions(events)? {
        if transition.from == Milestone::Origin && transition.to == Milestone::Moving {
            summary.start_time.trip = Some(transition.timestamp);
        }
        if matches!(transition.from, Milestone::Origin | Milestone::Destination) {
            summary.start_time.last_leg = Some(transition.timestamp);
        }
        summary.start_time.last_event = Some(transition.timestamp);

        match transition.from {
            Milestone::Stoplight => summary.duration.stoplight += transition.duration,
            Milestone::Train => summary.duration.train += transition.duration,
            Milestone::Origin => summary.duration.origin += transition.duration,
            Milestone::Destination => summary.duration.destination += transition.duration,
            Milestone::Moving => summary.duration.moving += transition.duration,
            Milestone::Complete => {}
        }

        match transition.to {
            Milestone::Stoplight => summary.count.stoplight += 1,
            Milestone::Train => summary.count.train += 1,
            Milestone::Destination => summary.count.destination += 1,
            Milestone::Origin | Milestone::Moving | Milestone::Complete => {}
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(order: i64, timestamp: i64, state: EventState) -> Event {
        Event {
            id: Some(order),
            state,
            timestamp,
            order,
        }
    }

    fn simple(order: i64, timestamp: i64, state: SimpleState) -> Event {
        event(order, timestamp, EventState::simple(state))
    }

    #[test]
    fn departure_sets_trip_start_and_origin_dwell() {
        let events = vec![
            event(1, 0, EventState::origin("home")),
            simple(2, 10, SimpleState::Moving),
        ];
        let summary = summarize(&events).unwrap();
        assert_eq!(summary.start_time.trip, Some(10));
        assert_eq!(summary.duration.origin, 10);
        assert_eq!(summary.start_time.last_leg, Some(10));
    }

    #[test]
    fn stoplight_time_and_count_accumulate() {
        let events = vec![
            event(1, 0, EventState::origin("home")),
            simple(2, 10, SimpleState::Moving),
            simple(3, 20, SimpleState::Stoplight),
            simple(4, 30, SimpleState::Moving),
        ];
        let summary = summarize(&events).unwrap();
        assert_eq!(summary.duration.moving, 10);
        assert_eq!(summary.duration.stoplight, 10);
        assert_eq!(summary.count.stoplight, 1);
        assert_eq!(summary.start_time.last_event, Some(30));
    }

    #[test]
    fn selections_between_milestones_are_skipped() {
        let events = vec![
            event(1, 0, EventState::origin("home")),
            simple(2, 5, SimpleState::Moving),
            simple(3, 25, SimpleState::Train),
            simple(4, 85, SimpleState::Moving),
            simple(5, 100, SimpleState::Destination),
            event(6, 101, EventState::destination("daycare")),
            event(7, 102, EventState::route("main street")),
            simple(8, 160, SimpleState::Complete),
        ];
        let summary = summarize(&events).unwrap();
        assert_eq!(summary.duration.origin, 5);
        assert_eq!(summary.duration.moving, 20 + 15);
        assert_eq!(summary.duration.train, 60);
        assert_eq!(summary.duration.destination, 60);
        assert_eq!(summary.count.train, 1);
        assert_eq!(summary.count.destination, 1);
        assert_eq!(summary.start_time.trip, Some(5));
        assert_eq!(summary.start_time.last_leg, Some(160));
        assert_eq!(summary.start_time.last_event, Some(160));
    }

    #[test]
    fn second_leg_moves_last_leg_start() {
        let events = vec![
            event(1, 0, EventState::origin("home")),
            simple(2, 10, SimpleState::Moving),
            simple(3, 50, SimpleState::Destination),
            event(4, 51, EventState::destination("daycare")),
            event(5, 52, EventState::route("main street")),
            simple(6, 70, SimpleState::Moving),
        ];
        let summary = summarize(&events).unwrap();
        assert_eq!(summary.start_time.trip, Some(10));
        assert_eq!(summary.start_time.last_leg, Some(70));
        assert_eq!(summary.duration.destination, 20);
    }

    #[test]
    fn unknown_pair_is_rejected() {
        let events = vec![
            event(1, 0, EventState::origin("home")),
            simple(2, 10, SimpleState::Stoplight),
        ];
        let err = summarize(&events).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "origin".into(),
                to: "stoplight".into()
            }
        );
    }

    #[test]
    fn empty_history_has_empty_summary() {
        assert_eq!(summarize(&[]).unwrap(), TripSummary::default());
    }

    #[test]
    fn transitions_report_each_leg() {
        let events = vec![
            event(1, 0, EventState::origin("home")),
            simple(2, 10, SimpleState::Moving),
            simple(3, 40, SimpleState::Destination),
        ];
        let legs = transitions(&events).unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[1].from, Milestone::Moving);
        assert_eq!(legs[1].duration, 30);
    }
}

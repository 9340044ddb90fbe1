use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dropoff_domain::model::EventState;
use dropoff_domain::phase::{PhaseKind, TripCommand};
use dropoff_domain::service::TripService;
use dropoff_domain::summary::{Transition, TripSummary, transitions};
use dropoff_domain::transaction::TripAggregate;
use dropoff_infra::config::AppConfig;
use dropoff_infra::db::{DbConfig, SqliteAdapter};
use dropoff_infra::logging::init_tracing;
use dropoff_infra::repositories::SqlTripStore;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track daycare drop-off trips", long_about = None)]
struct Args {
    /// SQLite file to use instead of the configured one
    #[arg(long, global = true)]
    database: Option<String>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the trip in progress
    Status,
    /// Pick where the trip starts
    Origin { name: String },
    /// Leave the origin
    Start,
    Stoplight,
    Train,
    /// Start moving again
    Go,
    /// Arrive somewhere
    Destination,
    /// Name the place just reached
    Arrive { name: String },
    /// Name the route just taken
    Route { name: String },
    Complete,
    /// Show the most recently completed trip
    Last,
    /// Summaries of recently completed trips
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl Command {
    fn trip_command(&self) -> Option<TripCommand> {
        Some(match self {
            Self::Origin { name } => TripCommand::SelectOrigin(name.clone()),
            Self::Start => TripCommand::Start,
            Self::Stoplight => TripCommand::Stoplight,
            Self::Train => TripCommand::Train,
            Self::Go => TripCommand::Go,
            Self::Destination => TripCommand::Destination,
            Self::Arrive { name } => TripCommand::SelectDestination(name.clone()),
            Self::Route { name } => TripCommand::SelectRoute(name.clone()),
            Self::Complete => TripCommand::Complete,
            Self::Status | Self::Last | Self::History { .. } => return None,
        })
    }
}

#[derive(Serialize)]
struct EventView {
    order: i64,
    state: &'static str,
    name: Option<String>,
    at: String,
}

#[derive(Serialize)]
struct TripView<'a> {
    trip_id: i64,
    phase: PhaseKind,
    actions: &'static [&'static str],
    known_locations: Vec<&'a str>,
    events: Vec<EventView>,
    legs: Vec<Transition>,
    summary: &'a TripSummary,
}

#[derive(Serialize)]
struct HistoryView {
    trip_id: i64,
    started_at: Option<String>,
    summary: TripSummary,
}

fn rfc3339(ms: i64) -> Result<String> {
    let at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .context("timestamp out of range")?;
    at.format(&Rfc3339).context("format timestamp")
}

fn trip_view(trip: &TripAggregate) -> Result<TripView<'_>> {
    let snapshot = trip.current();
    let phase = trip.phase_kind();
    let events = snapshot
        .events_ascending()
        .into_iter()
        .map(|event| {
            let name = match &event.state {
                EventState::LocationSelection { name, .. } | EventState::RouteSelection { name } => {
                    Some(name.clone())
                }
                EventState::Simple { .. } => None,
            };
            Ok(EventView {
                order: event.order,
                state: event.state.storage_state(),
                name,
                at: rfc3339(event.timestamp)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TripView {
        trip_id: snapshot.id(),
        phase,
        actions: phase.actions(),
        known_locations: snapshot
            .locations()
            .iter()
            .map(|location| location.name.as_str())
            .collect(),
        events,
        legs: transitions(&snapshot.events_ascending())?,
        summary: snapshot.summary(),
    })
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load()?;
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    init_tracing(&config)?;

    let adapter = SqliteAdapter::open(&DbConfig::from_app_config(&config))
        .with_context(|| format!("open database {}", config.database_path))?;
    let service = TripService::new(Arc::new(SqlTripStore::new(Arc::new(adapter))));

    if let Some(command) = args.cmd.trip_command() {
        let mut trip = service.load_active().await?;
        let phase = service.execute(&mut trip, &command).await?;
        info!(trip_id = trip.current().id(), phase = %phase, "action recorded");
        return print_json(&trip_view(&trip)?);
    }

    match args.cmd {
        Command::Last => match service.load_last_completed().await? {
            Some(trip) => print_json(&trip_view(&trip)?),
            None => print_json(&serde_json::Value::Null),
        },
        Command::History { limit } => {
            let records = service
                .history(limit.unwrap_or(config.history_limit))
                .await?
                .into_iter()
                .map(|record| {
                    Ok(HistoryView {
                        trip_id: record.trip_id,
                        started_at: record.summary.start_time.trip.map(rfc3339).transpose()?,
                        summary: record.summary,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            print_json(&records)
        }
        _ => {
            let trip = service.load_active().await?;
            print_json(&trip_view(&trip)?)
        }
    }
}

use std::sync::Arc;

use dropoff_domain::DomainResult;
use dropoff_domain::error::DomainError;
use dropoff_domain::model::SimpleState;
use dropoff_domain::ports::BoxFuture;
use dropoff_domain::ports::db::{DbError, RowSet, SqlExecutor, SqlValue};
use dropoff_domain::ports::trips::TripStore;
use dropoff_domain::rows::{
    EventLocationRow, EventRouteRow, EventRow, JoinedEventRow, LocationRow, NewEvent, NewRoute,
    RawTripRows, RouteRow,
};

const SELECT_LOCATIONS: &str = "SELECT id, name FROM locations ORDER BY id";
const SELECT_ROUTES: &str =
    "SELECT id, name, location_one_id, location_two_id FROM routes ORDER BY id";
const SELECT_TRIP_EVENTS: &str = r#"
SELECT e.id AS id, e.trip_id AS trip_id, e.state AS state, e.timestamp AS timestamp,
       e."order" AS "order",
       el.location_id AS location_id, er.route_id AS route_id
FROM events e
LEFT JOIN event_locations el ON el.event_id = e.id
LEFT JOIN event_routes er ON er.event_id = e.id
WHERE e.trip_id = ?1
ORDER BY e."order"
"#;
const SELECT_LATEST_EVENT: &str = r#"
SELECT id, trip_id, state, timestamp, "order"
FROM events
WHERE trip_id = ?1
ORDER BY "order" DESC
LIMIT 1
"#;
const SELECT_COMPLETED_TRIPS: &str = r#"
SELECT trip_id
FROM events
WHERE state = ?1
ORDER BY timestamp DESC, id DESC
LIMIT ?2
"#;

/// `TripStore` over any executor speaking the trip schema.
#[derive(Clone)]
pub struct SqlTripStore {
    executor: Arc<dyn SqlExecutor>,
}

impl SqlTripStore {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }
}

fn returned_id(rows: &RowSet, table: &str) -> DomainResult<i64> {
    rows.scalar_i64()
        .ok_or_else(|| DomainError::Persistence(format!("insert into {table} returned no id")))
}

async fn run(
    executor: &dyn SqlExecutor,
    statement: &str,
    params: Vec<SqlValue>,
) -> Result<RowSet, DbError> {
    executor.execute(statement, params).await
}

impl TripStore for SqlTripStore {
    fn latest_trip_id(&self) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            let rows = run(executor.as_ref(), "SELECT MAX(id) FROM trips", Vec::new()).await?;
            Ok(rows.scalar_i64())
        })
    }

    fn latest_event(&self, trip_id: i64) -> BoxFuture<'_, DomainResult<Option<EventRow>>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            let rows = run(executor.as_ref(), SELECT_LATEST_EVENT, vec![trip_id.into()]).await?;
            Ok(rows.decode_first::<EventRow>()?)
        })
    }

    fn completed_trip_ids(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<i64>>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = run(
                executor.as_ref(),
                SELECT_COMPLETED_TRIPS,
                vec![SimpleState::Complete.as_str().into(), limit.into()],
            )
            .await?;
            Ok(rows
                .rows
                .iter()
                .filter_map(|row| row.first().and_then(SqlValue::as_i64))
                .collect())
        })
    }

    fn create_trip(&self) -> BoxFuture<'_, DomainResult<i64>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            let rows = run(
                executor.as_ref(),
                "INSERT INTO trips DEFAULT VALUES RETURNING id",
                Vec::new(),
            )
            .await?;
            returned_id(&rows, "trips")
        })
    }

    fn load_rows(&self, trip_id: i64) -> BoxFuture<'_, DomainResult<RawTripRows>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            let locations = run(executor.as_ref(), SELECT_LOCATIONS, Vec::new())
                .await?
                .decode::<LocationRow>()?;
            let routes = run(executor.as_ref(), SELECT_ROUTES, Vec::new())
                .await?
                .decode::<RouteRow>()?;
            let events = run(executor.as_ref(), SELECT_TRIP_EVENTS, vec![trip_id.into()])
                .await?
                .decode::<JoinedEventRow>()?;
            tracing::debug!(
                trip_id,
                locations = locations.len(),
                routes = routes.len(),
                events = events.len(),
                "loaded trip rows"
            );
            Ok(RawTripRows {
                locations,
                routes,
                events,
            })
        })
    }

    fn begin(&self) -> BoxFuture<'_, DomainResult<()>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            run(executor.as_ref(), "BEGIN", Vec::new()).await?;
            Ok(())
        })
    }

    fn insert_location(&self, name: &str) -> BoxFuture<'_, DomainResult<i64>> {
        let executor = self.executor.clone();
        let name = name.to_string();
        Box::pin(async move {
            let rows = run(
                executor.as_ref(),
                "INSERT INTO locations (name) VALUES (?1) RETURNING id",
                vec![name.into()],
            )
            .await?;
            returned_id(&rows, "locations")
        })
    }

    fn insert_route(&self, route: &NewRoute) -> BoxFuture<'_, DomainResult<i64>> {
        let executor = self.executor.clone();
        let route = route.clone();
        Box::pin(async move {
            let rows = run(
                executor.as_ref(),
                "INSERT INTO routes (name, location_one_id, location_two_id) \
                 VALUES (?1, ?2, ?3) RETURNING id",
                vec![
                    route.name.into(),
                    route.location_one_id.into(),
                    route.location_two_id.into(),
                ],
            )
            .await?;
            returned_id(&rows, "routes")
        })
    }

    fn insert_event(&self, event: &NewEvent) -> BoxFuture<'_, DomainResult<i64>> {
        let executor = self.executor.clone();
        let event = event.clone();
        Box::pin(async move {
            let rows = run(
                executor.as_ref(),
                "INSERT INTO events (trip_id, state, timestamp, \"order\") \
                 VALUES (?1, ?2, ?3, ?4) RETURNING id",
                vec![
                    event.trip_id.into(),
                    event.state.into(),
                    event.timestamp.into(),
                    event.order.into(),
                ],
            )
            .await?;
            returned_id(&rows, "events")
        })
    }

    fn insert_event_location(&self, link: &EventLocationRow) -> BoxFuture<'_, DomainResult<()>> {
        let executor = self.executor.clone();
        let link = link.clone();
        Box::pin(async move {
            run(
                executor.as_ref(),
                "INSERT INTO event_locations (event_id, location_id) VALUES (?1, ?2)",
                vec![link.event_id.into(), link.location_id.into()],
            )
            .await?;
            Ok(())
        })
    }

    fn insert_event_route(&self, link: &EventRouteRow) -> BoxFuture<'_, DomainResult<()>> {
        let executor = self.executor.clone();
        let link = link.clone();
        Box::pin(async move {
            run(
                executor.as_ref(),
                "INSERT INTO event_routes (event_id, route_id) VALUES (?1, ?2)",
                vec![link.event_id.into(), link.route_id.into()],
            )
            .await?;
            Ok(())
        })
    }

    fn commit(&self) -> BoxFuture<'_, DomainResult<()>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            run(executor.as_ref(), "COMMIT", Vec::new()).await?;
            Ok(())
        })
    }

    fn rollback(&self) -> BoxFuture<'_, DomainResult<()>> {
        let executor = self.executor.clone();
        Box::pin(async move {
            run(executor.as_ref(), "ROLLBACK", Vec::new()).await?;
            Ok(())
        })
    }
}

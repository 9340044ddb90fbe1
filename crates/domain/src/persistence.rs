use crate::DomainResult;
use crate::ports::trips::TripStore;
use crate::transaction::{EventLink, IdAssignment, TransactionId, TripAggregate};

/// Writes every unsaved row of the staged snapshot inside one storage
/// transaction and patches the generated ids back into it.
///
/// Locations go first, then routes (which need both location ids), then
/// events followed by their junction rows. On any failure the storage
/// transaction is rolled back and the error returned; the aggregate's
/// transaction is left open for the caller to roll back.
pub async fn persist_staged(
    store: &dyn TripStore,
    trip: &mut TripAggregate,
    tx: TransactionId,
) -> DomainResult<()> {
    store.begin().await?;
    match write_staged(store, trip, tx).await {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Err(rollback_err) = store.rollback().await {
                tracing::warn!(error = %rollback_err, "storage rollback failed");
            }
            Err(err)
        }
    }
}

async fn write_staged(
    store: &dyn TripStore,
    trip: &mut TripAggregate,
    tx: TransactionId,
) -> DomainResult<()> {
    let trip_id = trip.staged(tx)?.id();

    let locations = trip.staged(tx)?.unsaved_locations();
    let mut assigned = Vec::with_capacity(locations.len());
    for location in locations {
        let id = store.insert_location(&location.name).await?;
        assigned.push(IdAssignment::Location {
            name: location.name,
            id,
        });
    }
    trip.assign_ids(tx, &assigned)?;

    let routes = trip.staged(tx)?.unsaved_routes()?;
    let mut assigned = Vec::with_capacity(routes.len());
    for route in routes {
        let id = store.insert_route(&route.new_route()).await?;
        assigned.push(IdAssignment::Route { key: route.key, id });
    }
    trip.assign_ids(tx, &assigned)?;

    let events = trip.staged(tx)?.unsaved_events()?;
    let mut assigned = Vec::with_capacity(events.len());
    for event in &events {
        let id = store.insert_event(&event.new_event(trip_id)).await?;
        assigned.push(IdAssignment::Event {
            order: event.order(),
            id,
        });
    }
    trip.assign_ids(tx, &assigned)?;

    for event in &events {
        let link = event.link(trip.staged(tx)?)?;
        match link {
            Some(EventLink::Location(row)) => store.insert_event_location(&row).await?,
            Some(EventLink::Route(row)) => store.insert_event_route(&row).await?,
            None => {}
        }
    }

    tracing::debug!(
        trip_id,
        events = events.len(),
        transaction = %tx,
        "staged rows written"
    );
    store.commit().await
}

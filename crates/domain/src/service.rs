use std::sync::Arc;

use serde::Serialize;

use crate::DomainResult;
use crate::model::{SimpleState, TripSnapshot};
use crate::persistence::persist_staged;
use crate::phase::{PhaseKind, StagedAction, TripCommand};
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::trips::TripStore;
use crate::reconstruct::{empty_trip, reconstruct};
use crate::summary::TripSummary;
use crate::transaction::TripAggregate;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TripRecord {
    pub trip_id: i64,
    pub summary: TripSummary,
}

#[derive(Clone)]
pub struct TripService {
    store: Arc<dyn TripStore>,
    clock: Arc<dyn Clock>,
}

impl TripService {
    pub fn new(store: Arc<dyn TripStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn TripStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn load_active(&self) -> DomainResult<TripAggregate> {
        let Some(trip_id) = self.store.latest_trip_id().await? else {
            return self.start_trip().await;
        };

        match self.store.latest_event(trip_id).await? {
            Some(event) if event.state == SimpleState::Complete.as_str() => {
                self.start_trip().await
            }
            Some(_) => self.load_trip(trip_id).await,
            None => {
                let rows = self.store.load_rows(trip_id).await?;
                let snapshot = empty_trip(trip_id, &rows.locations, &rows.routes)?;
                Ok(self.aggregate(snapshot))
            }
        }
    }

    pub async fn load_trip(&self, trip_id: i64) -> DomainResult<TripAggregate> {
        let rows = self.store.load_rows(trip_id).await?;
        let snapshot = reconstruct(trip_id, rows)?;
        Ok(self.aggregate(snapshot))
    }

    pub async fn load_last_completed(&self) -> DomainResult<Option<TripAggregate>> {
        let ids = self.store.completed_trip_ids(1).await?;
        match ids.first() {
            Some(trip_id) => Ok(Some(self.load_trip(*trip_id).await?)),
            None => Ok(None),
        }
    }

    pub async fn history(&self, limit: usize) -> DomainResult<Vec<TripRecord>> {
        let ids = self.store.completed_trip_ids(limit).await?;
        let mut records = Vec::with_capacity(ids.len());
        for trip_id in ids {
            let trip = self.load_trip(trip_id).await?;
            records.push(TripRecord {
                trip_id,
                summary: trip.current().summary().clone(),
            });
        }
        Ok(records)
    }

    pub async fn apply(
        &self,
        trip: &mut TripAggregate,
        action: &StagedAction,
    ) -> DomainResult<PhaseKind> {
        let tx = action.transaction;
        trip.staged(tx)?;

        if let Err(err) = persist_staged(self.store.as_ref(), trip, tx).await {
            tracing::warn!(
                trip_id = trip.current().id(),
                transaction = %tx,
                error = %err,
                "persisting trip action failed"
            );
            trip.rollback(tx)?;
            return Err(err);
        }

        trip.commit(tx)?;
        let phase = trip.phase_kind();
        tracing::info!(trip_id = trip.current().id(), phase = %phase, "trip advanced");
        Ok(phase)
    }

    pub async fn execute(
        &self,
        trip: &mut TripAggregate,
        command: &TripCommand,
    ) -> DomainResult<PhaseKind> {
        let action = trip.phase().dispatch(command)?;
        self.apply(trip, &action).await
    }

    async fn start_trip(&self) -> DomainResult<TripAggregate> {
        let trip_id = self.store.create_trip().await?;
        tracing::info!(trip_id, "new trip created");
        let rows = self.store.load_rows(trip_id).await?;
        let snapshot = empty_trip(trip_id, &rows.locations, &rows.routes)?;
        Ok(self.aggregate(snapshot))
    }

    fn aggregate(&self, snapshot: TripSnapshot) -> TripAggregate {
        TripAggregate::with_clock(snapshot, self.clock.clone())
    }
}

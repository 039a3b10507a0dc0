//! [`SweepRentalStatuses`] [`Task`].

use std::{convert::Infallible, error::Error, time};

use common::operations::{By, Perform, Start};
use futures::{stream, StreamExt as _};
use smart_default::SmartDefault;
use tokio::time::interval;
use tracerr::Traced;
use tracing as log;

use crate::{
    command::{recalculate_status, RecalculateStatus},
    domain::rental,
    infra::database,
    query::{self, Query},
    Command, Service,
};

#[cfg(doc)]
use crate::domain::Rental;

use super::Task;

/// Configuration for [`SweepRentalStatuses`] [`Task`].
#[derive(Clone, Copy, Debug, SmartDefault)]
pub struct Config {
    /// Interval between sweeps.
    #[default(time::Duration::from_secs(60))]
    pub interval: time::Duration,

    /// Maximum number of [`Rental`]s recalculated at once.
    #[default(8)]
    pub concurrency: usize,
}

/// [`Task`] recalculating statuses of all the [`Rental`]s.
#[derive(Clone, Copy, Debug)]
pub struct SweepRentalStatuses<S> {
    /// [`Config`] of this [`Task`].
    config: Config,

    /// [`Service`] instance.
    service: S,
}

impl<S> SweepRentalStatuses<S> {
    /// Creates a new [`SweepRentalStatuses`] [`Task`] over the provided
    /// [`Service`].
    #[must_use]
    pub fn new(config: Config, service: S) -> Self {
        Self { config, service }
    }
}

/// Outcome of a single [`SweepRentalStatuses`] pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Swept {
    /// Number of [`Rental`]s whose status has changed.
    pub updated: usize,

    /// Number of [`Rental`]s failed to be recalculated.
    pub failed: usize,
}

impl<Db, Clk> Task<Start<By<SweepRentalStatuses<Self>, Config>>>
    for Service<Db, Clk>
where
    SweepRentalStatuses<Self>: Task<Perform<()>, Ok = Swept, Err: Error>,
    Self: Clone,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        Start(by): Start<By<SweepRentalStatuses<Self>, Config>>,
    ) -> Result<Self::Ok, Self::Err> {
        let task = SweepRentalStatuses::new(by.into_inner(), self.clone());

        let mut interval = interval(task.config.interval);
        loop {
            let _ = interval.tick().await;
            _ = task.execute(Perform(())).await.map_err(|e| {
                log::error!("`task::SweepRentalStatuses` failed: {e}");
            });
        }
    }
}

impl<Db, Clk> Task<Perform<()>> for SweepRentalStatuses<Service<Db, Clk>>
where
    Service<Db, Clk>: Query<
            query::rentals::Ids,
            Ok = Vec<rental::Id>,
            Err = Traced<database::Error>,
        > + Command<
            RecalculateStatus,
            Ok = bool,
            Err = Traced<recalculate_status::ExecutionError>,
        >,
{
    type Ok = Swept;
    type Err = ExecutionError;

    async fn execute(&self, _: Perform<()>) -> Result<Self::Ok, Self::Err> {
        let ids = self
            .service
            .execute(query::rentals::Ids::by(()))
            .await
            .map_err(tracerr::wrap!())?;
        let total = ids.len();

        let outcomes = stream::iter(ids)
            .map(|rental_id| async move {
                self.service
                    .execute(RecalculateStatus {
                        rental_id,
                        forced: None,
                    })
                    .await
                    .map_err(|e| (rental_id, e))
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut swept = Swept::default();
        for outcome in outcomes {
            match outcome {
                Ok(true) => swept.updated += 1,
                Ok(false) => {}
                Err((id, e)) => {
                    log::error!(
                        "failed to recalculate status of `Rental(id: {id})`: \
                         {e}",
                    );
                    swept.failed += 1;
                }
            }
        }
        log::info!(
            "swept {total} `Rental`s: {} updated, {} failed",
            swept.updated,
            swept.failed,
        );

        Ok(swept)
    }
}

/// Error of [`SweepRentalStatuses`] execution.
pub type ExecutionError = Traced<database::Error>;

#[cfg(test)]
mod spec {
    use common::operations::Perform;

    use crate::{
        domain::rental::Status,
        fixture::{rental_of, service, stored_cell, stored_client},
        infra::Memory,
    };

    use super::{Config, SweepRentalStatuses, Swept, Task as _};

    #[tokio::test]
    async fn keeps_sweeping_past_failures() {
        let db = Memory::new();
        let client_id = stored_client(&db, true);
        let expiring = rental_of(
            client_id,
            &[stored_cell(&db, "A1")],
            ("2024-01-01T00:00:00Z", "2024-01-31T00:00:00Z"),
            Status::Active,
        );
        let broken = rental_of(
            client_id,
            &[stored_cell(&db, "A2")],
            ("2024-01-01T00:00:00Z", "2024-01-31T00:00:00Z"),
            Status::Active,
        );
        let settled = rental_of(
            client_id,
            &[stored_cell(&db, "A3")],
            ("2024-01-01T00:00:00Z", "2024-06-30T00:00:00Z"),
            Status::Active,
        );
        for r in [&expiring, &broken, &settled] {
            db.insert_rental(r.clone());
        }
        db.make_unavailable(broken.id);
        let task = SweepRentalStatuses::new(
            Config::default(),
            service(&db, "2024-01-29T00:00:00Z"),
        );

        let swept = task.execute(Perform(())).await.unwrap();

        assert_eq!(
            swept,
            Swept {
                updated: 1,
                failed: 1,
            },
        );
        let rentals = db.rentals();
        let status_of = |id| {
            rentals.iter().find(|r| r.id == id).map(|r| r.status).unwrap()
        };
        assert_eq!(status_of(expiring.id), Status::ExpiringSoon);
        assert_eq!(status_of(broken.id), Status::Active);
        assert_eq!(status_of(settled.id), Status::Active);

        let again = task.execute(Perform(())).await.unwrap();
        assert_eq!(
            again,
            Swept {
                updated: 0,
                failed: 1,
            },
        );
    }
}

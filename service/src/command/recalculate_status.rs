//! [`Command`] for recalculating a [`Rental`] status.

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    Clock,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{rental, Rental},
    error::{Categorize, Kind},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for recalculating a [`Rental`] status.
///
/// Results in `true` if the stored [`rental::Status`] has changed.
#[derive(Clone, Copy, Debug)]
pub struct RecalculateStatus {
    /// ID of the [`Rental`] to recalculate the status of.
    pub rental_id: rental::Id,

    /// [`rental::Status`] to set regardless of the dates, if any.
    pub forced: Option<rental::Status>,
}

impl<Db, Clk> Command<RecalculateStatus> for Service<Db, Clk>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Rental, rental::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Rental>, rental::Id>>,
            Ok = Option<Rental>,
            Err = Traced<database::Error>,
        > + Database<Update<Rental>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Clk: Clock,
{
    type Ok = bool;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: RecalculateStatus,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let RecalculateStatus { rental_id, forced } = cmd;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent recalculations of the same `Rental`.
        tx.execute(Lock(By::<Rental, _>::new(rental_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut rental = tx
            .execute(Select(By::<Option<Rental>, _>::new(rental_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::RentalNotExists(rental_id))
            .map_err(tracerr::wrap!())?;

        if !rental.recalculate_status(self.clock().now(), forced) {
            return Ok(false);
        }

        tx.execute(Update(rental))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(true)
    }
}

/// Error of [`RecalculateStatus`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Rental`] with the provided ID does not exist.
    #[display("`Rental(id: {_0})` does not exist")]
    RentalNotExists(#[error(not(source))] rental::Id),
}

impl Categorize for ExecutionError {
    fn kind(&self) -> Kind {
        match self {
            Self::Db(e) => e.kind(),
            Self::RentalNotExists(_) => Kind::NotFound,
        }
    }
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::rental::{self, Status},
        error::{Categorize as _, Kind},
        fixture::{at, rental_of, service, stored_cell, stored_client},
        infra::Memory,
    };

    use super::{Command as _, RecalculateStatus};

    #[tokio::test]
    async fn writes_only_changed_status() {
        let db = Memory::new();
        let rental = rental_of(
            stored_client(&db, true),
            &[stored_cell(&db, "A1")],
            ("2024-01-01T00:00:00Z", "2024-01-31T00:00:00Z"),
            Status::Active,
        );
        db.insert_rental(rental.clone());
        let svc = service(&db, "2024-01-29T00:00:00Z");
        let cmd = RecalculateStatus {
            rental_id: rental.id,
            forced: None,
        };

        assert!(svc.execute(cmd).await.unwrap());
        assert!(!svc.execute(cmd).await.unwrap());
        assert_eq!(db.rentals()[0].status, Status::ExpiringSoon);
    }

    #[tokio::test]
    async fn forces_closing() {
        let db = Memory::new();
        let rental = rental_of(
            stored_client(&db, true),
            &[stored_cell(&db, "A1")],
            ("2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z"),
            Status::Active,
        );
        db.insert_rental(rental.clone());
        let svc = service(&db, "2024-01-10T00:00:00Z");

        assert!(svc
            .execute(RecalculateStatus {
                rental_id: rental.id,
                forced: Some(Status::Closed),
            })
            .await
            .unwrap());

        let rentals = db.rentals();
        let stored = &rentals[0];
        assert_eq!(stored.status, Status::Closed);
        assert_eq!(stored.closed_at, Some(at("2024-01-10T00:00:00Z").coerce()));
    }

    #[tokio::test]
    async fn fails_on_unknown_rental() {
        let db = Memory::new();
        let err = service(&db, "2024-01-10T00:00:00Z")
            .execute(RecalculateStatus {
                rental_id: rental::Id::new(),
                forced: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::NotFound);
    }
}

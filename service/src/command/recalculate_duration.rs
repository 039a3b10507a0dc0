//! [`Command`] for recalculating a [`Rental`] end date from its [`Payment`]s.

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    Clock,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{rental, Payment, Rental},
    error::{Categorize, Kind},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for recalculating a [`Rental`] end date from its [`Payment`]s.
///
/// Results in the recalculated [`rental::EndDateTime`], which is left as is if
/// the [`Rental`] has no succeeded [`Payment`]s.
#[derive(Clone, Copy, Debug)]
pub struct RecalculateDuration {
    /// ID of the [`Rental`] to recalculate the end date of.
    pub rental_id: rental::Id,
}

impl<Db, Clk> Command<RecalculateDuration> for Service<Db, Clk>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Rental, rental::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Rental>, rental::Id>>,
            Ok = Option<Rental>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<Payment>, rental::Id>>,
            Ok = Vec<Payment>,
            Err = Traced<database::Error>,
        > + Database<Update<Rental>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Clk: Clock,
{
    type Ok = rental::EndDateTime;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: RecalculateDuration,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let RecalculateDuration { rental_id } = cmd;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent changes of the same `Rental`.
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

        let payments = tx
            .execute(Select(By::<Vec<Payment>, _>::new(rental_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        if !rental
            .replay_ledger(&payments, self.clock().now())
            .map_err(tracerr::from_and_wrap!(=> E))?
        {
            return Ok(rental.end_date);
        }

        let end_date = rental.end_date;
        tx.execute(Update(rental))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(end_date)
    }
}

/// Error of [`RecalculateDuration`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Payment`]s push the [`Rental`] end date out of range.
    #[display("Failed to replay `Payment`s: {_0}")]
    #[from]
    Overflow(rental::Overflow),

    /// [`Rental`] with the provided ID does not exist.
    #[display("`Rental(id: {_0})` does not exist")]
    RentalNotExists(#[error(not(source))] rental::Id),
}

impl Categorize for ExecutionError {
    fn kind(&self) -> Kind {
        match self {
            Self::Db(e) => e.kind(),
            Self::Overflow(_) => Kind::Validation,
            Self::RentalNotExists(_) => Kind::NotFound,
        }
    }
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::{payment::RentalDuration, rental::Status},
        fixture::{
            at, payment, rental_of, service, stored_cell, stored_client,
        },
        infra::Memory,
    };

    use super::{Command as _, RecalculateDuration};

    #[tokio::test]
    async fn replays_payments_in_creation_order() {
        let db = Memory::new();
        let rental = rental_of(
            stored_client(&db, true),
            &[stored_cell(&db, "A1")],
            ("2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z"),
            Status::Active,
        );
        let mut second = payment(rental.id, "2024-01-15T00:00:00Z", "");
        second.rental_duration = Some(RentalDuration::from(30));
        db.insert_payment(second);
        let first = payment(rental.id, "2024-01-01T00:00:00Z", "1 мес");
        db.insert_payment(first);
        db.insert_rental(rental.clone());

        let end_date = service(&db, "2024-01-10T00:00:00Z")
            .execute(RecalculateDuration {
                rental_id: rental.id,
            })
            .await
            .unwrap();

        assert_eq!(end_date, at("2024-03-01T23:59:59.999Z").coerce());
        let rentals = db.rentals();
        let stored = &rentals[0];
        assert_eq!(stored.end_date, end_date);
        assert_eq!(stored.status, Status::Active);
    }

    #[tokio::test]
    async fn keeps_end_date_without_payments() {
        let db = Memory::new();
        let rental = rental_of(
            stored_client(&db, true),
            &[stored_cell(&db, "A1")],
            ("2024-01-01T00:00:00Z", "2024-04-01T00:00:00Z"),
            Status::Active,
        );
        db.insert_rental(rental.clone());

        let end_date = service(&db, "2024-01-10T00:00:00Z")
            .execute(RecalculateDuration {
                rental_id: rental.id,
            })
            .await
            .unwrap();

        assert_eq!(end_date, rental.end_date);
        assert_eq!(db.rentals()[0], rental);
    }

    #[tokio::test]
    async fn keeps_closed_rental_closed() {
        let db = Memory::new();
        let x = stored_cell(&db, "X");
        let closed = rental_of(
            stored_client(&db, true),
            &[x],
            ("2024-01-01T00:00:00Z", "2024-02-01T00:00:00Z"),
            Status::Closed,
        );
        db.insert_rental(closed.clone());
        let paid = payment(closed.id, "2024-01-01T00:00:00Z", "6 мес");
        db.insert_payment(paid);
        db.insert_rental(rental_of(
            stored_client(&db, true),
            &[x],
            ("2024-02-05T00:00:00Z", "2024-03-05T00:00:00Z"),
            Status::Active,
        ));

        let end_date = service(&db, "2024-02-10T00:00:00Z")
            .execute(RecalculateDuration {
                rental_id: closed.id,
            })
            .await
            .unwrap();

        assert_eq!(end_date, closed.end_date);
        let holding = db
            .rentals()
            .into_iter()
            .filter(|r| !r.is_closed() && r.cell_ids.contains(&x))
            .count();
        assert_eq!(holding, 1);
        assert!(db.rentals().contains(&closed));
    }
}

//! [`Command`] for deleting a [`Payment`].

use common::{
    operations::{
        By, Commit, Delete, Lock, Select, Transact, Transacted, Update,
    },
    Clock,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{payment, rental, Payment, Rental},
    error::{Categorize, Kind},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for deleting a [`Payment`].
///
/// Only the most recent [`Payment`] of a [`Rental`] may be deleted. The
/// [`Rental`] end date is replayed from the remaining [`Payment`]s, or the
/// [`Rental`] is deleted along with its last [`Payment`].
///
/// Results in the updated [`Rental`], if it remains.
#[derive(Clone, Copy, Debug)]
pub struct DeletePayment {
    /// ID of the [`Payment`] to be deleted.
    pub payment_id: payment::Id,
}

impl<Db, Clk> Command<DeletePayment> for Service<Db, Clk>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Select<By<Option<Payment>, payment::Id>>,
            Ok = Option<Payment>,
            Err = Traced<database::Error>,
        > + Database<
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
        > + Database<
            Delete<By<Payment, payment::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Delete<By<Rental, rental::Id>>,
            Err = Traced<database::Error>,
        > + Database<Update<Rental>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Clk: Clock,
{
    type Ok = Option<Rental>;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: DeletePayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let DeletePayment { payment_id } = cmd;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let rental_id = tx
            .execute(Select(By::<Option<Payment>, _>::new(payment_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::PaymentNotExists(payment_id))
            .map_err(tracerr::wrap!())?
            .rental_id;

        let Some(rental_id) = rental_id else {
            tx.execute(Delete(By::<Payment, _>::new(payment_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            tx.execute(Commit)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            return Ok(None);
        };

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

        let (deleted, remaining): (Vec<_>, Vec<_>) = tx
            .execute(Select(By::<Vec<Payment>, _>::new(rental_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .into_iter()
            .partition(|p| p.id == payment_id);
        // Re-read under the `Rental` lock, as the `Payment` could have been
        // deleted concurrently.
        let Some(deleted) = deleted.into_iter().next() else {
            return Err(tracerr::new!(E::PaymentNotExists(payment_id)));
        };
        if remaining.iter().any(|p| p.created_at > deleted.created_at) {
            return Err(tracerr::new!(E::PaymentNotLatest(payment_id)));
        }

        tx.execute(Delete(By::<Payment, _>::new(payment_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let rental = if remaining.is_empty() {
            log::debug!(
                "deleting `Rental(id: {rental_id})` along with its last \
                 `Payment(id: {payment_id})`",
            );
            tx.execute(Delete(By::<Rental, _>::new(rental_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            None
        } else {
            if rental
                .replay_ledger(&remaining, self.clock().now())
                .map_err(tracerr::from_and_wrap!(=> E))?
            {
                tx.execute(Update(rental.clone()))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))
                    .map(drop)?;
            }
            Some(rental)
        };

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(rental)
    }
}

/// Error of [`DeletePayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Remaining [`Payment`]s push the [`Rental`] end date out of range.
    #[display("Failed to replay `Payment`s: {_0}")]
    #[from]
    Overflow(rental::Overflow),

    /// [`Payment`] with the provided ID does not exist.
    #[display("`Payment(id: {_0})` does not exist")]
    PaymentNotExists(#[error(not(source))] payment::Id),

    /// [`Payment`] is not the most recent one of its [`Rental`].
    #[display(
        "`Payment(id: {_0})` is not the most recent one of its `Rental`"
    )]
    PaymentNotLatest(#[error(not(source))] payment::Id),

    /// [`Rental`] with the provided ID does not exist.
    #[display("`Rental(id: {_0})` does not exist")]
    RentalNotExists(#[error(not(source))] rental::Id),
}

impl Categorize for ExecutionError {
    fn kind(&self) -> Kind {
        match self {
            Self::Db(e) => e.kind(),
            Self::Overflow(_) => Kind::Validation,
            Self::PaymentNotExists(_) | Self::RentalNotExists(_) => {
                Kind::NotFound
            }
            Self::PaymentNotLatest(_) => Kind::BusinessRule,
        }
    }
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::{payment::Id as PaymentId, rental::Status},
        error::{Categorize as _, Kind},
        fixture::{
            at, payment, rental_of, service, stored_cell, stored_client,
        },
        infra::Memory,
    };

    use super::{Command as _, DeletePayment};

    #[tokio::test]
    async fn replays_remaining_payments() {
        let db = Memory::new();
        let rental = rental_of(
            stored_client(&db, true),
            &[stored_cell(&db, "X")],
            ("2024-01-01T00:00:00Z", "2024-03-31T23:59:59.999Z"),
            Status::Active,
        );
        let first = payment(rental.id, "2024-01-01T00:00:00Z", "1 мес");
        let last = payment(rental.id, "2024-01-15T00:00:00Z", "2 мес");
        db.insert_rental(rental.clone());
        db.insert_payment(first.clone());
        db.insert_payment(last.clone());
        let svc = service(&db, "2024-01-20T00:00:00Z");

        let err = svc
            .execute(DeletePayment {
                payment_id: first.id,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Kind::BusinessRule);
        assert_eq!(db.payments().len(), 2);

        let updated = svc
            .execute(DeletePayment {
                payment_id: last.id,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.end_date, at("2024-01-31T23:59:59.999Z").coerce());
        assert_eq!(updated.status, Status::Active);
        assert_eq!(db.rentals(), vec![updated]);
        assert_eq!(db.payments().len(), 1);
    }

    #[tokio::test]
    async fn deletes_rental_with_its_last_payment() {
        let db = Memory::new();
        let rental = rental_of(
            stored_client(&db, true),
            &[stored_cell(&db, "X")],
            ("2024-01-01T00:00:00Z", "2024-01-31T23:59:59.999Z"),
            Status::Active,
        );
        let only = payment(rental.id, "2024-01-01T00:00:00Z", "1 мес");
        db.insert_rental(rental);
        db.insert_payment(only.clone());

        let remained = service(&db, "2024-01-20T00:00:00Z")
            .execute(DeletePayment {
                payment_id: only.id,
            })
            .await
            .unwrap();

        assert_eq!(remained, None);
        assert!(db.rentals().is_empty());
        assert!(db.payments().is_empty());
    }

    #[tokio::test]
    async fn fails_on_unknown_payment() {
        let db = Memory::new();

        let err = service(&db, "2024-01-20T00:00:00Z")
            .execute(DeletePayment {
                payment_id: PaymentId::new(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::NotFound);
    }

    #[tokio::test]
    async fn keeps_closed_rental_closed() {
        let db = Memory::new();
        let closed = rental_of(
            stored_client(&db, true),
            &[stored_cell(&db, "X")],
            ("2024-01-01T00:00:00Z", "2024-02-01T00:00:00Z"),
            Status::Closed,
        );
        let first = payment(closed.id, "2024-01-01T00:00:00Z", "6 мес");
        let last = payment(closed.id, "2024-01-15T00:00:00Z", "1 мес");
        db.insert_rental(closed.clone());
        db.insert_payment(first);
        db.insert_payment(last.clone());

        let remained = service(&db, "2024-02-10T00:00:00Z")
            .execute(DeletePayment {
                payment_id: last.id,
            })
            .await
            .unwrap();

        assert_eq!(remained, Some(closed.clone()));
        assert_eq!(db.rentals(), vec![closed]);
    }
}

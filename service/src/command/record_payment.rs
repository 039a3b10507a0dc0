//! [`Command`] for recording a succeeded [`Payment`].

use std::collections::HashMap;

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    Clock, Money,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        cell, client,
        payment::{self, Period, RentalDuration},
        rental, Cell, Client, Payment, Rental,
    },
    error::{Categorize, Kind},
    infra::{database, Database},
    read::rental::Occupying,
    Service,
};

use super::{assign_cells, AssignCells, Command};

/// [`Command`] for recording a succeeded [`Payment`].
///
/// The paying [`Rental`] gets its end date replayed from all its [`Payment`]s.
/// Nothing is stored if any step fails, including the assignment of the paid
/// [`Cell`]s.
#[derive(Clone, Debug)]
pub struct RecordPayment {
    /// [`Target`] the [`Payment`] is made for.
    pub target: Target,

    /// Paid amount.
    pub amount: Money,

    /// [`payment::Description`] of the [`Payment`].
    pub description: payment::Description,

    /// Structured [`Period`] granted by the [`Payment`], if known.
    pub period: Option<Period>,

    /// Legacy number of days granted by the [`Payment`], if any.
    pub rental_duration: Option<RentalDuration>,
}

/// What a [`Payment`] is made for.
#[derive(Clone, Debug)]
pub enum Target {
    /// Existing [`Rental`].
    Rental(rental::Id),

    /// [`Cell`]s to be rented by a [`Client`].
    ///
    /// They are assigned the way [`AssignCells`] [`Command`] does, in the
    /// same transaction.
    Cells {
        /// ID of the paying [`Client`].
        client_id: client::Id,

        /// IDs of the paid [`Cell`]s.
        cell_ids: Vec<cell::Id>,
    },
}

impl<Db, Clk> Command<RecordPayment> for Service<Db, Clk>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Cell, cell::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Lock<By<Rental, rental::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Client>, client::Id>>,
            Ok = Option<Client>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<HashMap<cell::Id, Cell>, Vec<cell::Id>>>,
            Ok = HashMap<cell::Id, Cell>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Rental>, rental::Id>>,
            Ok = Option<Rental>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<Rental>, Occupying>>,
            Ok = Vec<Rental>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<Payment>, rental::Id>>,
            Ok = Vec<Payment>,
            Err = Traced<database::Error>,
        > + Database<Insert<Rental>, Err = Traced<database::Error>>
        + Database<Update<Rental>, Err = Traced<database::Error>>
        + Database<Insert<Payment>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Clk: Clock,
{
    type Ok = Payment;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: RecordPayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let RecordPayment {
            target,
            amount,
            description,
            period,
            rental_duration,
        } = cmd;
        let now = self.clock().now();

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let rental_id = match target {
            Target::Rental(id) => id,
            Target::Cells {
                client_id,
                cell_ids,
            } => {
                AssignCells {
                    rental_id: None,
                    cell_ids,
                    client_id,
                    start_date: None,
                    end_date: None,
                }
                .execute_in(&tx, now)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .id
            }
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

        let payment = Payment {
            id: payment::Id::new(),
            rental_id: Some(rental.id),
            amount,
            description,
            period,
            rental_duration,
            status: payment::Status::Succeeded,
            created_at: now.coerce(),
        };
        tx.execute(Insert(payment.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let payments = tx
            .execute(Select(By::<Vec<Payment>, _>::new(rental.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if rental
            .replay_ledger(&payments, now)
            .map_err(tracerr::from_and_wrap!(=> E))?
        {
            tx.execute(Update(rental))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(payment)
    }
}

/// Error of [`RecordPayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`AssignCells`] [`Command`] failed.
    #[display("Failed to assign paid `Cell`s: {_0}")]
    #[from]
    AssignCells(assign_cells::ExecutionError),

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
            Self::AssignCells(e) => e.kind(),
            Self::Db(e) => e.kind(),
            Self::Overflow(_) => Kind::Validation,
            Self::RentalNotExists(_) => Kind::NotFound,
        }
    }
}

#[cfg(test)]
mod spec {
    use std::collections::BTreeSet;

    use crate::{
        domain::{
            payment::{self, Period, RentalDuration},
            rental::Status,
        },
        error::{Categorize as _, Kind},
        fixture::{at, rental_of, service, stored_cell, stored_client},
        infra::Memory,
    };

    use super::{Command as _, RecordPayment, Target};

    fn pay(target: Target, description: &str) -> RecordPayment {
        RecordPayment {
            target,
            amount: "3000".parse().unwrap(),
            description: payment::Description::new(description).unwrap(),
            period: None,
            rental_duration: None,
        }
    }

    #[tokio::test]
    async fn rents_paid_cells() {
        let db = Memory::new();
        let x = stored_cell(&db, "X");
        let client_id = stored_client(&db, true);
        let svc = service(&db, "2024-01-01T00:00:00Z");

        let payment = svc
            .execute(pay(
                Target::Cells {
                    client_id,
                    cell_ids: vec![x],
                },
                "1 мес",
            ))
            .await
            .unwrap();

        let rentals = db.rentals();
        assert_eq!(rentals.len(), 1);
        assert_eq!(payment.rental_id, Some(rentals[0].id));
        assert_eq!(rentals[0].cell_ids, BTreeSet::from([x]));
        assert_eq!(
            rentals[0].end_date,
            at("2024-01-31T23:59:59.999Z").coerce(),
        );
        // Paid rental is reopened until the next recalculation.
        assert_eq!(rentals[0].status, Status::Extended);
    }

    #[tokio::test]
    async fn routes_repeated_booking_to_same_rental() {
        let db = Memory::new();
        let x = stored_cell(&db, "X");
        let client_id = stored_client(&db, true);
        let target = Target::Cells {
            client_id,
            cell_ids: vec![x],
        };

        let first = service(&db, "2024-01-01T00:00:00Z")
            .execute(pay(target.clone(), "1 мес"))
            .await
            .unwrap();
        let second = service(&db, "2024-01-15T00:00:00Z")
            .execute(RecordPayment {
                rental_duration: Some(RentalDuration::from(30)),
                ..pay(target, "")
            })
            .await
            .unwrap();

        assert_eq!(first.rental_id, second.rental_id);
        let rentals = db.rentals();
        assert_eq!(rentals.len(), 1);
        assert_eq!(
            rentals[0].end_date,
            at("2024-03-01T23:59:59.999Z").coerce(),
        );
    }

    #[tokio::test]
    async fn extends_existing_rental_by_structured_period() {
        let db = Memory::new();
        let rental = rental_of(
            stored_client(&db, true),
            &[stored_cell(&db, "X")],
            ("2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z"),
            Status::Expired,
        );
        db.insert_rental(rental.clone());

        _ = service(&db, "2024-01-01T00:00:00Z")
            .execute(RecordPayment {
                period: Period::new(1, payment::Unit::Year),
                ..pay(Target::Rental(rental.id), "1 мес")
            })
            .await
            .unwrap();

        assert_eq!(
            db.rentals()[0].end_date,
            at("2024-12-31T23:59:59.999Z").coerce(),
        );
    }

    #[tokio::test]
    async fn refuses_cells_of_another_client() {
        let db = Memory::new();
        let x = stored_cell(&db, "X");
        db.insert_rental(rental_of(
            stored_client(&db, true),
            &[x],
            ("2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z"),
            Status::Active,
        ));

        let err = service(&db, "2024-01-10T00:00:00Z")
            .execute(pay(
                Target::Cells {
                    client_id: stored_client(&db, true),
                    cell_ids: vec![x],
                },
                "",
            ))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::Conflict);
        assert!(db.payments().is_empty());
    }

    #[tokio::test]
    async fn rolls_back_assignment_when_payment_fails() {
        let db = Memory::new();
        let x = stored_cell(&db, "X");
        let client_id = stored_client(&db, true);

        let err = service(&db, "2024-01-01T00:00:00Z")
            .execute(RecordPayment {
                period: Period::new(1_000_000, payment::Unit::Year),
                ..pay(
                    Target::Cells {
                        client_id,
                        cell_ids: vec![x],
                    },
                    "",
                )
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::Validation);
        assert!(db.rentals().is_empty());
        assert!(db.payments().is_empty());
    }
}

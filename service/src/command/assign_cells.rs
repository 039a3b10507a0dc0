//! [`Command`] for assigning [`Cell`]s to a [`Client`].

use std::collections::{BTreeSet, HashMap};

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    Clock, DateTime,
};
use derive_more::{Display, Error, From};
use itertools::Itertools as _;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        cell, client,
        rental::{self, ExtensionCount, Status},
        Cell, Client, Rental,
    },
    error::{Categorize, Kind},
    infra::{database, Database},
    read::rental::Occupying,
    Service,
};

use super::Command;

/// [`Command`] for assigning [`Cell`]s to a [`Client`].
///
/// Without a [`rental::Id`] a new [`Rental`] is created, unless the
/// [`Client`] occupies some of the [`Cell`]s already: then the rest of them
/// are merged into the latest ending [`Rental`] of this [`Client`] instead.
///
/// With a [`rental::Id`] the [`Cell`]s and the [`Client`] of the existing
/// [`Rental`] are replaced.
#[derive(Clone, Debug)]
pub struct AssignCells {
    /// ID of the [`Rental`] to reassign, if any.
    pub rental_id: Option<rental::Id>,

    /// IDs of the [`Cell`]s to assign.
    pub cell_ids: Vec<cell::Id>,

    /// ID of the [`Client`] to assign the [`Cell`]s to.
    pub client_id: client::Id,

    /// [`rental::StartDateTime`] to set, if any.
    ///
    /// New [`Rental`]s start now by default. Ignored when merging into an
    /// existing [`Rental`] of the [`Client`], as its dates are paid already.
    pub start_date: Option<rental::StartDateTime>,

    /// [`rental::EndDateTime`] to set, if any.
    ///
    /// New [`Rental`]s end at their start by default, until paid. Ignored
    /// when merging into an existing [`Rental`] of the [`Client`], as its
    /// dates are paid already.
    pub end_date: Option<rental::EndDateTime>,
}

impl<Db, Clk> Command<AssignCells> for Service<Db, Clk>
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
        > + Database<Insert<Rental>, Err = Traced<database::Error>>
        + Database<Update<Rental>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Clk: Clock,
{
    type Ok = Rental;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: AssignCells) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let rental = cmd
            .execute_in(&tx, self.clock().now())
            .await
            .map_err(tracerr::wrap!())?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(rental)
    }
}

impl AssignCells {
    /// Executes this [`AssignCells`] inside the provided transaction, leaving
    /// it uncommitted.
    ///
    /// # Errors
    ///
    /// See [`ExecutionError`] for details.
    pub(crate) async fn execute_in<Tx>(
        self,
        tx: &Tx,
        now: DateTime,
    ) -> Result<Rental, Traced<ExecutionError>>
    where
        Tx: Database<Lock<By<Cell, cell::Id>>, Err = Traced<database::Error>>
            + Database<
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
            > + Database<Insert<Rental>, Err = Traced<database::Error>>
            + Database<Update<Rental>, Err = Traced<database::Error>>,
    {
        use ExecutionError as E;

        let Self {
            rental_id,
            cell_ids,
            client_id,
            start_date,
            end_date,
        } = self;

        let cell_ids = cell_ids.into_iter().collect::<BTreeSet<_>>();
        if cell_ids.is_empty() {
            return Err(tracerr::new!(E::NoCells));
        }

        // Locking in the same order avoids deadlocks between concurrent
        // assignments of intersecting `Cell`s.
        for &id in &cell_ids {
            tx.execute(Lock(By::<Cell, _>::new(id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }

        _ = tx
            .execute(Select(By::<Option<Client>, _>::new(client_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ClientNotExists(client_id))
            .map_err(tracerr::wrap!())?;

        let cells = tx
            .execute(Select(By::<HashMap<cell::Id, Cell>, _>::new(
                cell_ids.iter().copied().collect::<Vec<_>>(),
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if let Some(&id) =
            cell_ids.iter().find(|&id| !cells.contains_key(id))
        {
            return Err(tracerr::new!(E::CellNotExists(id)));
        }

        let existing = if let Some(id) = rental_id {
            // Avoid concurrent changes of the same `Rental`.
            tx.execute(Lock(By::<Rental, _>::new(id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;

            Some(
                tx.execute(Select(By::<Option<Rental>, _>::new(id)))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .ok_or(E::RentalNotExists(id))
                    .map_err(tracerr::wrap!())?,
            )
        } else {
            None
        };

        let occupying = Occupying {
            cell_ids: cell_ids.iter().copied().collect(),
            except: rental_id,
        };
        let occupied_by = tx
            .execute(Select(By::<Vec<Rental>, _>::new(occupying.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .into_iter()
            .map(|r| r.id)
            .collect::<BTreeSet<_>>();
        // Avoid concurrent changes of the occupying `Rental`s, and re-read
        // them under the locks.
        for &id in &occupied_by {
            tx.execute(Lock(By::<Rental, _>::new(id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }
        let mut occupying = tx
            .execute(Select(By::<Vec<Rental>, _>::new(occupying)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Reassigning an existing `Rental` never merges it into another one.
        let is_foreign =
            |r: &Rental| existing.is_some() || r.client_id != client_id;
        if occupying.iter().any(is_foreign) {
            let names = cell_ids
                .iter()
                .filter(|id| {
                    occupying
                        .iter()
                        .filter(|&r| is_foreign(r))
                        .any(|r| r.cell_ids.contains(*id))
                })
                .filter_map(|id| cells.get(id))
                .map(|c| &c.name)
                .join(", ");
            return Err(tracerr::new!(E::CellsOccupied(names)));
        }

        let rental = if let Some(mut rental) = existing {
            rental.cell_ids = cell_ids;
            rental.client_id = client_id;
            if let Some(start_date) = start_date {
                rental.start_date = start_date;
            }
            if let Some(end_date) = end_date {
                rental.end_date = end_date;
            }
            check_dates(&rental).map_err(tracerr::wrap!())?;
            _ = rental.recalculate_status(now, None);

            tx.execute(Update(rental.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            rental
        } else if let Some(pos) =
            occupying.iter().position_max_by_key(|r| r.end_date)
        {
            let mut rental = occupying.swap_remove(pos);
            // `Cell`s occupied by other `Rental`s of the `Client` stay there.
            let held = occupying
                .iter()
                .flat_map(|r| r.cell_ids.iter().copied())
                .collect::<BTreeSet<_>>();
            let merged = cell_ids
                .into_iter()
                .filter(|id| !held.contains(id))
                .collect::<Vec<_>>();

            log::debug!(
                "merging `Cell`s [{}] into `Rental(id: {})` of \
                 `Client(id: {client_id})`",
                merged.iter().join(", "),
                rental.id,
            );
            if start_date.is_some() || end_date.is_some() {
                log::debug!(
                    "ignoring dates requested for `Rental(id: {})` being \
                     merged into",
                    rental.id,
                );
            }

            rental.cell_ids.extend(merged);
            _ = rental.recalculate_status(now, None);

            tx.execute(Update(rental.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            rental
        } else {
            let start_date = start_date.unwrap_or_else(|| now.coerce());
            let mut rental = Rental {
                id: rental::Id::new(),
                client_id,
                cell_ids,
                start_date,
                end_date: end_date.unwrap_or_else(|| start_date.coerce()),
                status: Status::Active,
                closed_at: None,
                last_extended_at: None,
                extension_count: ExtensionCount::default(),
                created_at: now.coerce(),
            };
            check_dates(&rental).map_err(tracerr::wrap!())?;
            _ = rental.recalculate_status(now, None);

            tx.execute(Insert(rental.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            rental
        };

        Ok(rental)
    }
}

/// Checks that the provided [`Rental`] doesn't end before it starts.
fn check_dates(rental: &Rental) -> Result<(), Traced<ExecutionError>> {
    if rental.end_date.coerce::<()>() < rental.start_date.coerce() {
        return Err(tracerr::new!(ExecutionError::EndsBeforeStart));
    }
    Ok(())
}

/// Error of [`AssignCells`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Cell`] with the provided ID does not exist.
    #[display("`Cell(id: {_0})` does not exist")]
    CellNotExists(#[error(not(source))] cell::Id),

    /// [`Cell`]s are occupied by another [`Client`].
    #[display("`Cell`s are occupied already: {_0}")]
    CellsOccupied(#[error(not(source))] String),

    /// [`Client`] with the provided ID does not exist.
    #[display("`Client(id: {_0})` does not exist")]
    ClientNotExists(#[error(not(source))] client::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Rental`] ends before it starts.
    #[display("`Rental` ends before it starts")]
    EndsBeforeStart,

    /// No [`Cell`]s are provided.
    #[display("No `Cell`s are provided")]
    NoCells,

    /// [`Rental`] with the provided ID does not exist.
    #[display("`Rental(id: {_0})` does not exist")]
    RentalNotExists(#[error(not(source))] rental::Id),
}

impl Categorize for ExecutionError {
    fn kind(&self) -> Kind {
        match self {
            Self::CellNotExists(_)
            | Self::ClientNotExists(_)
            | Self::RentalNotExists(_) => Kind::NotFound,
            Self::CellsOccupied(_) => Kind::Conflict,
            Self::Db(e) => e.kind(),
            Self::EndsBeforeStart | Self::NoCells => Kind::Validation,
        }
    }
}

#[cfg(test)]
mod spec {
    use std::collections::BTreeSet;

    use futures::future;

    use crate::{
        command::ExtendRental,
        domain::{cell, client, rental::Status},
        error::{Categorize as _, Kind},
        fixture::{at, rental_of, service, stored_cell, stored_client},
        infra::Memory,
    };

    use super::{AssignCells, Command as _, ExecutionError};

    fn assign(cell_ids: &[cell::Id], client_id: client::Id) -> AssignCells {
        AssignCells {
            rental_id: None,
            cell_ids: cell_ids.to_vec(),
            client_id,
            start_date: None,
            end_date: None,
        }
    }

    #[tokio::test]
    async fn creates_rental_of_free_cells() {
        let db = Memory::new();
        let (a1, a2) = (stored_cell(&db, "A1"), stored_cell(&db, "A2"));
        let client_id = stored_client(&db, true);
        let svc = service(&db, "2024-01-10T00:00:00Z");

        let rental =
            svc.execute(assign(&[a2, a1, a2], client_id)).await.unwrap();

        assert_eq!(rental.cell_ids, BTreeSet::from([a1, a2]));
        assert_eq!(rental.client_id, client_id);
        assert_eq!(rental.start_date, at("2024-01-10T00:00:00Z").coerce());
        assert_eq!(rental.end_date, rental.start_date.coerce());
        assert_eq!(rental.closed_at, None);
        assert_eq!(db.rentals(), vec![rental]);
    }

    #[tokio::test]
    async fn rejects_cells_of_another_client() {
        let db = Memory::new();
        let (x, y) = (stored_cell(&db, "X"), stored_cell(&db, "Y"));
        let holder = rental_of(
            stored_client(&db, true),
            &[x],
            ("2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z"),
            Status::Active,
        );
        db.insert_rental(holder.clone());
        let svc = service(&db, "2024-01-10T00:00:00Z");

        let err = svc
            .execute(assign(&[x, y], stored_client(&db, true)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::Conflict);
        assert!(
            matches!(
                err.as_ref(),
                ExecutionError::CellsOccupied(names) if names == "X",
            ),
            "unexpected error: {err}",
        );
        assert_eq!(db.rentals(), vec![holder]);
    }

    #[tokio::test]
    async fn merges_into_rental_of_same_client() {
        let db = Memory::new();
        let (x, y) = (stored_cell(&db, "X"), stored_cell(&db, "Y"));
        let client_id = stored_client(&db, true);
        let holder = rental_of(
            client_id,
            &[x],
            ("2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z"),
            Status::Active,
        );
        db.insert_rental(holder.clone());
        let svc = service(&db, "2024-01-10T00:00:00Z");

        let merged = svc.execute(assign(&[x], client_id)).await.unwrap();
        assert_eq!(merged.id, holder.id);
        assert_eq!(merged.cell_ids, BTreeSet::from([x]));

        let merged = svc.execute(assign(&[x, y], client_id)).await.unwrap();
        assert_eq!(merged.id, holder.id);
        assert_eq!(merged.cell_ids, BTreeSet::from([x, y]));
        assert_eq!(db.rentals().len(), 1);
    }

    #[tokio::test]
    async fn keeps_cells_in_other_rentals_of_same_client() {
        let db = Memory::new();
        let (x, y) = (stored_cell(&db, "X"), stored_cell(&db, "Y"));
        let client_id = stored_client(&db, true);
        let first = rental_of(
            client_id,
            &[x],
            ("2024-01-01T00:00:00Z", "2024-02-01T00:00:00Z"),
            Status::Active,
        );
        let second = rental_of(
            client_id,
            &[y],
            ("2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z"),
            Status::Active,
        );
        db.insert_rental(first.clone());
        db.insert_rental(second.clone());
        let svc = service(&db, "2024-01-10T00:00:00Z");

        let merged = svc.execute(assign(&[x, y], client_id)).await.unwrap();

        assert_eq!(merged.id, second.id);
        assert_eq!(merged.cell_ids, BTreeSet::from([y]));
        let rentals = db.rentals();
        assert_eq!(rentals.len(), 2);
        for cell in [x, y] {
            let holding = rentals
                .iter()
                .filter(|r| !r.is_closed() && r.cell_ids.contains(&cell))
                .count();
            assert_eq!(holding, 1);
        }
    }

    #[tokio::test]
    async fn merges_into_current_state_of_rental() {
        let db = Memory::new();
        let (x, y) = (stored_cell(&db, "X"), stored_cell(&db, "Y"));
        let client_id = stored_client(&db, true);
        let holder = rental_of(
            client_id,
            &[x],
            ("2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z"),
            Status::Active,
        );
        db.insert_rental(holder.clone());
        let svc = service(&db, "2024-01-10T00:00:00Z");
        let extended = svc
            .execute(ExtendRental {
                rental_id: holder.id,
                amount: "3000".parse().unwrap(),
                description: None,
                duration: None,
            })
            .await
            .unwrap();

        let merged = svc
            .execute(AssignCells {
                start_date: Some(at("2024-01-10T00:00:00Z").coerce()),
                end_date: Some(at("2024-01-20T00:00:00Z").coerce()),
                ..assign(&[x, y], client_id)
            })
            .await
            .unwrap();

        assert_eq!(merged.id, holder.id);
        assert_eq!(merged.cell_ids, BTreeSet::from([x, y]));
        assert_eq!(merged.start_date, extended.start_date);
        assert_eq!(merged.end_date, extended.end_date);
        assert_eq!(merged.extension_count, extended.extension_count);
        assert_eq!(merged.last_extended_at, extended.last_extended_at);
        assert_eq!(db.rentals(), vec![merged]);
    }

    #[tokio::test]
    async fn reuses_cells_of_closed_rentals() {
        let db = Memory::new();
        let x = stored_cell(&db, "X");
        db.insert_rental(rental_of(
            stored_client(&db, true),
            &[x],
            ("2023-01-01T00:00:00Z", "2023-03-01T00:00:00Z"),
            Status::Closed,
        ));
        let svc = service(&db, "2024-01-10T00:00:00Z");

        let rental =
            svc.execute(assign(&[x], stored_client(&db, true))).await.unwrap();

        assert_eq!(db.rentals().len(), 2);
        assert!(!rental.is_closed());
    }

    #[tokio::test]
    async fn never_double_books_concurrently() {
        let db = Memory::new();
        let x = stored_cell(&db, "X");
        let svc = service(&db, "2024-01-10T00:00:00Z");

        let results = future::join_all(
            (0..5).map(|_| svc.execute(assign(&[x], stored_client(&db, true)))),
        )
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let holding = db
            .rentals()
            .into_iter()
            .filter(|r| !r.is_closed() && r.cell_ids.contains(&x))
            .count();
        assert_eq!(holding, 1);
    }

    #[tokio::test]
    async fn reassigns_existing_rental() {
        let db = Memory::new();
        let (x, y) = (stored_cell(&db, "X"), stored_cell(&db, "Y"));
        let rental = rental_of(
            stored_client(&db, true),
            &[x],
            ("2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z"),
            Status::Active,
        );
        db.insert_rental(rental.clone());
        let new_client = stored_client(&db, true);
        let svc = service(&db, "2024-01-10T00:00:00Z");

        let updated = svc
            .execute(AssignCells {
                rental_id: Some(rental.id),
                ..assign(&[y], new_client)
            })
            .await
            .unwrap();

        assert_eq!(updated.id, rental.id);
        assert_eq!(updated.client_id, new_client);
        assert_eq!(updated.cell_ids, BTreeSet::from([y]));
        assert_eq!(db.rentals(), vec![updated]);
    }

    #[tokio::test]
    async fn validates_input() {
        let db = Memory::new();
        let x = stored_cell(&db, "X");
        let client_id = stored_client(&db, true);
        let svc = service(&db, "2024-01-10T00:00:00Z");

        let err = svc.execute(assign(&[], client_id)).await.unwrap_err();
        assert_eq!(err.kind(), Kind::Validation);

        let err = svc
            .execute(AssignCells {
                end_date: Some(at("2024-01-01T00:00:00Z").coerce()),
                ..assign(&[x], client_id)
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Kind::Validation);

        let err = svc
            .execute(assign(&[cell::Id::new()], client_id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Kind::NotFound);

        let err = svc
            .execute(assign(&[x], client::Id::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Kind::NotFound);
        assert!(db.rentals().is_empty());
    }
}

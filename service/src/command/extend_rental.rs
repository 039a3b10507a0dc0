//! [`Command`] for extending a [`Rental`] with a paid [`Period`].

use std::collections::HashMap;

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    Clock, Money,
};
use derive_more::{Display, Error, From};
use itertools::Itertools as _;
use tracerr::Traced;

use crate::{
    domain::{
        cell, client,
        payment::{self, Period},
        rental, Cell, Client, Payment, Rental,
    },
    error::{Categorize, Kind},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for extending a [`Rental`] with a paid [`Period`].
///
/// Records a succeeded [`Payment`] and moves the [`Rental`] end date forward,
/// reactivating the [`Rental`] from now if it has expired or closed already.
#[derive(Clone, Debug)]
pub struct ExtendRental {
    /// ID of the [`Rental`] to extend.
    pub rental_id: rental::Id,

    /// Paid amount.
    pub amount: Money,

    /// [`payment::Description`] of the [`Payment`], if any.
    ///
    /// Lists the extended [`Cell`]s by default.
    pub description: Option<payment::Description>,

    /// [`Period`] to extend the [`Rental`] by.
    ///
    /// [`Period::DEFAULT`] is used if [`None`].
    pub duration: Option<Period>,
}

impl<Db, Clk> Command<ExtendRental> for Service<Db, Clk>
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
            Select<By<Option<Client>, client::Id>>,
            Ok = Option<Client>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<HashMap<cell::Id, Cell>, Vec<cell::Id>>>,
            Ok = HashMap<cell::Id, Cell>,
            Err = Traced<database::Error>,
        > + Database<Insert<Payment>, Err = Traced<database::Error>>
        + Database<Update<Rental>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Clk: Clock,
{
    type Ok = Rental;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: ExtendRental) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ExtendRental {
            rental_id,
            amount,
            description,
            duration,
        } = cmd;
        let period = duration.unwrap_or(Period::DEFAULT);
        let now = self.clock().now();

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

        let client = tx
            .execute(Select(By::<Option<Client>, _>::new(rental.client_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ClientNotExists(rental.client_id))
            .map_err(tracerr::wrap!())?;
        if !client.is_billable() {
            return Err(tracerr::new!(E::ClientNotBillable(client.id)));
        }

        let description = if let Some(d) = description {
            d
        } else {
            let cells = tx
                .execute(Select(By::<HashMap<cell::Id, Cell>, _>::new(
                    rental.cell_ids.iter().copied().collect::<Vec<_>>(),
                )))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            let names = rental
                .cell_ids
                .iter()
                .filter_map(|id| cells.get(id))
                .map(|c| &c.name)
                .join(", ");
            payment::Description::new(format!("Extension of cells {names}"))
                .unwrap_or_default()
        };

        let payment = Payment {
            id: payment::Id::new(),
            rental_id: Some(rental.id),
            amount,
            description,
            period: Some(period),
            rental_duration: None,
            status: payment::Status::Succeeded,
            created_at: now.coerce(),
        };
        tx.execute(Insert(payment))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        rental
            .extend(period, now)
            .map_err(tracerr::from_and_wrap!(=> E))?;

        tx.execute(Update(rental.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(rental)
    }
}

/// Error of [`ExtendRental`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Client`] has no billable account linked.
    #[display("`Client(id: {_0})` has no linked account to be billed")]
    ClientNotBillable(#[error(not(source))] client::Id),

    /// [`Client`] with the provided ID does not exist.
    #[display("`Client(id: {_0})` does not exist")]
    ClientNotExists(#[error(not(source))] client::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Period`] pushes the [`Rental`] end date out of range.
    #[display("Failed to extend `Rental`: {_0}")]
    #[from]
    Overflow(rental::Overflow),

    /// [`Rental`] with the provided ID does not exist.
    #[display("`Rental(id: {_0})` does not exist")]
    RentalNotExists(#[error(not(source))] rental::Id),
}

impl Categorize for ExecutionError {
    fn kind(&self) -> Kind {
        match self {
            Self::ClientNotBillable(_) => Kind::BusinessRule,
            Self::ClientNotExists(_) | Self::RentalNotExists(_) => {
                Kind::NotFound
            }
            Self::Db(e) => e.kind(),
            Self::Overflow(_) => Kind::Validation,
        }
    }
}

//! In-memory [`Database`] implementation.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use common::operations::{
    By, Commit, Delete, Insert, Lock, Select, Transact, Update,
};
use derive_more::{Display, Error as StdError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracerr::Traced;

use crate::{
    domain::{cell, client, payment, rental, Cell, Client, Payment, Rental},
    infra::{database, Database},
    read,
};

/// In-memory [`Database`] client.
///
/// Transactions are serialized: a [`Tx`] works on its own copy of the
/// [`State`], which replaces the shared one on [`Commit`] and is discarded
/// once the [`Tx`] is dropped otherwise.
#[derive(Clone, Debug, Default)]
pub struct Memory<T = NonTx>(T);

impl Memory {
    /// Creates a new empty [`Memory`] client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the provided [`Client`].
    pub fn insert_client(&self, client: Client) {
        _ = self.state().clients.insert(client.id, client);
    }

    /// Stores the provided [`read::cell::Listing`] along with its [`Cell`].
    pub fn insert_cell(&self, listing: read::cell::Listing) {
        _ = self.state().cells.insert(listing.cell.id, listing);
    }

    /// Stores the provided [`Rental`] as is.
    pub fn insert_rental(&self, rental: Rental) {
        _ = self.state().rentals.insert(rental.id, rental);
    }

    /// Stores the provided [`Payment`] as is.
    pub fn insert_payment(&self, payment: Payment) {
        _ = self.state().payments.insert(payment.id, payment);
    }

    /// Makes every read of the [`Rental`] with the provided ID fail.
    pub fn make_unavailable(&self, id: rental::Id) {
        _ = lock(&self.0 .0.unavailable).insert(id);
    }

    /// Returns all the stored [`Rental`]s.
    #[must_use]
    pub fn rentals(&self) -> Vec<Rental> {
        self.state().rentals.values().cloned().collect()
    }

    /// Returns all the stored [`Payment`]s.
    #[must_use]
    pub fn payments(&self) -> Vec<Payment> {
        self.state().payments.values().cloned().collect()
    }
}

/// Data stored in a [`Memory`] client.
#[derive(Clone, Debug, Default)]
pub struct State {
    /// Stored [`Client`]s.
    pub clients: HashMap<client::Id, Client>,

    /// Stored [`Cell`]s along with their reference data.
    pub cells: HashMap<cell::Id, read::cell::Listing>,

    /// Stored [`Rental`]s.
    pub rentals: HashMap<rental::Id, Rental>,

    /// Stored [`Payment`]s.
    pub payments: HashMap<payment::Id, Payment>,
}

impl State {
    /// Indicates whether the [`Cell`] with the provided ID is occupied by a
    /// non-closed [`Rental`].
    fn is_occupied(&self, id: cell::Id) -> bool {
        self.rentals
            .values()
            .any(|r| !r.is_closed() && r.cell_ids.contains(&id))
    }
}

/// State shared between all the clones of a [`Memory`] client.
#[derive(Debug, Default)]
struct Shared {
    /// Committed [`State`].
    state: Mutex<State>,

    /// Lock held by the active [`Tx`], if any.
    tx_lock: Arc<AsyncMutex<()>>,

    /// IDs of the [`Rental`]s failing to be read.
    unavailable: Mutex<HashSet<rental::Id>>,
}

/// Non-transactional [`Memory`] client.
#[derive(Clone, Debug, Default)]
pub struct NonTx(Arc<Shared>);

/// Transactional [`Memory`] client.
#[derive(Clone, Debug)]
pub struct Tx(Arc<TxInner>);

/// Inner representation of a [`Tx`] client.
#[derive(Debug)]
struct TxInner {
    /// [`Shared`] state to [`Commit`] into.
    shared: Arc<Shared>,

    /// [`State`] staged by this [`Tx`].
    staged: Mutex<State>,

    /// Guard serializing transactions.
    _guard: OwnedMutexGuard<()>,
}

/// Access to the [`State`] of a [`Memory`] client.
pub trait Access {
    /// Returns the [`State`] visible to this client.
    fn state(&self) -> MutexGuard<'_, State>;

    /// Checks whether the [`Rental`] with the provided ID can be read.
    ///
    /// # Errors
    ///
    /// If the [`Rental`] was made unavailable.
    fn check(&self, id: rental::Id) -> Result<(), Traced<database::Error>>;
}

impl Access for NonTx {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.0.state)
    }

    fn check(&self, id: rental::Id) -> Result<(), Traced<database::Error>> {
        self.0.check(id)
    }
}

impl Access for Tx {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.0.staged)
    }

    fn check(&self, id: rental::Id) -> Result<(), Traced<database::Error>> {
        self.0.shared.check(id)
    }
}

impl<A: Access> Memory<A> {
    /// Returns the [`State`] visible to this [`Memory`] client.
    fn state(&self) -> MutexGuard<'_, State> {
        self.0.state()
    }
}

impl Shared {
    /// Checks whether the [`Rental`] with the provided ID can be read.
    fn check(&self, id: rental::Id) -> Result<(), Traced<database::Error>> {
        if lock(&self.unavailable).contains(&id) {
            return Err(tracerr::new!(database::Error::from(
                Error::Unavailable(id)
            )));
        }
        Ok(())
    }
}

/// Locks the provided [`Mutex`] ignoring its poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Memory`] database [`Error`].
#[derive(Debug, Display, StdError)]
pub enum Error {
    /// [`Rental`] was made unavailable.
    #[display("`Rental(id: {_0})` is unavailable")]
    Unavailable(#[error(not(source))] rental::Id),
}

impl Database<Transact> for Memory<NonTx> {
    type Ok = Memory<Tx>;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        let shared = Arc::clone(&self.0 .0);
        let guard = Arc::clone(&shared.tx_lock).lock_owned().await;
        let staged = lock(&shared.state).clone();
        Ok(Memory(Tx(Arc::new(TxInner {
            shared,
            staged: Mutex::new(staged),
            _guard: guard,
        }))))
    }
}

impl Database<Transact> for Memory<Tx> {
    type Ok = Self;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(self.clone())
    }
}

impl Database<Commit> for Memory<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        let staged = self.state().clone();
        *lock(&self.0 .0.shared.state) = staged;
        Ok(())
    }
}

impl<A: Access> Database<Select<By<Option<Rental>, rental::Id>>> for Memory<A> {
    type Ok = Option<Rental>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Rental>, rental::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0.check(id).map_err(tracerr::wrap!())?;
        Ok(self.state().rentals.get(&id).cloned())
    }
}

impl<A: Access> Database<Select<By<Vec<Rental>, read::rental::Occupying>>>
    for Memory<A>
{
    type Ok = Vec<Rental>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Rental>, read::rental::Occupying>>,
    ) -> Result<Self::Ok, Self::Err> {
        let read::rental::Occupying { cell_ids, except } = by.into_inner();
        Ok(self
            .state()
            .rentals
            .values()
            .filter(|r| {
                !r.is_closed()
                    && Some(r.id) != except
                    && cell_ids.iter().any(|id| r.cell_ids.contains(id))
            })
            .cloned()
            .collect())
    }
}

impl<A: Access> Database<Select<By<Vec<rental::Id>, ()>>> for Memory<A> {
    type Ok = Vec<rental::Id>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Select<By<Vec<rental::Id>, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.state().rentals.keys().copied().collect())
    }
}

impl<A: Access> Database<Insert<Rental>> for Memory<A> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(rental): Insert<Rental>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(rental)).await.map_err(tracerr::wrap!())
    }
}

impl<A: Access> Database<Update<Rental>> for Memory<A> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(rental): Update<Rental>,
    ) -> Result<Self::Ok, Self::Err> {
        _ = self.state().rentals.insert(rental.id, rental);
        Ok(())
    }
}

impl<A: Access> Database<Delete<By<Rental, rental::Id>>> for Memory<A> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Rental, rental::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        let mut state = self.state();
        _ = state.rentals.remove(&id);
        state
            .payments
            .values_mut()
            .filter(|p| p.rental_id == Some(id))
            .for_each(|p| p.rental_id = None);
        Ok(())
    }
}

impl<A: Access> Database<Lock<By<Rental, rental::Id>>> for Memory<A> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Rental, rental::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Transactions are serialized already.
        Ok(())
    }
}

impl<A: Access> Database<Lock<By<Cell, cell::Id>>> for Memory<A> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Cell, cell::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Transactions are serialized already.
        Ok(())
    }
}

impl<A, IDs> Database<Select<By<HashMap<cell::Id, Cell>, IDs>>> for Memory<A>
where
    A: Access,
    IDs: AsRef<[cell::Id]>,
{
    type Ok = HashMap<cell::Id, Cell>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<HashMap<cell::Id, Cell>, IDs>>,
    ) -> Result<Self::Ok, Self::Err> {
        let ids = by.into_inner();
        let state = self.state();
        Ok(ids
            .as_ref()
            .iter()
            .filter_map(|id| state.cells.get(id))
            .map(|l| (l.cell.id, l.cell.clone()))
            .collect())
    }
}

impl<A: Access> Database<Select<By<Option<Client>, client::Id>>> for Memory<A> {
    type Ok = Option<Client>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Client>, client::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.state().clients.get(&by.into_inner()).cloned())
    }
}

impl<A: Access> Database<Select<By<Vec<Payment>, rental::Id>>> for Memory<A> {
    type Ok = Vec<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Payment>, rental::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        let mut payments = self
            .state()
            .payments
            .values()
            .filter(|p| p.rental_id == Some(id))
            .cloned()
            .collect::<Vec<_>>();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}

impl<A: Access> Database<Select<By<Option<Payment>, payment::Id>>>
    for Memory<A>
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.state().payments.get(&by.into_inner()).cloned())
    }
}

impl<A: Access> Database<Insert<Payment>> for Memory<A> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(payment): Insert<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        _ = self.state().payments.insert(payment.id, payment);
        Ok(())
    }
}

impl<A: Access> Database<Delete<By<Payment, payment::Id>>> for Memory<A> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Payment, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        _ = self.state().payments.remove(&by.into_inner());
        Ok(())
    }
}

impl<A: Access>
    Database<Select<By<read::cell::list::Page, read::cell::list::Selector>>>
    for Memory<A>
{
    type Ok = read::cell::list::Page;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<read::cell::list::Page, read::cell::list::Selector>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::cell::list::Selector {
            arguments,
            filter,
            sort,
        } = by.into_inner();

        let state = self.state();
        let mut free = state
            .cells
            .values()
            .filter(|l| !state.is_occupied(l.cell.id) && filter.matches(l))
            .cloned()
            .collect::<Vec<_>>();
        drop(state);

        read::cell::list::sort(&mut free, sort);
        let total = free.len();
        Ok(read::cell::list::Page::new(
            arguments,
            free.into_iter()
                .skip(arguments.offset())
                .take(arguments.limit()),
            total,
        ))
    }
}

//! [`Rental`]-related [`Database`] implementations.

use common::operations::{By, Delete, Insert, Lock, Select, Update};
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{cell, rental, Rental},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read,
};

/// Columns of a [`Rental`] selected from the `rentals r` table.
const COLUMNS: &str = "\
    r.id, r.client_id, r.start_date, r.end_date, r.status, \
    r.closed_at, r.last_extended_at, r.extension_count, r.created_at, \
    ARRAY(SELECT rc.cell_id \
          FROM rental_cells rc \
          WHERE rc.rental_id = r.id) AS cell_ids";

/// Builds a [`Rental`] out of the provided [`Row`] selected with [`COLUMNS`].
fn from_row(row: &Row) -> Rental {
    Rental {
        id: row.get("id"),
        client_id: row.get("client_id"),
        cell_ids: row
            .get::<_, Vec<cell::Id>>("cell_ids")
            .into_iter()
            .collect(),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        status: row.get("status"),
        closed_at: row.get("closed_at"),
        last_extended_at: row.get("last_extended_at"),
        extension_count: row.get("extension_count"),
        created_at: row.get("created_at"),
    }
}

impl<C> Database<Select<By<Option<Rental>, rental::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Rental>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Rental>, rental::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: rental::Id = by.into_inner();

        let sql = format!(
            "SELECT {COLUMNS} \
             FROM rentals r \
             WHERE r.id = $1::UUID"
        );
        Ok(self
            .query_opt(&sql, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Select<By<Vec<Rental>, read::rental::Occupying>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<Rental>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Rental>, read::rental::Occupying>>,
    ) -> Result<Self::Ok, Self::Err> {
        let read::rental::Occupying { cell_ids, except } = by.into_inner();
        if cell_ids.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "SELECT {COLUMNS} \
             FROM rentals r \
             WHERE r.status <> $1::INT2 \
               AND ($2::UUID IS NULL OR r.id <> $2::UUID) \
               AND EXISTS (SELECT 1 \
                           FROM rental_cells rc \
                           WHERE rc.rental_id = r.id \
                             AND rc.cell_id = ANY($3::UUID[]))"
        );
        Ok(self
            .query(&sql, &[&rental::Status::Closed, &except, &cell_ids])
            .await
            .map_err(tracerr::wrap!())?
            .iter()
            .map(from_row)
            .collect())
    }
}

impl<C> Database<Select<By<Vec<rental::Id>, ()>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<rental::Id>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Select<By<Vec<rental::Id>, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        const SQL: &str = "\
            SELECT id \
            FROM rentals";
        Ok(self
            .query(SQL, &[])
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| row.get("id"))
            .collect())
    }
}

impl<C> Database<Insert<Rental>> for Postgres<C>
where
    C: Connection,
    Self: Database<Update<Rental>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(rental): Insert<Rental>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(rental)).await.map_err(tracerr::wrap!())
    }
}

impl<C> Database<Update<Rental>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(rental): Update<Rental>,
    ) -> Result<Self::Ok, Self::Err> {
        let Rental {
            id,
            client_id,
            cell_ids,
            start_date,
            end_date,
            status,
            closed_at,
            last_extended_at,
            extension_count,
            created_at,
        } = rental;
        let cell_ids = cell_ids.into_iter().collect::<Vec<_>>();

        const SQL: &str = "\
            INSERT INTO rentals (\
                id, client_id, start_date, end_date, status, \
                closed_at, last_extended_at, extension_count, created_at\
            ) VALUES (\
                $1::UUID, $2::UUID, $3::TIMESTAMPTZ, $4::TIMESTAMPTZ, \
                $5::INT2, \
                $6::TIMESTAMPTZ, $7::TIMESTAMPTZ, $8::INT4, $9::TIMESTAMPTZ\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET client_id = EXCLUDED.client_id, \
                start_date = EXCLUDED.start_date, \
                end_date = EXCLUDED.end_date, \
                status = EXCLUDED.status, \
                closed_at = EXCLUDED.closed_at, \
                last_extended_at = EXCLUDED.last_extended_at, \
                extension_count = EXCLUDED.extension_count";
        self.exec(
            SQL,
            &[
                &id,
                &client_id,
                &start_date,
                &end_date,
                &status,
                &closed_at,
                &last_extended_at,
                &extension_count,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)?;

        const DETACH_SQL: &str = "\
            DELETE FROM rental_cells \
            WHERE rental_id = $1::UUID \
              AND cell_id <> ALL($2::UUID[])";
        self.exec(DETACH_SQL, &[&id, &cell_ids])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;

        const ATTACH_SQL: &str = "\
            INSERT INTO rental_cells (rental_id, cell_id) \
            SELECT $1::UUID, unnest($2::UUID[]) \
            ON CONFLICT (rental_id, cell_id) DO NOTHING";
        self.exec(ATTACH_SQL, &[&id, &cell_ids])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Delete<By<Rental, rental::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Rental, rental::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: rental::Id = by.into_inner();

        // `payments` are detached and `rental_cells` are removed by the
        // foreign keys.
        const SQL: &str = "\
            DELETE FROM rentals \
            WHERE id = $1::UUID";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Lock<By<Rental, rental::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Rental, rental::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: rental::Id = by.into_inner();

        // Upserting locks the row until the transaction ends, even if it
        // exists already.
        const SQL: &str = "\
            INSERT INTO rentals_lock \
            VALUES ($1::UUID) \
            ON CONFLICT (id) DO UPDATE \
            SET id = EXCLUDED.id";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

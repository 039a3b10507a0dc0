//! [`Payment`]-related [`Database`] implementations.

use common::operations::{By, Delete, Insert, Select};
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{
        payment::{self, Period},
        rental, Payment,
    },
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

/// Builds a [`Payment`] out of the provided [`Row`].
fn from_row(row: &Row) -> Payment {
    let period_value = row.get::<_, Option<i32>>("period_value");
    let period_unit = row.get::<_, Option<payment::Unit>>("period_unit");
    Payment {
        id: row.get("id"),
        rental_id: row.get("rental_id"),
        amount: row.get("amount"),
        description: row.get("description"),
        period: period_value.zip(period_unit).and_then(|(value, unit)| {
            Period::new(u32::try_from(value).ok()?, unit)
        }),
        rental_duration: row.get("rental_duration"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

impl<C> Database<Select<By<Vec<Payment>, rental::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Payment>, rental::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let rental_id: rental::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id, rental_id, amount, description, \
                   period_value, period_unit, rental_duration, \
                   status, created_at \
            FROM payments \
            WHERE rental_id = $1::UUID \
            ORDER BY created_at ASC, id ASC";
        Ok(self
            .query(SQL, &[&rental_id])
            .await
            .map_err(tracerr::wrap!())?
            .iter()
            .map(from_row)
            .collect())
    }
}

impl<C> Database<Select<By<Option<Payment>, payment::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: payment::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id, rental_id, amount, description, \
                   period_value, period_unit, rental_duration, \
                   status, created_at \
            FROM payments \
            WHERE id = $1::UUID";
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Insert<Payment>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(payment): Insert<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        let Payment {
            id,
            rental_id,
            amount,
            description,
            period,
            rental_duration,
            status,
            created_at,
        } = payment;
        let period_value = period
            .map(|p| i32::try_from(p.value()).unwrap_or(i32::MAX));
        let period_unit = period.map(Period::unit);

        const SQL: &str = "\
            INSERT INTO payments (\
                id, rental_id, amount, description, \
                period_value, period_unit, rental_duration, \
                status, created_at\
            ) VALUES (\
                $1::UUID, $2::UUID, $3::NUMERIC, $4::VARCHAR, \
                $5::INT4, $6::INT2, $7::INT4, \
                $8::INT2, $9::TIMESTAMPTZ\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET rental_id = EXCLUDED.rental_id, \
                amount = EXCLUDED.amount, \
                description = EXCLUDED.description, \
                period_value = EXCLUDED.period_value, \
                period_unit = EXCLUDED.period_unit, \
                rental_duration = EXCLUDED.rental_duration, \
                status = EXCLUDED.status";
        self.exec(
            SQL,
            &[
                &id,
                &rental_id,
                &amount,
                &description,
                &period_value,
                &period_unit,
                &rental_duration,
                &status,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Delete<By<Payment, payment::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Payment, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: payment::Id = by.into_inner();

        const SQL: &str = "\
            DELETE FROM payments \
            WHERE id = $1::UUID";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

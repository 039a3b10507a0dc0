//! [`Cell`]-related [`Database`] implementations.

use std::collections::HashMap;

use common::operations::{By, Lock, Select};
use itertools::Itertools as _;
use postgres_types::ToSql;
use tracerr::Traced;

use crate::{
    domain::{cell, rental, Cell},
    infra::{
        database::{
            self,
            postgres::{Connection, FuzzPattern},
            Postgres,
        },
        Database,
    },
    read,
};

impl<C, IDs> Database<Select<By<HashMap<cell::Id, Cell>, IDs>>> for Postgres<C>
where
    C: Connection,
    IDs: AsRef<[cell::Id]>,
{
    type Ok = HashMap<cell::Id, Cell>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<HashMap<cell::Id, Cell>, IDs>>,
    ) -> Result<Self::Ok, Self::Err> {
        let ids = by.into_inner();
        // Avoid subtle change for SQL.
        let ids: &[cell::Id] = ids.as_ref();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        const SQL: &str = "\
            SELECT id, name, comment, size_id, container_id \
            FROM cells \
            WHERE id = ANY($1::UUID[])";
        Ok(self
            .query(SQL, &[&ids])
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| {
                let id = row.get("id");
                (
                    id,
                    Cell {
                        id,
                        name: row.get("name"),
                        comment: row.get("comment"),
                        size_id: row.get("size_id"),
                        container_id: row.get("container_id"),
                    },
                )
            })
            .collect())
    }
}

impl<C> Database<Lock<By<Cell, cell::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Cell, cell::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: cell::Id = by.into_inner();

        // Upserting locks the row until the transaction ends, even if it
        // exists already.
        const SQL: &str = "\
            INSERT INTO cells_lock \
            VALUES ($1::UUID) \
            ON CONFLICT (id) DO UPDATE \
            SET id = EXCLUDED.id";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Select<By<read::cell::list::Page, read::cell::list::Selector>>>
    for Postgres<C>
where
    C: Connection,
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
            filter:
                read::cell::list::Filter {
                    search,
                    location_id,
                    size_id,
                },
            sort,
        } = by.into_inner();

        let closed = rental::Status::Closed;
        let mut ps: Vec<&(dyn ToSql + Sync)> = vec![&closed];

        let location_idx = location_id.as_ref().map(|id| {
            ps.push(id);
            ps.len()
        });
        let size_idx = size_id.as_ref().map(|id| {
            ps.push(id);
            ps.len()
        });

        let pattern = search.as_ref().map(|s| FuzzPattern::new(s.words()));
        let pattern_idx = pattern.as_ref().map(|p| {
            ps.push(p);
            ps.len()
        });
        let numbers = search
            .as_ref()
            .map(|s| s.numbers().collect::<Vec<_>>())
            .filter(|n| !n.is_empty());
        let numbers_idx = numbers.as_ref().map(|n| {
            ps.push(n);
            ps.len()
        });

        let conditions = format!(
            "NOT EXISTS (SELECT 1 \
                         FROM rental_cells rc \
                         INNER JOIN rentals r ON r.id = rc.rental_id \
                         WHERE rc.cell_id = c.id \
                           AND r.status <> $1::INT2) \
             {location_filtering} \
             {size_filtering} \
             {search_filtering}",
            location_filtering =
                location_idx.into_iter().format_with("", |idx, f| {
                    f(&format_args!("AND l.id = ${idx}::UUID"))
                }),
            size_filtering = size_idx.into_iter().format_with("", |idx, f| {
                f(&format_args!("AND c.size_id = ${idx}::UUID"))
            }),
            search_filtering =
                pattern_idx.into_iter().format_with("", |idx, f| {
                    let labels = [
                        "c.name",
                        "c.comment",
                        "s.name",
                        "s.short_name",
                        "l.name",
                        "l.short_name",
                        "l.address",
                        "ct.title",
                        "ct.short_name",
                    ]
                    .into_iter()
                    .format_with(" OR ", |label, f| {
                        f(&format_args!(
                            "LOWER(COALESCE({label}, '')) \
                             SIMILAR TO LOWER(${idx}::VARCHAR)"
                        ))
                    });
                    let numbers = numbers_idx.into_iter().format_with(
                        "",
                        |idx, f| {
                            f(&format_args!(
                                " OR cn.number = ANY(${idx}::INT4[])"
                            ))
                        },
                    );
                    f(&format_args!("AND ({labels}{numbers})"))
                }),
        );
        const FROM: &str = "\
            FROM cells c \
            INNER JOIN sizes s ON s.id = c.size_id \
            INNER JOIN containers cn ON cn.id = c.container_id \
            INNER JOIN locations l ON l.id = cn.location_id \
            INNER JOIN cities ct ON ct.id = l.city_id";

        let total = self
            .query_opt(
                &format!("SELECT COUNT(*)::INT8 {FROM} WHERE {conditions}"),
                ps.as_slice(),
            )
            .await
            .map_err(tracerr::wrap!())?
            .map_or(0, |row| row.get::<_, i64>(0));

        let limit = i64::try_from(arguments.limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(arguments.offset()).unwrap_or(i64::MAX);
        ps.push(&limit);
        let limit_idx = ps.len();
        ps.push(&offset);
        let offset_idx = ps.len();

        let sql = format!(
            "SELECT c.id, c.name, c.comment, c.size_id, c.container_id, \
                    s.name AS size_name, s.short_name AS size_short_name, \
                    cn.number AS container_number, \
                    l.id AS location_id, l.name AS location_name, \
                    l.short_name AS location_short_name, \
                    l.address AS location_address, \
                    ct.title AS city_title, \
                    ct.short_name AS city_short_name \
             {FROM} \
             WHERE {conditions} \
             ORDER BY {field} {order}, c.id ASC \
             LIMIT ${limit_idx}::INT8 \
             OFFSET ${offset_idx}::INT8",
            field = sort.by.sql(),
            order = sort.order.sql(),
        );
        let items = self
            .query(&sql, ps.as_slice())
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| read::cell::Listing {
                cell: Cell {
                    id: row.get("id"),
                    name: row.get("name"),
                    comment: row.get("comment"),
                    size_id: row.get("size_id"),
                    container_id: row.get("container_id"),
                },
                size_name: row.get("size_name"),
                size_short_name: row.get("size_short_name"),
                container_number: row.get("container_number"),
                location_id: row.get("location_id"),
                location_name: row.get("location_name"),
                location_short_name: row.get("location_short_name"),
                location_address: row.get("location_address"),
                city_title: row.get("city_title"),
                city_short_name: row.get("city_short_name"),
            })
            .collect::<Vec<_>>();

        Ok(read::cell::list::Page::new(
            arguments,
            items,
            usize::try_from(total).unwrap_or_default(),
        ))
    }
}

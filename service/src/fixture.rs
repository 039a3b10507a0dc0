//! Shared builders of test data.

use std::collections::BTreeSet;

use common::{DateTime, FixedClock};

use crate::{
    domain::{
        cell, client, payment,
        rental::{self, ExtensionCount, Status},
        Cell, Client, Payment, Rental,
    },
    infra::Memory,
    read::cell::Listing,
    Config, Service,
};

/// Parses the provided RFC 3339 string.
pub(crate) fn at(s: &str) -> DateTime {
    DateTime::from_rfc3339(s).unwrap()
}

/// Creates a [`Service`] over the provided [`Memory`] frozen at `now`.
pub(crate) fn service(db: &Memory, now: &str) -> Service<Memory, FixedClock> {
    Service::with_clock(Config::default(), db.clone(), FixedClock(at(now)))
}

/// Creates a [`Listing`] of a new [`Cell`] with the provided name.
pub(crate) fn listing(name: &str, location: &str) -> Listing {
    Listing {
        cell: Cell {
            id: cell::Id::new(),
            name: cell::Name::new(name).unwrap(),
            comment: None,
            size_id: cell::SizeId::new(),
            container_id: cell::ContainerId::new(),
        },
        size_name: "S".into(),
        size_short_name: None,
        container_number: 1,
        location_id: cell::LocationId::new(),
        location_name: location.into(),
        location_short_name: None,
        location_address: "Main st. 1".into(),
        city_title: "Minsk".into(),
        city_short_name: None,
    }
}

/// Stores a new [`Cell`] with the provided name and returns its ID.
pub(crate) fn stored_cell(db: &Memory, name: &str) -> cell::Id {
    let listing = listing(name, "North");
    let id = listing.cell.id;
    db.insert_cell(listing);
    id
}

/// Stores a new [`Client`] and returns its ID.
pub(crate) fn stored_client(db: &Memory, billable: bool) -> client::Id {
    let client = Client {
        id: client::Id::new(),
        name: client::Name::new("Ivan").unwrap(),
        account_id: billable.then(client::AccountId::new),
    };
    let id = client.id;
    db.insert_client(client);
    id
}

/// Creates a new [`Rental`] of the provided [`Cell`]s.
pub(crate) fn rental_of(
    client_id: client::Id,
    cell_ids: &[cell::Id],
    (start, end): (&str, &str),
    status: Status,
) -> Rental {
    Rental {
        id: rental::Id::new(),
        client_id,
        cell_ids: cell_ids.iter().copied().collect::<BTreeSet<_>>(),
        start_date: at(start).coerce(),
        end_date: at(end).coerce(),
        status,
        closed_at: (status == Status::Closed).then(|| at(end).coerce()),
        last_extended_at: None,
        extension_count: ExtensionCount::default(),
        created_at: at(start).coerce(),
    }
}

/// Creates a new succeeded [`Payment`] attached to the provided [`Rental`].
pub(crate) fn payment(
    rental_id: rental::Id,
    created_at: &str,
    description: &str,
) -> Payment {
    Payment {
        id: payment::Id::new(),
        rental_id: Some(rental_id),
        amount: "3000".parse().unwrap(),
        description: payment::Description::new(description).unwrap(),
        period: None,
        rental_duration: None,
        status: payment::Status::Succeeded,
        created_at: at(created_at).coerce(),
    }
}

//! [`Cell`] read model definitions.

use crate::domain::{cell, Cell};

/// [`Cell`] along with the labels of the reference data it belongs to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Listing {
    /// Listed [`Cell`].
    pub cell: Cell,

    /// Name of the [`Cell`]'s size.
    pub size_name: String,

    /// Short name of the [`Cell`]'s size, if any.
    pub size_short_name: Option<String>,

    /// Number of the container the [`Cell`] is located in.
    pub container_number: i32,

    /// ID of the location the [`Cell`]'s container stands at.
    pub location_id: cell::LocationId,

    /// Name of the location.
    pub location_name: String,

    /// Short name of the location, if any.
    pub location_short_name: Option<String>,

    /// Address of the location.
    pub location_address: String,

    /// Title of the city the location is in.
    pub city_title: String,

    /// Short name of the city, if any.
    pub city_short_name: Option<String>,
}

pub mod list {
    //! Free [`Cell`]s list definitions.

    use std::cmp::Ordering;

    use common::define_pagination;
    use derive_more::{AsRef, Display};

    use crate::domain::cell;
    #[cfg(doc)]
    use crate::domain::Cell;

    use super::Listing;

    define_pagination!(Listing, Filter, SortField);

    /// Filter for [`Selector`].
    ///
    /// All the specified criteria must be satisfied.
    #[derive(Clone, Debug, Default)]
    pub struct Filter {
        /// Free-text [`Search`] across the [`Listing`] labels.
        pub search: Option<Search>,

        /// ID of the location the [`Cell`] must be at.
        pub location_id: Option<cell::LocationId>,

        /// ID of the size the [`Cell`] must be of.
        pub size_id: Option<cell::SizeId>,
    }

    impl Filter {
        /// Checks whether the provided [`Listing`] satisfies this [`Filter`].
        #[must_use]
        pub fn matches(&self, listing: &Listing) -> bool {
            self.location_id.map_or(true, |id| listing.location_id == id)
                && self.size_id.map_or(true, |id| listing.cell.size_id == id)
                && self.search.as_ref().map_or(true, |s| s.matches(listing))
        }
    }

    /// Free-text search query.
    ///
    /// Matches a [`Listing`] if any of its words is found in any of the
    /// [`Listing`] labels, case-insensitively. Numeric words also match the
    /// container number exactly.
    #[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
    #[as_ref(str)]
    pub struct Search(String);

    impl Search {
        /// Creates a new [`Search`] if the given `query` has any words.
        #[must_use]
        pub fn new(query: impl AsRef<str>) -> Option<Self> {
            let query = query.as_ref().trim();
            (!query.is_empty() && query.len() <= 256)
                .then(|| Self(query.to_owned()))
        }

        /// Returns words of this [`Search`].
        pub fn words(&self) -> impl Iterator<Item = &str> {
            self.0.split_whitespace()
        }

        /// Returns the numeric words of this [`Search`].
        pub fn numbers(&self) -> impl Iterator<Item = i32> + '_ {
            self.words().filter_map(|w| w.parse().ok())
        }

        /// Checks whether the provided [`Listing`] matches this [`Search`].
        #[must_use]
        pub fn matches(&self, listing: &Listing) -> bool {
            let labels = [
                Some(AsRef::<str>::as_ref(&listing.cell.name)),
                listing.cell.comment.as_ref().map(AsRef::<str>::as_ref),
                Some(listing.size_name.as_str()),
                listing.size_short_name.as_deref(),
                Some(listing.location_name.as_str()),
                listing.location_short_name.as_deref(),
                Some(listing.location_address.as_str()),
                Some(listing.city_title.as_str()),
                listing.city_short_name.as_deref(),
            ]
            .into_iter()
            .flatten()
            .map(str::to_lowercase)
            .collect::<Vec<_>>();

            self.words().any(|word| {
                let word = word.to_lowercase();
                labels.iter().any(|l| l.contains(&word))
            }) || self.numbers().any(|n| n == listing.container_number)
        }
    }

    /// Field to sort free [`Cell`]s by.
    #[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
    pub enum SortField {
        /// [`Cell`] name.
        #[default]
        #[display("NAME")]
        Name,

        /// Name of the [`Cell`] size.
        #[display("SIZE_NAME")]
        SizeName,

        /// Name of the location.
        #[display("LOCATION_NAME")]
        LocationName,

        /// Title of the city.
        #[display("CITY_TITLE")]
        CityTitle,
    }

    impl SortField {
        /// Compares two [`Listing`]s by this [`SortField`] in ascending
        /// order.
        #[must_use]
        pub fn compare(self, a: &Listing, b: &Listing) -> Ordering {
            match self {
                Self::Name => AsRef::<str>::as_ref(&a.cell.name)
                    .cmp(AsRef::<str>::as_ref(&b.cell.name)),
                Self::SizeName => a.size_name.cmp(&b.size_name),
                Self::LocationName => a.location_name.cmp(&b.location_name),
                Self::CityTitle => a.city_title.cmp(&b.city_title),
            }
        }

        /// Returns the SQL column to sort by.
        #[cfg(feature = "postgres")]
        #[must_use]
        pub const fn sql(self) -> &'static str {
            match self {
                Self::Name => "c.name",
                Self::SizeName => "s.name",
                Self::LocationName => "l.name",
                Self::CityTitle => "ct.title",
            }
        }
    }

    /// Orders the provided [`Listing`]s according to the provided [`Sort`],
    /// breaking ties by [`cell::Id`].
    pub fn sort(listings: &mut [Listing], sort: Sort) {
        listings.sort_by(|a, b| {
            sort.order
                .apply(sort.by.compare(a, b))
                .then_with(|| a.cell.id.cmp(&b.cell.id))
        });
    }

    #[cfg(test)]
    mod spec {
        use common::pagination::Order;

        use crate::domain::{cell, Cell};

        use super::{sort, Filter, Listing, Search, Sort, SortField};

        fn listing(name: &str, location: &str, number: i32) -> Listing {
            Listing {
                cell: Cell {
                    id: cell::Id::new(),
                    name: cell::Name::new(name).unwrap(),
                    comment: None,
                    size_id: cell::SizeId::new(),
                    container_id: cell::ContainerId::new(),
                },
                size_name: "Small".into(),
                size_short_name: Some("S".into()),
                container_number: number,
                location_id: cell::LocationId::new(),
                location_name: location.into(),
                location_short_name: None,
                location_address: "Lenina 1".into(),
                city_title: "Москва".into(),
                city_short_name: Some("MSK".into()),
            }
        }

        #[test]
        fn searches_any_word_in_any_label() {
            let l = listing("A-12", "Northern", 7);

            for query in ["a-12", "north", "москва", "msk", "foo northern"] {
                let s = Search::new(query).unwrap();
                assert!(s.matches(&l), "query: {query}");
            }
            for query in ["B-1", "southern", "8"] {
                let s = Search::new(query).unwrap();
                assert!(!s.matches(&l), "query: {query}");
            }
        }

        #[test]
        fn searches_container_number_exactly() {
            let l = listing("A-12", "Northern", 7);

            assert!(Search::new("7").unwrap().matches(&l));
            assert!(!Search::new("77").unwrap().matches(&l));
        }

        #[test]
        fn rejects_empty_search() {
            assert!(Search::new("").is_none());
            assert!(Search::new("   ").is_none());
        }

        #[test]
        fn combines_criteria() {
            let l = listing("A-12", "Northern", 7);

            let mut filter = Filter {
                search: Search::new("north"),
                location_id: Some(l.location_id),
                size_id: None,
            };
            assert!(filter.matches(&l));

            filter.size_id = Some(cell::SizeId::new());
            assert!(!filter.matches(&l));
        }

        #[test]
        fn sorts_deterministically() {
            let mut listings = vec![
                listing("B", "Northern", 1),
                listing("A", "Southern", 2),
                listing("A", "Northern", 3),
            ];
            let mut expected = listings.clone();

            sort(
                &mut listings,
                Sort {
                    by: SortField::Name,
                    order: Order::Descending,
                },
            );
            assert_eq!(listings[0].cell.name.to_string(), "B");

            sort(
                &mut listings,
                Sort {
                    by: SortField::LocationName,
                    order: Order::Ascending,
                },
            );
            expected.sort_by(|a, b| {
                a.location_name
                    .cmp(&b.location_name)
                    .then_with(|| a.cell.id.cmp(&b.cell.id))
            });
            assert_eq!(listings, expected);
        }
    }
}

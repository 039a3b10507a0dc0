//! Abstractions for offset pagination.

/// Page of items selected by [`Arguments`].
#[derive(Clone, Debug)]
pub struct Page<T> {
    /// Items on this [`Page`].
    pub items: Vec<T>,

    /// Total number of items matching the filter, across all pages.
    pub total: usize,

    /// [`Arguments`] this [`Page`] was selected with.
    pub arguments: Arguments,
}

impl<T> Page<T> {
    /// Creates a new [`Page`].
    #[must_use]
    pub fn new(
        arguments: Arguments,
        items: impl IntoIterator<Item = T>,
        total: usize,
    ) -> Self {
        Self {
            items: items.into_iter().collect(),
            total,
            arguments,
        }
    }

    /// Returns the number of pages available for the [`Arguments::limit`].
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.arguments.limit())
    }

    /// Indicates whether there are more items after this [`Page`].
    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.arguments.offset() + self.items.len() < self.total
    }
}

/// Pagination arguments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Arguments {
    /// One-based page number.
    page: usize,

    /// Maximum number of items per page.
    limit: usize,
}

impl Arguments {
    /// Maximum allowed [`Arguments::limit`].
    pub const MAX_LIMIT: usize = 500;

    /// Creates new [`Arguments`].
    ///
    /// [`None`] is returned if `page` or `limit` is zero, or `limit` exceeds
    /// [`Arguments::MAX_LIMIT`].
    #[must_use]
    pub fn new(page: usize, limit: usize) -> Option<Self> {
        (page > 0 && limit > 0 && limit <= Self::MAX_LIMIT)
            .then_some(Self { page, limit })
    }

    /// Returns the one-based page number.
    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    /// Returns the maximum number of items per page.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of items to skip before this page.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Arguments {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// Sorting of a list by the `F`ield.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Sort<F> {
    /// Field to sort by.
    pub by: F,

    /// [`Order`] of sorting.
    pub order: Order,
}

/// Order of sorting.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Order {
    /// Ascending order.
    #[default]
    Ascending,

    /// Descending order.
    Descending,
}

impl Order {
    /// Applies this [`Order`] to an ascending [`Ordering`].
    ///
    /// [`Ordering`]: std::cmp::Ordering
    #[must_use]
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }

    #[cfg(feature = "postgres")]
    /// Returns SQL keyword representing this [`Order`].
    #[must_use]
    pub const fn sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Pagination selector.
#[derive(Clone, Debug)]
pub struct Selector<F, S> {
    /// Pagination [`Arguments`].
    pub arguments: Arguments,

    /// Filter being applied to the result.
    pub filter: F,

    /// [`Sort`] being applied to the result.
    pub sort: Sort<S>,
}

/// Defines pagination types.
#[expect(clippy::module_name_repetitions, reason = "more readable")]
#[macro_export]
macro_rules! define_pagination {
    ($node:ty, $filter:ty, $field:ty) => {
        #[doc = "A [`Page`] of nodes."]
        pub type Page = $crate::pagination::Page<$node>;

        #[doc = "Arguments for selecting a [`Page`]."]
        pub type Arguments = $crate::pagination::Arguments;

        #[doc = "Sorting of a [`Page`]."]
        pub type Sort = $crate::pagination::Sort<$field>;

        #[doc = "[`Page`] selector."]
        pub type Selector = $crate::pagination::Selector<$filter, $field>;
    };
}

#[cfg(test)]
mod spec {
    use super::{Arguments, Page};

    #[test]
    fn rejects_invalid_arguments() {
        assert!(Arguments::new(0, 10).is_none());
        assert!(Arguments::new(1, 0).is_none());
        assert!(Arguments::new(1, Arguments::MAX_LIMIT + 1).is_none());
        assert!(Arguments::new(3, Arguments::MAX_LIMIT).is_some());
    }

    #[test]
    fn computes_offset() {
        assert_eq!(Arguments::new(1, 10).unwrap().offset(), 0);
        assert_eq!(Arguments::new(3, 10).unwrap().offset(), 20);
    }

    #[test]
    fn reports_remaining_pages() {
        let args = Arguments::new(2, 10).unwrap();

        let page = Page::new(args, 0..10, 25);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next_page());

        let page = Page::new(Arguments::new(3, 10).unwrap(), 0..5, 25);
        assert!(!page.has_next_page());
    }
}

//! Service contains the rental lifecycle and cell availability logic.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod domain;
pub mod error;
#[cfg(test)]
mod fixture;
pub mod infra;
pub mod query;
pub mod read;
pub mod task;

use common::{
    operations::{By, Start},
    SystemClock,
};
#[cfg(doc)]
use common::Clock;

#[cfg(doc)]
use infra::Database;

pub use self::{
    command::Command,
    error::{Categorize, Kind},
    query::Query,
    task::Task,
};

/// [`Service`] configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    /// [`task::SweepRentalStatuses`] configuration.
    pub sweep_rental_statuses: task::sweep_rental_statuses::Config,
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db, Clk = SystemClock> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,

    /// [`Clock`] of this [`Service`].
    clock: Clk,
}

impl<Db> Service<Db> {
    /// Creates a new [`Service`] with the provided parameters, reading the
    /// system time.
    ///
    /// Returned [`task::Background`] drives the periodic [`Task`]s and must
    /// be awaited.
    pub fn new(config: Config, database: Db) -> (Self, task::Background)
    where
        Self: Task<
                Start<
                    By<
                        task::SweepRentalStatuses<Self>,
                        task::sweep_rental_statuses::Config,
                    >,
                >,
                Ok = (),
                Err: std::error::Error + 'static,
            > + Clone
            + 'static,
    {
        let this = Self::with_clock(config, database, SystemClock);

        let mut bg = task::Background::default();
        let svc = this.clone();
        bg.spawn("sweep_rental_statuses", async move {
            svc.execute(Start(By::new(svc.config().sweep_rental_statuses)))
                .await
        });

        (this, bg)
    }
}

impl<Db, Clk> Service<Db, Clk> {
    /// Creates a new [`Service`] reading the time from the provided
    /// [`Clock`], without spawning any [`Task`]s.
    pub fn with_clock(config: Config, database: Db, clock: Clk) -> Self {
        Self {
            config,
            database,
            clock,
        }
    }

    /// Returns [`Config`] of this [`Service`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }

    /// Returns [`Clock`] of this [`Service`].
    #[must_use]
    pub fn clock(&self) -> &Clk {
        &self.clock
    }
}

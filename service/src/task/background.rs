//! Background runner of the periodic [`Task`]s.

use std::{
    error::Error,
    fmt,
    future::{Future, IntoFuture},
};

use futures::future::{self, FutureExt as _, LocalBoxFuture};
use tokio::task::LocalSet;
use tracing as log;

#[cfg(doc)]
use crate::Task;

/// Type-erased failure of a background [`Task`].
pub type Failure = Box<dyn Error + 'static>;

/// Background runner of the periodic [`Task`]s.
///
/// Spawned [`Task`]s start only once the [`Background`] is awaited, and run
/// on the current thread. The first failed [`Task`] stops the runner.
#[derive(Default)]
pub struct Background {
    /// Named [`Task`]s to be run.
    tasks: Vec<(&'static str, LocalBoxFuture<'static, Result<(), Failure>>)>,
}

impl Background {
    /// Spawns a new [`Task`] with the provided `name` inside this
    /// [`Background`].
    pub fn spawn<F, E>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: Error + 'static,
    {
        let task =
            task.map(|res| res.map_err(|e| -> Failure { Box::new(e) }));
        self.tasks.push((name, task.boxed_local()));
    }
}

impl fmt::Debug for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Background")
            .field(
                "tasks",
                &self.tasks.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl IntoFuture for Background {
    type Output = Result<(), Failure>;
    type IntoFuture = LocalBoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        let set = LocalSet::new();
        let handles = self
            .tasks
            .into_iter()
            .map(|(name, task)| {
                set.spawn_local(task).map(move |res| {
                    res.map_err(Failure::from).and_then(|r| r).inspect_err(
                        |e| log::error!("`{name}` background task failed: {e}"),
                    )
                })
            })
            .collect::<Vec<_>>();

        async move { set.run_until(future::try_join_all(handles)).await }
            .map(|res| res.map(drop))
            .boxed_local()
    }
}

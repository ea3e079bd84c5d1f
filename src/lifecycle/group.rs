//! Run group: long-running actors with first-exit-wins teardown.
//!
//! Each actor is a run future plus an interrupt. The first run future to
//! return decides the group's result. Every interrupt is then called in
//! registration order, and the group waits for all remaining actors.

use futures_util::future::BoxFuture;
use std::future::Future;
use tokio::task::JoinSet;

use crate::error::Error;

type Interrupt = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Actor {
    name: &'static str,
    run: BoxFuture<'static, Result<(), Error>>,
    interrupt: Interrupt,
}

#[derive(Default)]
pub struct RunGroup {
    actors: Vec<Actor>,
}

impl RunGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<R, I, F>(&mut self, name: &'static str, run: R, interrupt: I)
    where
        R: Future<Output = Result<(), Error>> + Send + 'static,
        I: FnOnce() -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        self.actors.push(Actor {
            name,
            run: Box::pin(run),
            interrupt: Box::new(move || Box::pin(interrupt())),
        });
    }

    /// Run every actor until the first returns, then interrupt them all.
    ///
    /// Dropping the returned future aborts every actor still running.
    pub async fn run(self) -> Result<(), Error> {
        let mut tasks = JoinSet::new();
        let mut names = Vec::with_capacity(self.actors.len());
        let mut interrupts = Vec::with_capacity(self.actors.len());
        for (index, actor) in self.actors.into_iter().enumerate() {
            let run = actor.run;
            tasks.spawn(async move { (index, run.await) });
            names.push(actor.name);
            interrupts.push((actor.name, actor.interrupt));
        }

        let result = match tasks.join_next().await {
            None => return Ok(()),
            Some(Ok((index, result))) => {
                match &result {
                    Ok(()) => tracing::info!(actor = names[index], "actor finished, stopping"),
                    Err(e) => tracing::error!(actor = names[index], error = %e, "actor failed, stopping"),
                }
                result
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "actor panicked, stopping");
                Err(Error::Panicked(e.to_string()))
            }
        };

        for (name, interrupt) in interrupts {
            tracing::debug!(actor = name, "interrupting");
            interrupt().await;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(()))) => tracing::debug!(actor = names[index], "actor stopped"),
                Ok((index, Err(e))) => {
                    tracing::warn!(actor = names[index], error = %e, "actor failed while stopping")
                }
                Err(e) => tracing::warn!(error = %e, "actor panicked while stopping"),
            }
        }
        result
    }
}

//! Identity-keyed child runs with parent-close policies.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::task::AbortHandle;

use crate::dispatch::ShipmentReceipt;
use crate::error::SagaError;

/// What happens to a child run when its parent finishes with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentClosePolicy {
    /// The child is aborted.
    #[default]
    Terminate,
    /// The child keeps running.
    Abandon,
}

type SharedResult = Shared<BoxFuture<'static, Result<ShipmentReceipt, SagaError>>>;

struct ChildEntry {
    parent_id: String,
    policy: ParentClosePolicy,
    abort: AbortHandle,
    result: SharedResult,
}

/// Handle to a child run. Cloning it does not start another run.
#[derive(Clone)]
pub struct ChildHandle {
    id: String,
    newly_started: bool,
    result: SharedResult,
}

impl std::fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildHandle")
            .field("id", &self.id)
            .field("newly_started", &self.newly_started)
            .finish_non_exhaustive()
    }
}

impl ChildHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// False if the start call was deduplicated onto an existing run.
    pub fn newly_started(&self) -> bool {
        self.newly_started
    }

    /// Waits for the child's result.
    pub async fn wait(self) -> Result<ShipmentReceipt, SagaError> {
        self.result.await
    }
}

/// Registry of child runs keyed by run id.
///
/// Starting an id whose run is still in flight returns a handle to that run
/// instead of spawning a second one. Once a child has closed its id may be
/// started again.
#[derive(Clone, Default)]
pub struct ChildExecutions {
    children: Arc<Mutex<HashMap<String, ChildEntry>>>,
}

impl std::fmt::Debug for ChildExecutions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildExecutions")
            .field("len", &self.len())
            .finish()
    }
}

impl ChildExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChildEntry>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the child run `id` under `parent_id`, or joins the existing one.
    pub fn start<F>(
        &self,
        id: impl Into<String>,
        parent_id: &str,
        policy: ParentClosePolicy,
        run: F,
    ) -> ChildHandle
    where
        F: Future<Output = Result<ShipmentReceipt, SagaError>> + Send + 'static,
    {
        let id = id.into();
        let mut children = self.lock();
        children.retain(|_, entry| !entry.abort.is_finished());

        if let Some(existing) = children.get(&id) {
            tracing::debug!(child_id = %id, "child run already running, deduplicating");
            return ChildHandle {
                id,
                newly_started: false,
                result: existing.result.clone(),
            };
        }

        let task = tokio::spawn(run);
        let abort = task.abort_handle();
        let child_id = id.clone();
        let result = async move {
            match task.await {
                Ok(result) => result,
                Err(err) => Err(SagaError::ChildTerminated {
                    id: child_id,
                    reason: if err.is_cancelled() {
                        "terminated by parent close policy".to_string()
                    } else {
                        err.to_string()
                    },
                }),
            }
        }
        .boxed()
        .shared();

        children.insert(
            id.clone(),
            ChildEntry {
                parent_id: parent_id.to_string(),
                policy,
                abort,
                result: result.clone(),
            },
        );
        tracing::info!(child_id = %id, parent_id, ?policy, "started child run");

        ChildHandle {
            id,
            newly_started: true,
            result,
        }
    }

    /// Returns a handle to a registered child run.
    pub fn get(&self, id: &str) -> Option<ChildHandle> {
        self.lock().get(id).map(|entry| ChildHandle {
            id: id.to_string(),
            newly_started: false,
            result: entry.result.clone(),
        })
    }

    /// Applies parent-close policies after `parent_id` failed.
    ///
    /// Returns the number of still-running children that were terminated.
    pub fn close_parent(&self, parent_id: &str) -> usize {
        let children = self.lock();
        let mut terminated = 0;
        for (id, entry) in children.iter() {
            if entry.parent_id != parent_id
                || entry.policy != ParentClosePolicy::Terminate
                || entry.abort.is_finished()
            {
                continue;
            }
            entry.abort.abort();
            terminated += 1;
            tracing::info!(child_id = %id, parent_id, "terminated child run");
        }
        terminated
    }

    /// Drops every entry registered under `parent_id` once the parent closed.
    ///
    /// Abandoned children that are still running stay registered. Returns the
    /// number of entries removed.
    pub fn release_parent(&self, parent_id: &str) -> usize {
        let mut children = self.lock();
        let before = children.len();
        children.retain(|_, entry| {
            entry.parent_id != parent_id
                || (entry.policy == ParentClosePolicy::Abandon && !entry.abort.is_finished())
        });
        before - children.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

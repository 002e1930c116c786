//! Parallel Group Runner
//!
//! Launches a set of independent members concurrently and waits for every one
//! of them before reporting. One member's failure never cancels its siblings;
//! all failures are gathered and handed back so the caller can decide which
//! subsets are tolerable.

use crate::types::{AppError, Result};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct MemberFailure {
    pub member: String,
    pub error: AppError,
}

/// Terminal state of every member of a group, in launch order.
#[derive(Debug)]
pub struct GroupReport<T> {
    pub completed: Vec<(String, T)>,
    pub failures: Vec<MemberFailure>,
}

impl<T> GroupReport<T> {
    pub fn failure(&self, member: &str) -> Option<&AppError> {
        self.failures
            .iter()
            .find(|f| f.member == member)
            .map(|f| &f.error)
    }
}

/// A join barrier over concurrently running members.
pub struct ParallelGroup<T> {
    label: String,
    members: Vec<String>,
    tasks: JoinSet<(usize, Result<T>)>,
}

impl<T: Send + 'static> ParallelGroup<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            members: Vec::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Launch `future` as a member of the group. It starts running immediately.
    pub fn spawn<F>(&mut self, member: impl Into<String>, future: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let member = member.into();
        let index = self.members.len();
        let label = member.clone();
        self.members.push(member);

        self.tasks.spawn(async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(AppError::Internal(format!("'{}' panicked", label))),
            };
            (index, result)
        });
    }

    /// Wait for every member to reach a terminal state.
    pub async fn join(self) -> GroupReport<T> {
        self.join_with_deadline(None).await
    }

    /// Wait for every member, up to `deadline`. Members still running when it
    /// expires are aborted and reported as [`AppError::Timeout`].
    pub async fn join_with_deadline(mut self, deadline: Option<Duration>) -> GroupReport<T> {
        let mut results: HashMap<usize, Result<T>> = HashMap::with_capacity(self.members.len());
        let mut timed_out = false;

        let drain = async {
            while let Some(joined) = self.tasks.join_next().await {
                match joined {
                    Ok((index, result)) => {
                        results.insert(index, result);
                    }
                    Err(e) => {
                        tracing::warn!(group = %self.label, error = %e, "Group member did not complete");
                    }
                }
            }
        };

        match deadline {
            Some(limit) => {
                if tokio::time::timeout(limit, drain).await.is_err() {
                    timed_out = true;
                }
            }
            None => drain.await,
        }

        if timed_out {
            self.tasks.abort_all();
            tracing::warn!(
                group = %self.label,
                pending = self.members.len() - results.len(),
                "Deadline expired, aborting outstanding members"
            );
        }

        let mut report = GroupReport {
            completed: Vec::new(),
            failures: Vec::new(),
        };
        for (index, member) in self.members.into_iter().enumerate() {
            match results.remove(&index) {
                Some(Ok(value)) => report.completed.push((member, value)),
                Some(Err(error)) => report.failures.push(MemberFailure { member, error }),
                None if timed_out => report.failures.push(MemberFailure {
                    error: AppError::Timeout(format!("'{}' did not finish in time", member)),
                    member,
                }),
                None => report.failures.push(MemberFailure {
                    error: AppError::Internal(format!("'{}' was cancelled", member)),
                    member,
                }),
            }
        }
        report
    }
}

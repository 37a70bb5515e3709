//! Version-checked mutations and optimistic updates.
//!
//! # Responsibilities
//! - Compare a caller's expected version with the live one under the write lock
//! - Report mismatches as `ConflictError` with the current value at the path
//! - Retry read-compute-write cycles on conflict only
//!
//! # Design Decisions
//! - The check and the mutation share one write-lock acquisition, so no other
//!   writer can slip in between them
//! - Exhausting the retry budget returns the last conflict unchanged

use crate::error::{ConflictError, Error, Result};
use crate::manager::history::Operation;
use crate::manager::mutation::Edit;
use crate::manager::{Manager, State};
use crate::observability::metrics;
use crate::tree::{path, Node};

impl Manager {
    pub(crate) fn check_version(
        &self,
        state: &State,
        at: &str,
        op: Operation,
        expected: i64,
    ) -> Result<()> {
        let current = self.version();
        if current == expected {
            return Ok(());
        }

        metrics::record_conflict(op);
        tracing::warn!(
            op = %op,
            path = %at,
            expected_version = expected,
            current_version = current,
            "Version conflict"
        );

        let current_value = path::resolve(&state.tree, at)
            .ok()
            .and_then(|id| state.tree.to_node(id));
        Err(ConflictError {
            path: at.to_string(),
            operation: op.to_string(),
            expected_version: expected,
            current_version: current,
            current_value,
        }
        .into())
    }

    /// [`Manager::insert`] if the version is still `expected`.
    pub fn conditional_insert(
        &self,
        at: &str,
        index: usize,
        value: impl Into<Node>,
        expected: i64,
    ) -> Result<i64> {
        self.mutate(
            at,
            Some(expected),
            Edit::Insert {
                index,
                value: value.into(),
            },
        )
    }

    /// [`Manager::remove`] if the version is still `expected`.
    pub fn conditional_remove(&self, at: &str, index: usize, expected: i64) -> Result<i64> {
        self.mutate(at, Some(expected), Edit::Remove { index })
    }

    /// [`Manager::replace`] if the version is still `expected`.
    pub fn conditional_replace(&self, at: &str, value: impl Into<Node>, expected: i64) -> Result<i64> {
        self.mutate(
            at,
            Some(expected),
            Edit::Replace {
                value: value.into(),
            },
        )
    }

    /// Alias of [`Manager::conditional_replace`].
    pub fn compare_and_swap(&self, at: &str, expected: i64, value: impl Into<Node>) -> Result<i64> {
        self.conditional_replace(at, value, expected)
    }

    /// Read the value at `path`, compute its successor with `update`, and
    /// replace it if nobody committed in between. Conflicts are retried with
    /// backoff up to the manager's retry policy; other errors are returned
    /// immediately.
    pub fn optimistic_update<F>(&self, at: &str, mut update: F) -> Result<i64>
    where
        F: FnMut(&Node) -> Result<Node>,
    {
        let policy = self.retry_policy();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (version, current) = self.read_versioned(at)?;
            let next = update(&current)?;

            match self.conditional_replace(at, next, version) {
                Err(e) if e.is_conflict() && policy.should_retry(attempt) => {
                    let delay = policy.delay(attempt);
                    tracing::debug!(path = %at, attempt, delay_ms = delay.as_millis() as u64, "Retrying after conflict");
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }

    /// Version and value at `path` from one read-lock acquisition.
    pub fn read_versioned(&self, at: &str) -> Result<(i64, Node)> {
        self.ensure_not_notifying()?;
        let state = self.state.read();
        let id = path::resolve(&state.tree, at)?;
        let node = state.tree.to_node(id).ok_or(Error::Disjoint)?;
        Ok((self.version(), node))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::resilience::RetryPolicy;
    use crate::source::MemorySource;

    fn manager(doc: &str, retry: RetryPolicy) -> Manager {
        Manager::builder(Arc::new(MemorySource::new(doc, "").unwrap()))
            .retry_policy(retry)
            .build()
            .unwrap()
    }

    #[test]
    fn test_conditional_replace_checks_version() {
        let m = manager(r#"{"limit": 1}"#, RetryPolicy::default());
        m.register_replace("/limit", |_| Ok(())).unwrap();

        assert_eq!(m.conditional_replace("/limit", 2, 1).unwrap(), 2);

        let err = m.compare_and_swap("/limit", 1, 3).unwrap_err();
        let conflict = err.conflict().expect("conflict");
        assert_eq!(conflict.expected_version, 1);
        assert_eq!(conflict.current_version, 2);
        assert_eq!(conflict.current_value, Some(Node::Integer(2)));
        assert_eq!(conflict.operation, "replace");
        assert_eq!(m.version(), 2);
    }

    #[test]
    fn test_optimistic_update_retries_conflicts() {
        let m = Arc::new(manager(r#"{"counter": 0}"#, RetryPolicy::immediate(3)));
        m.register_replace("/counter", |_| Ok(())).unwrap();

        // A competing writer commits during the first computation only.
        let competitor = Arc::clone(&m);
        let mut calls = 0;
        let version = m
            .optimistic_update("/counter", |current| {
                calls += 1;
                if calls == 1 {
                    std::thread::spawn({
                        let competitor = Arc::clone(&competitor);
                        move || competitor.replace("/counter", 100).unwrap()
                    })
                    .join()
                    .unwrap();
                }
                Ok(Node::Integer(current.as_int()? + 1))
            })
            .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(version, 3);
        assert_eq!(m.get("/counter").unwrap(), Node::Integer(101));
    }

    #[test]
    fn test_optimistic_update_gives_up_with_conflict() {
        let m = Arc::new(manager(r#"{"counter": 0}"#, RetryPolicy::immediate(2)));
        m.register_replace("/counter", |_| Ok(())).unwrap();

        let competitor = Arc::clone(&m);
        let mut calls = 0;
        let err = m
            .optimistic_update("/counter", |current| {
                calls += 1;
                let competitor = Arc::clone(&competitor);
                std::thread::spawn(move || competitor.replace("/counter", -1).unwrap())
                    .join()
                    .unwrap();
                Ok(Node::Integer(current.as_int()? + 1))
            })
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_non_conflict_errors_are_not_retried() {
        let m = manager(r#"{"counter": 0}"#, RetryPolicy::immediate(5));
        let mut calls = 0;
        let err = m
            .optimistic_update("/counter", |_| {
                calls += 1;
                Ok(Node::Integer(1))
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotModifiable { .. }));
        assert_eq!(calls, 1);
    }
}

//! Document manager: the live tree, its registry, and the mutation protocol.
//!
//! # Data Flow
//! ```text
//! insert / remove / replace (write lock held throughout):
//!     1. resolve   registry.rs (kind, path) → node id, index bounds
//!     2. stage     staging.rs edits a clone of the source document
//!     3. validate  custom validators → schema → external service
//!     4. mutate    live tree edited, backup kept; handler notified (may veto)
//!     5. commit    Source::set_config → version + 1 → path cache invalidated
//!                  → registry re-synced → history recorded
//! after the lock is released:
//!     change event broadcast to subscribers
//!
//! conditional.rs  version check under the same write lock, then the protocol
//! snapshot.rs     whole-document snapshot / restore / reload from source
//! ```
//!
//! # Design Decisions
//! - One `RwLock` guards tree, registry, path cache, validators and history
//! - The version lives in an `AtomicI64` written only under the write lock, so
//!   reading it never blocks
//! - Handlers run inside the write lock before persistence and can veto the
//!   change. A handler calling back into the same manager gets
//!   `Error::Reentrant` instead of a deadlock; code that reacts to changes
//!   with further mutations subscribes to the post-commit change feed
//! - Everything leaving the lock is an owned `Node` copy

pub mod conditional;
pub mod history;
pub mod mutation;
pub mod registry;
pub mod snapshot;
pub(crate) mod staging;

use std::cell::RefCell;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::query::{self, QueryResult};
use crate::resilience::RetryPolicy;
use crate::source::Source;
use crate::tree::{path, Node, NodeId, PathCache, Tree};
use crate::validation::{CustomValidators, ExternalValidator, SchemaValidator, ValidatorFn};

pub use history::{ChangeEvent, ChangeHistory, Operation};
pub use registry::{BoxError, Handler, Modifiable, ModifiableKind, ModifiablePaths};
pub use snapshot::Snapshot;

use registry::Registry;

/// Capacity of the change broadcast channel.
const CHANGE_FEED_CAPACITY: usize = 256;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Managers whose handlers are running on this thread.
    static NOTIFYING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks a manager as notifying on the current thread until dropped.
struct NotifyScope;

impl NotifyScope {
    fn enter(id: u64) -> Self {
        NOTIFYING.with(|active| active.borrow_mut().push(id));
        NotifyScope
    }
}

impl Drop for NotifyScope {
    fn drop(&mut self) {
        NOTIFYING.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

/// Everything guarded by the manager's lock.
pub(crate) struct State {
    pub(crate) tree: Tree,
    pub(crate) registry: Registry,
    /// Behind its own mutex so readers can rebuild it under the read lock.
    pub(crate) cache: Mutex<PathCache>,
    pub(crate) validators: CustomValidators,
    pub(crate) history: ChangeHistory,
}

/// Full description of the document, read under one lock acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentState {
    pub modifiable_paths: ModifiablePaths,
    pub config: Value,
    pub schema: Value,
    pub version: i64,
}

/// Builder for [`Manager`].
pub struct ManagerBuilder {
    source: Arc<dyn Source>,
    external: Option<Arc<dyn ExternalValidator>>,
    retry: RetryPolicy,
    history_capacity: usize,
}

impl ManagerBuilder {
    /// Consult `validator` after schema validation on every change.
    pub fn external_validator(mut self, validator: Arc<dyn ExternalValidator>) -> Self {
        self.external = Some(validator);
        self
    }

    /// Retry policy used by `optimistic_update`.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Compile the schema, check the source document against it and build
    /// the live tree at version 1.
    pub fn build(self) -> Result<Manager> {
        let schema = SchemaValidator::compile(&self.source.schema())?;
        schema.validate_str(&self.source.config())?;

        let tree = Tree::from_value(&self.source.config_object());
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        tracing::info!(nodes = tree.len(), "Configuration manager initialized");
        metrics::record_version(1);

        Ok(Manager {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            source: self.source,
            schema,
            external: self.external,
            state: RwLock::new(State {
                tree,
                registry: Registry::default(),
                cache: Mutex::new(PathCache::new()),
                validators: CustomValidators::new(),
                history: ChangeHistory::new(self.history_capacity),
            }),
            version: AtomicI64::new(1),
            changes,
            retry: self.retry,
        })
    }
}

/// The live, validated, versioned configuration document.
pub struct Manager {
    id: u64,
    source: Arc<dyn Source>,
    schema: SchemaValidator,
    external: Option<Arc<dyn ExternalValidator>>,
    state: RwLock<State>,
    version: AtomicI64,
    changes: broadcast::Sender<ChangeEvent>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("id", &self.id)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Build a manager over `source` with default settings.
    pub fn new(source: Arc<dyn Source>) -> Result<Self> {
        Self::builder(source).build()
    }

    pub fn builder(source: Arc<dyn Source>) -> ManagerBuilder {
        ManagerBuilder {
            source,
            external: None,
            retry: RetryPolicy::default(),
            history_capacity: history::DEFAULT_CAPACITY,
        }
    }

    /// Current version. Never blocks.
    pub fn version(&self) -> i64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fail fast when called from one of this manager's own handlers.
    pub(crate) fn ensure_not_notifying(&self) -> Result<()> {
        let reentered = NOTIFYING.with(|active| active.borrow().contains(&self.id));
        if reentered {
            Err(Error::Reentrant)
        } else {
            Ok(())
        }
    }

    /// Run a user callback (handler or validator) that executes under the
    /// write lock. Calls back into this manager from `f` get `Reentrant`.
    pub(crate) fn in_callback<T>(&self, f: impl FnOnce() -> T) -> T {
        let _scope = NotifyScope::enter(self.id);
        f()
    }

    pub(crate) fn notify(&self, handler: &Handler, node: &Node) -> std::result::Result<(), BoxError> {
        self.in_callback(|| handler(node))
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.changes.send(event);
    }

    /// Receive every committed change, delivered after the write lock is released.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    // ---- reads ---------------------------------------------------------

    /// Node id at `path`.
    pub fn locate(&self, at: &str) -> Result<NodeId> {
        self.ensure_not_notifying()?;
        let state = self.state.read();
        path::resolve(&state.tree, at)
    }

    /// Current path of a node, from the path cache.
    pub fn path_of(&self, id: NodeId) -> Result<String> {
        self.ensure_not_notifying()?;
        let state = self.state.read();
        let mut cache = state.cache.lock();
        cache.lookup(&state.tree, id).ok_or(Error::Disjoint)
    }

    /// Copy of the value at `path`.
    pub fn get(&self, at: &str) -> Result<Node> {
        self.ensure_not_notifying()?;
        let state = self.state.read();
        let id = path::resolve(&state.tree, at)?;
        state.tree.to_node(id).ok_or(Error::Disjoint)
    }

    /// Copy of the node with identity `id`.
    pub fn node(&self, id: NodeId) -> Result<Node> {
        self.ensure_not_notifying()?;
        let state = self.state.read();
        state.tree.to_node(id).ok_or(Error::Disjoint)
    }

    /// Copy of the whole document.
    pub fn document(&self) -> Result<Node> {
        self.ensure_not_notifying()?;
        let state = self.state.read();
        state.tree.to_node(state.tree.root()).ok_or(Error::Disjoint)
    }

    /// Document, schema, modifiable paths and version, consistent with each other.
    pub fn describe(&self) -> Result<DocumentState> {
        self.ensure_not_notifying()?;
        let state = self.state.read();
        Ok(DocumentState {
            modifiable_paths: state.registry.all_paths(),
            config: state.tree.to_value(),
            schema: self.schema.schema().clone(),
            version: self.version(),
        })
    }

    pub fn modifiable_paths(&self) -> Result<ModifiablePaths> {
        self.ensure_not_notifying()?;
        Ok(self.state.read().registry.all_paths())
    }

    pub fn schema(&self) -> &Value {
        self.schema.schema()
    }

    // ---- queries -------------------------------------------------------

    /// Run a path query; results are copies.
    pub fn query(&self, q: &str) -> Result<Vec<QueryResult>> {
        self.ensure_not_notifying()?;
        let result = {
            let state = self.state.read();
            query::execute(&state.tree, q)
        };
        metrics::record_query(result.is_ok());
        if let Err(e) = &result {
            tracing::debug!(query = %q, error = %e, "Query failed");
        }
        result
    }

    /// First result of `q`, or `NoResults`.
    pub fn query_one(&self, q: &str) -> Result<QueryResult> {
        self.query(q)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoResults(q.to_string()))
    }

    /// Whether `q` parses, traverses and matches something. Every error,
    /// including `Reentrant` from inside a callback, reads as `false`; use
    /// [`Manager::query`] to tell them apart.
    pub fn query_exists(&self, q: &str) -> bool {
        match self.query(q) {
            Ok(results) => !results.is_empty(),
            Err(Error::Reentrant) => {
                tracing::warn!(query = %q, "query_exists called from a callback of the same manager");
                false
            }
            Err(_) => false,
        }
    }

    pub fn query_count(&self, q: &str) -> Result<usize> {
        self.query(q).map(|results| results.len())
    }

    /// Every node accepted by `predicate`, pre-order from the root.
    pub fn find_all(&self, predicate: impl Fn(&Node) -> bool) -> Result<Vec<QueryResult>> {
        let root = self.document()?;
        Ok(query::find_all(&root, &predicate))
    }

    // ---- validators and history ----------------------------------------

    /// Run `validator` for every change at exactly `path`.
    pub fn add_validator(&self, at: &str, validator: ValidatorFn) -> Result<()> {
        self.ensure_not_notifying()?;
        self.state.write().validators.add(path::normalize(at), validator);
        Ok(())
    }

    /// Every retained change, oldest first.
    pub fn history(&self) -> Result<Vec<ChangeEvent>> {
        self.ensure_not_notifying()?;
        Ok(self.state.read().history.all())
    }

    pub fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeEvent>> {
        self.ensure_not_notifying()?;
        Ok(self.state.read().history.recent(limit))
    }

    /// Changes at `path`, newest first.
    pub fn changes_at(&self, at: &str, limit: usize) -> Result<Vec<ChangeEvent>> {
        self.ensure_not_notifying()?;
        Ok(self.state.read().history.by_path(&path::normalize(at), limit))
    }

    pub fn clear_history(&self) -> Result<()> {
        self.ensure_not_notifying()?;
        self.state.write().history.clear();
        Ok(())
    }

    pub fn export_history(&self) -> Result<String> {
        self.ensure_not_notifying()?;
        self.state
            .read()
            .history
            .export_json()
            .map_err(|e| Error::InvalidDocument(e.to_string()))
    }

    // ---- registration --------------------------------------------------

    /// Allow inserts into the array `node`; `handler` sees each inserted value.
    pub fn on_insert<F>(&self, node: NodeId, handler: F) -> Result<()>
    where
        F: Fn(&Node) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(ModifiableKind::Insertable, node, Arc::new(handler))
    }

    /// Allow removals from the array `node`; `handler` sees each removed value.
    pub fn on_remove<F>(&self, node: NodeId, handler: F) -> Result<()>
    where
        F: Fn(&Node) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(ModifiableKind::Removable, node, Arc::new(handler))
    }

    /// Allow replacing `node`; `handler` sees the new value.
    pub fn on_replace<F>(&self, node: NodeId, handler: F) -> Result<()>
    where
        F: Fn(&Node) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(ModifiableKind::Replaceable, node, Arc::new(handler))
    }

    /// Bind `node` for `kind`. The node must be reachable from the root.
    pub fn register(&self, kind: ModifiableKind, node: NodeId, handler: Handler) -> Result<()> {
        self.ensure_not_notifying()?;
        let mut guard = self.state.write();
        let state = &mut *guard;
        let at = state
            .cache
            .get_mut()
            .lookup(&state.tree, node)
            .ok_or(Error::Disjoint)?;
        state
            .registry
            .register(&state.tree, kind, at.clone(), node, handler)?;
        tracing::info!(kind = %kind, path = %at, "Registered modifiable path");
        Ok(())
    }

    /// Path-based form of [`Manager::register`].
    pub fn register_path(&self, kind: ModifiableKind, at: &str, handler: Handler) -> Result<()> {
        let node = self.locate(at)?;
        self.register(kind, node, handler)
    }

    pub fn register_insert<F>(&self, at: &str, handler: F) -> Result<()>
    where
        F: Fn(&Node) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_path(ModifiableKind::Insertable, at, Arc::new(handler))
    }

    pub fn register_remove<F>(&self, at: &str, handler: F) -> Result<()>
    where
        F: Fn(&Node) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_path(ModifiableKind::Removable, at, Arc::new(handler))
    }

    pub fn register_replace<F>(&self, at: &str, handler: F) -> Result<()>
    where
        F: Fn(&Node) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_path(ModifiableKind::Replaceable, at, Arc::new(handler))
    }

    // ---- shared commit helpers -----------------------------------------

    /// Schema and external validation of a whole candidate document.
    pub(crate) fn validate_document(&self, document: &Value) -> Result<()> {
        self.schema.validate(document)?;
        if let Some(external) = &self.external {
            self.in_callback(|| external.validate(document, self.schema.schema()))?;
        }
        Ok(())
    }

    /// Bump the version and refresh derived state after a structural commit.
    pub(crate) fn finish_commit(&self, state: &mut State) -> i64 {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let cache = state.cache.get_mut();
        cache.invalidate();
        let dropped = state.registry.resync(&state.tree, cache);
        if dropped > 0 {
            tracing::info!(dropped, "Dropped bindings for detached nodes");
        }
        metrics::record_version(version);
        version
    }
}

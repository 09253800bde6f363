//! Compiled templates and the process-wide template cache
//!
//! A template is the immutable build artifact shared by every instance of
//! one (hive class, frozen meta-parameter record) pair. Templates are
//! memoized for process lifetime and compared by identity: same template
//! object ⇒ same graph shape, which downstream logic relies on.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use crate::bee::{Bee, BeeId, StateFn};
use crate::error::HiveError;
use crate::graph::{DispatchTable, EdgePoint};
use crate::namespace::Namespace;
use crate::params::{CallArgs, FrozenParams, ParameterSchema};
use crate::resolver::ResolvedGraph;

static NEXT_TEMPLATE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique template identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(u64);

impl TemplateId {
    fn next() -> Self {
        Self(NEXT_TEMPLATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One registered state object: name, factory, and the positional-arity
/// range its factory accepts from the leftover argument list
#[derive(Clone)]
pub struct StateDecl {
    pub name: Arc<str>,
    pub factory: StateFn,
    pub positional: RangeInclusive<usize>,
}

impl StateDecl {
    /// Factory signature mismatch is a build-time failure.
    pub fn check_arity(&self, got: usize) -> Result<(), HiveError> {
        if self.positional.contains(&got) {
            return Ok(());
        }
        let expected = if self.positional.start() == self.positional.end() {
            self.positional.start().to_string()
        } else {
            format!("{}..={}", self.positional.start(), self.positional.end())
        };
        Err(HiveError::StateArity {
            state: Arc::clone(&self.name),
            expected,
            got,
        })
    }
}

impl fmt::Debug for StateDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDecl")
            .field("name", &self.name)
            .field("positional", &self.positional)
            .finish_non_exhaustive()
    }
}

/// An embedded child hive: its compiled template plus the arguments
/// captured when the parent's builder declared it
#[derive(Debug, Clone)]
pub struct NestedRef {
    pub bee: BeeId,
    pub name: Arc<str>,
    pub template: Arc<Template>,
    pub args: CallArgs,
    /// Gates whether the matchmaking walk descends into this child
    pub import_namespace: bool,
}

/// Visibility of a named runtime attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

/// One entry of the template's name→accessor table. Instances hold only
/// data; every named read/write goes through this table.
#[derive(Debug, Clone)]
pub struct Accessor {
    pub point: EdgePoint,
    pub access: Access,
}

/// Immutable compiled artifact for one (hive class, frozen meta-params)
#[derive(Debug)]
pub struct Template {
    pub(crate) id: TemplateId,
    pub(crate) class_id: u64,
    pub(crate) name: Arc<str>,
    pub(crate) meta: Arc<FrozenParams>,
    pub(crate) arena: Vec<Bee>,
    pub(crate) internal: Namespace,
    pub(crate) external: Namespace,
    pub(crate) schema: ParameterSchema,
    pub(crate) states: Vec<StateDecl>,
    pub(crate) nested: Vec<NestedRef>,
    pub(crate) dispatch: DispatchTable,
    pub(crate) slot_defaults: Vec<Value>,
    pub(crate) accessors: FxHashMap<Arc<str>, Accessor>,
    pub(crate) resolved: OnceCell<ResolvedGraph>,
}

impl Template {
    pub(crate) fn allocate_id() -> TemplateId {
        TemplateId::next()
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Frozen meta-parameter record this template was compiled for
    pub fn meta(&self) -> &FrozenParams {
        &self.meta
    }

    pub fn bee(&self, id: BeeId) -> &Bee {
        &self.arena[id.index()]
    }

    pub fn arena(&self) -> &[Bee] {
        &self.arena
    }

    pub fn internal(&self) -> &Namespace {
        &self.internal
    }

    pub fn external(&self) -> &Namespace {
        &self.external
    }

    /// Runtime parameter schema, resolved at instantiation
    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    pub fn states(&self) -> &[StateDecl] {
        &self.states
    }

    pub fn nested(&self) -> &[NestedRef] {
        &self.nested
    }

    pub(crate) fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }

    pub fn accessor(&self, name: &str) -> Option<&Accessor> {
        self.accessors.get(name)
    }
}

// ─────────────────────────────────────────────────────────────
// Process-wide cache
// ─────────────────────────────────────────────────────────────

type TemplateKey = (u64, FrozenParams);

/// Global template cache (thread-safe, lock-free)
static TEMPLATE_CACHE: Lazy<DashMap<TemplateKey, Arc<Template>>> = Lazy::new(DashMap::new);

pub(crate) fn cache_get(class_id: u64, meta: &FrozenParams) -> Option<Arc<Template>> {
    TEMPLATE_CACHE
        .get(&(class_id, meta.clone()))
        .map(|t| Arc::clone(&t))
}

/// Insert a freshly built template, returning the canonical Arc.
///
/// First insert wins: if another thread raced us, its template is the
/// identity every caller observes from now on.
pub(crate) fn cache_insert(
    class_id: u64,
    meta: FrozenParams,
    template: Arc<Template>,
) -> Arc<Template> {
    let entry = TEMPLATE_CACHE
        .entry((class_id, meta))
        .or_insert_with(|| {
            debug!(
                template = %template.name,
                digest = template.meta.digest(),
                "template cached"
            );
            Arc::clone(&template)
        });
    Arc::clone(&entry)
}

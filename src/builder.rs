//! Hive classes and the declare/build pipeline
//!
//! A [`HiveClass`] is an accrued chain of declarator and builder
//! callables. `extend` copies a base class's chains and appends: chains
//! always run oldest-base-first, so later builders observe and extend the
//! wiring laid down by their bases. That ordering is how hives compose.
//!
//! Compiling a class against a call's arguments freezes the meta
//! parameters, runs the builder chain against a fresh [`BuildCtx`], and
//! memoizes the finished template per (class identity, frozen record).

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use rustc_hash::FxHashSet;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::bee::{Bee, BeeId, BeeKind, CardinalityPolicy, SocketRx, StateFn};
use crate::error::HiveError;
use crate::graph::{ConnectEdge, ConnectMode, DispatchTable, EdgePoint, TriggerEdge, TriggerOrder};
use crate::identifier::{Identifier, MatchPolicy};
use crate::instance::RuntimeInstance;
use crate::interner::intern;
use crate::namespace::{Namespace, NamespaceRole};
use crate::params::{CallArgs, FrozenParams, ParameterSchema};
use crate::template::{self, Accessor, Access, NestedRef, StateDecl, Template};

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_BUILD_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Declarator: populates the meta-parameter schema
pub type DeclaratorFn = Arc<dyn Fn(&mut ParameterSchema) -> Result<(), HiveError> + Send + Sync>;

/// Builder: populates namespaces and wiring through the build context
pub type BuilderFn = Arc<dyn Fn(&mut BuildCtx) -> Result<(), HiveError> + Send + Sync>;

#[derive(Clone)]
struct ChainEntry<F> {
    name: Arc<str>,
    f: F,
}

/// Handle to a bee created during the current build
///
/// Carries the build token so namespaces can reject bees attached from a
/// different build.
#[derive(Debug, Clone, Copy)]
pub struct BeeRef {
    id: BeeId,
    token: u64,
}

/// A composable hive class: name + accrued declarator/builder chains
///
/// Cloning shares the chains and keeps the class identity (clones hit
/// the same template cache slots); `extend` mints a new identity.
#[derive(Clone)]
pub struct HiveClass {
    id: u64,
    name: Arc<str>,
    declarators: Vec<ChainEntry<DeclaratorFn>>,
    builders: Vec<ChainEntry<BuilderFn>>,
}

impl HiveClass {
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_CLASS_ID.fetch_add(1, AtomicOrdering::Relaxed),
            name: intern(name),
            declarators: Vec::new(),
            builders: Vec::new(),
        }
    }

    /// New class whose chains start with `base`'s, oldest-base-first.
    pub fn extend(name: &str, base: &HiveClass) -> Self {
        Self {
            id: NEXT_CLASS_ID.fetch_add(1, AtomicOrdering::Relaxed),
            name: intern(name),
            declarators: base.declarators.clone(),
            builders: base.builders.clone(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Append a declarator to the chain.
    pub fn declarator(
        mut self,
        name: &str,
        f: impl Fn(&mut ParameterSchema) -> Result<(), HiveError> + Send + Sync + 'static,
    ) -> Self {
        self.declarators.push(ChainEntry {
            name: intern(name),
            f: Arc::new(f),
        });
        self
    }

    /// Append a builder to the chain.
    pub fn builder(
        mut self,
        name: &str,
        f: impl Fn(&mut BuildCtx) -> Result<(), HiveError> + Send + Sync + 'static,
    ) -> Self {
        self.builders.push(ChainEntry {
            name: intern(name),
            f: Arc::new(f),
        });
        self
    }

    /// Run the declarator chain against a fresh meta schema.
    fn meta_schema(&self) -> Result<ParameterSchema, HiveError> {
        let mut schema = ParameterSchema::new();
        for entry in &self.declarators {
            (entry.f)(&mut schema).map_err(|e| e.in_builder(&entry.name))?;
        }
        Ok(schema)
    }

    /// Compile (or fetch) the template for these arguments.
    pub fn compile(&self, args: CallArgs) -> Result<Arc<Template>, HiveError> {
        self.compile_with(args).map(|(template, _)| template)
    }

    /// Compile and also return the arguments the meta schema left behind.
    #[instrument(skip(self, args), fields(hive = %self.name), level = "debug")]
    pub(crate) fn compile_with(
        &self,
        mut args: CallArgs,
    ) -> Result<(Arc<Template>, CallArgs), HiveError> {
        let meta_schema = self.meta_schema()?;
        let frozen = meta_schema.resolve(&mut args)?;

        let template = match template::cache_get(self.id, &frozen) {
            Some(hit) => {
                debug!(digest = frozen.digest(), "template cache hit");
                hit
            }
            None => {
                let meta = Arc::new(frozen.clone());
                let mut ctx = BuildCtx::new(Arc::clone(&self.name), meta);
                for entry in &self.builders {
                    (entry.f)(&mut ctx).map_err(|e| e.in_builder(&entry.name))?;
                }
                let built = Arc::new(ctx.finish(self.id)?);
                // A failed build never reaches this insert
                template::cache_insert(self.id, frozen, built)
            }
        };

        check_state_signatures(&template, &args)?;
        Ok((template, args))
    }

    /// Compile, resolve the tree, and produce one live instance.
    pub fn instantiate(&self, args: CallArgs) -> Result<RuntimeInstance, HiveError> {
        let (template, leftover) = self.compile_with(args)?;
        crate::instance::instantiate_root(template, leftover)
    }
}

/// Dry-run the runtime schema + state factories against the leftover
/// argument list, so a mismatched factory signature fails at build time.
/// Leftovers that cannot satisfy the runtime schema yet are left for
/// instantiation to report.
fn check_state_signatures(template: &Template, leftover: &CallArgs) -> Result<(), HiveError> {
    let mut rehearsal = leftover.clone();
    if template.schema().extract(&mut rehearsal).is_err() {
        return Ok(());
    }
    let got = rehearsal.positional().len();
    for state in template.states() {
        state.check_arity(got)?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────
// Build context
// ─────────────────────────────────────────────────────────────

/// Wire role used for implicit endpoint resolution
#[derive(Debug, Clone, Copy)]
enum Role {
    TriggerSource,
    TriggerTarget,
    ConnectSource,
    ConnectTarget,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::TriggerSource => "trigger source",
            Role::TriggerTarget => "trigger target",
            Role::ConnectSource => "connect source",
            Role::ConnectTarget => "connect target",
        }
    }

    fn satisfied_by(self, bee: &Bee) -> bool {
        match self {
            Role::TriggerSource => bee.is_trigger_source(),
            Role::TriggerTarget => bee.is_trigger_target(),
            Role::ConnectSource => bee.is_connect_source(),
            Role::ConnectTarget => bee.is_connect_target(),
        }
    }
}

/// Explicit build-context value threaded through every builder call
///
/// All declare/build state lives here; nothing ambient. One context per
/// template build, discarded once its contents move into the template.
pub struct BuildCtx {
    token: u64,
    hive_name: Arc<str>,
    meta: Arc<FrozenParams>,
    arena: Vec<Bee>,
    internal: Namespace,
    external: Namespace,
    schema: ParameterSchema,
    states: Vec<StateDecl>,
    nested: Vec<NestedRef>,
    triggers: Vec<TriggerEdge>,
    connects: Vec<ConnectEdge>,
    slot_defaults: Vec<Value>,
}

impl BuildCtx {
    fn new(hive_name: Arc<str>, meta: Arc<FrozenParams>) -> Self {
        Self {
            token: NEXT_BUILD_TOKEN.fetch_add(1, AtomicOrdering::Relaxed),
            hive_name,
            meta,
            arena: Vec::new(),
            internal: Namespace::new(NamespaceRole::Internal),
            external: Namespace::new(NamespaceRole::External),
            schema: ParameterSchema::new(),
            states: Vec::new(),
            nested: Vec::new(),
            triggers: Vec::new(),
            connects: Vec::new(),
            slot_defaults: Vec::new(),
        }
    }

    /// Frozen meta-parameters this template is being built for
    pub fn meta(&self) -> &FrozenParams {
        &self.meta
    }

    fn add(&mut self, kind: BeeKind) -> BeeRef {
        let id = BeeId(self.arena.len() as u32);
        self.arena.push(Bee::new(kind, self.token));
        BeeRef {
            id,
            token: self.token,
        }
    }

    fn bee(&self, r: BeeRef) -> &Bee {
        &self.arena[r.id.index()]
    }

    // ── Bee factories ────────────────────────────────────────

    /// Typed value slot, one per instance.
    pub fn attribute(&mut self, data_type: Identifier, default: Value) -> BeeRef {
        let slot = self.slot_defaults.len();
        self.slot_defaults.push(default);
        self.add(BeeKind::Attribute { data_type, slot })
    }

    /// Bridge to a field of a registered state object.
    pub fn property(&mut self, state: &str, field: &str, data_type: Identifier) -> BeeRef {
        self.add(BeeKind::Property {
            state: intern(state),
            field: intern(field),
            data_type,
        })
    }

    pub fn trigger_func(
        &mut self,
        f: impl Fn(&RuntimeInstance) -> Result<(), HiveError> + Send + Sync + 'static,
    ) -> BeeRef {
        self.add(BeeKind::TriggerFunc { f: Arc::new(f) })
    }

    pub fn triggerable(
        &mut self,
        f: impl Fn(&RuntimeInstance) -> Result<(), HiveError> + Send + Sync + 'static,
    ) -> BeeRef {
        self.add(BeeKind::Triggerable { f: Arc::new(f) })
    }

    pub fn modifier(
        &mut self,
        f: impl Fn(&RuntimeInstance) -> Result<(), HiveError> + Send + Sync + 'static,
    ) -> BeeRef {
        self.add(BeeKind::Modifier { f: Arc::new(f) })
    }

    fn storage_id(&self, store: BeeRef, io: &'static str) -> Result<BeeId, HiveError> {
        let bee = self.bee(store);
        match bee.kind {
            BeeKind::Attribute { .. } | BeeKind::Property { .. } => Ok(store.id),
            _ => Err(HiveError::IncompatibleWire {
                from: bee.kind_name().to_string(),
                target: io.to_string(),
                reason: "io endpoints wrap attributes or properties".to_string(),
            }),
        }
    }

    pub fn push_in(&mut self, store: BeeRef) -> Result<BeeRef, HiveError> {
        let store = self.storage_id(store, "push_in")?;
        Ok(self.add(BeeKind::PushIn { store }))
    }

    pub fn push_out(&mut self, store: BeeRef) -> Result<BeeRef, HiveError> {
        let store = self.storage_id(store, "push_out")?;
        Ok(self.add(BeeKind::PushOut { store }))
    }

    pub fn pull_in(&mut self, store: BeeRef) -> Result<BeeRef, HiveError> {
        let store = self.storage_id(store, "pull_in")?;
        Ok(self.add(BeeKind::PullIn { store }))
    }

    pub fn pull_out(&mut self, store: BeeRef) -> Result<BeeRef, HiveError> {
        let store = self.storage_id(store, "pull_out")?;
        Ok(self.add(BeeKind::PullOut { store }))
    }

    /// Exported trigger target forwarding to an inner target.
    pub fn entry(&mut self, target: BeeRef) -> Result<BeeRef, HiveError> {
        let target = self.resolve_role(target, Role::TriggerTarget)?;
        Ok(self.add(BeeKind::Entry { target }))
    }

    /// Exported trigger source relaying an inner source.
    pub fn hook(&mut self, source: BeeRef) -> Result<BeeRef, HiveError> {
        let source = self.resolve_role(source, Role::TriggerSource)?;
        let hook = self.add(BeeKind::Hook);
        // Relay edge: inner source fires → hook propagates outward
        self.triggers.push(TriggerEdge {
            source,
            target: EdgePoint::local(hook.id),
            order: TriggerOrder::Normal,
        });
        Ok(hook)
    }

    /// Exported connection target forwarding to an inner input.
    pub fn antenna(&mut self, target: BeeRef) -> Result<BeeRef, HiveError> {
        let target = self.resolve_role(target, Role::ConnectTarget)?;
        Ok(self.add(BeeKind::Antenna { target }))
    }

    /// Exported connection source forwarding from an inner output.
    pub fn output(&mut self, source: BeeRef) -> Result<BeeRef, HiveError> {
        let target = self.resolve_role(source, Role::ConnectSource)?;
        Ok(self.add(BeeKind::Output { target }))
    }

    /// Producer callable matched tree-wide by identifier.
    pub fn plugin(
        &mut self,
        identifier: Identifier,
        policy: CardinalityPolicy,
        export: bool,
        callable: impl Fn(&RuntimeInstance, Value) -> Result<Value, HiveError> + Send + Sync + 'static,
    ) -> BeeRef {
        self.add(BeeKind::Plugin {
            identifier,
            policy,
            export,
            callable: Arc::new(callable),
        })
    }

    /// Consumer matched tree-wide by identifier.
    pub fn socket(
        &mut self,
        identifier: Identifier,
        policy: CardinalityPolicy,
        export: bool,
    ) -> BeeRef {
        self.add(BeeKind::Socket {
            identifier,
            policy,
            export,
            receiver: None,
        })
    }

    /// Socket with a receiver run for each delivered plugin.
    pub fn socket_with(
        &mut self,
        identifier: Identifier,
        policy: CardinalityPolicy,
        export: bool,
        receiver: impl Fn(&RuntimeInstance, &crate::instance::BoundPlugin) -> Result<(), HiveError>
            + Send
            + Sync
            + 'static,
    ) -> BeeRef {
        let receiver: SocketRx = Arc::new(receiver);
        self.add(BeeKind::Socket {
            identifier,
            policy,
            export,
            receiver: Some(receiver),
        })
    }

    /// Embed a child hive, compiling its template now (memoized).
    pub fn hive(&mut self, child: &HiveClass, args: CallArgs) -> Result<BeeRef, HiveError> {
        self.hive_inner(child, args, true)
    }

    /// Embed a child hive excluded from tree-wide matchmaking.
    pub fn hive_isolated(&mut self, child: &HiveClass, args: CallArgs) -> Result<BeeRef, HiveError> {
        self.hive_inner(child, args, false)
    }

    fn hive_inner(
        &mut self,
        child: &HiveClass,
        args: CallArgs,
        import_namespace: bool,
    ) -> Result<BeeRef, HiveError> {
        let (template, leftover) = child.compile_with(args)?;
        let index = self.nested.len() as u32;
        let r = self.add(BeeKind::Nested { index });
        self.nested.push(NestedRef {
            bee: r.id,
            name: Arc::clone(template.name()),
            template,
            args: leftover,
            import_namespace,
        });
        Ok(r)
    }

    /// Declare a runtime parameter, resolved at instantiation.
    pub fn parameter(
        &mut self,
        name: &str,
        data_type: Identifier,
        default: Option<Value>,
        options: Option<Vec<Value>>,
    ) -> Result<BeeRef, HiveError> {
        self.schema.declare(name, data_type, default, options)?;
        Ok(self.add(BeeKind::Parameter { name: intern(name) }))
    }

    /// Register a state object factory with its positional-arity range.
    pub fn state(
        &mut self,
        name: &str,
        positional: RangeInclusive<usize>,
        factory: impl Fn(&FrozenParams, &CallArgs) -> Result<Value, HiveError> + Send + Sync + 'static,
    ) -> Result<(), HiveError> {
        let name = intern(name);
        if self.states.iter().any(|s| s.name == name) {
            return Err(HiveError::DuplicateState { state: name });
        }
        let factory: StateFn = Arc::new(factory);
        self.states.push(StateDecl {
            name,
            factory,
            positional,
        });
        Ok(())
    }

    // ── Namespaces ───────────────────────────────────────────

    pub fn internal(&mut self, name: &str, bee: BeeRef) -> Result<(), HiveError> {
        self.internal
            .assign(name, bee.id, &self.arena[bee.id.index()], self.token)
    }

    pub fn external(&mut self, name: &str, bee: BeeRef) -> Result<(), HiveError> {
        self.external
            .assign(name, bee.id, &self.arena[bee.id.index()], self.token)
    }

    /// Look up a name assigned by an earlier builder in the chain.
    pub fn lookup(&self, name: &str) -> Option<BeeRef> {
        self.internal
            .get(name)
            .or_else(|| self.external.get(name))
            .map(|id| BeeRef {
                id,
                token: self.token,
            })
    }

    // ── Wiring ───────────────────────────────────────────────

    /// Trigger edge, normal ordering.
    pub fn trigger(&mut self, source: BeeRef, target: BeeRef) -> Result<(), HiveError> {
        self.trigger_ordered(source, target, TriggerOrder::Normal)
    }

    /// Trigger edge that completes before every normal edge of `source`.
    pub fn pretrigger(&mut self, source: BeeRef, target: BeeRef) -> Result<(), HiveError> {
        self.trigger_ordered(source, target, TriggerOrder::Pre)
    }

    pub fn trigger_ordered(
        &mut self,
        source: BeeRef,
        target: BeeRef,
        order: TriggerOrder,
    ) -> Result<(), HiveError> {
        let source = self.resolve_role(source, Role::TriggerSource)?;
        let target = self.resolve_role(target, Role::TriggerTarget)?;
        self.triggers.push(TriggerEdge {
            source,
            target,
            order,
        });
        Ok(())
    }

    /// Connect edge; direction fixed by the endpoints' push/pull kind.
    pub fn connect(&mut self, source: BeeRef, target: BeeRef) -> Result<(), HiveError> {
        let source = self.resolve_role(source, Role::ConnectSource)?;
        let target = self.resolve_role(target, Role::ConnectTarget)?;

        // Shadow the proxy points with the unwrapped terminals; the
        // dispatch table must key edges on the bee that actually pushes
        // or pulls, not on an antenna/output wrapper around it.
        let (source_bee, source_type, source) = self.endpoint_info(&source)?;
        let (target_bee, target_type, target) = self.endpoint_info(&target)?;

        let mode = match (&source_bee.kind, &target_bee.kind) {
            (BeeKind::PushOut { .. }, BeeKind::PushIn { .. }) => ConnectMode::Push,
            (BeeKind::PullOut { .. }, BeeKind::PullIn { .. }) => ConnectMode::Pull,
            _ => {
                return Err(HiveError::IncompatibleWire {
                    from: source_bee.kind_name().to_string(),
                    target: target_bee.kind_name().to_string(),
                    reason: "push/pull modes differ".to_string(),
                })
            }
        };

        if !source_type.matches(&target_type, MatchPolicy::default()) {
            return Err(HiveError::IncompatibleWire {
                from: source_type.to_string(),
                target: target_type.to_string(),
                reason: "data types do not share a prefix".to_string(),
            });
        }

        if mode == ConnectMode::Pull
            && self
                .connects
                .iter()
                .any(|e| e.mode == ConnectMode::Pull && e.target == target)
        {
            return Err(HiveError::PullAlreadyWired {
                target: format!("{target:?}"),
            });
        }

        self.connects.push(ConnectEdge {
            source,
            target,
            mode,
        });
        Ok(())
    }

    /// Resolve a wire endpoint, delegating through nested hives: a hive
    /// satisfies a role through its single external bee with that
    /// capability, or fails with an ambiguity error before any edge is
    /// recorded.
    fn resolve_role(&self, r: BeeRef, role: Role) -> Result<EdgePoint, HiveError> {
        let bee = self.bee(r);
        if let BeeKind::Nested { index } = bee.kind {
            let nested = &self.nested[index as usize];
            let inner = resolve_role_in(&nested.template, role)?;
            return Ok(EdgePoint::under(index, inner));
        }
        if role.satisfied_by(bee) {
            return Ok(EdgePoint::local(r.id));
        }
        Err(HiveError::IncompatibleWire {
            from: bee.kind_name().to_string(),
            target: role.as_str().to_string(),
            reason: format!("bee kind lacks the {} capability", role.as_str()),
        })
    }

    /// Terminal bee (proxies unwrapped) and data type of an endpoint.
    fn endpoint_info(&self, point: &EdgePoint) -> Result<(Bee, Identifier, EdgePoint), HiveError> {
        endpoint_info_in(&self.arena, &self.nested, point)
    }

    // ── Finalization ─────────────────────────────────────────

    fn finish(mut self, class_id: u64) -> Result<Template, HiveError> {
        // Auto-name anonymous bees so no intermediate wiring is lost
        let named: FxHashSet<BeeId> = self
            .internal
            .iter()
            .chain(self.external.iter())
            .map(|(_, id)| id)
            .collect();
        for index in 0..self.arena.len() {
            let id = BeeId(index as u32);
            if named.contains(&id) {
                continue;
            }
            let auto = format!("_{}_{}", self.arena[index].kind_name(), index);
            self.internal
                .assign(&auto, id, &self.arena[index], self.token)?;
        }

        // Stateful-bee accessor table: external names public, internal
        // names private. Built once; instances hold only data. External
        // assignment wins when both namespaces carry one name.
        let mut accessors = rustc_hash::FxHashMap::default();
        for (namespace, access) in [
            (&self.internal, Access::Private),
            (&self.external, Access::Public),
        ] {
            for (name, id) in namespace.iter() {
                let has_data_surface = matches!(
                    self.arena[id.index()].kind,
                    BeeKind::Attribute { .. }
                        | BeeKind::Property { .. }
                        | BeeKind::Antenna { .. }
                        | BeeKind::Output { .. }
                        | BeeKind::PushIn { .. }
                        | BeeKind::PushOut { .. }
                        | BeeKind::PullIn { .. }
                        | BeeKind::PullOut { .. }
                );
                if has_data_surface {
                    accessors.insert(
                        Arc::clone(name),
                        Accessor {
                            point: EdgePoint::local(id),
                            access,
                        },
                    );
                }
            }
        }

        let dispatch = DispatchTable::build(&self.triggers, &self.connects);

        Ok(Template {
            id: Template::allocate_id(),
            class_id,
            name: self.hive_name,
            meta: Arc::clone(&self.meta),
            arena: self.arena,
            internal: self.internal,
            external: self.external,
            schema: self.schema,
            states: self.states,
            nested: self.nested,
            dispatch,
            slot_defaults: self.slot_defaults,
            accessors,
            resolved: OnceCell::new(),
        })
    }
}

/// Implicit resolution inside an already-compiled child template.
fn resolve_role_in(template: &Template, role: Role) -> Result<EdgePoint, HiveError> {
    let candidates: Vec<BeeId> = template
        .external()
        .iter()
        .filter(|(_, id)| role.satisfied_by(template.bee(*id)))
        .map(|(_, id)| id)
        .collect();

    if candidates.len() != 1 {
        return Err(HiveError::AmbiguousWire {
            hive: Arc::clone(template.name()),
            role: role.as_str(),
            candidates: candidates.len(),
        });
    }
    Ok(EdgePoint::local(candidates[0]))
}

/// Follow nesting steps and proxy chains to the terminal bee, collecting
/// the data type of whatever storage it wraps and the terminal's full
/// point. Edges are recorded on terminal points so a runtime push or
/// pull lifted into the parent's dispatch table lands on the same key
/// the wire was declared with.
fn endpoint_info_in(
    arena: &[Bee],
    nested: &[NestedRef],
    point: &EdgePoint,
) -> Result<(Bee, Identifier, EdgePoint), HiveError> {
    if let Some((index, rest)) = point.step() {
        let child = &nested[index as usize].template;
        let (bee, data_type, inner) = endpoint_info_in(child.arena(), child.nested(), &rest)?;
        return Ok((bee, data_type, EdgePoint::under(index, inner)));
    }

    let bee = &arena[point.bee().index()];
    match &bee.kind {
        BeeKind::Antenna { target } | BeeKind::Output { target } => {
            endpoint_info_in(arena, nested, target)
        }
        BeeKind::PushIn { store }
        | BeeKind::PushOut { store }
        | BeeKind::PullIn { store }
        | BeeKind::PullOut { store } => {
            let data_type = match &arena[store.index()].kind {
                BeeKind::Attribute { data_type, .. } => data_type.clone(),
                BeeKind::Property { data_type, .. } => data_type.clone(),
                _ => Identifier::untyped(),
            };
            Ok((bee.clone(), data_type, point.clone()))
        }
        _ => Ok((bee.clone(), Identifier::untyped(), point.clone())),
    }
}

//! Live hive instances
//!
//! An instance is a data-only runtime view of its immutable template:
//! parameter record, state objects, attribute slots, lazily materialized
//! children, and the plugin bindings delivered at instantiation. Handles
//! are `Rc` clones of one shared core, so instances stay on the thread
//! that created them while templates remain shared process-wide.
//!
//! Cross-hive dispatch works on instance-relative edge points: firing or
//! writing consults the instance's own dispatch table first, then the
//! parent's table with the point lifted by the child's nesting index.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{instrument, trace};

use crate::bee::{BeeId, BeeKind, PluginFn};
use crate::error::HiveError;
use crate::graph::EdgePoint;
use crate::params::{CallArgs, FrozenParams};
use crate::resolver::{self, MatchEdge};
use crate::template::{Access, Template};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// A matched plugin as delivered to a socket: the producer callable
/// bound to the instance that owns it.
#[derive(Clone)]
pub struct BoundPlugin {
    callable: PluginFn,
    owner: RuntimeInstance,
}

impl BoundPlugin {
    /// Invoke the plugin against its owning instance.
    pub fn call(&self, payload: Value) -> Result<Value, HiveError> {
        (self.callable)(&self.owner, payload)
    }

    pub fn owner(&self) -> &RuntimeInstance {
        &self.owner
    }

    /// Two bindings delivered from the same plugin bee share one callable.
    pub fn shares_callable(&self, other: &BoundPlugin) -> bool {
        Arc::ptr_eq(&self.callable, &other.callable)
    }
}

impl std::fmt::Debug for BoundPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundPlugin")
            .field("owner", &self.owner.id())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct InstanceCore {
    id: u64,
    template: Arc<Template>,
    params: FrozenParams,
    states: FxHashMap<Arc<str>, RefCell<Value>>,
    slots: Vec<RefCell<Value>>,
    children: RefCell<FxHashMap<u32, RuntimeInstance>>,
    bindings: RefCell<FxHashMap<BeeId, Vec<BoundPlugin>>>,
    parent: Option<(Weak<InstanceCore>, u32)>,
}

/// Cheap cloneable handle to one live instance
#[derive(Debug, Clone)]
pub struct RuntimeInstance {
    core: Rc<InstanceCore>,
}

/// Compile output already resolved; materialize the root and deliver
/// every plugin/socket match.
#[instrument(skip_all, fields(hive = %template.name()))]
pub(crate) fn instantiate_root(
    template: Arc<Template>,
    args: CallArgs,
) -> Result<RuntimeInstance, HiveError> {
    let matches: Vec<MatchEdge> = resolver::resolve(&template)?.matches.clone();
    let root = materialize(template, args, None)?;
    for edge in &matches {
        deliver(&root, edge)?;
    }
    Ok(root)
}

fn materialize(
    template: Arc<Template>,
    mut args: CallArgs,
    parent: Option<(Weak<InstanceCore>, u32)>,
) -> Result<RuntimeInstance, HiveError> {
    let values = template.schema().extract(&mut args)?;
    let params = template.schema().freeze(values)?;

    for decl in template.states() {
        decl.check_arity(args.positional().len())?;
    }
    let mut states = FxHashMap::default();
    for decl in template.states() {
        let value = (decl.factory)(&params, &args)?;
        states.insert(Arc::clone(&decl.name), RefCell::new(value));
    }

    let slots = template
        .slot_defaults
        .iter()
        .cloned()
        .map(RefCell::new)
        .collect();

    let core = Rc::new(InstanceCore {
        id: NEXT_INSTANCE_ID.fetch_add(1, AtomicOrdering::Relaxed),
        template,
        params,
        states,
        slots,
        children: RefCell::new(FxHashMap::default()),
        bindings: RefCell::new(FxHashMap::default()),
        parent,
    });
    trace!(instance = core.id, hive = %core.template.name(), "instance materialized");
    Ok(RuntimeInstance { core })
}

/// Walk one resolved match down from the root, binding the plugin's
/// callable into the socket's instance and running its receiver.
fn deliver(root: &RuntimeInstance, edge: &MatchEdge) -> Result<(), HiveError> {
    let plugin_inst = root.at_path(&edge.plugin.path)?;
    let callable = match &plugin_inst.core.template.bee(edge.plugin.bee).kind {
        BeeKind::Plugin { callable, .. } => Arc::clone(callable),
        other => {
            return Err(HiveError::Callable(format!(
                "matched node '{}' resolved to a {}, not a plugin",
                edge.plugin.name,
                other.name()
            )))
        }
    };
    let bound = BoundPlugin {
        callable,
        owner: plugin_inst,
    };

    let socket_inst = root.at_path(&edge.socket.path)?;
    let receiver = match &socket_inst.core.template.bee(edge.socket.bee).kind {
        BeeKind::Socket { receiver, .. } => receiver.clone(),
        other => {
            return Err(HiveError::Callable(format!(
                "matched node '{}' resolved to a {}, not a socket",
                edge.socket.name,
                other.name()
            )))
        }
    };

    socket_inst
        .core
        .bindings
        .borrow_mut()
        .entry(edge.socket.bee)
        .or_default()
        .push(bound.clone());
    if let Some(rx) = receiver {
        rx(&socket_inst, &bound)?;
    }
    Ok(())
}

impl RuntimeInstance {
    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.core.template
    }

    /// Runtime parameters frozen at instantiation
    pub fn params(&self) -> &FrozenParams {
        &self.core.params
    }

    pub fn parent(&self) -> Option<RuntimeInstance> {
        self.parent_with_index().map(|(p, _)| p)
    }

    fn parent_with_index(&self) -> Option<(RuntimeInstance, u32)> {
        let (weak, index) = self.core.parent.as_ref()?;
        let core = weak.upgrade()?;
        Some((RuntimeInstance { core }, *index))
    }

    // ── Children ─────────────────────────────────────────────

    /// Child instance at a nesting index, materialized on first access
    /// and memoized for the owner's lifetime.
    pub fn child_at(&self, index: u32) -> Result<RuntimeInstance, HiveError> {
        if let Some(child) = self.core.children.borrow().get(&index) {
            return Ok(child.clone());
        }
        let nested = self
            .core
            .template
            .nested()
            .get(index as usize)
            .ok_or_else(|| HiveError::Callable(format!("no nested hive at index {index}")))?;
        let child = materialize(
            Arc::clone(&nested.template),
            nested.args.clone(),
            Some((Rc::downgrade(&self.core), index)),
        )?;
        self.core.children.borrow_mut().insert(index, child.clone());
        Ok(child)
    }

    /// Child by its assigned name.
    pub fn child(&self, name: &str) -> Result<RuntimeInstance, HiveError> {
        let id = self.lookup(name)?;
        match self.core.template.bee(id).kind {
            BeeKind::Nested { index } => self.child_at(index),
            _ => Err(HiveError::Callable(format!(
                "'{name}' is not a nested hive"
            ))),
        }
    }

    fn at_path(&self, path: &[u32]) -> Result<RuntimeInstance, HiveError> {
        let mut current = self.clone();
        for &index in path {
            current = current.child_at(index)?;
        }
        Ok(current)
    }

    fn lookup(&self, name: &str) -> Result<BeeId, HiveError> {
        self.core
            .template
            .external()
            .get(name)
            .or_else(|| self.core.template.internal().get(name))
            // Pure declarations have no runtime surface
            .filter(|id| self.core.template.bee(*id).is_runtime_endpoint())
            .ok_or_else(|| HiveError::UnknownName {
                name: name.to_string(),
            })
    }

    // ── Named data access ────────────────────────────────────

    /// Read a publicly named endpoint.
    pub fn get(&self, name: &str) -> Result<Value, HiveError> {
        self.read_named(name, Access::Public)
    }

    /// Read any named endpoint, private ones included. For use inside
    /// the hive's own callables.
    pub fn get_private(&self, name: &str) -> Result<Value, HiveError> {
        self.read_named(name, Access::Private)
    }

    /// Write a publicly named endpoint.
    pub fn set(&self, name: &str, value: Value) -> Result<(), HiveError> {
        let point = self.accessor_point(name, Access::Public)?;
        self.write_point(&point, value)
    }

    /// Write any named endpoint, private ones included.
    pub fn set_private(&self, name: &str, value: Value) -> Result<(), HiveError> {
        let point = self.accessor_point(name, Access::Private)?;
        self.write_point(&point, value)
    }

    fn read_named(&self, name: &str, reach: Access) -> Result<Value, HiveError> {
        let point = self.accessor_point(name, reach)?;
        self.read_point(&point)
    }

    fn accessor_point(&self, name: &str, reach: Access) -> Result<EdgePoint, HiveError> {
        let accessor = self
            .core
            .template
            .accessor(name)
            .ok_or_else(|| HiveError::UnknownName {
                name: name.to_string(),
            })?;
        if accessor.access == Access::Private && reach == Access::Public {
            return Err(HiveError::PrivateName {
                name: name.to_string(),
            });
        }
        Ok(accessor.point.clone())
    }

    /// Snapshot of a registered state object.
    pub fn state(&self, name: &str) -> Result<Value, HiveError> {
        self.core
            .states
            .get(name)
            .map(|cell| cell.borrow().clone())
            .ok_or_else(|| HiveError::UnknownState {
                state: name.to_string(),
            })
    }

    /// Plugins delivered to a named socket, in resolution order.
    pub fn bindings(&self, name: &str) -> Result<Vec<BoundPlugin>, HiveError> {
        let id = self.lookup(name)?;
        if !self.core.template.bee(id).is_socketable() {
            return Err(HiveError::Callable(format!("'{name}' is not a socket")));
        }
        Ok(self
            .core
            .bindings
            .borrow()
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    // ── Triggering ───────────────────────────────────────────

    /// Fire an externally named trigger endpoint.
    pub fn fire(&self, name: &str) -> Result<(), HiveError> {
        let id = match self.core.template.external().get(name) {
            Some(id) => id,
            None if self.core.template.internal().contains(name) => {
                return Err(HiveError::PrivateName {
                    name: name.to_string(),
                })
            }
            None => {
                return Err(HiveError::UnknownName {
                    name: name.to_string(),
                })
            }
        };
        self.fire_checked(id, name)
    }

    /// Fire any named trigger endpoint, private ones included.
    pub fn fire_private(&self, name: &str) -> Result<(), HiveError> {
        let id = self.lookup(name)?;
        self.fire_checked(id, name)
    }

    fn fire_checked(&self, id: BeeId, name: &str) -> Result<(), HiveError> {
        let bee = self.core.template.bee(id);
        let fireable = bee.is_trigger_target()
            || matches!(bee.kind, BeeKind::Hook | BeeKind::PushOut { .. });
        if !fireable {
            return Err(HiveError::NotTriggerable {
                name: name.to_string(),
            });
        }
        self.fire_point(&EdgePoint::local(id))
    }

    /// Act on the bee at a point, then propagate its trigger edges.
    fn fire_point(&self, point: &EdgePoint) -> Result<(), HiveError> {
        if let Some((index, rest)) = point.step() {
            return self.child_at(index)?.fire_point(&rest);
        }
        let bee = self.core.template.bee(point.bee());
        match &bee.kind {
            BeeKind::TriggerFunc { f } | BeeKind::Triggerable { f } | BeeKind::Modifier { f } => {
                f(self)?;
            }
            BeeKind::Entry { target } => {
                let target = target.clone();
                return self.fire_point(&target);
            }
            // Relay and arrival points act by propagating alone
            BeeKind::Hook | BeeKind::PushIn { .. } => {}
            BeeKind::PushOut { store } => {
                let value = self.read_point(&EdgePoint::local(*store))?;
                self.push_from(point, &value)?;
            }
            other => {
                return Err(HiveError::Callable(format!(
                    "a {} cannot be fired",
                    other.name()
                )))
            }
        }
        if self.core.template.bee(point.bee()).is_trigger_source() {
            self.propagate_trigger(point)?;
        }
        Ok(())
    }

    /// Fan a source's trigger edges out: all pre edges (own table, then
    /// the parent's lifted view) complete before any normal edge runs.
    fn propagate_trigger(&self, point: &EdgePoint) -> Result<(), HiveError> {
        let mut pre: Vec<(RuntimeInstance, EdgePoint)> = Vec::new();
        let mut normal: Vec<(RuntimeInstance, EdgePoint)> = Vec::new();

        if let Some(fan) = self.core.template.dispatch().trigger_fan_out(point) {
            pre.extend(fan.pre.iter().map(|t| (self.clone(), t.clone())));
            normal.extend(fan.normal.iter().map(|t| (self.clone(), t.clone())));
        }
        if let Some((parent, index)) = self.parent_with_index() {
            let lifted = EdgePoint::under(index, point.clone());
            if let Some(fan) = parent.core.template.dispatch().trigger_fan_out(&lifted) {
                pre.extend(fan.pre.iter().map(|t| (parent.clone(), t.clone())));
                normal.extend(fan.normal.iter().map(|t| (parent.clone(), t.clone())));
            }
        }

        for (instance, target) in pre.into_iter().chain(normal) {
            instance.fire_point(&target)?;
        }
        Ok(())
    }

    // ── Point-addressed reads and writes ─────────────────────

    fn read_point(&self, point: &EdgePoint) -> Result<Value, HiveError> {
        if let Some((index, rest)) = point.step() {
            return self.child_at(index)?.read_point(&rest);
        }
        let bee = self.core.template.bee(point.bee());
        match &bee.kind {
            BeeKind::Attribute { slot, .. } => Ok(self.core.slots[*slot].borrow().clone()),
            BeeKind::Property { state, field, .. } => {
                let cell = self.core.states.get(state.as_ref()).ok_or_else(|| {
                    HiveError::UnknownState {
                        state: state.to_string(),
                    }
                })?;
                cell.borrow()
                    .get(field.as_ref())
                    .cloned()
                    .ok_or_else(|| HiveError::UnknownName {
                        name: field.to_string(),
                    })
            }
            BeeKind::Antenna { target } | BeeKind::Output { target } => {
                let target = target.clone();
                self.read_point(&target)
            }
            BeeKind::PushIn { store }
            | BeeKind::PushOut { store }
            | BeeKind::PullOut { store } => self.read_point(&EdgePoint::local(*store)),
            BeeKind::PullIn { store } => {
                let store = *store;
                if let Some(pulled) = self.pull_value(point)? {
                    self.write_point(&EdgePoint::local(store), pulled.clone())?;
                    return Ok(pulled);
                }
                self.read_point(&EdgePoint::local(store))
            }
            other => Err(HiveError::Callable(format!(
                "a {} holds no value",
                other.name()
            ))),
        }
    }

    /// Depth-first pull across the upstream edge, if one is wired. The
    /// edge may live in this template or in any ancestor's; edges are
    /// keyed on terminal points, so the pulling bee lifts its own point
    /// level by level until a table matches.
    fn pull_value(&self, point: &EdgePoint) -> Result<Option<Value>, HiveError> {
        let mut node = self.clone();
        let mut lifted = point.clone();
        loop {
            if let Some(source) = node.core.template.dispatch().pull_source(&lifted) {
                let source = source.clone();
                return node.read_point(&source).map(Some);
            }
            match node.parent_with_index() {
                Some((parent, index)) => {
                    lifted = EdgePoint::under(index, lifted);
                    node = parent;
                }
                None => return Ok(None),
            }
        }
    }

    fn write_point(&self, point: &EdgePoint, value: Value) -> Result<(), HiveError> {
        if let Some((index, rest)) = point.step() {
            return self.child_at(index)?.write_point(&rest, value);
        }
        let bee = self.core.template.bee(point.bee());
        match &bee.kind {
            BeeKind::Attribute { slot, .. } => {
                *self.core.slots[*slot].borrow_mut() = value;
                Ok(())
            }
            BeeKind::Property { state, field, .. } => {
                let cell = self.core.states.get(state.as_ref()).ok_or_else(|| {
                    HiveError::UnknownState {
                        state: state.to_string(),
                    }
                })?;
                let mut object = cell.borrow_mut();
                match object.as_object_mut() {
                    Some(map) => {
                        map.insert(field.to_string(), value);
                        Ok(())
                    }
                    None => Err(HiveError::Callable(format!(
                        "state '{state}' is not an object, cannot set field '{field}'"
                    ))),
                }
            }
            BeeKind::Antenna { target } | BeeKind::Output { target } => {
                let target = target.clone();
                self.write_point(&target, value)
            }
            // Data arrival at a push input fires it
            BeeKind::PushIn { store } => {
                self.write_point(&EdgePoint::local(*store), value)?;
                self.propagate_trigger(point)
            }
            // Writing a push output stores, copies downstream, then fires
            BeeKind::PushOut { store } => {
                self.write_point(&EdgePoint::local(*store), value.clone())?;
                self.push_from(point, &value)?;
                self.propagate_trigger(point)
            }
            BeeKind::PullIn { store } | BeeKind::PullOut { store } => {
                self.write_point(&EdgePoint::local(*store), value)
            }
            other => Err(HiveError::Callable(format!(
                "a {} accepts no value",
                other.name()
            ))),
        }
    }

    /// Copy a value along every push edge leaving this point, own table
    /// first, then each ancestor's lifted view. A source re-exported
    /// through output proxies keys the ancestor's edge on this same
    /// terminal point.
    fn push_from(&self, point: &EdgePoint, value: &Value) -> Result<(), HiveError> {
        let mut node = self.clone();
        let mut lifted = point.clone();
        loop {
            let targets: Vec<EdgePoint> = node
                .core
                .template
                .dispatch()
                .push_targets(&lifted)
                .to_vec();
            for target in targets {
                node.write_point(&target, value.clone())?;
            }
            match node.parent_with_index() {
                Some((parent, index)) => {
                    lifted = EdgePoint::under(index, lifted);
                    node = parent;
                }
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bee::CardinalityPolicy;
    use crate::builder::HiveClass;
    use crate::identifier::Identifier;
    use serde_json::json;

    fn counter_hive() -> HiveClass {
        HiveClass::new("counter")
            .declarator("declare", |schema| {
                schema.declare("step", Identifier::untyped(), Some(json!(1)), None)
            })
            .builder("build", |ctx| {
                let count = ctx.attribute(Identifier::untyped(), json!(0));
                ctx.external("count", count)?;
                let step = ctx.meta().get("step").and_then(Value::as_i64).unwrap_or(1);
                let bump = ctx.triggerable(move |inst| {
                    let current = inst.get("count")?.as_i64().unwrap_or(0);
                    inst.set("count", json!(current + step))
                });
                let entry = ctx.entry(bump)?;
                ctx.external("bump", entry)
            })
    }

    #[test]
    fn fire_runs_the_wired_callable() {
        let inst = counter_hive().instantiate(CallArgs::new()).unwrap();
        assert_eq!(inst.get("count").unwrap(), json!(0));
        inst.fire("bump").unwrap();
        inst.fire("bump").unwrap();
        assert_eq!(inst.get("count").unwrap(), json!(2));
    }

    #[test]
    fn meta_params_specialize_the_template() {
        let fives = counter_hive()
            .instantiate(CallArgs::new().kwarg("step", 5))
            .unwrap();
        fives.fire("bump").unwrap();
        assert_eq!(fives.get("count").unwrap(), json!(5));
    }

    #[test]
    fn instances_of_one_template_do_not_share_data() {
        let class = counter_hive();
        let a = class.instantiate(CallArgs::new()).unwrap();
        let b = class.instantiate(CallArgs::new()).unwrap();
        assert!(Arc::ptr_eq(a.template(), b.template()));

        a.fire("bump").unwrap();
        assert_eq!(a.get("count").unwrap(), json!(1));
        assert_eq!(b.get("count").unwrap(), json!(0));
    }

    #[test]
    fn internal_names_are_private_on_the_handle() {
        let class = HiveClass::new("hidden").builder("build", |ctx| {
            let secret = ctx.attribute(Identifier::untyped(), json!("shh"));
            ctx.internal("secret", secret)?;
            let wipe = ctx.triggerable(|inst| inst.set_private("secret", json!("")));
            let entry = ctx.entry(wipe)?;
            ctx.internal("wipe", entry)
        });
        let inst = class.instantiate(CallArgs::new()).unwrap();

        assert!(matches!(
            inst.get("secret"),
            Err(HiveError::PrivateName { .. })
        ));
        assert_eq!(inst.get_private("secret").unwrap(), json!("shh"));

        assert!(matches!(
            inst.fire("wipe"),
            Err(HiveError::PrivateName { .. })
        ));
        inst.fire_private("wipe").unwrap();
        assert_eq!(inst.get_private("secret").unwrap(), json!(""));
        assert!(matches!(
            inst.get("missing"),
            Err(HiveError::UnknownName { .. })
        ));
    }

    #[test]
    fn runtime_parameters_resolve_at_instantiation() {
        let class = HiveClass::new("greeter").builder("build", |ctx| {
            ctx.parameter("who", Identifier::untyped(), Some(json!("world")), None)?;
            Ok(())
        });

        let named = class
            .instantiate(CallArgs::new().kwarg("who", "bees"))
            .unwrap();
        assert_eq!(named.params().get("who"), Some(&json!("bees")));

        let defaulted = class.instantiate(CallArgs::new()).unwrap();
        assert_eq!(defaulted.params().get("who"), Some(&json!("world")));
    }

    #[test]
    fn state_factories_consume_leftover_positionals() {
        let class = HiveClass::new("tank").builder("build", |ctx| {
            ctx.state("level", 1..=1, |_, args| {
                Ok(json!({ "fill": args.positional()[0] }))
            })?;
            let gauge = ctx.property("level", "fill", Identifier::untyped());
            ctx.external("fill", gauge)
        });

        let inst = class.instantiate(CallArgs::new().arg(40)).unwrap();
        assert_eq!(inst.state("level").unwrap(), json!({ "fill": 40 }));
        assert_eq!(inst.get("fill").unwrap(), json!(40));

        inst.set("fill", json!(55)).unwrap();
        assert_eq!(inst.state("level").unwrap(), json!({ "fill": 55 }));
        assert!(matches!(
            inst.state("pressure"),
            Err(HiveError::UnknownState { .. })
        ));
    }

    #[test]
    fn push_copies_at_write_time() {
        let class = HiveClass::new("pusher").builder("build", |ctx| {
            let src = ctx.attribute(Identifier::untyped(), json!(0));
            let dst = ctx.attribute(Identifier::untyped(), json!(0));
            let out = ctx.push_out(src)?;
            let inp = ctx.push_in(dst)?;
            ctx.connect(out, inp)?;
            ctx.external("out", out)?;
            ctx.external("dst", dst)
        });

        let inst = class.instantiate(CallArgs::new()).unwrap();
        inst.set("out", json!(7)).unwrap();
        assert_eq!(inst.get("dst").unwrap(), json!(7));

        // The copy detaches: the target keeps its own value afterwards
        inst.set("dst", json!(0)).unwrap();
        inst.set("out", json!(9)).unwrap();
        assert_eq!(inst.get("dst").unwrap(), json!(9));
    }

    #[test]
    fn pull_reads_lazily_through_the_wire() {
        let class = HiveClass::new("puller").builder("build", |ctx| {
            let src = ctx.attribute(Identifier::untyped(), json!("fresh"));
            let dst = ctx.attribute(Identifier::untyped(), json!("stale"));
            let out = ctx.pull_out(src)?;
            let inp = ctx.pull_in(dst)?;
            ctx.connect(out, inp)?;
            ctx.external("src", src)?;
            ctx.external("inp", inp)
        });

        let inst = class.instantiate(CallArgs::new()).unwrap();
        inst.set("src", json!("updated")).unwrap();
        // Each read walks upstream, never returning the stale cache
        assert_eq!(inst.get("inp").unwrap(), json!("updated"));
    }

    #[test]
    fn push_arrival_fires_downstream_triggers() {
        let class = HiveClass::new("reactive").builder("build", |ctx| {
            let store = ctx.attribute(Identifier::untyped(), json!(0));
            let seen = ctx.attribute(Identifier::untyped(), json!(false));
            let inp = ctx.push_in(store)?;
            ctx.external("inp", inp)?;
            ctx.external("seen", seen)?;
            let mark = ctx.triggerable(|inst| inst.set("seen", json!(true)));
            ctx.trigger(inp, mark)
        });

        let inst = class.instantiate(CallArgs::new()).unwrap();
        assert_eq!(inst.get("seen").unwrap(), json!(false));
        inst.set("inp", json!(3)).unwrap();
        assert_eq!(inst.get("seen").unwrap(), json!(true));
    }

    #[test]
    fn firing_a_data_bee_is_rejected() {
        let class = HiveClass::new("mute").builder("build", |ctx| {
            let attr = ctx.attribute(Identifier::untyped(), json!(0));
            ctx.external("attr", attr)
        });
        let inst = class.instantiate(CallArgs::new()).unwrap();
        assert!(matches!(
            inst.fire("attr"),
            Err(HiveError::NotTriggerable { .. })
        ));
    }

    #[test]
    fn callable_errors_surface_unchanged() {
        let class = HiveClass::new("faulty").builder("build", |ctx| {
            let boom = ctx.triggerable(|_inst| Err(HiveError::callable("sensor offline")));
            let entry = ctx.entry(boom)?;
            ctx.external("poll", entry)
        });
        let inst = class.instantiate(CallArgs::new()).unwrap();
        match inst.fire("poll") {
            Err(HiveError::Callable(msg)) => assert_eq!(msg, "sensor offline"),
            other => panic!("expected the callable's own error, got {other:?}"),
        }
    }

    #[test]
    fn sockets_collect_bindings_with_shared_callables() {
        let class = HiveClass::new("plugged").builder("build", |ctx| {
            let plug = ctx.plugin(
                Identifier::parse("math.double").unwrap(),
                CardinalityPolicy::SingleRequired,
                true,
                |_, payload| Ok(json!(payload.as_i64().unwrap_or(0) * 2)),
            );
            ctx.external("doubler", plug)?;
            let sock = ctx.socket(
                Identifier::parse("math").unwrap(),
                CardinalityPolicy::SingleRequired,
                true,
            );
            ctx.external("sock", sock)
        });

        let inst = class.instantiate(CallArgs::new()).unwrap();
        let bindings = inst.bindings("sock").unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].call(json!(21)).unwrap(), json!(42));

        let again = inst.bindings("sock").unwrap();
        assert!(bindings[0].shares_callable(&again[0]));
    }
}

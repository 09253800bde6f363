//! Bees: the atomic wiring primitives, and the capability model
//!
//! Every composition decision in the engine dispatches on *capability*
//! (can this bee source a trigger? accept a connection? be exported?),
//! never on the concrete kind. The capability predicates on [`Bee`] are
//! the single source of truth for that table.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::HiveError;
use crate::graph::EdgePoint;
use crate::identifier::Identifier;
use crate::instance::{BoundPlugin, RuntimeInstance};
use crate::params::{CallArgs, FrozenParams};

/// Index into a template's bee arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BeeId(pub(crate) u32);

impl BeeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Callable run when a trigger reaches a bee
pub type TriggerFn = Arc<dyn Fn(&RuntimeInstance) -> Result<(), HiveError> + Send + Sync>;

/// Producer callable advertised by a plugin
pub type PluginFn = Arc<dyn Fn(&RuntimeInstance, Value) -> Result<Value, HiveError> + Send + Sync>;

/// Optional receiver a socket runs for each plugin delivered to it
pub type SocketRx = Arc<dyn Fn(&RuntimeInstance, &BoundPlugin) -> Result<(), HiveError> + Send + Sync>;

/// Factory for one state object, fed the frozen runtime parameters and
/// the argument leftovers the schemas did not consume
pub type StateFn = Arc<dyn Fn(&FrozenParams, &CallArgs) -> Result<Value, HiveError> + Send + Sync>;

/// Inclusive [min, max] constraint on realized plugin/socket connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CardinalityPolicy {
    SingleRequired,
    SingleOptional,
    MultipleRequired,
    MultipleOptional,
}

impl CardinalityPolicy {
    pub fn min(self) -> usize {
        match self {
            CardinalityPolicy::SingleRequired | CardinalityPolicy::MultipleRequired => 1,
            CardinalityPolicy::SingleOptional | CardinalityPolicy::MultipleOptional => 0,
        }
    }

    /// `None` means unbounded
    pub fn max(self) -> Option<usize> {
        match self {
            CardinalityPolicy::SingleRequired | CardinalityPolicy::SingleOptional => Some(1),
            CardinalityPolicy::MultipleRequired | CardinalityPolicy::MultipleOptional => None,
        }
    }
}

/// A bee's concrete kind and payload
#[derive(Clone)]
pub enum BeeKind {
    /// Callable that can be triggered and can source further triggers
    TriggerFunc { f: TriggerFn },
    /// Like `TriggerFunc`, declared by the host rather than wiring sugar
    Triggerable { f: TriggerFn },
    /// State-mutating callable; target only, never a source
    Modifier { f: TriggerFn },
    /// Exported trigger target forwarding into the hive
    Entry { target: EdgePoint },
    /// Exported trigger source relaying out of the hive
    Hook,
    /// Exported connection target forwarding to an inner input
    Antenna { target: EdgePoint },
    /// Exported connection source forwarding from an inner output
    Output { target: EdgePoint },
    /// Push-mode input writing into a storage bee
    PushIn { store: BeeId },
    /// Push-mode output reading from a storage bee
    PushOut { store: BeeId },
    /// Pull-mode input caching into a storage bee
    PullIn { store: BeeId },
    /// Pull-mode output reading from a storage bee
    PullOut { store: BeeId },
    /// Typed value slot owned by the instance
    Attribute { data_type: Identifier, slot: usize },
    /// Bridge to a field of a host state object
    Property {
        state: Arc<str>,
        field: Arc<str>,
        data_type: Identifier,
    },
    /// Schema entry; pure declaration, dropped at runtime
    Parameter { name: Arc<str> },
    /// Identifier-addressed consumer matched tree-wide
    Socket {
        identifier: Identifier,
        policy: CardinalityPolicy,
        export: bool,
        receiver: Option<SocketRx>,
    },
    /// Identifier-addressed producer matched tree-wide
    Plugin {
        identifier: Identifier,
        policy: CardinalityPolicy,
        export: bool,
        callable: PluginFn,
    },
    /// Embedded child hive
    Nested { index: u32 },
}

impl BeeKind {
    pub fn name(&self) -> &'static str {
        match self {
            BeeKind::TriggerFunc { .. } => "trigger_func",
            BeeKind::Triggerable { .. } => "triggerable",
            BeeKind::Modifier { .. } => "modifier",
            BeeKind::Entry { .. } => "entry",
            BeeKind::Hook => "hook",
            BeeKind::Antenna { .. } => "antenna",
            BeeKind::Output { .. } => "output",
            BeeKind::PushIn { .. } => "push_in",
            BeeKind::PushOut { .. } => "push_out",
            BeeKind::PullIn { .. } => "pull_in",
            BeeKind::PullOut { .. } => "pull_out",
            BeeKind::Attribute { .. } => "attribute",
            BeeKind::Property { .. } => "property",
            BeeKind::Parameter { .. } => "parameter",
            BeeKind::Socket { .. } => "socket",
            BeeKind::Plugin { .. } => "plugin",
            BeeKind::Nested { .. } => "hive",
        }
    }
}

impl fmt::Debug for BeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Callable payloads are opaque; print the shape only
        match self {
            BeeKind::TriggerFunc { .. } => write!(f, "TriggerFunc"),
            BeeKind::Triggerable { .. } => write!(f, "Triggerable"),
            BeeKind::Modifier { .. } => write!(f, "Modifier"),
            BeeKind::Entry { target } => write!(f, "Entry({target:?})"),
            BeeKind::Hook => write!(f, "Hook"),
            BeeKind::Antenna { target } => write!(f, "Antenna({target:?})"),
            BeeKind::Output { target } => write!(f, "Output({target:?})"),
            BeeKind::PushIn { store } => write!(f, "PushIn({store:?})"),
            BeeKind::PushOut { store } => write!(f, "PushOut({store:?})"),
            BeeKind::PullIn { store } => write!(f, "PullIn({store:?})"),
            BeeKind::PullOut { store } => write!(f, "PullOut({store:?})"),
            BeeKind::Attribute { data_type, slot } => {
                write!(f, "Attribute(type={data_type}, slot={slot})")
            }
            BeeKind::Property { state, field, .. } => write!(f, "Property({state}.{field})"),
            BeeKind::Parameter { name } => write!(f, "Parameter({name})"),
            BeeKind::Socket { identifier, policy, .. } => {
                write!(f, "Socket({identifier}, {policy:?})")
            }
            BeeKind::Plugin { identifier, policy, .. } => {
                write!(f, "Plugin({identifier}, {policy:?})")
            }
            BeeKind::Nested { index } => write!(f, "Nested({index})"),
        }
    }
}

/// One bee in a template's arena
///
/// `token` identifies the build that created the bee; a namespace only
/// accepts bees carrying its own build's token.
#[derive(Debug, Clone)]
pub struct Bee {
    pub kind: BeeKind,
    pub(crate) token: u64,
}

impl Bee {
    pub(crate) fn new(kind: BeeKind, token: u64) -> Self {
        Self { kind, token }
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    // ─────────────────────────────────────────────────────────────
    // Capability predicates
    // ─────────────────────────────────────────────────────────────

    pub fn is_trigger_source(&self) -> bool {
        matches!(
            self.kind,
            BeeKind::TriggerFunc { .. }
                | BeeKind::Triggerable { .. }
                | BeeKind::Hook
                | BeeKind::PushIn { .. }
                | BeeKind::PushOut { .. }
        )
    }

    pub fn is_trigger_target(&self) -> bool {
        matches!(
            self.kind,
            BeeKind::TriggerFunc { .. }
                | BeeKind::Triggerable { .. }
                | BeeKind::Modifier { .. }
                | BeeKind::Entry { .. }
                | BeeKind::PushOut { .. }
        )
    }

    pub fn is_connect_source(&self) -> bool {
        matches!(
            self.kind,
            BeeKind::Output { .. } | BeeKind::PushOut { .. } | BeeKind::PullOut { .. }
        )
    }

    pub fn is_connect_target(&self) -> bool {
        matches!(
            self.kind,
            BeeKind::Antenna { .. } | BeeKind::PushIn { .. } | BeeKind::PullIn { .. }
        )
    }

    pub fn is_stateful(&self) -> bool {
        matches!(
            self.kind,
            BeeKind::Attribute { .. } | BeeKind::Property { .. } | BeeKind::Nested { .. }
        )
    }

    pub fn is_bindable(&self) -> bool {
        matches!(
            self.kind,
            BeeKind::TriggerFunc { .. }
                | BeeKind::Triggerable { .. }
                | BeeKind::Modifier { .. }
                | BeeKind::Attribute { .. }
                | BeeKind::Property { .. }
        )
    }

    pub fn is_nameable(&self) -> bool {
        true
    }

    pub fn is_exportable(&self) -> bool {
        matches!(
            self.kind,
            BeeKind::Attribute { .. }
                | BeeKind::Property { .. }
                | BeeKind::Entry { .. }
                | BeeKind::Hook
                | BeeKind::Antenna { .. }
                | BeeKind::Output { .. }
                | BeeKind::PushIn { .. }
                | BeeKind::PushOut { .. }
                | BeeKind::PullIn { .. }
                | BeeKind::PullOut { .. }
                | BeeKind::Socket { .. }
                | BeeKind::Plugin { .. }
                | BeeKind::Nested { .. }
        )
    }

    pub fn is_pluggable(&self) -> bool {
        matches!(self.kind, BeeKind::Plugin { .. })
    }

    pub fn is_socketable(&self) -> bool {
        matches!(self.kind, BeeKind::Socket { .. })
    }

    /// Kinds that survive instantiation as directly usable endpoints.
    /// Pure declarations are dropped from the runtime surface.
    pub fn is_runtime_endpoint(&self) -> bool {
        !matches!(self.kind, BeeKind::Parameter { .. })
    }
}

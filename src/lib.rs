//! Waggle - declarative component wiring for hives of typed bees
//!
//! A hive is declared once as a [`HiveClass`]: a chain of declarator and
//! builder callables that lay out bees, namespaces, and trigger/connect
//! wiring. Compiling a class against call arguments freezes its meta
//! parameters into an immutable [`Template`], memoized process-wide per
//! (class, frozen record). Instantiating a template resolves tree-wide
//! plugin/socket matchmaking once at the root, then materializes a
//! single-threaded [`RuntimeInstance`] with its own state.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`bee`] | Bee kinds, capabilities, cardinality policies |
//! | [`builder`] | Hive classes, build context, wiring resolution |
//! | [`template`] | Compiled templates and the process-wide cache |
//! | [`resolver`] | Plugin/socket matchmaking over the nesting tree |
//! | [`instance`] | Live instances, triggering, push/pull data flow |
//! | [`params`] | Call arguments, schemas, frozen parameter records |
//! | [`identifier`] | Dotted identifiers and prefix matching |
//! | [`namespace`] | Internal/external name assignment |
//! | [`graph`] | Edge points, trigger/connect edges, dispatch tables |
//! | [`error`] | Error taxonomy with fix suggestions |

pub mod bee;
pub mod builder;
pub mod error;
pub mod graph;
pub mod identifier;
pub mod instance;
pub mod interner;
pub mod namespace;
pub mod params;
pub mod resolver;
pub mod template;

pub use bee::{Bee, BeeId, BeeKind, CardinalityPolicy};
pub use builder::{BeeRef, BuildCtx, HiveClass};
pub use error::{FixSuggestion, HiveError};
pub use graph::{ConnectMode, TriggerOrder};
pub use identifier::{Identifier, MatchPolicy};
pub use instance::{BoundPlugin, RuntimeInstance};
pub use namespace::{Namespace, NamespaceRole};
pub use params::{CallArgs, FrozenParams, ParameterSchema};
pub use template::{Template, TemplateId};

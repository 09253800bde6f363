//! Error types with fix suggestions
//!
//! One taxonomy for the whole engine. Build-time errors (schema, namespace,
//! ambiguity, policy, builder) abort template construction; runtime errors
//! inside user callables pass through [`HiveError::Callable`] unchanged.

use std::sync::Arc;

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum HiveError {
    // ─────────────────────────────────────────────────────────────
    // Schema errors (WGL-010 to WGL-015)
    // ─────────────────────────────────────────────────────────────
    #[error("WGL-010: Parameter '{param}' declared twice in the same schema")]
    DuplicateParam { param: Arc<str> },

    #[error("WGL-011: Parameter '{param}' missing and has no default")]
    MissingParam { param: Arc<str> },

    #[error("WGL-012: Value {value} for parameter '{param}' is not in its option set")]
    ParamOutOfRange { param: Arc<str>, value: serde_json::Value },

    #[error("WGL-013: Parameter '{param}' must be passed by keyword (a prior parameter already was)")]
    PositionalAfterKeyword { param: Arc<str> },

    #[error("WGL-014: State '{state}' accepts {expected} leftover positional argument(s), got {got}")]
    StateArity {
        state: Arc<str>,
        expected: String,
        got: usize,
    },

    #[error("WGL-015: State '{state}' registered twice for one hive")]
    DuplicateState { state: Arc<str> },

    // ─────────────────────────────────────────────────────────────
    // Namespace errors (WGL-020 to WGL-024)
    // ─────────────────────────────────────────────────────────────
    #[error("WGL-020: '{name}' is a reserved name")]
    ReservedName { name: Arc<str> },

    #[error("WGL-021: Name '{name}' already assigned in the {role} namespace")]
    DuplicateName { name: Arc<str>, role: &'static str },

    #[error("WGL-022: Bee kind '{kind}' cannot be exported under name '{name}'")]
    NotExportable { name: Arc<str>, kind: &'static str },

    #[error("WGL-023: Bee kind '{kind}' cannot be named ('{name}')")]
    NotNameable { name: Arc<str>, kind: &'static str },

    #[error("WGL-024: Bee assigned as '{name}' belongs to a different build")]
    ForeignBee { name: Arc<str> },

    // ─────────────────────────────────────────────────────────────
    // Wiring errors (WGL-030 to WGL-032)
    // ─────────────────────────────────────────────────────────────
    #[error("WGL-030: Implicit {role} wire on hive '{hive}' has {candidates} candidate(s), need exactly 1")]
    AmbiguousWire {
        hive: Arc<str>,
        role: &'static str,
        candidates: usize,
    },

    // Field kept off the name `source` so thiserror does not treat it
    // as an error chain.
    #[error("WGL-031: Incompatible connection from '{from}' to '{target}': {reason}")]
    IncompatibleWire {
        from: String,
        target: String,
        reason: String,
    },

    #[error("WGL-032: Pull input '{target}' already has an upstream connection")]
    PullAlreadyWired { target: String },

    // ─────────────────────────────────────────────────────────────
    // Matchmaking policy errors (WGL-040 to WGL-041)
    // ─────────────────────────────────────────────────────────────
    #[error("WGL-040: '{bee}' at identifier '{identifier}' realized {realized} connection(s), policy requires at least {min}")]
    PolicyUnderSubscribed {
        identifier: String,
        bee: Arc<str>,
        realized: usize,
        min: usize,
    },

    #[error("WGL-041: '{bee}' at identifier '{identifier}' already holds {realized} connection(s), policy allows at most {max}")]
    PolicyOverSubscribed {
        identifier: String,
        bee: Arc<str>,
        realized: usize,
        max: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // Builder errors (WGL-050)
    // ─────────────────────────────────────────────────────────────
    #[error("WGL-050: Builder '{builder}' failed: {source}")]
    Builder {
        builder: Arc<str>,
        #[source]
        source: Box<HiveError>,
    },

    // ─────────────────────────────────────────────────────────────
    // Runtime access errors (WGL-060 to WGL-063)
    // ─────────────────────────────────────────────────────────────
    #[error("WGL-060: Unknown name '{name}' on this instance")]
    UnknownName { name: String },

    #[error("WGL-061: Name '{name}' is private to the hive that declared it")]
    PrivateName { name: String },

    #[error("WGL-062: '{name}' cannot be triggered")]
    NotTriggerable { name: String },

    #[error("WGL-063: No state object named '{state}' on this instance")]
    UnknownState { state: String },

    // ─────────────────────────────────────────────────────────────
    // User callable errors (WGL-070)
    // ─────────────────────────────────────────────────────────────
    #[error("WGL-070: {0}")]
    Callable(String),
}

impl HiveError {
    /// Wrap an error as coming from the named builder, preserving origin.
    ///
    /// The innermost builder wins: an error already tagged by a nested
    /// composition layer is left alone.
    pub fn in_builder(self, builder: &Arc<str>) -> Self {
        match self {
            err @ HiveError::Builder { .. } => err,
            err => HiveError::Builder {
                builder: Arc::clone(builder),
                source: Box::new(err),
            },
        }
    }

    /// Convenience constructor for errors raised inside user callables.
    pub fn callable(msg: impl Into<String>) -> Self {
        HiveError::Callable(msg.into())
    }
}

impl FixSuggestion for HiveError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            HiveError::DuplicateParam { .. } => Some("Use unique parameter names across the declarator chain"),
            HiveError::MissingParam { .. } => Some("Pass the parameter or declare a default for it"),
            HiveError::ParamOutOfRange { .. } => Some("Pick one of the declared option values"),
            HiveError::PositionalAfterKeyword { .. } => {
                Some("Once any parameter is passed by keyword, pass all later ones by keyword too")
            }
            HiveError::StateArity { .. } => {
                Some("Match the positional arguments left after schema extraction to the state factory")
            }
            HiveError::DuplicateState { .. } => Some("Register each state object once, in the base builder"),
            HiveError::ReservedName { .. } => Some("Rename: 'parent', 'hive' and 'state' are reserved"),
            HiveError::DuplicateName { .. } => Some("Each namespace name can be assigned once per build"),
            HiveError::NotExportable { .. } => {
                Some("Wrap the callable in an entry (target) or hook (source) before exporting")
            }
            HiveError::NotNameable { .. } => None,
            HiveError::ForeignBee { .. } => {
                Some("Create bees through the build context of the hive that names them")
            }
            HiveError::AmbiguousWire { .. } => {
                Some("Name the endpoint explicitly instead of wiring the whole hive")
            }
            HiveError::IncompatibleWire { .. } => {
                Some("Connect push to push, pull to pull, and keep the source data type under the target's")
            }
            HiveError::PullAlreadyWired { .. } => Some("A pull input takes exactly one upstream source"),
            HiveError::PolicyUnderSubscribed { .. } => {
                Some("Provide a plugin/socket at a matching identifier, or relax the policy to optional")
            }
            HiveError::PolicyOverSubscribed { .. } => {
                Some("Relax the policy to multiple, or remove the extra plugin/socket")
            }
            HiveError::Builder { .. } => None,
            HiveError::UnknownName { .. } => Some("Check the external namespace of the hive you instantiated"),
            HiveError::PrivateName { .. } => Some("Only externally named bees are public on an instance"),
            HiveError::NotTriggerable { .. } => Some("Fire entries, hooks, trigger functions or push outputs"),
            HiveError::UnknownState { .. } => Some("Register the state in a builder before accessing it"),
            HiveError::Callable(_) => None,
        }
    }
}

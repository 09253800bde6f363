//! Parameter schemas and frozen parameter records
//!
//! A [`ParameterSchema`] is the mutable, ordered declaration side: each
//! declarator appends named entries with optional defaults and option
//! sets. [`ParameterSchema::extract`] consumes schema names from a call's
//! argument list; [`ParameterSchema::freeze`] turns the resolved values
//! into an immutable [`FrozenParams`] record whose xxh3 digest makes it
//! cheap to hash as a template cache key.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use xxhash_rust::xxh3::Xxh3;

use crate::error::HiveError;
use crate::identifier::Identifier;
use crate::interner::intern;

/// Positional + named arguments for one compile/instantiate call
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<Value>,
    named: FxHashMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a named argument
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn named(&self) -> &FxHashMap<String, Value> {
        &self.named
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// One schema entry, in positional order
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: Arc<str>,
    pub data_type: Identifier,
    pub default: Option<Value>,
    pub options: Option<Vec<Value>>,
}

/// Ordered, named parameter schema
#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    decls: Vec<ParamDecl>,
    index: FxHashMap<Arc<str>, usize>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a schema entry. Order of declaration is positional order.
    pub fn declare(
        &mut self,
        name: &str,
        data_type: Identifier,
        default: Option<Value>,
        options: Option<Vec<Value>>,
    ) -> Result<(), HiveError> {
        let name = intern(name);
        if self.index.contains_key(&name) {
            return Err(HiveError::DuplicateParam { param: name });
        }
        self.index.insert(Arc::clone(&name), self.decls.len());
        self.decls.push(ParamDecl {
            name,
            data_type,
            default,
            options,
        });
        Ok(())
    }

    pub fn decls(&self) -> &[ParamDecl] {
        &self.decls
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Consume schema names from `args`, leaving the rest in place.
    ///
    /// Entries resolve positionally in declaration order until one
    /// resolves by keyword; from then on every later entry must resolve
    /// by keyword or default (the ordinary keyword-after-positional
    /// rule). Named arguments take priority per name.
    pub fn extract(&self, args: &mut CallArgs) -> Result<Vec<(Arc<str>, Value)>, HiveError> {
        let mut values = Vec::with_capacity(self.decls.len());
        let mut cursor = 0usize;
        let mut keyword_seen = false;

        for decl in &self.decls {
            if let Some(value) = args.named.remove(decl.name.as_ref()) {
                keyword_seen = true;
                values.push((Arc::clone(&decl.name), value));
            } else if !keyword_seen && cursor < args.positional.len() {
                values.push((Arc::clone(&decl.name), args.positional[cursor].clone()));
                cursor += 1;
            } else if let Some(default) = &decl.default {
                values.push((Arc::clone(&decl.name), default.clone()));
            } else if keyword_seen && cursor < args.positional.len() {
                return Err(HiveError::PositionalAfterKeyword {
                    param: Arc::clone(&decl.name),
                });
            } else {
                return Err(HiveError::MissingParam {
                    param: Arc::clone(&decl.name),
                });
            }
        }

        args.positional.drain(..cursor);
        Ok(values)
    }

    /// Validate resolved values against their option sets and freeze them.
    pub fn freeze(&self, values: Vec<(Arc<str>, Value)>) -> Result<FrozenParams, HiveError> {
        for (name, value) in &values {
            let Some(&slot) = self.index.get(name) else {
                continue;
            };
            if let Some(options) = &self.decls[slot].options {
                if !options.contains(value) {
                    return Err(HiveError::ParamOutOfRange {
                        param: Arc::clone(name),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(FrozenParams::new(values))
    }

    /// `extract` + `freeze` in one step.
    pub fn resolve(&self, args: &mut CallArgs) -> Result<FrozenParams, HiveError> {
        let values = self.extract(args)?;
        self.freeze(values)
    }
}

/// Immutable, ordered parameter record
///
/// Part of the template cache key: `Hash` uses a digest precomputed at
/// freeze time, `Eq` compares the full entry list.
#[derive(Debug, Clone, Serialize)]
pub struct FrozenParams {
    entries: Vec<(Arc<str>, Value)>,
    #[serde(skip)]
    digest: u64,
}

impl FrozenParams {
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn new(entries: Vec<(Arc<str>, Value)>) -> Self {
        let mut hasher = Xxh3::new();
        for (name, value) in &entries {
            hasher.update(name.as_bytes());
            hasher.update(&[0xff]);
            // serde_json's map ordering is deterministic, so value-equal
            // records always produce the same encoding
            hasher.update(value.to_string().as_bytes());
            hasher.update(&[0xfe]);
        }
        let digest = hasher.digest();
        Self { entries, digest }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn digest(&self) -> u64 {
        self.digest
    }
}

impl PartialEq for FrozenParams {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest && self.entries == other.entries
    }
}

impl Eq for FrozenParams {}

impl std::hash::Hash for FrozenParams {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for FrozenParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

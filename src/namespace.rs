//! Insertion-ordered namespaces with assignment-time validation
//!
//! A build populates two of these: "internal" (private to the hive) and
//! "external" (the instance's public surface). Validation happens at the
//! moment of assignment, never later: reserved names, duplicates, bee
//! ownership, and the Exportable requirement for external names.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::bee::{Bee, BeeId};
use crate::error::HiveError;
use crate::interner::intern;

/// Names no builder may claim
pub const RESERVED_NAMES: &[&str] = &["parent", "hive", "state"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceRole {
    Internal,
    External,
}

impl NamespaceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            NamespaceRole::Internal => "internal",
            NamespaceRole::External => "external",
        }
    }
}

/// Ordered name→bee mapping
///
/// `Vec` keeps insertion order (it is load-bearing for matchmaking and
/// dispatch); the map is a lookup index over the same entries.
#[derive(Debug, Clone)]
pub struct Namespace {
    role: NamespaceRole,
    entries: Vec<(Arc<str>, BeeId)>,
    index: FxHashMap<Arc<str>, usize>,
}

impl Namespace {
    pub fn new(role: NamespaceRole) -> Self {
        Self {
            role,
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn role(&self) -> NamespaceRole {
        self.role
    }

    /// Assign `name` to a bee, validating at assignment time.
    pub fn assign(
        &mut self,
        name: &str,
        id: BeeId,
        bee: &Bee,
        build_token: u64,
    ) -> Result<(), HiveError> {
        let name = intern(name);

        if RESERVED_NAMES.contains(&name.as_ref()) {
            return Err(HiveError::ReservedName { name });
        }
        if self.index.contains_key(&name) {
            return Err(HiveError::DuplicateName {
                name,
                role: self.role.as_str(),
            });
        }
        if bee.token != build_token {
            return Err(HiveError::ForeignBee { name });
        }
        if !bee.is_nameable() {
            return Err(HiveError::NotNameable {
                name,
                kind: bee.kind_name(),
            });
        }
        if self.role == NamespaceRole::External && !bee.is_exportable() {
            return Err(HiveError::NotExportable {
                name,
                kind: bee.kind_name(),
            });
        }

        self.index.insert(Arc::clone(&name), self.entries.len());
        self.entries.push((name, id));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<BeeId> {
        self.index.get(name).map(|&i| self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, BeeId)> {
        self.entries.iter().map(|(n, id)| (n, *id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bee::BeeKind;
    use crate::identifier::Identifier;

    const TOKEN: u64 = 42;

    fn attribute() -> Bee {
        Bee::new(
            BeeKind::Attribute {
                data_type: Identifier::untyped(),
                slot: 0,
            },
            TOKEN,
        )
    }

    fn hook() -> Bee {
        Bee::new(BeeKind::Hook, TOKEN)
    }

    #[test]
    fn preserves_insertion_order() {
        let mut ns = Namespace::new(NamespaceRole::Internal);
        ns.assign("gamma", BeeId(0), &attribute(), TOKEN).unwrap();
        ns.assign("alpha", BeeId(1), &attribute(), TOKEN).unwrap();
        ns.assign("beta", BeeId(2), &attribute(), TOKEN).unwrap();

        let names: Vec<_> = ns.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, ["gamma", "alpha", "beta"]);
        assert_eq!(ns.get("alpha"), Some(BeeId(1)));
    }

    #[test]
    fn rejects_reserved_and_duplicate_names() {
        let mut ns = Namespace::new(NamespaceRole::Internal);

        let err = ns.assign("parent", BeeId(0), &attribute(), TOKEN).unwrap_err();
        assert!(matches!(err, HiveError::ReservedName { .. }));

        ns.assign("value", BeeId(0), &attribute(), TOKEN).unwrap();
        let err = ns.assign("value", BeeId(1), &attribute(), TOKEN).unwrap_err();
        assert!(matches!(err, HiveError::DuplicateName { role: "internal", .. }));
    }

    #[test]
    fn rejects_bees_from_another_build() {
        let mut ns = Namespace::new(NamespaceRole::Internal);
        let err = ns.assign("value", BeeId(0), &attribute(), TOKEN + 1).unwrap_err();
        assert!(matches!(err, HiveError::ForeignBee { .. }));
    }

    #[test]
    fn external_requires_exportable() {
        let mut ns = Namespace::new(NamespaceRole::External);

        let modifier = Bee::new(
            BeeKind::Modifier {
                f: std::sync::Arc::new(|_| Ok(())),
            },
            TOKEN,
        );
        let err = ns.assign("tick", BeeId(0), &modifier, TOKEN).unwrap_err();
        assert!(matches!(err, HiveError::NotExportable { kind: "modifier", .. }));

        // Attributes and hooks export fine
        ns.assign("value", BeeId(1), &attribute(), TOKEN).unwrap();
        ns.assign("fired", BeeId(2), &hook(), TOKEN).unwrap();
        assert!(ns.contains("fired"));
    }
}

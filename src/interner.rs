//! String interning for identifier segments and namespace names
//!
//! Ensures each unique segment string is stored only once in memory.
//! Uses DashMap for lock-free concurrent access: templates may be compiled
//! from several threads, so the interner must be shared and thread-safe.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Global segment interner (thread-safe, lock-free)
static INTERNER: Lazy<Interner> = Lazy::new(Interner::new);

/// Thread-safe string interner using DashMap
pub struct Interner {
    strings: DashMap<Arc<str>, ()>,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            strings: DashMap::new(),
        }
    }

    /// Intern a string, returning a shared `Arc<str>`.
    ///
    /// If the string was already interned, returns the existing Arc.
    pub fn intern(&self, s: &str) -> Arc<str> {
        let key: Arc<str> = Arc::from(s);

        if let Some(existing) = self.strings.get(&key) {
            return Arc::clone(existing.key());
        }

        self.strings.insert(Arc::clone(&key), ());
        key
    }

    /// Number of interned strings
    #[allow(dead_code)] // Used in tests
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

/// Intern a segment or name through the global interner
#[inline]
pub fn intern(s: &str) -> Arc<str> {
    INTERNER.intern(s)
}

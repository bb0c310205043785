//! Realm -> abstraction allow-list compilation and lookup.
//!
//! Built once from configuration and never mutated afterwards; safe for
//! unsynchronized concurrent reads.

use std::collections::{BTreeSet, HashMap};

use realmgate_core::error::{MeshError, Result};
use realmgate_core::protocol::{AbstractionKind, RealmCapability};

use crate::config::RealmConfig;

/// A bounded service context and what it may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm {
    pub id: String,
    permitted: BTreeSet<AbstractionKind>,
    flags: BTreeSet<RealmCapability>,
}

impl Realm {
    pub fn new<A, F>(id: impl Into<String>, permitted: A, flags: F) -> Self
    where
        A: IntoIterator<Item = AbstractionKind>,
        F: IntoIterator<Item = RealmCapability>,
    {
        Self {
            id: id.into(),
            permitted: permitted.into_iter().collect(),
            flags: flags.into_iter().collect(),
        }
    }

    pub fn permits(&self, kind: AbstractionKind) -> bool {
        self.permitted.contains(&kind)
    }

    pub fn has(&self, cap: RealmCapability) -> bool {
        self.flags.contains(&cap)
    }

    pub fn abstractions(&self) -> impl Iterator<Item = AbstractionKind> + '_ {
        self.permitted.iter().copied()
    }
}

/// Immutable realm table injected into the gateway at construction.
#[derive(Debug, Clone, Default)]
pub struct RealmMap {
    realms: HashMap<String, Realm>,
}

impl RealmMap {
    pub fn compile(raw: &[RealmConfig]) -> Result<Self> {
        let mut realms = HashMap::with_capacity(raw.len());
        for r in raw {
            let mut permitted = BTreeSet::new();
            for name in &r.abstractions {
                let kind = name.parse::<AbstractionKind>().map_err(|_| {
                    MeshError::Config(format!("realm {}: unknown abstraction '{name}'", r.id))
                })?;
                permitted.insert(kind);
            }
            let realm = Realm::new(r.id.clone(), permitted, r.capabilities.iter().copied());
            if realms.insert(r.id.clone(), realm).is_some() {
                return Err(MeshError::Config(format!("duplicate realm id: {}", r.id)));
            }
        }
        Ok(Self { realms })
    }

    pub fn from_realms<I: IntoIterator<Item = Realm>>(realms: I) -> Self {
        Self {
            realms: realms.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn realm(&self, id: &str) -> Option<&Realm> {
        self.realms.get(id)
    }

    /// Unknown realms and unknown kinds are never allowed.
    pub fn is_allowed(&self, realm: &str, kind: AbstractionKind) -> bool {
        self.realms.get(realm).is_some_and(|r| r.permits(kind))
    }

    /// String-keyed variant; names outside the closed set are never allowed.
    pub fn is_allowed_name(&self, realm: &str, name: &str) -> bool {
        name.parse::<AbstractionKind>()
            .map(|k| self.is_allowed(realm, k))
            .unwrap_or(false)
    }

    pub fn has_capability(&self, realm: &str, cap: RealmCapability) -> bool {
        self.realms.get(realm).is_some_and(|r| r.has(cap))
    }

    pub fn len(&self) -> usize {
        self.realms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }

    pub fn realm_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.realms.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

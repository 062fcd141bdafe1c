//! Roles and role aliases
//!
//! A role names who may exercise a permission inside a contract. It is either
//! a concrete `SimpleRole` holding keys (or their anonymous ids), or a
//! `RoleAlias` that points, by name, at another role of the same contract.
//!
//! Roles find their siblings through the `RoleScope` they are attached to.
//! The binding is weak: a contract owns its roles, never the other way round.
//!
//! Alias resolution is bounded by `MAX_ALIAS_DEPTH` hops. Anything that does
//! not resolve within the bound (a cycle, a dangling name, a detached alias)
//! yields `None`, and every query answered through an alias then denies.

use crate::crypto;
use crate::types::{AnonymousId, PubKey};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use thiserror::Error;

/// Maximum number of alias hops followed by [`RoleAlias::resolve`].
pub const MAX_ALIAS_DEPTH: usize = 40;

/// Errors raised when defining roles
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoleError {
    #[error("role alias '{0}' targets itself")]
    SelfReference(String),

    #[error("role name must not be empty")]
    EmptyName,
}

/// Name-indexed role lookup, implemented by whatever owns a role table.
pub trait RoleScope: Send + Sync {
    /// Role registered under `name`, if any.
    fn role(&self, name: &str) -> Option<Arc<Role>>;
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Weak link from a role to the scope it lives in.
#[derive(Default)]
struct RoleBinding {
    scope: RwLock<Option<Weak<dyn RoleScope>>>,
}

impl RoleBinding {
    fn attach(&self, scope: Weak<dyn RoleScope>) {
        *self.scope.write().unwrap_or_else(PoisonError::into_inner) = Some(scope);
    }

    fn scope(&self) -> Option<Arc<dyn RoleScope>> {
        self.scope
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

impl Clone for RoleBinding {
    fn clone(&self) -> Self {
        let scope = self.scope.read().unwrap_or_else(PoisonError::into_inner).clone();
        Self { scope: RwLock::new(scope) }
    }
}

impl fmt::Debug for RoleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.scope().is_some() { "attached" } else { "detached" };
        f.write_str(state)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A named role: concrete or alias.
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    Simple(SimpleRole),
    Alias(RoleAlias),
}

impl Role {
    /// Concrete role held by the given keys.
    pub fn simple(name: impl Into<String>, keys: impl IntoIterator<Item = PubKey>) -> Self {
        Role::Simple(SimpleRole::new(name, keys))
    }

    /// Alias role pointing at `target`.
    pub fn alias(name: impl Into<String>, target: impl Into<String>) -> Result<Self, RoleError> {
        RoleAlias::new(name, target).map(Role::Alias)
    }

    pub fn name(&self) -> &str {
        match self {
            Role::Simple(r) => r.name(),
            Role::Alias(a) => a.name(),
        }
    }

    pub fn as_alias(&self) -> Option<&RoleAlias> {
        match self {
            Role::Alias(a) => Some(a),
            Role::Simple(_) => None,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Role::Alias(_))
    }

    /// Bind this role to the scope that owns it. Shared by every role kind.
    pub fn attach<S: RoleScope + 'static>(&self, scope: &Arc<S>) {
        let scope: Arc<dyn RoleScope> = scope.clone();
        self.attach_weak(Arc::downgrade(&scope));
    }

    /// Bind to a scope through an existing weak handle (used while the owner
    /// is still being constructed).
    pub fn attach_weak(&self, scope: Weak<dyn RoleScope>) {
        match self {
            Role::Simple(r) => r.binding.attach(scope),
            Role::Alias(a) => a.binding.attach(scope),
        }
    }

    /// True if a live scope is bound.
    pub fn is_attached(&self) -> bool {
        match self {
            Role::Simple(r) => r.binding.scope().is_some(),
            Role::Alias(a) => a.binding.scope().is_some(),
        }
    }

    pub fn keys(&self) -> BTreeSet<PubKey> {
        match self {
            Role::Simple(r) => r.keys(),
            Role::Alias(a) => a.keys(),
        }
    }

    pub fn anonymous_ids(&self) -> BTreeSet<AnonymousId> {
        match self {
            Role::Simple(r) => r.anonymous_ids(),
            Role::Alias(a) => a.anonymous_ids(),
        }
    }

    pub fn is_allowed_for_keys(&self, keys: &BTreeSet<PubKey>) -> bool {
        match self {
            Role::Simple(r) => r.is_allowed_for_keys(keys),
            Role::Alias(a) => a.is_allowed_for_keys(keys),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Role::Simple(r) => r.is_valid(),
            Role::Alias(a) => a.is_valid(),
        }
    }

    pub fn equal_keys(&self, other: &Role) -> bool {
        match self {
            Role::Simple(r) => r.equal_keys(other),
            Role::Alias(a) => a.equal_keys(other),
        }
    }

    pub fn anonymize(&self) {
        match self {
            Role::Simple(r) => r.anonymize(),
            Role::Alias(a) => a.anonymize(),
        }
    }
}

// ---------------------------------------------------------------------------
// SimpleRole
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct KeyHolders {
    keys: BTreeSet<PubKey>,
    anonymous_ids: BTreeSet<AnonymousId>,
}

/// Concrete role: a set of keys and anonymous key ids that must all sign.
#[derive(Debug)]
pub struct SimpleRole {
    name: String,
    binding: RoleBinding,
    holders: RwLock<KeyHolders>,
}

impl SimpleRole {
    pub fn new(name: impl Into<String>, keys: impl IntoIterator<Item = PubKey>) -> Self {
        Self::with_anonymous_ids(name, keys, std::iter::empty())
    }

    pub fn with_anonymous_ids(
        name: impl Into<String>,
        keys: impl IntoIterator<Item = PubKey>,
        anonymous_ids: impl IntoIterator<Item = AnonymousId>,
    ) -> Self {
        let holders = KeyHolders {
            keys: keys.into_iter().collect(),
            anonymous_ids: anonymous_ids.into_iter().collect(),
        };
        Self {
            name: name.into(),
            binding: RoleBinding::default(),
            holders: RwLock::new(holders),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> BTreeSet<PubKey> {
        self.holders.read().unwrap_or_else(PoisonError::into_inner).keys.clone()
    }

    pub fn anonymous_ids(&self) -> BTreeSet<AnonymousId> {
        self.holders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .anonymous_ids
            .clone()
    }

    /// A role with no holders can never be satisfied.
    pub fn is_valid(&self) -> bool {
        let holders = self.holders.read().unwrap_or_else(PoisonError::into_inner);
        !holders.keys.is_empty() || !holders.anonymous_ids.is_empty()
    }

    /// Every key and every anonymous id must be matched by a presented key.
    pub fn is_allowed_for_keys(&self, keys: &BTreeSet<PubKey>) -> bool {
        if !self.is_valid() {
            return false;
        }
        let holders = self.holders.read().unwrap_or_else(PoisonError::into_inner);
        if !holders.keys.is_subset(keys) {
            return false;
        }
        if holders.anonymous_ids.is_empty() {
            return true;
        }
        let presented: BTreeSet<AnonymousId> = keys.iter().map(crypto::anonymous_id).collect();
        holders.anonymous_ids.is_subset(&presented)
    }

    pub fn equal_keys(&self, other: &Role) -> bool {
        self.keys() == other.keys() && self.anonymous_ids() == other.anonymous_ids()
    }

    /// Replace every key by its anonymous id.
    pub fn anonymize(&self) {
        let mut holders = self.holders.write().unwrap_or_else(PoisonError::into_inner);
        let keys = std::mem::take(&mut holders.keys);
        holders.anonymous_ids.extend(keys.iter().map(crypto::anonymous_id));
    }
}

impl Clone for SimpleRole {
    fn clone(&self) -> Self {
        let holders = self.holders.read().unwrap_or_else(PoisonError::into_inner).clone();
        Self {
            name: self.name.clone(),
            binding: self.binding.clone(),
            holders: RwLock::new(holders),
        }
    }
}

impl PartialEq for SimpleRole {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.keys() == other.keys() && self.anonymous_ids() == other.anonymous_ids()
    }
}

// ---------------------------------------------------------------------------
// RoleAlias
// ---------------------------------------------------------------------------

/// A role that delegates everything to another named role of its scope.
///
/// Carries no authorization state of its own. It may stay dangling forever
/// if the target name never appears.
#[derive(Debug, Clone)]
pub struct RoleAlias {
    name: String,
    target_name: String,
    binding: RoleBinding,
}

impl RoleAlias {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Result<Self, RoleError> {
        let name = name.into();
        let target_name = target.into();
        if name.is_empty() || target_name.is_empty() {
            return Err(RoleError::EmptyName);
        }
        if name == target_name {
            return Err(RoleError::SelfReference(name));
        }
        Ok(Self::from_parts(name, target_name))
    }

    /// Alias as read from an encoded contract. Names are not checked: a
    /// self-targeting alias loads and never resolves.
    pub fn from_parts(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self { name: name.into(), target_name: target.into(), binding: RoleBinding::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// The role registered under the target name. One hop only: the result
    /// may itself be an alias.
    pub fn target(&self) -> Option<Arc<Role>> {
        self.binding.scope()?.role(&self.target_name)
    }

    /// Follow the alias chain to the first concrete role.
    ///
    /// Returns `None` if a hop is missing or the chain is longer than
    /// `MAX_ALIAS_DEPTH` (which also covers cycles).
    pub fn resolve(&self) -> Option<Arc<Role>> {
        let mut current = self.target()?;
        for _ in 1..MAX_ALIAS_DEPTH {
            match current.as_ref() {
                Role::Alias(alias) => current = alias.target()?,
                Role::Simple(_) => return Some(current),
            }
        }
        None
    }

    pub fn keys(&self) -> BTreeSet<PubKey> {
        self.resolve().map(|role| role.keys()).unwrap_or_default()
    }

    pub fn anonymous_ids(&self) -> BTreeSet<AnonymousId> {
        self.resolve().map(|role| role.anonymous_ids()).unwrap_or_default()
    }

    pub fn is_allowed_for_keys(&self, keys: &BTreeSet<PubKey>) -> bool {
        self.resolve().is_some_and(|role| role.is_allowed_for_keys(keys))
    }

    pub fn is_valid(&self) -> bool {
        self.resolve().is_some_and(|role| role.is_valid())
    }

    pub fn equal_keys(&self, other: &Role) -> bool {
        self.resolve().is_some_and(|role| role.equal_keys(other))
    }

    pub fn anonymize(&self) {
        if let Some(role) = self.resolve() {
            role.anonymize();
        }
    }
}

/// Aliases are equal when they point at the same name, regardless of scope
/// or of whether they currently resolve.
impl PartialEq for RoleAlias {
    fn eq(&self, other: &Self) -> bool {
        self.target_name == other.target_name
    }
}

impl Eq for RoleAlias {}

impl fmt::Display for RoleAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binding.scope() {
            None => write!(f, "RoleAlias<{}->{}:detached>", self.name, self.target_name),
            Some(_) => match self.target() {
                Some(role) => write!(f, "RoleAlias<{}->{}:{}>", self.name, self.target_name, role.name()),
                None => write!(f, "RoleAlias<{}->{}:none>", self.name, self.target_name),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

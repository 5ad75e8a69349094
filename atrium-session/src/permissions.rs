//! Permission evaluation
//!
//! Synchronous checks against the in-memory session. Role permissions
//! take precedence over the flat permission list when present, and
//! administrative roles bypass permission checks entirely, including
//! when their permission list is empty.

use std::sync::Arc;

use atrium_core::User;

use crate::store::SessionStore;

/// Role names granted the administrative bypass. Matching is
/// case-insensitive and ignores surrounding whitespace.
const ADMIN_ROLES: &[&str] = &["admin", "super_admin", "super admin"];

/// Whether the user's role name marks them as an administrator.
pub fn is_admin(user: Option<&User>) -> bool {
    user.and_then(User::role_name)
        .map(|name| ADMIN_ROLES.contains(&name.trim().to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether the user holds `permission`.
///
/// Administrators pass every check. Otherwise the role's permission
/// list is consulted when it has entries, falling back to the flat
/// list attached to the user itself. No user, or no list with
/// entries, means denied.
pub fn evaluate(user: Option<&User>, permission: &str) -> bool {
    let Some(user) = user else {
        return false;
    };

    if is_admin(Some(user)) {
        return true;
    }

    if let Some(list) = user.role.as_ref().and_then(|role| role.permissions.as_ref()) {
        if !list.is_empty() {
            return list.contains(permission);
        }
    }

    match user.permissions.as_ref() {
        Some(flat) => flat.iter().any(|p| p == permission),
        None => false,
    }
}

/// Whether the user holds at least one of `permissions`.
/// Administrators pass even with an empty slice; for everyone else an
/// empty slice is denied.
pub fn evaluate_any(user: Option<&User>, permissions: &[&str]) -> bool {
    if is_admin(user) {
        return true;
    }
    permissions.iter().any(|p| evaluate(user, p))
}

/// Whether the user holds every one of `permissions`. An empty slice
/// is vacuously granted.
pub fn evaluate_all(user: Option<&User>, permissions: &[&str]) -> bool {
    if is_admin(user) {
        return true;
    }
    permissions.iter().all(|p| evaluate(user, p))
}

/// Permission checks bound to a session store.
///
/// All methods read the current user under the store's lock and never
/// touch the network, so they are safe to call from hot paths.
#[derive(Clone)]
pub struct PermissionEvaluator {
    store: Arc<SessionStore>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.store.with_user(|user| evaluate(user, permission))
    }

    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        self.store
            .with_user(|user| evaluate_any(user, permissions))
    }

    pub fn has_all_permissions(&self, permissions: &[&str]) -> bool {
        self.store
            .with_user(|user| evaluate_all(user, permissions))
    }

    pub fn is_admin(&self) -> bool {
        self.store.with_user(is_admin)
    }
}

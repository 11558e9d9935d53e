//! Authorization requirements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Policy attached to a guarded endpoint.
///
/// The subsystem never evaluates it; it only merges and forwards it to
/// [`crate::AuthProvider::authorize_request`]. A request satisfies the policy
/// when it holds at least one of `any_roles` (if any are listed) and every
/// entry of `all_permissions`, as interpreted by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequirement {
    #[serde(default)]
    pub any_roles: BTreeSet<String>,

    #[serde(default)]
    pub all_permissions: BTreeSet<String>,
}

impl AuthRequirement {
    /// An empty requirement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add roles, any one of which is sufficient.
    #[must_use]
    pub fn with_any_role<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Add permissions, all of which are required.
    #[must_use]
    pub fn with_all_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all_permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Union `other` into `self`. Sets are never intersected.
    pub fn merge(&mut self, other: &AuthRequirement) {
        self.any_roles.extend(other.any_roles.iter().cloned());
        self.all_permissions
            .extend(other.all_permissions.iter().cloned());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.any_roles.is_empty() && self.all_permissions.is_empty()
    }
}

impl<'a> FromIterator<&'a AuthRequirement> for AuthRequirement {
    fn from_iter<I: IntoIterator<Item = &'a AuthRequirement>>(iter: I) -> Self {
        let mut combined = AuthRequirement::default();
        for requirement in iter {
            combined.merge(requirement);
        }
        combined
    }
}

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use flightsure_types::{ConsortiumError, ConsortiumEvent, ConsortiumResult, Guard, Principal, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Role Registry: the capability sets every other component consults.
///
/// The admin is installed at genesis. Only an admin grants or revokes
/// roles; the Affiliate role is owned by the governance ledger and cannot be
/// changed through this registry's public entry points.
#[derive(Clone, Debug)]
pub struct RoleRegistry {
    grants: HashMap<Principal, BTreeSet<Role>>,
    /// Revocation history (append-only)
    revocations: Vec<RevocationRecord>,
}

/// Record of a role revocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub principal: Principal,
    pub role: Role,
    pub revoked_by: Principal,
    pub revoked_at: DateTime<Utc>,
}

impl RoleRegistry {
    /// Registry with `admin` installed as the genesis admin.
    pub fn with_admin(admin: &Principal) -> Self {
        let mut grants = HashMap::new();
        grants.insert(admin.clone(), BTreeSet::from([Role::Admin]));
        Self {
            grants,
            revocations: Vec::new(),
        }
    }

    pub fn has_role(&self, principal: &Principal, role: Role) -> bool {
        self.grants
            .get(principal)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }

    pub fn roles_of(&self, principal: &Principal) -> Vec<Role> {
        self.grants
            .get(principal)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn revocation_history(&self) -> &[RevocationRecord] {
        &self.revocations
    }

    /// `OnlyAdmin` guard.
    pub fn require_admin(&self, caller: &Principal) -> ConsortiumResult<()> {
        if self.has_role(caller, Role::Admin) {
            Ok(())
        } else {
            Err(ConsortiumError::unauthorized(caller, Guard::OnlyAdmin))
        }
    }

    /// `OnlyDelegate` guard: delegates and admins may move escrow funds.
    pub fn require_delegate(&self, caller: &Principal) -> ConsortiumResult<()> {
        if self.has_role(caller, Role::Delegate) || self.has_role(caller, Role::Admin) {
            Ok(())
        } else {
            Err(ConsortiumError::unauthorized(caller, Guard::OnlyDelegate))
        }
    }

    /// Admin-gated grant. Returns `false` if the role was already held.
    pub fn grant(
        &mut self,
        caller: &Principal,
        principal: &Principal,
        role: Role,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<bool> {
        self.require_admin(caller)?;
        if role == Role::Affiliate {
            return Err(ConsortiumError::unauthorized(caller, Guard::RoleManagement));
        }
        Ok(self.insert(principal, role, events))
    }

    /// Admin-gated revoke. Returns `false` if the role was not held.
    pub fn revoke(
        &mut self,
        caller: &Principal,
        principal: &Principal,
        role: Role,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<bool> {
        self.require_admin(caller)?;
        if role == Role::Affiliate {
            return Err(ConsortiumError::unauthorized(caller, Guard::RoleManagement));
        }
        if !self.has_role(principal, role) {
            return Ok(false);
        }
        if role == Role::Admin && self.admin_count() == 1 {
            return Err(ConsortiumError::unauthorized(caller, Guard::RoleManagement));
        }

        if let Some(roles) = self.grants.get_mut(principal) {
            roles.remove(&role);
        }
        self.revocations.push(RevocationRecord {
            principal: principal.clone(),
            role,
            revoked_by: caller.clone(),
            revoked_at: Utc::now(),
        });
        debug!(principal = %principal, role = %role, "Role revoked");
        events.push(ConsortiumEvent::RoleRevoked {
            principal: principal.clone(),
            role,
        });
        Ok(true)
    }

    /// Unchecked grant used by the governance ledger for affiliates.
    pub(crate) fn insert(
        &mut self,
        principal: &Principal,
        role: Role,
        events: &mut Vec<ConsortiumEvent>,
    ) -> bool {
        let added = self.grants.entry(principal.clone()).or_default().insert(role);
        if added {
            debug!(principal = %principal, role = %role, "Role granted");
            events.push(ConsortiumEvent::RoleGranted {
                principal: principal.clone(),
                role,
            });
        }
        added
    }

    fn admin_count(&self) -> usize {
        self.grants
            .values()
            .filter(|roles| roles.contains(&Role::Admin))
            .count()
    }
}

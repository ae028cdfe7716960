//! Authorization gate for governance setters.

use alloy::primitives::Address;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Gated engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Change the staking-yield split
    SetSplitBps,
    /// Change the minimum interval between split claims
    SetUpdateInterval,
}

/// Permission checks consumed by the engine.
pub trait AccessControl: Send + Sync + Debug {
    fn is_authorized(&self, caller: &Address, permission: Permission) -> bool;
}

/// Role table: permission -> callers holding it.
#[derive(Debug, Default)]
pub struct RoleAccessControl {
    grants: DashMap<Permission, DashSet<Address>>,
}

impl RoleAccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant every permission to `admin`.
    pub fn with_admin(admin: Address) -> Self {
        let access = Self::new();
        access.grant(admin, Permission::SetSplitBps);
        access.grant(admin, Permission::SetUpdateInterval);
        access
    }

    pub fn grant(&self, caller: Address, permission: Permission) {
        self.grants.entry(permission).or_default().insert(caller);
    }

    pub fn revoke(&self, caller: &Address, permission: Permission) {
        if let Some(holders) = self.grants.get(&permission) {
            holders.remove(caller);
        }
    }
}

impl AccessControl for RoleAccessControl {
    fn is_authorized(&self, caller: &Address, permission: Permission) -> bool {
        self.grants
            .get(&permission)
            .map(|holders| holders.contains(caller))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_and_revoke() {
        let admin = Address::repeat_byte(1);
        let stranger = Address::repeat_byte(2);
        let access = RoleAccessControl::with_admin(admin);

        assert!(access.is_authorized(&admin, Permission::SetSplitBps));
        assert!(!access.is_authorized(&stranger, Permission::SetSplitBps));

        access.revoke(&admin, Permission::SetSplitBps);
        assert!(!access.is_authorized(&admin, Permission::SetSplitBps));
        assert!(access.is_authorized(&admin, Permission::SetUpdateInterval));
    }
}

use serde::{Deserialize, Serialize};

/// Capability sets a principal may hold. Roles are not exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Installed at genesis; grants and revokes the other roles.
    Admin,
    /// Trusted automation caller allowed to move escrow funds.
    Delegate,
    /// Consortium member, managed through the governance ledger.
    Affiliate,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Delegate => write!(f, "delegate"),
            Role::Affiliate => write!(f, "affiliate"),
        }
    }
}

/// Named authorization guard. Every state-mutating operation declares the
/// guards it evaluates; a violation reports the guard by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Guard {
    OnlyAdmin,
    /// Delegate or Admin.
    OnlyDelegate,
    /// Any registered affiliate, funded or not.
    OnlyAffiliate,
    /// Funded and approved affiliate.
    OnlyApprovedAffiliate,
    /// Funded affiliate, regardless of approval.
    OnlyConsortiumAffiliate,
    /// Registered oracle holding the submitted index.
    OnlyOracle,
    /// Role changes that would leave the registry without an admin, or that
    /// target a role owned by governance.
    RoleManagement,
}

impl std::fmt::Display for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Guard::OnlyAdmin => "caller is not admin",
            Guard::OnlyDelegate => "caller is not a delegate",
            Guard::OnlyAffiliate => "caller is not an affiliate",
            Guard::OnlyApprovedAffiliate => "caller is not an approved affiliate",
            Guard::OnlyConsortiumAffiliate => "caller is not a consortium affiliate",
            Guard::OnlyOracle => "caller is not a registered oracle for this index",
            Guard::RoleManagement => "role change not permitted",
        };
        f.write_str(text)
    }
}

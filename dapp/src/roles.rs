//! Contract roles and the capability set derived from them

use std::collections::BTreeSet;
use std::fmt;

use alloy_primitives::{keccak256, B256};

use crate::units::shorten_hex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Admin,
    Operator,
    Minter,
    Pauser,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Operator, Role::Minter, Role::Pauser];

    /// AccessControl role identifier. The admin role is the zero hash.
    pub fn id(self) -> B256 {
        match self {
            Role::Admin => B256::ZERO,
            Role::Operator => keccak256("OPERATOR_ROLE"),
            Role::Minter => keccak256("MINTER_ROLE"),
            Role::Pauser => keccak256("PAUSER_ROLE"),
        }
    }

    pub fn from_id(id: &B256) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.id() == *id)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Operator => "Operator",
            Role::Minter => "Minter",
            Role::Pauser => "Pauser",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Name for a raw role id as seen in events.
pub fn role_display_name(id: &B256) -> String {
    match Role::from_id(id) {
        Some(role) => role.display_name().to_string(),
        None => shorten_hex(&id.to_string()),
    }
}

/// Privileged operations the UI gates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    Mint,
    Burn,
    SetReserve,
    SetFeed,
    Pause,
}

impl Capability {
    fn granted_by(self) -> &'static [Role] {
        match self {
            Capability::Mint => &[Role::Admin, Role::Operator, Role::Minter],
            Capability::Burn => &Role::ALL,
            Capability::SetReserve | Capability::SetFeed => &[Role::Admin, Role::Operator],
            Capability::Pause => &[Role::Admin, Role::Operator, Role::Pauser],
        }
    }
}

/// Roles held by one address, obtained from a single batched query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    roles: BTreeSet<Role>,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn holds(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// True when at least one recognized role is held
    pub fn is_authorized(&self) -> bool {
        !self.roles.is_empty()
    }

    pub fn allows(&self, capability: Capability) -> bool {
        capability.granted_by().iter().any(|role| self.holds(*role))
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }
}

impl FromIterator<Role> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ids_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::from_id(&role.id()), Some(role));
        }
        assert_eq!(Role::Admin.id(), B256::ZERO);
        assert_eq!(Role::from_id(&B256::repeat_byte(0x42)), None);
    }

    #[test]
    fn test_unknown_role_name_is_shortened() {
        assert_eq!(role_display_name(&Role::Minter.id()), "Minter");
        let name = role_display_name(&B256::repeat_byte(0x42));
        assert_eq!(name, "0x4242...4242");
    }

    #[test]
    fn test_capability_gating() {
        let minter: Capabilities = [Role::Minter].into_iter().collect();
        assert!(minter.is_authorized());
        assert!(minter.allows(Capability::Mint));
        assert!(minter.allows(Capability::Burn));
        assert!(!minter.allows(Capability::SetFeed));
        assert!(!minter.allows(Capability::Pause));

        let pauser: Capabilities = [Role::Pauser].into_iter().collect();
        assert!(pauser.allows(Capability::Pause));
        assert!(!pauser.allows(Capability::Mint));

        let operator: Capabilities = [Role::Operator].into_iter().collect();
        assert!(operator.allows(Capability::SetReserve));
        assert!(operator.allows(Capability::SetFeed));

        let nobody = Capabilities::none();
        assert!(!nobody.is_authorized());
        assert!(!nobody.allows(Capability::Burn));
    }
}

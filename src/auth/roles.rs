//! User roles within a farm

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Veterinarian,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Veterinarian => "veterinarian",
            Role::Operator => "operator",
        }
    }

    /// Farm settings may only be changed by admins and owners
    pub fn can_manage_tenant(&self) -> bool {
        matches!(self, Role::Admin | Role::Owner)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            "veterinarian" => Ok(Role::Veterinarian),
            "operator" => Ok(Role::Operator),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_management() {
        assert!(Role::Admin.can_manage_tenant());
        assert!(Role::Owner.can_manage_tenant());
        assert!(!Role::Veterinarian.can_manage_tenant());
        assert!(!Role::Operator.can_manage_tenant());
    }

    #[test]
    fn test_parse_roundtrip() {
        for role in [Role::Admin, Role::Owner, Role::Veterinarian, Role::Operator] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("OWNER".parse::<Role>().unwrap(), Role::Owner);
        assert!("cowboy".parse::<Role>().is_err());
    }
}

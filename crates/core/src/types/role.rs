//! Application roles carried by a profile.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Role attached to a profile in the Data Store.
///
/// The Data Store column is an open string. Known values map to dedicated
/// variants; anything else is kept verbatim in [`Role::Unknown`] so it can be
/// reported back to the caller, and it never matches a required role set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// End customer.
    Customer,
    /// Sales agent; may manage customers and place orders.
    Sale,
    /// Administrator; full catalogue and inventory access.
    Admin,
    /// Sales lead with administrator rights.
    SaleAdmin,
    /// Any role string this build does not know about.
    Unknown(String),
}

impl Role {
    /// Roles allowed to work with customers and orders.
    pub const SALES_STAFF: &'static [Self] = &[Self::Sale, Self::Admin, Self::SaleAdmin];

    /// Roles allowed to change the catalogue, inventory and reports.
    pub const ADMINISTRATORS: &'static [Self] = &[Self::Admin, Self::SaleAdmin];

    /// Wire representation (exactly as stored).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Customer => "customer",
            Self::Sale => "sale",
            Self::Admin => "admin",
            Self::SaleAdmin => "sale_admin",
            Self::Unknown(raw) => raw,
        }
    }

    /// Returns `true` if this role is one of `allowed`.
    ///
    /// Matching is exact and case-sensitive. `Unknown` roles never match,
    /// even when an `Unknown` with the same text is listed.
    #[must_use]
    pub fn is_one_of(&self, allowed: &[Self]) -> bool {
        !matches!(self, Self::Unknown(_)) && allowed.contains(self)
    }
}

impl From<&str> for Role {
    fn from(raw: &str) -> Self {
        match raw {
            "customer" => Self::Customer,
            "sale" => Self::Sale,
            "admin" => Self::Admin,
            "sale_admin" => Self::SaleAdmin,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_roles_round_trip_through_strings() {
        for role in [Role::Customer, Role::Sale, Role::Admin, Role::SaleAdmin] {
            assert_eq!(Role::from(role.as_str()), role);
        }
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(Role::from("Admin"), Role::Unknown("Admin".to_string()));
        assert!(!Role::from("Admin").is_one_of(Role::ADMINISTRATORS));
        assert!(Role::from("admin").is_one_of(Role::ADMINISTRATORS));
    }

    #[test]
    fn test_unknown_never_matches() {
        let odd = Role::Unknown("auditor".to_string());
        assert!(!odd.is_one_of(&[odd.clone()]));
    }

    #[test]
    fn test_sales_staff_excludes_customers() {
        assert!(!Role::Customer.is_one_of(Role::SALES_STAFF));
        assert!(Role::Sale.is_one_of(Role::SALES_STAFF));
        assert!(!Role::Sale.is_one_of(Role::ADMINISTRATORS));
    }

    #[test]
    fn test_serde_uses_raw_string() {
        let role: Role = serde_json::from_str("\"warehouse\"").unwrap();
        assert_eq!(role, Role::Unknown("warehouse".to_string()));
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"warehouse\"");
        assert_eq!(serde_json::to_string(&Role::SaleAdmin).unwrap(), "\"sale_admin\"");
    }
}

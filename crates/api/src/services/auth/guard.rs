//! Role-based access control.
//!
//! The guard only reads the role already resolved for the request. It holds
//! no state, so its answer depends on nothing but the role and the set.

use appejv_core::Role;

use super::AuthError;
use crate::models::Profile;

/// Permit iff `profile.role` is one of `allowed`.
///
/// # Errors
///
/// `Forbidden` carrying the caller's role and the accepted set.
pub fn require_role(profile: &Profile, allowed: &[Role]) -> Result<(), AuthError> {
    if profile.role.is_one_of(allowed) {
        Ok(())
    } else {
        tracing::debug!(role = %profile.role, "Role not permitted");
        Err(AuthError::Forbidden {
            role: profile.role.clone(),
            required: allowed.to_vec(),
        })
    }
}

/// A named set of roles, used as a type parameter on route extractors.
pub trait RolePolicy: Send + Sync + 'static {
    const ROLES: &'static [Role];
}

/// `sale`, `admin`, `sale_admin`.
#[derive(Debug, Clone, Copy)]
pub struct SalesStaff;

impl RolePolicy for SalesStaff {
    const ROLES: &'static [Role] = Role::SALES_STAFF;
}

/// `admin`, `sale_admin`.
#[derive(Debug, Clone, Copy)]
pub struct Administrators;

impl RolePolicy for Administrators {
    const ROLES: &'static [Role] = Role::ADMINISTRATORS;
}

#[cfg(test)]
mod tests {
    use super::*;
    use appejv_core::SubjectId;

    fn profile(role: &str) -> Profile {
        Profile {
            id: SubjectId::new("u"),
            full_name: None,
            role: Role::from(role),
            phone: None,
            avatar_url: None,
        }
    }

    #[test]
    fn test_membership_decides() {
        assert!(require_role(&profile("sale"), SalesStaff::ROLES).is_ok());
        assert!(require_role(&profile("sale_admin"), Administrators::ROLES).is_ok());
        assert!(require_role(&profile("customer"), SalesStaff::ROLES).is_err());
        assert!(require_role(&profile("sale"), Administrators::ROLES).is_err());
    }

    #[test]
    fn test_forbidden_reports_role_and_set() {
        let err = require_role(&profile("customer"), Administrators::ROLES).unwrap_err();
        match err {
            AuthError::Forbidden { role, required } => {
                assert_eq!(role, Role::Customer);
                assert_eq!(required, vec![Role::Admin, Role::SaleAdmin]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_case_variants_are_forbidden() {
        for role in ["Admin", "ADMIN", "superuser", ""] {
            assert!(require_role(&profile(role), Administrators::ROLES).is_err(), "{role}");
        }
    }
}

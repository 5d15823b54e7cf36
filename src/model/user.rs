//! Users and roles.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An authenticated actor. The engine trusts the identity it is handed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Primary role. Drives visibility.
    pub role: Role,
    /// Every role the user holds. Always contains `role`.
    pub roles: BTreeSet<Role>,
}

impl User {
    /// Build a user holding `role` plus any `extra` roles, checking the role invariants.
    pub fn new(
        id: impl Into<UserId>,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        extra: impl IntoIterator<Item = Role>,
    ) -> Result<Self> {
        let mut roles: BTreeSet<Role> = extra.into_iter().collect();
        roles.insert(role);
        let user = Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            role,
            roles,
        };
        user.validate()?;
        Ok(user)
    }

    /// Admin is exclusive, and the primary role must be one of `roles`.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(Error::Validation("user id must not be empty".to_string()));
        }
        if !self.roles.contains(&self.role) {
            return Err(Error::Validation(format!(
                "primary role {} is not among the user's roles",
                self.role
            )));
        }
        if self.roles.contains(&Role::Admin) && self.roles.len() > 1 {
            return Err(Error::Validation(
                "admin cannot be combined with other roles".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Newtype for user ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&UserId> for UserId {
    fn from(id: &UserId) -> Self {
        id.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Maker,
    Checker1,
    Checker2,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Maker, Role::Checker1, Role::Checker2];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Maker => "maker",
            Role::Checker1 => "checker1",
            Role::Checker2 => "checker2",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown role: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_must_be_exclusive() {
        let err = User::new("u1", "Ana", "ana@example.com", Role::Admin, [Role::Maker]);
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn non_admin_may_hold_several_roles() {
        let user = User::new(
            "u2",
            "Ben",
            "ben@example.com",
            Role::Maker,
            [Role::Checker1],
        )
        .unwrap();
        assert!(user.has_role(Role::Maker));
        assert!(user.has_role(Role::Checker1));
        assert!(!user.is_admin());
    }

    #[test]
    fn primary_role_must_be_listed() {
        let mut user = User::new("u3", "Cy", "cy@example.com", Role::Checker2, []).unwrap();
        user.roles.clear();
        user.roles.insert(Role::Checker1);
        assert!(user.validate().is_err());
    }

    #[test]
    fn roles_parse_from_strings() {
        assert_eq!("checker2".parse::<Role>().unwrap(), Role::Checker2);
        assert!("auditor".parse::<Role>().is_err());
    }
}

//! User directory.

use std::collections::BTreeSet;

use super::Db;
use crate::error::{Error, Result};
use crate::model::{Role, User, UserId};

impl Db {
    /// Insert or replace a user. The role invariants are checked first.
    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        user.validate()?;
        let roles: Vec<String> = user.roles.iter().map(|r| r.to_string()).collect();
        sqlx::query(
            "INSERT INTO users (id, name, email, role, roles)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE
             SET name = EXCLUDED.name, email = EXCLUDED.email, role = EXCLUDED.role, roles = EXCLUDED.roles",
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&roles)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: &UserId) -> Result<User> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, email, role, roles FROM users WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("user {id}")))?
            .try_into_user()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, name, email, role, roles FROM users ORDER BY id")
                .fetch_all(self.pool())
                .await?;
        rows.into_iter().map(UserRow::try_into_user).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    roles: Vec<String>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User> {
        let roles = self
            .roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<BTreeSet<Role>>>()?;
        let user = User {
            id: UserId(self.id),
            name: self.name,
            email: self.email,
            role: self.role.parse()?,
            roles,
        };
        user.validate()?;
        Ok(user)
    }
}

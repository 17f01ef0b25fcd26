use crate::models::db_operations::gateway::{Collection, Filter, PersistenceGateway, Query};
use crate::models::db_operations::posts_db_operations::{from_record, to_record, RepositoryError};
use crate::models::{Role, RoleGrant};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct GrantInsert<'a> {
    user_id: &'a str,
    role: Role,
}

/// Reads and writes the `user_roles` relation.
#[derive(Clone)]
pub struct RoleDirectory {
    gateway: Arc<dyn PersistenceGateway>,
}

impl RoleDirectory {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        RoleDirectory { gateway }
    }

    /// Always queries the store; nothing is cached.
    pub fn has_role(&self, user_id: &str, role: Role) -> Result<bool, RepositoryError> {
        let query = Query::new().eq("user_id", user_id).eq("role", role.as_str()).limit(1);
        Ok(!self.gateway.select(Collection::UserRoles, &query)?.is_empty())
    }

    pub fn grants_for(&self, user_id: &str) -> Result<Vec<RoleGrant>, RepositoryError> {
        self.gateway
            .select(Collection::UserRoles, &Query::new().eq("user_id", user_id))?
            .into_iter()
            .map(|row| from_record(Collection::UserRoles, row))
            .collect()
    }

    /// Idempotent: granting an already-held role returns the existing grant.
    pub fn grant(&self, user_id: &str, role: Role) -> Result<RoleGrant, RepositoryError> {
        if let Some(existing) = self.grants_for(user_id)?.into_iter().find(|g| g.role == role) {
            return Ok(existing);
        }
        let record = to_record(Collection::UserRoles, &GrantInsert { user_id, role })?;
        let stored = self.gateway.insert(Collection::UserRoles, record)?;
        from_record(Collection::UserRoles, stored)
    }

    /// Returns how many grants were removed.
    pub fn revoke(&self, user_id: &str, role: Role) -> Result<usize, RepositoryError> {
        let filters = [Filter::eq("user_id", user_id), Filter::eq("role", role.as_str())];
        Ok(self.gateway.delete(Collection::UserRoles, &filters)?)
    }
}

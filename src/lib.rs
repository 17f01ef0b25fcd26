use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
pub type DbPool = Pool<SqliteConnectionManager>;

use helper::identity_helpers::IdentityResolver;
use helper::media_helpers::ObjectStorage;
use models::db_operations::gateway::PersistenceGateway;
use models::db_operations::posts_db_operations::ContentRepository;
use models::db_operations::roles_db_operations::RoleDirectory;
use models::db_operations::users_db_operations::IdentityStore;

/// Shared handles every request handler works from.
pub struct AppState {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub identity: IdentityStore,
    pub storage: Arc<dyn ObjectStorage>,
    pub admin_url_prefix: String,
    pub max_upload_size_mb: usize,
}

impl AppState {
    pub fn repository(&self) -> ContentRepository {
        ContentRepository::new(Arc::clone(&self.gateway))
    }

    pub fn roles(&self) -> RoleDirectory {
        RoleDirectory::new(Arc::clone(&self.gateway))
    }

    /// A resolver for the browser that presented `token`, already resolved.
    pub fn resolver_for(&self, token: Option<String>) -> IdentityResolver {
        let resolver = IdentityResolver::new(Arc::new(self.identity.for_browser(token)), self.roles());
        resolver.init();
        resolver
    }

    pub fn admin_path(&self, route: &str) -> String {
        format!("/management/{}{}", self.admin_url_prefix, route)
    }
}

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;

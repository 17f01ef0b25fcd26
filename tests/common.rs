#![allow(dead_code)]

use editorial_backend::helper::identity_helpers::IdentityResolver;
use editorial_backend::helper::media_helpers::LocalObjectStorage;
use editorial_backend::models::db_operations::gateway::{
    Collection, Filter, GatewayError, PersistenceGateway, Query, Record, RedbGateway,
};
use editorial_backend::models::db_operations::posts_db_operations::ContentRepository;
use editorial_backend::models::db_operations::roles_db_operations::RoleDirectory;
use editorial_backend::models::db_operations::users_db_operations::IdentityStore;
use editorial_backend::models::{Role, User};
use editorial_backend::setup::db_setup;
use editorial_backend::AppState;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const PASSWORD: &str = "correct horse battery";
pub const ADMIN_PREFIX: &str = "desk";

// Lowest cost bcrypt accepts; keeps test sign-ins fast.
const TEST_HASH_COST: u32 = 4;

/// Wraps the real gateway and counts every write that reaches it.
pub struct CountingGateway {
    inner: RedbGateway,
    writes: AtomicUsize,
}

impl CountingGateway {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PersistenceGateway for CountingGateway {
    fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Record>, GatewayError> {
        self.inner.select(collection, query)
    }

    fn insert(&self, collection: Collection, record: Record) -> Result<Record, GatewayError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(collection, record)
    }

    fn update(&self, collection: Collection, id: &str, patch: Record) -> Result<Option<Record>, GatewayError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(collection, id, patch)
    }

    fn insert_unique(&self, collection: Collection, record: Record, column: &'static str) -> Result<Record, GatewayError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_unique(collection, record, column)
    }

    fn update_unique(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
        column: &'static str,
    ) -> Result<Option<Record>, GatewayError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_unique(collection, id, patch, column)
    }

    fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<usize, GatewayError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(collection, filters)
    }
}

pub struct TestStores {
    pub dir: TempDir,
    pub gateway: Arc<CountingGateway>,
    pub identity: IdentityStore,
}

pub fn stores() -> TestStores {
    let dir = tempfile::tempdir().unwrap();

    let content = db_setup::setup_content_db(&dir.path().join("content").join("content.redb")).unwrap();
    let gateway = Arc::new(CountingGateway { inner: content, writes: AtomicUsize::new(0) });

    let pool = Pool::builder()
        .max_size(4)
        .build(SqliteConnectionManager::file(dir.path().join("identity.db")))
        .unwrap();
    db_setup::setup_identity_db(&mut pool.get().unwrap()).unwrap();
    let identity = IdentityStore::new(pool, chrono::Duration::hours(2)).with_hash_cost(TEST_HASH_COST);

    TestStores { dir, gateway, identity }
}

impl TestStores {
    pub fn repository(&self) -> ContentRepository {
        ContentRepository::new(self.gateway.clone())
    }

    pub fn roles(&self) -> RoleDirectory {
        RoleDirectory::new(self.gateway.clone())
    }

    pub fn writes(&self) -> usize {
        self.gateway.writes()
    }

    pub fn register(&self, email: &str, admin: bool) -> User {
        let user = self.identity.register_user(email, PASSWORD).unwrap();
        if admin {
            self.roles().grant(&user.id, Role::Admin).unwrap();
        }
        user
    }

    /// A resolver for a browser that has just signed in as `email`.
    pub fn signed_in(&self, email: &str) -> IdentityResolver {
        let resolver = self.resolver_for(None);
        resolver.sign_in(email, PASSWORD).unwrap();
        resolver
    }

    pub fn resolver_for(&self, token: Option<String>) -> IdentityResolver {
        let resolver = IdentityResolver::new(Arc::new(self.identity.for_browser(token)), self.roles());
        resolver.init();
        resolver
    }

    pub fn app_state(&self) -> AppState {
        let storage =
            LocalObjectStorage::new(self.dir.path().join("media"), "http://localhost:8080/media/").unwrap();
        AppState {
            gateway: self.gateway.clone(),
            identity: self.identity.clone(),
            storage: Arc::new(storage),
            admin_url_prefix: ADMIN_PREFIX.to_string(),
            max_upload_size_mb: 1,
        }
    }
}

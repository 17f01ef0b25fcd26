use crate::models::db_operations::posts_db_operations::RepositoryError;
use crate::models::db_operations::roles_db_operations::RoleDirectory;
use crate::models::db_operations::users_db_operations::{AuthChangeSubscription, AuthError, IdentityProvider};
use crate::models::{Role, Session};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use thiserror::Error;

pub use crate::models::db_operations::users_db_operations::AuthEvent;

/// What callers know about the current browser context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    /// Resolution in flight. Callers must not decide anything yet.
    Loading,
    Unauthenticated,
    Authenticated { session: Session, is_admin: bool },
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AuthState::Authenticated { is_admin: true, .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }
}

#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("No signed-in session.")]
    NoSession,
    #[error("The signed-in user does not hold the admin role.")]
    NotAdmin,
    #[error("Role lookup failed: {0}")]
    RoleLookup(#[from] RepositoryError),
}

type Listener = Arc<dyn Fn(&AuthState) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle for a state listener. Dropping it unsubscribes.
pub struct AuthSubscription {
    id: u64,
    shared: Weak<SharedState>,
}

impl AuthSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            lock_or_recover(&shared.listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::error!("Mutex in identity resolver was poisoned! Recovering lock.");
        poisoned.into_inner()
    })
}

// State reachable from both the resolver and the provider's event callback.
struct SharedState {
    roles: RoleDirectory,
    state: RwLock<AuthState>,
    listeners: Mutex<Listeners>,
}

impl SharedState {
    fn read(&self) -> AuthState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| {
                log::error!("RwLock for auth state was poisoned! Using stale data.");
                poisoned.into_inner()
            })
            .clone()
    }

    fn write(&self, next: AuthState) {
        let mut state = self.state.write().unwrap_or_else(|poisoned| {
            log::error!("RwLock for auth state was poisoned during update! Recovering lock.");
            poisoned.into_inner()
        });
        *state = next;
    }

    fn publish(&self, next: AuthState) -> AuthState {
        self.write(next.clone());
        let listeners: Vec<Listener> = lock_or_recover(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&next);
        }
        next
    }

    fn install(&self, session: Session) -> AuthState {
        self.publish(AuthState::Loading);
        let is_admin = match self.roles.has_role(&session.user.id, Role::Admin) {
            Ok(is_admin) => is_admin,
            Err(e) => {
                log::error!("Role lookup for {} failed: {}", session.user.email, e);
                false
            }
        };
        self.publish(AuthState::Authenticated { session, is_admin })
    }

    fn handle_event(&self, event: AuthEvent) -> AuthState {
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => self.install(session),
            AuthEvent::SignedOut | AuthEvent::SessionExpired => self.publish(AuthState::Unauthenticated),
        }
    }
}

/// Owns the session of one browser context and decides whether it carries
/// the admin capability. It is the only writer of that state.
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
    shared: Arc<SharedState>,
    provider_subscription: Mutex<Option<AuthChangeSubscription>>,
}

impl IdentityResolver {
    /// Starts in `Loading`; call [`IdentityResolver::init`] to resolve.
    pub fn new(provider: Arc<dyn IdentityProvider>, roles: RoleDirectory) -> Self {
        IdentityResolver {
            provider,
            shared: Arc::new(SharedState {
                roles,
                state: RwLock::new(AuthState::Loading),
                listeners: Mutex::new(Listeners::default()),
            }),
            provider_subscription: Mutex::new(None),
        }
    }

    /// Subscribes to provider events, then resolves the stored session, if
    /// any, and its admin grant.
    pub fn init(&self) -> AuthState {
        self.watch_provider();
        self.shared.publish(AuthState::Loading);
        match self.provider.current_session() {
            Ok(Some(session)) => match self.state() {
                // The provider already reported this session while restoring it.
                AuthState::Authenticated { session: ref reported, .. } if *reported == session => self.state(),
                _ => self.shared.install(session),
            },
            Ok(None) => self.shared.publish(AuthState::Unauthenticated),
            Err(AuthError::SessionExpired) => {
                log::info!("Stored session expired; treating browser as signed out.");
                match self.state() {
                    AuthState::Unauthenticated => AuthState::Unauthenticated,
                    _ => self.shared.publish(AuthState::Unauthenticated),
                }
            }
            Err(e) => {
                log::warn!("Could not restore stored session: {}", e);
                self.shared.publish(AuthState::Unauthenticated)
            }
        }
    }

    /// Drops the provider subscription and all listeners, and forgets the
    /// session locally.
    pub fn teardown(&self) {
        lock_or_recover(&self.provider_subscription).take();
        lock_or_recover(&self.shared.listeners).entries.clear();
        self.shared.write(AuthState::Unauthenticated);
    }

    pub fn state(&self) -> AuthState {
        self.shared.read()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state().session().cloned()
    }

    /// Queries the role relation for `(session.user.id, admin)`.
    pub fn is_admin(&self, session: &Session) -> Result<bool, RepositoryError> {
        self.shared.roles.has_role(&session.user.id, Role::Admin)
    }

    /// On success the new session is installed and its role resolved, and a
    /// different session this context held before is revoked. On failure the
    /// current state is left as it was.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.provider.sign_in_with_password(email, password)?;
        log::info!("User {} signed in", session.user.email);
        if let Some(previous) = self.current_session().filter(|previous| previous.token != session.token) {
            if let Err(e) = self.provider.sign_out(&previous) {
                log::error!("Failed to revoke replaced session for {}: {}", previous.user.email, e);
            }
        }
        self.shared.install(session.clone());
        Ok(session)
    }

    /// Drops admin rights immediately, then asks the provider to revoke.
    pub fn sign_out(&self) {
        let previous = self.state();
        self.shared.publish(AuthState::Unauthenticated);
        if let Some(session) = previous.session() {
            log::info!("User {} signed out", session.user.email);
            if let Err(e) = self.provider.sign_out(session) {
                log::error!("Failed to revoke session for {}: {}", session.user.email, e);
            }
        }
    }

    pub fn handle_event(&self, event: AuthEvent) -> AuthState {
        self.shared.handle_event(event)
    }

    /// Re-runs role resolution to completion and returns the session only if
    /// it currently holds the admin grant. A resolver still `Loading` is
    /// initialised first rather than denied.
    pub fn authorize_editor(&self) -> Result<Session, AuthorizationError> {
        if self.state().is_loading() {
            self.init();
        }
        let session = self.current_session().ok_or(AuthorizationError::NoSession)?;

        let is_admin = match self.is_admin(&session) {
            Ok(is_admin) => is_admin,
            Err(e) => {
                self.shared.publish(AuthState::Authenticated { session, is_admin: false });
                return Err(AuthorizationError::RoleLookup(e));
            }
        };
        self.shared.publish(AuthState::Authenticated { session: session.clone(), is_admin });

        if is_admin {
            Ok(session)
        } else {
            Err(AuthorizationError::NotAdmin)
        }
    }

    /// Registers `listener` for every state change.
    pub fn subscribe(&self, listener: impl Fn(&AuthState) + Send + Sync + 'static) -> AuthSubscription {
        let mut listeners = lock_or_recover(&self.shared.listeners);
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, Arc::new(listener)));
        AuthSubscription { id, shared: Arc::downgrade(&self.shared) }
    }

    fn watch_provider(&self) {
        let mut slot = lock_or_recover(&self.provider_subscription);
        if slot.is_some() {
            return;
        }
        let shared = Arc::downgrade(&self.shared);
        *slot = Some(self.provider.on_auth_state_change(Arc::new(move |event: &AuthEvent| {
            if let Some(shared) = shared.upgrade() {
                shared.handle_event(event.clone());
            }
        })));
    }
}

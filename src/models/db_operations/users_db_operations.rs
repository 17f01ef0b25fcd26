use crate::models::{Session, User};
use crate::DbPool;
use bcrypt::{hash, verify, BcryptError};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,
    #[error("Identity provider error: {0}")]
    Provider(String),
}

impl From<RusqliteError> for AuthError {
    fn from(e: RusqliteError) -> Self {
        AuthError::Provider(e.to_string())
    }
}

impl From<r2d2::Error> for AuthError {
    fn from(e: r2d2::Error) -> Self {
        AuthError::Provider(e.to_string())
    }
}

/// Out-of-band changes reported by the identity provider.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
    SessionExpired,
}

pub type AuthEventListener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

#[derive(Default)]
struct EventListeners {
    next_id: u64,
    entries: Vec<(u64, AuthEventListener)>,
}

fn lock_event_listeners(listeners: &Mutex<EventListeners>) -> MutexGuard<'_, EventListeners> {
    listeners.lock().unwrap_or_else(|poisoned| {
        log::error!("Mutex for provider listeners was poisoned! Recovering lock.");
        poisoned.into_inner()
    })
}

/// Fan-out of provider events to registered listeners.
#[derive(Clone, Default)]
pub struct AuthEventHub {
    listeners: Arc<Mutex<EventListeners>>,
}

impl AuthEventHub {
    pub fn subscribe(&self, listener: AuthEventListener) -> AuthChangeSubscription {
        let mut listeners = lock_event_listeners(&self.listeners);
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, listener));
        AuthChangeSubscription { id, listeners: Arc::downgrade(&self.listeners) }
    }

    /// Delivers `event` to every listener. Listeners run outside the lock.
    pub fn emit(&self, event: &AuthEvent) {
        let listeners: Vec<AuthEventListener> = lock_event_listeners(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

/// Handle returned by `on_auth_state_change`. Dropping it unsubscribes.
pub struct AuthChangeSubscription {
    id: u64,
    listeners: Weak<Mutex<EventListeners>>,
}

impl Drop for AuthChangeSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock_event_listeners(&listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Verifies credentials and owns session lifetimes for one browser context.
pub trait IdentityProvider: Send + Sync {
    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    fn sign_out(&self, session: &Session) -> Result<(), AuthError>;

    /// The session this context was restored with, if it is still valid.
    fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Registers `listener` for refreshes and expiries the provider notices
    /// on its own.
    fn on_auth_state_change(&self, listener: AuthEventListener) -> AuthChangeSubscription;
}

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

fn parse_timestamp(idx: usize, raw: String) -> Result<DateTime<Utc>, RusqliteError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RusqliteError::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn create_user(conn: &Connection, email: &str, password: &str, cost: u32) -> Result<User, RusqliteError> {
    let hashed_password = hash(password, cost).map_err(bcrypt_to_rusqlite_error)?;
    let user = User { id: Uuid::new_v4().to_string(), email: normalize_email(email) };
    conn.execute(
        "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user.id, user.email, hashed_password, Utc::now().to_rfc3339()],
    )?;
    Ok(user)
}

pub fn read_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, RusqliteError> {
    conn.query_row(
        "SELECT id, email FROM users WHERE email = ?1",
        [normalize_email(email)],
        |row| Ok(User { id: row.get(0)?, email: row.get(1)? }),
    )
    .optional()
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<User>, RusqliteError> {
    let mut stmt = conn.prepare("SELECT id, email FROM users ORDER BY email")?;
    let rows = stmt.query_map([], |row| Ok(User { id: row.get(0)?, email: row.get(1)? }))?;
    rows.collect()
}

pub fn update_password(conn: &Connection, email: &str, new_password: &str, cost: u32) -> Result<usize, RusqliteError> {
    let hashed_password = hash(new_password, cost).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE email = ?2",
        params![hashed_password, normalize_email(email)],
    )
}

pub fn verify_credentials(conn: &Connection, email: &str, password: &str) -> Result<Option<User>, RusqliteError> {
    let found: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, email, password_hash FROM users WHERE email = ?1",
            [normalize_email(email)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    Ok(found.and_then(|(id, email, password_hash)| {
        if verify(password, &password_hash).unwrap_or(false) {
            Some(User { id, email })
        } else {
            None
        }
    }))
}

pub fn update_last_login_time(conn: &Connection, user_id: &str) -> Result<(), RusqliteError> {
    let now = Utc::now().to_rfc3339();
    conn.execute("UPDATE users SET last_login_time = ?1 WHERE id = ?2", params![now, user_id])?;
    Ok(())
}

pub fn read_last_login_time(conn: &Connection, user_id: &str) -> Result<Option<String>, RusqliteError> {
    conn.query_row("SELECT last_login_time FROM users WHERE id = ?1", [user_id], |row| row.get(0))
        .optional()
        .map(Option::flatten)
}

/// A session row as stored, including bookkeeping the `Session` view hides.
pub struct StoredSession {
    pub session: Session,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

pub fn insert_session(conn: &Connection, user: &User, ttl: Duration) -> Result<Session, RusqliteError> {
    let now = Utc::now();
    let session = Session { token: new_session_token(), user: user.clone(), expires_at: now + ttl };
    conn.execute(
        "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![session.token, user.id, now.to_rfc3339(), session.expires_at.to_rfc3339()],
    )?;
    Ok(session)
}

pub fn read_session(conn: &Connection, token: &str) -> Result<Option<StoredSession>, RusqliteError> {
    conn.query_row(
        "SELECT s.token, s.created_at, s.expires_at, s.revoked, u.id, u.email
         FROM sessions s JOIN users u ON u.id = s.user_id
         WHERE s.token = ?1",
        [token],
        |row| {
            Ok(StoredSession {
                session: Session {
                    token: row.get(0)?,
                    expires_at: parse_timestamp(2, row.get(2)?)?,
                    user: User { id: row.get(4)?, email: row.get(5)? },
                },
                created_at: parse_timestamp(1, row.get(1)?)?,
                revoked: row.get(3)?,
            })
        },
    )
    .optional()
}

pub fn extend_session(conn: &Connection, token: &str, expires_at: DateTime<Utc>) -> Result<(), RusqliteError> {
    conn.execute(
        "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
        params![expires_at.to_rfc3339(), token],
    )?;
    Ok(())
}

pub fn revoke_session(conn: &Connection, token: &str) -> Result<usize, RusqliteError> {
    conn.execute("UPDATE sessions SET revoked = 1 WHERE token = ?1", [token])
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", [token])
}

/// Drops revoked sessions and those that expired before `now`.
pub fn purge_sessions(conn: &Connection, now: DateTime<Utc>) -> Result<usize, RusqliteError> {
    let mut stmt = conn.prepare("SELECT token, expires_at, revoked FROM sessions")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, parse_timestamp(1, row.get(1)?)?, row.get::<_, bool>(2)?))
    })?;

    let mut doomed = Vec::new();
    for row in rows {
        let (token, expires_at, revoked) = row?;
        if revoked || expires_at <= now {
            doomed.push(token);
        }
    }

    let mut removed = 0;
    for token in doomed {
        removed += delete_session(conn, &token)?;
    }
    Ok(removed)
}

/// Outcome of looking a session token up.
#[derive(Debug, Clone, PartialEq)]
pub enum Restored {
    Missing,
    Expired,
    Valid(Session),
    Refreshed(Session),
}

/// The user and session store behind the identity provider.
#[derive(Clone)]
pub struct IdentityStore {
    pool: DbPool,
    session_ttl: Duration,
    hash_cost: u32,
}

impl IdentityStore {
    pub fn new(pool: DbPool, session_ttl: Duration) -> Self {
        IdentityStore { pool, session_ttl, hash_cost: bcrypt::DEFAULT_COST }
    }

    /// Overrides the bcrypt cost used for new password hashes.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn register_user(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let conn = self.pool.get()?;
        Ok(create_user(&conn, email, password, self.hash_cost)?)
    }

    pub fn change_password(&self, email: &str, new_password: &str) -> Result<bool, AuthError> {
        let conn = self.pool.get()?;
        Ok(update_password(&conn, email, new_password, self.hash_cost)? > 0)
    }

    pub fn find_user(&self, email: &str) -> Result<Option<User>, AuthError> {
        let conn = self.pool.get()?;
        Ok(read_user_by_email(&conn, email)?)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let conn = self.pool.get()?;
        let user = verify_credentials(&conn, email, password)?.ok_or(AuthError::InvalidCredentials)?;
        let session = insert_session(&conn, &user, self.session_ttl)?;
        if let Err(e) = update_last_login_time(&conn, &user.id) {
            log::warn!("Could not record login time for {}: {}", user.email, e);
        }
        Ok(session)
    }

    pub fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let conn = self.pool.get()?;
        revoke_session(&conn, token)?;
        Ok(())
    }

    /// Looks a token up. Expired sessions are deleted and reported as
    /// `SessionExpired`; sessions past half their lifetime get a fresh expiry.
    pub fn restore(&self, token: &str) -> Result<Option<Session>, AuthError> {
        match self.restore_session(token)? {
            Restored::Missing => Ok(None),
            Restored::Expired => Err(AuthError::SessionExpired),
            Restored::Valid(session) | Restored::Refreshed(session) => Ok(Some(session)),
        }
    }

    /// `restore` with the outcome spelled out, so callers can tell a refresh
    /// apart from an unchanged session.
    pub fn restore_session(&self, token: &str) -> Result<Restored, AuthError> {
        let conn = self.pool.get()?;
        let Some(stored) = read_session(&conn, token)? else {
            return Ok(Restored::Missing);
        };
        if stored.revoked {
            return Ok(Restored::Missing);
        }

        let now = Utc::now();
        let mut session = stored.session;
        if session.expires_at <= now {
            delete_session(&conn, token)?;
            return Ok(Restored::Expired);
        }
        if session.expires_at - now < self.session_ttl / 2 {
            session.expires_at = now + self.session_ttl;
            extend_session(&conn, token, session.expires_at)?;
            log::debug!("Refreshed session for {} (created {})", session.user.email, stored.created_at);
            return Ok(Restored::Refreshed(session));
        }
        Ok(Restored::Valid(session))
    }

    pub fn purge_stale_sessions(&self) -> Result<usize, AuthError> {
        let conn = self.pool.get()?;
        Ok(purge_sessions(&conn, Utc::now())?)
    }

    /// Binds the store to the token a browser presented.
    pub fn for_browser(&self, restored_token: Option<String>) -> BrowserIdentity {
        BrowserIdentity { store: self.clone(), restored_token, events: AuthEventHub::default() }
    }
}

/// `IdentityProvider` for one browser context. Restoring the browser's token
/// reports refreshes and expiries to subscribers.
pub struct BrowserIdentity {
    store: IdentityStore,
    restored_token: Option<String>,
    events: AuthEventHub,
}

impl IdentityProvider for BrowserIdentity {
    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.store.sign_in(email, password)
    }

    fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        self.store.revoke(&session.token)
    }

    fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(token) = &self.restored_token else {
            return Ok(None);
        };
        match self.store.restore_session(token)? {
            Restored::Missing => Ok(None),
            Restored::Expired => {
                self.events.emit(&AuthEvent::SessionExpired);
                Err(AuthError::SessionExpired)
            }
            Restored::Valid(session) => Ok(Some(session)),
            Restored::Refreshed(session) => {
                self.events.emit(&AuthEvent::TokenRefreshed(session.clone()));
                Ok(Some(session))
            }
        }
    }

    fn on_auth_state_change(&self, listener: AuthEventListener) -> AuthChangeSubscription {
        self.events.subscribe(listener)
    }
}

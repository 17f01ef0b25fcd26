use crate::helper::identity_helpers::{AuthState, IdentityResolver};
use crate::helper::publishing_helpers::PublishingWorkflow;
use crate::models::db_operations::posts_db_operations::ContentRepository;
use crate::AppState;
use actix_session::{Session as CookieSession, SessionExt};
use actix_web::{dev, web, FromRequest, HttpRequest};
use serde::Serialize;
use std::future::{ready, Ready};

/// Cookie-session key holding the identity provider's session token.
pub const SESSION_TOKEN_KEY: &str = "session_token";

/// What the admin console should do for a given auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Wait,
    RedirectToLogin,
    Render,
}

/// `Loading` never denies; only a resolved admin renders.
pub fn console_gate(state: &AuthState) -> GateDecision {
    match state {
        AuthState::Loading => GateDecision::Wait,
        AuthState::Authenticated { is_admin: true, .. } => GateDecision::Render,
        AuthState::Unauthenticated | AuthState::Authenticated { .. } => GateDecision::RedirectToLogin,
    }
}

/// The identity of the browser behind a request, restored from its signed
/// cookie. Extraction never rejects: handlers go through the workflow, which
/// decides about authorization.
pub struct EditorContext {
    pub resolver: IdentityResolver,
    pub repository: ContentRepository,
    pub cookie: CookieSession,
}

impl EditorContext {
    pub fn workflow(&self) -> PublishingWorkflow<'_> {
        PublishingWorkflow::new(&self.resolver, &self.repository)
    }

    /// Binds a freshly signed-in session to this browser.
    pub fn remember(&self, token: &str) -> Result<(), actix_web::Error> {
        self.cookie.renew();
        self.cookie.insert(SESSION_TOKEN_KEY, token)?;
        Ok(())
    }

    pub fn forget(&self) {
        self.cookie.purge();
    }
}

impl FromRequest for EditorContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            log::error!("AppState is not registered; cannot restore editor session.");
            return ready(Err(actix_web::error::ErrorInternalServerError("Server misconfigured.")));
        };

        let cookie = req.get_session();
        let token = cookie.get::<String>(SESSION_TOKEN_KEY).unwrap_or_else(|e| {
            log::warn!("Unreadable session cookie: {}", e);
            None
        });
        let had_token = token.is_some();

        let resolver = state.resolver_for(token);
        if had_token && resolver.current_session().is_none() {
            cookie.remove(SESSION_TOKEN_KEY);
        }

        ready(Ok(EditorContext { resolver, repository: state.repository(), cookie }))
    }
}

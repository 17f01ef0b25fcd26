mod common;

use chrono::{Duration, Utc};
use editorial_backend::helper::identity_helpers::{AuthEvent, AuthState, IdentityResolver};
use editorial_backend::middleware::{console_gate, GateDecision};
use editorial_backend::models::db_operations::users_db_operations::{self, AuthError, IdentityProvider};
use std::sync::{Arc, Mutex};

#[test]
fn wrong_password_is_reported_and_leaves_state_unauthenticated() {
    let stores = common::stores();
    stores.register("editor@example.com", true);
    let resolver = stores.resolver_for(None);

    let err = resolver.sign_in("editor@example.com", "wrong").unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(resolver.state(), AuthState::Unauthenticated);
}

#[test]
fn sign_in_resolves_admin_and_records_login_time() {
    let stores = common::stores();
    let user = stores.register("Editor@Example.com", true);
    assert_eq!(user.email, "editor@example.com");

    let resolver = stores.signed_in("  EDITOR@example.com ");

    assert!(resolver.state().is_admin());
    let conn = stores.identity.pool().get().unwrap();
    assert!(users_db_operations::read_last_login_time(&conn, &user.id).unwrap().is_some());
}

#[test]
fn non_admin_sign_in_is_authenticated_without_admin() {
    let stores = common::stores();
    stores.register("reader@example.com", false);

    let resolver = stores.signed_in("reader@example.com");

    let state = resolver.state();
    assert!(state.session().is_some());
    assert!(!state.is_admin());
    assert_eq!(console_gate(&state), GateDecision::RedirectToLogin);
}

#[test]
fn session_token_restores_a_second_browser_context() {
    let stores = common::stores();
    stores.register("editor@example.com", true);
    let first = stores.signed_in("editor@example.com");
    let token = first.current_session().unwrap().token;

    let restored = stores.resolver_for(Some(token));

    assert!(restored.state().is_admin());
    assert_eq!(console_gate(&restored.state()), GateDecision::Render);
}

#[test]
fn sign_out_drops_admin_immediately_and_the_gate_redirects() {
    let stores = common::stores();
    stores.register("editor@example.com", true);
    let resolver = stores.signed_in("editor@example.com");
    let token = resolver.current_session().unwrap().token;
    assert_eq!(console_gate(&resolver.state()), GateDecision::Render);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = resolver.subscribe(move |state| sink.lock().unwrap().push(console_gate(state)));

    resolver.sign_out();

    assert_eq!(console_gate(&resolver.state()), GateDecision::RedirectToLogin);
    // No render decision is ever observed after sign-out.
    assert_eq!(seen.lock().unwrap().as_slice(), [GateDecision::RedirectToLogin]);
    // The revoked token no longer restores anything.
    assert_eq!(stores.resolver_for(Some(token)).state(), AuthState::Unauthenticated);
}

#[test]
fn expired_session_is_reported_and_removed() {
    let stores = common::stores();
    let user = stores.register("editor@example.com", true);
    let conn = stores.identity.pool().get().unwrap();
    let stale = users_db_operations::insert_session(&conn, &user, Duration::seconds(-5)).unwrap();

    let browser = stores.identity.for_browser(Some(stale.token.clone()));
    assert!(matches!(browser.current_session(), Err(AuthError::SessionExpired)));
    assert!(users_db_operations::read_session(&conn, &stale.token).unwrap().is_none());

    let resolver = stores.resolver_for(Some(stale.token));
    assert_eq!(resolver.state(), AuthState::Unauthenticated);
}

#[test]
fn sessions_past_half_life_are_extended() {
    let stores = common::stores();
    let user = stores.register("editor@example.com", true);
    let conn = stores.identity.pool().get().unwrap();
    let ageing = users_db_operations::insert_session(&conn, &user, Duration::minutes(30)).unwrap();

    let restored = stores.identity.restore(&ageing.token).unwrap().unwrap();

    assert!(restored.expires_at > Utc::now() + Duration::minutes(90));
    let stored = users_db_operations::read_session(&conn, &ageing.token).unwrap().unwrap();
    assert_eq!(stored.session.expires_at, restored.expires_at);
}

#[test]
fn purge_removes_revoked_and_expired_sessions_only() {
    let stores = common::stores();
    let user = stores.register("editor@example.com", true);
    let conn = stores.identity.pool().get().unwrap();
    let live = users_db_operations::insert_session(&conn, &user, Duration::hours(1)).unwrap();
    users_db_operations::insert_session(&conn, &user, Duration::seconds(-1)).unwrap();
    let revoked = users_db_operations::insert_session(&conn, &user, Duration::hours(1)).unwrap();
    stores.identity.revoke(&revoked.token).unwrap();

    assert_eq!(stores.identity.purge_stale_sessions().unwrap(), 2);
    assert!(users_db_operations::read_session(&conn, &live.token).unwrap().is_some());
}

#[test]
fn expiry_event_from_provider_clears_the_session() {
    let stores = common::stores();
    stores.register("editor@example.com", true);
    let resolver = stores.signed_in("editor@example.com");

    let state = resolver.handle_event(AuthEvent::SessionExpired);

    assert_eq!(state, AuthState::Unauthenticated);
    assert!(resolver.current_session().is_none());
}

#[test]
fn password_change_invalidates_old_password() {
    let stores = common::stores();
    stores.register("editor@example.com", true);

    assert!(stores.identity.change_password("editor@example.com", "new secret").unwrap());
    assert!(stores.identity.sign_in("editor@example.com", common::PASSWORD).is_err());
    assert!(stores.identity.sign_in("editor@example.com", "new secret").is_ok());
    assert!(!stores.identity.change_password("nobody@example.com", "x").unwrap());
}

#[test]
fn refresh_found_while_restoring_reaches_resolver_subscribers() {
    let stores = common::stores();
    let user = stores.register("editor@example.com", true);
    let conn = stores.identity.pool().get().unwrap();
    let ageing = users_db_operations::insert_session(&conn, &user, Duration::minutes(30)).unwrap();

    let browser = Arc::new(stores.identity.for_browser(Some(ageing.token.clone())));
    let events = Arc::new(Mutex::new(Vec::new()));
    let event_sink = events.clone();
    let _provider_subscription =
        browser.on_auth_state_change(Arc::new(move |event: &AuthEvent| event_sink.lock().unwrap().push(event.clone())));

    let resolver = IdentityResolver::new(browser, stores.roles());
    let states = Arc::new(Mutex::new(Vec::new()));
    let state_sink = states.clone();
    let _subscription = resolver.subscribe(move |state| state_sink.lock().unwrap().push(state.clone()));

    let resolved = resolver.init();

    let refreshed = match events.lock().unwrap().as_slice() {
        [AuthEvent::TokenRefreshed(session)] => session.clone(),
        other => panic!("expected a single refresh, got {:?}", other),
    };
    assert_eq!(refreshed.token, ageing.token);
    assert!(refreshed.expires_at > Utc::now() + Duration::minutes(90));
    assert_eq!(resolved, AuthState::Authenticated { session: refreshed, is_admin: true });

    let states = states.lock().unwrap();
    assert_eq!(states.iter().filter(|state| state.session().is_some()).count(), 1);
    assert_eq!(states.last(), Some(&resolved));
}

#[test]
fn expiry_found_while_restoring_is_reported_once() {
    let stores = common::stores();
    let user = stores.register("editor@example.com", true);
    let conn = stores.identity.pool().get().unwrap();
    let stale = users_db_operations::insert_session(&conn, &user, Duration::seconds(-5)).unwrap();

    let browser = Arc::new(stores.identity.for_browser(Some(stale.token)));
    let events = Arc::new(Mutex::new(Vec::new()));
    let event_sink = events.clone();
    let _provider_subscription =
        browser.on_auth_state_change(Arc::new(move |event: &AuthEvent| event_sink.lock().unwrap().push(event.clone())));

    let resolver = IdentityResolver::new(browser, stores.roles());
    let states = Arc::new(Mutex::new(Vec::new()));
    let state_sink = states.clone();
    let _subscription = resolver.subscribe(move |state| state_sink.lock().unwrap().push(state.clone()));

    assert_eq!(resolver.init(), AuthState::Unauthenticated);
    assert_eq!(events.lock().unwrap().as_slice(), [AuthEvent::SessionExpired]);
    assert_eq!(states.lock().unwrap().as_slice(), [AuthState::Loading, AuthState::Unauthenticated]);
}

#[test]
fn signing_in_again_from_the_same_browser_revokes_the_old_token() {
    let stores = common::stores();
    stores.register("editor@example.com", true);
    let first = stores.signed_in("editor@example.com").current_session().unwrap().token;

    let same_browser = stores.resolver_for(Some(first.clone()));
    let second = same_browser.sign_in("editor@example.com", common::PASSWORD).unwrap();

    assert_ne!(second.token, first);
    assert_eq!(stores.resolver_for(Some(first)).state(), AuthState::Unauthenticated);
    assert!(stores.resolver_for(Some(second.token)).state().is_admin());
}

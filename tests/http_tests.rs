mod common;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Cookie, Key};
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use editorial_backend::routes;
use serde_json::{json, Value};

macro_rules! editorial_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(routes::public::config_api)
                .service(
                    web::scope("/management")
                        .wrap(
                            SessionMiddleware::builder(CookieSessionStore::default(), Key::from(&[7u8; 64]))
                                .cookie_secure(false)
                                .build(),
                        )
                        .service(web::scope(common::ADMIN_PREFIX).configure(routes::admin::config_admin)),
                ),
        )
        .await
    };
}

fn admin_uri(route: &str) -> String {
    format!("/management/{}{}", common::ADMIN_PREFIX, route)
}

#[actix_web::test]
async fn public_api_basics() {
    let stores = common::stores();
    let state = web::Data::new(stores.app_state());
    let app = editorial_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/is_server_active").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/posts/search?q=%20").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/posts/missing").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/posts").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!([]));
}

#[actix_web::test]
async fn anonymous_browser_is_redirected_and_refused() {
    let stores = common::stores();
    let state = web::Data::new(stores.app_state());
    let app = editorial_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&admin_uri("/console")).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), admin_uri("/login").as_str());

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri("/posts/draft"))
            .set_json(json!({ "title": "Sneaky" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(stores.writes(), 0);
}

#[actix_web::test]
async fn editor_round_trip_from_login_to_logout() {
    let stores = common::stores();
    stores.register("editor@example.com", true);
    let state = web::Data::new(stores.app_state());
    let app = editorial_app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri("/login"))
            .set_json(json!({ "email": "editor@example.com", "password": "nope" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri("/login"))
            .set_json(json!({ "email": "editor@example.com", "password": common::PASSWORD }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie: Cookie<'static> = resp.response().cookies().next().unwrap().into_owned();
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["is_admin"], json!(true));

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&admin_uri("/console")).cookie(cookie.clone()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri("/posts/publish"))
            .cookie(cookie.clone())
            .set_json(json!({
                "title": "Bugatti Tourbillon: New Era!",
                "primary_content": "<p>Intro</p><h2>Engine</h2><p>V16</p>",
                "status": "draft"
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["post"]["slug"], json!("bugatti-tourbillon-new-era"));
    assert_eq!(body["post"]["status"], json!("published"));
    assert!(!body["post"]["published_at"].is_null());

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/posts/bugatti-tourbillon-new-era").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let article: Value = test::read_body_json(resp).await;
    assert_eq!(article["fragments"].as_array().unwrap().len(), 2);
    assert_eq!(article["category_name"], json!("Uncategorized"));
    assert_eq!(article["secondary_available"], json!(false));

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri(&admin_uri("/logout")).cookie(cookie.clone()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Replaying the old cookie after sign-out must not reach the console.
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&admin_uri("/console")).cookie(cookie).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
}

#[actix_web::test]
async fn logging_in_again_retires_the_earlier_cookie() {
    let stores = common::stores();
    stores.register("editor@example.com", true);
    let state = web::Data::new(stores.app_state());
    let app = editorial_app!(state);
    let credentials = json!({ "email": "editor@example.com", "password": common::PASSWORD });

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri(&admin_uri("/login")).set_json(credentials.clone()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first: Cookie<'static> = resp.response().cookies().next().unwrap().into_owned();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri("/login"))
            .cookie(first.clone())
            .set_json(credentials)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let second: Cookie<'static> = resp.response().cookies().next().unwrap().into_owned();

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&admin_uri("/console")).cookie(first).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&admin_uri("/console")).cookie(second).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn workflow_failures_map_to_status_codes() {
    let stores = common::stores();
    stores.register("editor@example.com", true);
    let state = web::Data::new(stores.app_state());
    let app = editorial_app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri("/login"))
            .set_json(json!({ "email": "editor@example.com", "password": common::PASSWORD }))
            .to_request(),
    )
    .await;
    let cookie: Cookie<'static> = resp.response().cookies().next().unwrap().into_owned();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri("/posts/draft"))
            .cookie(cookie.clone())
            .set_json(json!({ "title": "Long meta", "meta_title": "x".repeat(75) }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri("/posts/draft"))
            .cookie(cookie.clone())
            .set_json(json!({ "title": "Keeper" }))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let id = body["post"]["id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri(&format!("/posts/{}/delete", id)))
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&admin_uri(&format!("/posts/{}", id))).cookie(cookie.clone()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&admin_uri(&format!("/posts/{}/delete", id)))
            .cookie(cookie.clone())
            .set_json(json!({ "confirm": id }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&admin_uri(&format!("/posts/{}", id))).cookie(cookie).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

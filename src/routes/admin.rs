use crate::helper::identity_helpers::AuthorizationError;
use crate::helper::media_helpers;
use crate::helper::publishing_helpers::{DeleteConfirmation, PublishingWorkflow, WorkflowError};
use crate::middleware::{console_gate, EditorContext, GateDecision};
use crate::models::db_operations::users_db_operations::AuthError;
use crate::models::PostForm;
use crate::routes::workflow_error_response;
use crate::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct CategoryForm {
    name: String,
}

pub fn config_admin(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(handle_login))
        .route("/logout", web::post().to(handle_logout))
        .route("/session", web::get().to(show_session))
        .route("/console", web::get().to(show_console))
        .route("/posts", web::get().to(list_posts))
        .route("/posts/draft", web::post().to(save_draft))
        .route("/posts/publish", web::post().to(publish_post))
        .route("/posts/{id}", web::get().to(load_post))
        .route("/posts/{id}/delete", web::post().to(delete_post))
        .route("/categories", web::get().to(list_categories))
        .route("/categories", web::post().to(create_category))
        .route("/categories/{id}/delete", web::post().to(delete_category))
        .route("/media", web::post().to(upload_media));
}

async fn handle_login(editor: EditorContext, form: web::Json<LoginForm>) -> HttpResponse {
    let form = form.into_inner();
    match editor.resolver.sign_in(&form.email, &form.password) {
        Ok(session) => {
            if let Err(e) = editor.remember(&session.token) {
                log::error!("Could not store session cookie for {}: {}", session.user.email, e);
                return HttpResponse::InternalServerError()
                    .json(json!({ "success": false, "error": "Could not start a session." }));
            }
            let is_admin = editor.resolver.state().is_admin();
            HttpResponse::Ok().json(json!({ "success": true, "user": session.user, "is_admin": is_admin }))
        }
        Err(AuthError::Provider(e)) => {
            log::error!("Sign-in failed: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Sign-in is temporarily unavailable." }))
        }
        Err(e) => HttpResponse::Unauthorized().json(json!({ "success": false, "error": e.to_string() })),
    }
}

async fn handle_logout(editor: EditorContext) -> impl Responder {
    editor.resolver.sign_out();
    editor.forget();
    HttpResponse::Ok().json(json!({ "success": true }))
}

async fn show_session(editor: EditorContext) -> impl Responder {
    HttpResponse::Ok().json(editor.resolver.state())
}

/// Answers the console's gate: render for admins, otherwise send the browser
/// to the login surface. Never renders before resolution finished.
async fn show_console(editor: EditorContext, state: web::Data<AppState>) -> HttpResponse {
    let auth = editor.resolver.state();
    match console_gate(&auth) {
        GateDecision::Render => HttpResponse::Ok().json(json!({
            "success": true,
            "decision": GateDecision::Render,
            "user": auth.session().map(|s| &s.user),
        })),
        GateDecision::RedirectToLogin => HttpResponse::Found()
            .append_header(("location", state.admin_path("/login")))
            .finish(),
        GateDecision::Wait => HttpResponse::ServiceUnavailable()
            .append_header(("Retry-After", "1"))
            .json(json!({ "success": false, "decision": GateDecision::Wait })),
    }
}

async fn list_posts(editor: EditorContext) -> HttpResponse {
    match editor.workflow().list_all() {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => workflow_error_response("Failed to list posts", &e),
    }
}

async fn load_post(editor: EditorContext, id: web::Path<String>) -> HttpResponse {
    match editor.workflow().load_post(&id) {
        Ok(post) => HttpResponse::Ok().json(post),
        Err(e) => workflow_error_response("Failed to load post", &e),
    }
}

async fn save_draft(editor: EditorContext, form: web::Json<PostForm>) -> HttpResponse {
    match editor.workflow().save_draft(form.into_inner()) {
        Ok(post) => HttpResponse::Ok().json(json!({ "success": true, "post": post })),
        Err(e) => workflow_error_response("Failed to save draft", &e),
    }
}

async fn publish_post(editor: EditorContext, form: web::Json<PostForm>) -> HttpResponse {
    match editor.workflow().publish(form.into_inner()) {
        Ok(post) => HttpResponse::Ok().json(json!({ "success": true, "post": post })),
        Err(e) => workflow_error_response("Failed to publish post", &e),
    }
}

async fn delete_post(
    editor: EditorContext,
    id: web::Path<String>,
    confirmation: Option<web::Json<DeleteConfirmation>>,
) -> HttpResponse {
    match editor.workflow().delete_post(&id, confirmation.as_deref()) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "message": "Post deleted successfully." })),
        Err(e) => workflow_error_response("Failed to delete post", &e),
    }
}

async fn list_categories(editor: EditorContext) -> HttpResponse {
    match editor.workflow().list_categories() {
        Ok(categories) => HttpResponse::Ok().json(categories),
        Err(e) => workflow_error_response("Failed to list categories", &e),
    }
}

async fn create_category(editor: EditorContext, form: web::Json<CategoryForm>) -> HttpResponse {
    match editor.workflow().create_category(&form.name) {
        Ok(category) => HttpResponse::Ok().json(json!({ "success": true, "category": category })),
        Err(e) => workflow_error_response("Failed to create category", &e),
    }
}

async fn delete_category(
    editor: EditorContext,
    id: web::Path<String>,
    confirmation: Option<web::Json<DeleteConfirmation>>,
) -> HttpResponse {
    match editor.workflow().delete_category(&id, confirmation.as_deref()) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "message": "Category deleted successfully." })),
        Err(e) => workflow_error_response("Failed to delete category", &e),
    }
}

async fn upload_media(editor: EditorContext, state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    // Refuse before reading the body; the workflow checks again before storing.
    if !editor.resolver.state().is_admin() {
        return workflow_error_response("Upload refused", &WorkflowError::Unauthorized(AuthorizationError::NotAdmin));
    }

    let upload = match media_helpers::read_image_upload(payload, state.max_upload_size_mb).await {
        Ok(upload) => upload,
        Err(e) => return workflow_error_response("Upload rejected", &WorkflowError::Storage(e)),
    };

    let EditorContext { resolver, repository, .. } = editor;
    let storage = state.storage.clone();
    let stored = web::block(move || {
        PublishingWorkflow::new(&resolver, &repository).upload_featured_image(storage.as_ref(), upload)
    })
    .await;

    match stored {
        Ok(Ok(url)) => HttpResponse::Ok().json(json!({ "success": true, "url": url })),
        Ok(Err(e)) => workflow_error_response("Failed to store upload", &e),
        Err(e) => {
            log::error!("Upload task failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "success": false, "error": "Upload failed." }))
        }
    }
}

use crate::helper::public_helpers;
use crate::models::Language;
use crate::routes::repository_error_response;
use crate::AppState;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
pub struct ArticleQuery {
    #[serde(default)]
    lang: Language,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/is_server_active", web::get().to(is_server_active))
            .route("/posts", web::get().to(get_published_posts))
            .route("/posts/search", web::get().to(search_posts))
            .route("/posts/{slug}", web::get().to(get_post_by_slug))
            .route("/categories", web::get().to(get_categories)),
    );
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

async fn get_published_posts(state: web::Data<AppState>, query: web::Query<ListQuery>) -> impl Responder {
    let offset = query.offset.unwrap_or(0);
    match public_helpers::fetch_published_cards(&state.repository(), query.limit, offset) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => repository_error_response("Failed to fetch published posts", &e),
    }
}

async fn search_posts(state: web::Data<AppState>, query: web::Query<SearchQuery>) -> impl Responder {
    let q = query.q.as_deref().unwrap_or("").trim();
    if q.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "success": false, "error": "A search query is required." }));
    }
    match public_helpers::search_published(&state.repository(), q) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => repository_error_response("Search failed", &e),
    }
}

async fn get_post_by_slug(
    slug: web::Path<String>,
    state: web::Data<AppState>,
    query: web::Query<ArticleQuery>,
) -> impl Responder {
    match public_helpers::build_article_view(&state.repository(), &slug, query.lang) {
        Ok(Some(article)) => HttpResponse::Ok().json(article),
        Ok(None) => HttpResponse::NotFound().json(json!({ "success": false, "error": "Article not found." })),
        Err(e) => repository_error_response("Failed to load article", &e),
    }
}

async fn get_categories(state: web::Data<AppState>) -> impl Responder {
    match state.repository().list_categories() {
        Ok(categories) => HttpResponse::Ok().json(categories),
        Err(e) => repository_error_response("Failed to fetch categories", &e),
    }
}

use crate::helper::publishing_helpers::WorkflowError;
use crate::models::db_operations::posts_db_operations::RepositoryError;
use actix_web::HttpResponse;
use serde_json::json;

pub mod admin;
pub mod public;

/// JSON error body with a status matching the workflow failure.
pub(crate) fn workflow_error_response(context: &str, e: &WorkflowError) -> HttpResponse {
    let body = json!({ "success": false, "error": e.to_string() });
    match e {
        WorkflowError::Unauthorized(_) => HttpResponse::Forbidden().json(body),
        WorkflowError::Validation(_) | WorkflowError::Storage(_) => HttpResponse::UnprocessableEntity().json(body),
        WorkflowError::ConfirmationRequired(_) => HttpResponse::Conflict().json(body),
        WorkflowError::NotFound { .. } => HttpResponse::NotFound().json(body),
        WorkflowError::Repository(_) => {
            log::error!("{}: {}", context, e);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

pub(crate) fn repository_error_response(context: &str, e: &RepositoryError) -> HttpResponse {
    log::error!("{}: {}", context, e);
    HttpResponse::InternalServerError().json(json!({ "success": false, "error": e.to_string() }))
}

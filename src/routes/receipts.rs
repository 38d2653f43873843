use crate::{error::AppError, middleware::guards::User, state::AppState};
use actix_web::{post, web, HttpResponse};
use uuid::Uuid;

/// POST /conversations/{id}/delivered
/// Advance every message from others to at least `delivered`
#[post("/conversations/{id}/delivered")]
pub async fn mark_delivered(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let batch = state
        .delivery
        .mark_delivered(user.id, conversation_id.into_inner(), None)
        .await?;
    Ok(HttpResponse::Ok().json(batch))
}

/// POST /conversations/{id}/read
#[post("/conversations/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let batch = state
        .delivery
        .mark_read(user.id, conversation_id.into_inner(), None)
        .await?;
    Ok(HttpResponse::Ok().json(batch))
}

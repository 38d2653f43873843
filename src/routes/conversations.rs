use crate::{
    error::AppError, middleware::guards::User, services::CreateGroupRequest, state::AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectRequest {
    pub user_id: Uuid,
}

/// POST /conversations/direct
/// Find or create the direct conversation with another user
#[post("/conversations/direct")]
pub async fn create_direct(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateDirectRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .create_or_get_direct(user.id, body.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}

/// POST /conversations/group
#[post("/conversations/group")]
pub async fn create_group(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .create_group(user.id, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(conversation))
}

/// GET /conversations
/// Pinned first, then by most recent activity
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let conversations = state.conversations.list_for_user(user.id).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let summary = state
        .conversations
        .get_for_user(user.id, conversation_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[put("/conversations/{id}/pin")]
pub async fn pin_conversation(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .conversations
        .set_pinned(user.id, conversation_id.into_inner(), true)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/conversations/{id}/pin")]
pub async fn unpin_conversation(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .conversations
        .set_pinned(user.id, conversation_id.into_inner(), false)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

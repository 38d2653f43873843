use crate::{
    error::AppError,
    middleware::guards::User,
    models::{Attachment, PageDirection, PageRequest},
    services::{MessageTarget, SendMessageRequest},
    state::AppState,
};
use actix_web::{delete, get, patch, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub cursor_id: Option<i64>,
    pub direction: Option<PageDirection>,
    pub limit: Option<usize>,
    pub mark_delivered: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub replied_to_id: Option<i64>,
    #[serde(default)]
    pub client_message_id: Option<String>,
}

#[derive(Deserialize)]
pub struct EditMessageBody {
    pub content: String,
}

/// GET /conversations/{id}/messages?cursorId=&direction=&limit=&markDelivered=
/// Cursor page in chronological order; marks the page delivered unless told not to
#[get("/conversations/{id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let request = PageRequest::new(
        query.cursor_id,
        query.direction,
        query.limit,
        query.mark_delivered,
    );
    let page = state
        .messages
        .page(user.id, conversation_id.into_inner(), request)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// POST /conversations/{id}/messages
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<SendMessageBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let request = SendMessageRequest {
        conversation_id: conversation_id.into_inner(),
        content: body.content,
        attachments: body.attachments,
        replied_to_id: body.replied_to_id,
        client_message_id: body.client_message_id,
    };
    let message = state.messages.append(user.id, request, None).await?;
    Ok(HttpResponse::Created().json(json!({ "message": message })))
}

/// PATCH /messages/{id}
/// Sender only
#[patch("/messages/{id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<i64>,
    body: web::Json<EditMessageBody>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .edit(
            user.id,
            MessageTarget::Id(message_id.into_inner()),
            &body.content,
            None,
        )
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

/// PATCH /conversations/{id}/messages/by-client-id/{client_message_id}
/// Edit of a message the client only knows by its optimistic token
#[patch("/conversations/{id}/messages/by-client-id/{client_message_id}")]
pub async fn edit_message_by_client_id(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, String)>,
    body: web::Json<EditMessageBody>,
) -> Result<HttpResponse, AppError> {
    let (conversation_id, client_message_id) = path.into_inner();
    let message = state
        .messages
        .edit(
            user.id,
            MessageTarget::Client {
                conversation_id,
                client_message_id,
            },
            &body.content,
            None,
        )
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

/// DELETE /messages/{id}
/// Soft delete: content is cleared, receipts and reactions stay
#[delete("/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    state
        .messages
        .soft_delete(user.id, message_id.into_inner(), None)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/messages/{id}/pin")]
pub async fn pin_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let pin = state
        .messages
        .pin_message(user.id, message_id.into_inner(), None)
        .await?;
    Ok(HttpResponse::Ok().json(pin))
}

#[delete("/messages/{id}/pin")]
pub async fn unpin_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    state
        .messages
        .unpin_message(user.id, message_id.into_inner(), None)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/conversations/{id}/pins")]
pub async fn get_pinned_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let pins = state
        .messages
        .pinned_messages(user.id, conversation_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(pins))
}

use crate::{
    error::AppError, middleware::guards::User, state::AppState, websocket::events::ReactionAck,
};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct SetReactionRequest {
    pub emoji: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReactionsRequest {
    pub message_ids: Vec<i64>,
}

/// POST /messages/{id}/reactions
/// Toggle: same emoji again removes it, a different one replaces it
#[post("/messages/{id}/reactions")]
pub async fn set_reaction(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<i64>,
    body: web::Json<SetReactionRequest>,
) -> Result<HttpResponse, AppError> {
    let toggle = state
        .reactions
        .set_reaction(user.id, message_id.into_inner(), &body.emoji, None)
        .await?;
    Ok(HttpResponse::Ok().json(ReactionAck::from(toggle)))
}

/// GET /messages/{id}/reactions
#[get("/messages/{id}/reactions")]
pub async fn get_reactions(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let summary = state
        .reactions
        .reactions_for(user.id, message_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// POST /reactions/bulk
#[post("/reactions/bulk")]
pub async fn bulk_reactions(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<BulkReactionsRequest>,
) -> Result<HttpResponse, AppError> {
    let reactions = state
        .reactions
        .reactions_bulk(user.id, &body.message_ids)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "reactions": reactions })))
}

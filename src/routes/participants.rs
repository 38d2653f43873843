use crate::{
    error::AppError,
    middleware::guards::User,
    models::{LeaveOutcome, MemberRole},
    state::AppState,
};
use actix_web::{delete, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: Option<MemberRole>,
}

fn leave_response(outcome: LeaveOutcome) -> HttpResponse {
    match outcome {
        LeaveOutcome::Removed { promoted_owner } => HttpResponse::Ok().json(json!({
            "conversationDeleted": false,
            "promotedOwner": promoted_owner,
        })),
        LeaveOutcome::ConversationDeleted => {
            HttpResponse::Ok().json(json!({ "conversationDeleted": true }))
        }
    }
}

/// POST /conversations/{id}/participants
/// Admin or owner only; the granted role must rank below the actor's
#[post("/conversations/{id}/participants")]
pub async fn add_participant(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<AddParticipantRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let participant = state
        .conversations
        .add_participant(
            user.id,
            conversation_id.into_inner(),
            body.user_id,
            body.role.unwrap_or(MemberRole::Member),
        )
        .await?;
    Ok(HttpResponse::Created().json(participant))
}

/// POST /conversations/{id}/leave
#[post("/conversations/{id}/leave")]
pub async fn leave_conversation(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let outcome = state
        .conversations
        .leave(user.id, conversation_id.into_inner(), None)
        .await?;
    Ok(leave_response(outcome))
}

/// DELETE /conversations/{id}/participants/{user_id}
#[delete("/conversations/{id}/participants/{user_id}")]
pub async fn remove_participant(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (conversation_id, target) = path.into_inner();
    let outcome = state
        .conversations
        .leave(user.id, conversation_id, Some(target))
        .await?;
    Ok(leave_response(outcome))
}

pub mod conversations;
pub mod messages;
pub mod participants;
pub mod reactions;
pub mod receipts;
pub mod wsroute;

use actix_web::{web, HttpResponse};

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Registers every REST and WebSocket route on the app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(conversations::create_direct)
        .service(conversations::create_group)
        .service(conversations::list_conversations)
        .service(conversations::get_conversation)
        .service(conversations::pin_conversation)
        .service(conversations::unpin_conversation)
        .service(participants::add_participant)
        .service(participants::leave_conversation)
        .service(participants::remove_participant)
        .service(messages::get_messages)
        .service(messages::send_message)
        .service(messages::edit_message)
        .service(messages::edit_message_by_client_id)
        .service(messages::delete_message)
        .service(messages::pin_message)
        .service(messages::unpin_message)
        .service(messages::get_pinned_messages)
        .service(reactions::set_reaction)
        .service(reactions::get_reactions)
        .service(reactions::bulk_reactions)
        .service(receipts::mark_delivered)
        .service(receipts::mark_read)
        .service(wsroute::ws_handler)
        .route("/health", web::get().to(health));
}

use crate::error::AppError;
use crate::middleware::auth::bearer_token;
use crate::state::AppState;
use crate::websocket::{ConnectionId, Gateway};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, http::header, web, Error, HttpRequest, HttpResponse, ResponseError};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

// Frame pushed from the registry channel to the socket
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct OutboundFrame(String);

// WebSocket Actor
struct WsSession {
    user_id: Uuid,
    connection_id: ConnectionId,
    gateway: Gateway,
    outbound: Option<UnboundedReceiver<String>>,
    inbound: UnboundedSender<String>,
    hb: Instant,
}

impl WsSession {
    fn new(
        user_id: Uuid,
        connection_id: ConnectionId,
        gateway: Gateway,
        outbound: UnboundedReceiver<String>,
    ) -> Self {
        let inbound = gateway.spawn_inbound(connection_id, user_id);
        Self {
            user_id,
            connection_id,
            gateway,
            outbound: Some(outbound),
            inbound,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(connection_id = %act.connection_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);

        // Bridge the registry channel into the actor mailbox
        if let Some(mut rx) = self.outbound.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    if !addr.connected() {
                        break;
                    }
                    addr.do_send(OutboundFrame(frame));
                }
            });
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            "WebSocket session stopped"
        );

        let gateway = self.gateway.clone();
        let connection_id = self.connection_id;
        let user_id = self.user_id;
        actix::spawn(async move {
            gateway.disconnect(connection_id, user_id).await;
        });
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

// Handle WebSocket protocol messages
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                // replies come back through the registry channel
                if self.inbound.send(text.to_string()).is_err() {
                    tracing::warn!(connection_id = %self.connection_id, "inbound worker gone");
                    ctx.stop();
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Token from the `token` query parameter, else `Authorization: Bearer`.
fn request_token<'a>(params: &'a WsParams, req: &'a HttpRequest) -> Option<&'a str> {
    params.token.as_deref().or_else(|| {
        bearer_token(
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
        )
    })
}

// HTTP handler
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();

    // Authentication happens before any state is created
    let verified = request_token(&params, &req)
        .ok_or(AppError::MissingToken)
        .and_then(|token| state.jwt.verify(token));
    let user_id = match verified {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket connection rejected");
            return Ok(e.error_response());
        }
    };

    let (connection_id, rx) = state.gateway.connect(user_id).await?;

    let session = WsSession::new(user_id, connection_id, state.gateway.clone(), rx);
    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            state.gateway.disconnect(connection_id, user_id).await;
            Err(e)
        }
    }
}

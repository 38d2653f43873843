use crate::{
    config::Config,
    error::AppResult,
    middleware::auth::JwtVerifier,
    repository::ChatRepository,
    services::{
        ConversationService, DeliveryService, MessageHydrator, MessageService, ReactionService,
        UserDirectory,
    },
    websocket::{presence::TypingTracker, Broadcaster, ConnectionRegistry, Gateway},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Arc<dyn ChatRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub registry: ConnectionRegistry,
    pub jwt: Arc<JwtVerifier>,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub delivery: DeliveryService,
    pub reactions: ReactionService,
    pub gateway: Gateway,
}

impl AppState {
    /// Wires every service around one registry, which doubles as the broadcaster.
    pub fn new(
        config: Config,
        repo: Arc<dyn ChatRepository>,
        users: Arc<dyn UserDirectory>,
    ) -> AppResult<Self> {
        let jwt = Arc::new(JwtVerifier::from_config(&config.jwt)?);
        let registry = ConnectionRegistry::new();
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(registry.clone());

        let hydrator = MessageHydrator::new(repo.clone(), users.clone());
        let conversations =
            ConversationService::new(repo.clone(), users.clone(), broadcaster.clone());
        let messages = MessageService::new(repo.clone(), hydrator, broadcaster.clone());
        let delivery = DeliveryService::new(repo.clone(), broadcaster.clone());
        let reactions = ReactionService::new(repo.clone(), broadcaster);
        let typing = TypingTracker::new(
            registry.clone(),
            config.typing_sweep_interval,
            config.typing_stale_after,
        );
        let gateway = Gateway::new(
            repo.clone(),
            registry.clone(),
            typing,
            messages.clone(),
            delivery.clone(),
            reactions.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            repo,
            users,
            registry,
            jwt,
            conversations,
            messages,
            delivery,
            reactions,
            gateway,
        })
    }
}

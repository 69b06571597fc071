pub mod chat_store;
pub mod connection_manager;
pub mod presence;
pub mod room_router;
pub mod user_session;

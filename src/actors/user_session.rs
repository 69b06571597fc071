pub mod handlers;
mod session;

pub use session::UserSession;

mod handlers;
mod messages;
mod router;

pub use messages::{RoomId, RouterMessage};
pub use router::RoomRouter;

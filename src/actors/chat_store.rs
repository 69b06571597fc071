mod actor;
mod handle;
mod handlers;
mod messages;

pub use actor::ChatStore;
pub use handle::StoreHandle;
pub use messages::{ParticipantSeed, SettingsPatch, StoreMessage};

pub mod autosave;
pub mod channel;
pub mod history;
pub mod identity;
pub mod presence;
pub mod server;
pub mod session;
pub mod ws;

pub mod api;

use uuid::Uuid;

pub type DocumentId = String;
pub type SessionId = Uuid;
pub type UserId = String;

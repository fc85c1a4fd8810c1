pub mod data;
pub mod error;
pub mod store;

pub use data::{ReplyTicket, Session};
pub use error::SessionError;
pub use store::{SessionStore, SharedSession};

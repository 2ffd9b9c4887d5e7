pub mod app;
pub mod attachment;
pub mod backend;
pub mod config;
pub mod error;
pub mod exchange;
pub mod repl;
pub mod session;
pub mod store;

pub use app::App;
pub use error::{ChatError, ValidationError};
pub use session::{Document, Message, Model, Role, Session};
pub use store::{Notification, SessionStore, StoreEvent};

#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod events;
pub mod persistence;
pub mod server;
pub mod session;
pub mod subscription;
pub mod timer;
pub mod world;

pub use error::{ErrorKind, ServerError};
pub use server::GameServer;
pub use session::registry::SessionRegistry;
pub use session::Session;
pub use timer::TimerWheel;

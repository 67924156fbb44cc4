//! Error taxonomy for the session core. Every error has a
//! named kind and a user-visible message; mine hits are a game outcome, not
//! an error, and are never represented here.

use std::fmt;
use thiserror::Error;

/// The coarse category a [`ServerError`] falls into. A transport adapter
/// can switch on this without matching every variant of the full error
/// enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  AlreadyExists,
  NotInGame,
  GameOver,
  LockedOut,
  InvalidInput,
  TransientIO,
  Internal,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let s = match self {
      ErrorKind::NotFound => "not_found",
      ErrorKind::AlreadyExists => "already_exists",
      ErrorKind::NotInGame => "not_in_game",
      ErrorKind::GameOver => "game_over",
      ErrorKind::LockedOut => "locked_out",
      ErrorKind::InvalidInput => "invalid_input",
      ErrorKind::TransientIO => "transient_io",
      ErrorKind::Internal => "internal",
    };
    write!(f, "{s}")
  }
}

#[derive(Debug, Error)]
pub enum ServerError {
  #[error("no such game {0}")]
  SessionNotFound(String),
  #[error("no such chunk {0}")]
  ChunkNotFound(String),
  #[error("game {0} already exists")]
  AlreadyExists(String),
  #[error("player is not in this game")]
  NotInGame,
  #[error("game is over")]
  GameOver,
  #[error("player is locked out until {locked_until_ms}ms (epoch)")]
  LockedOut { locked_until_ms: u64 },
  #[error("invalid input: {0}")]
  InvalidInput(String),
  #[error("persistence error: {0}")]
  TransientIO(#[from] PersistenceError),
  #[error("internal error: {0}")]
  Internal(String),
}

impl ServerError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ServerError::SessionNotFound(_) | ServerError::ChunkNotFound(_) => ErrorKind::NotFound,
      ServerError::AlreadyExists(_) => ErrorKind::AlreadyExists,
      ServerError::NotInGame => ErrorKind::NotInGame,
      ServerError::GameOver => ErrorKind::GameOver,
      ServerError::LockedOut {.. } => ErrorKind::LockedOut,
      ServerError::InvalidInput(_) => ErrorKind::InvalidInput,
      ServerError::TransientIO(_) => ErrorKind::TransientIO,
      ServerError::Internal(_) => ErrorKind::Internal,
    }
  }
}

/// Errors surfaced by a [`crate::persistence::PersistenceGateway`]
/// implementation. Kept separate from [`ServerError`] so a gateway impl
/// doesn't need to depend on the rest of the core's error type, only to be
/// wrapped by it at the boundary.
#[derive(Debug, Error)]
pub enum PersistenceError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("(de)serialization error: {0}")]
  Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

//! Maps game id to [`Session`]. Creation is idempotent only when
//! explicitly requested; otherwise creating an existing game id is an
//! error.

use super::{Contributor, Session};
use crate::config::{BoardConfig, ScoringConfig};
use crate::error::{Result, ServerError};
use crate::events::{PlayerId, ServerEvent};
use crate::timer::TimerSink;
use crate::world::WorldGenerator;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A player's durable fields, as saved through a
/// [`crate::persistence::PersistenceGateway`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
  pub id: PlayerId,
  pub username: String,
  pub score: u32,
  pub locked_until_ms: Option<u64>,
  pub joined_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineRevealRecord {
  pub x: i32,
  pub y: i32,
  pub contributors: Vec<Contributor>,
  pub revealed: bool,
  pub reveal_at_ms: Option<u64>,
}

/// A full, serialisable session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
  pub game_id: String,
  pub board_config: BoardConfig,
  pub scoring_config: ScoringConfig,
  pub players: Vec<PlayerRecord>,
  pub mine_reveals: Vec<MineRevealRecord>,
  pub game_over: bool,
  pub winner: Option<PlayerId>,
  pub updated_at_ms: u64,
}

/// Maps every live game id to its [`Session`], and the
/// [`WorldGenerator`] that produced its procedural content.
pub struct SessionRegistry {
  sessions: RwLock<HashMap<String, Arc<Session>>>,
  leaderboard_sink: Option<crossbeam_channel::Sender<(String, ServerEvent)>>,
  timer_sink: RwLock<Option<Arc<dyn TimerSink>>>,
}

impl SessionRegistry {
  pub fn new(leaderboard_sink: Option<crossbeam_channel::Sender<(String, ServerEvent)>>) -> Self {
    SessionRegistry { sessions: RwLock::new(HashMap::new()), leaderboard_sink, timer_sink: RwLock::new(None) }
  }

  /// Wires every session created or restored through this registry from
  /// this point on to `timer_sink`, typically a
  /// [`crate::timer::TimerWheel`]. Separate from construction because the
  /// wheel itself needs an `Arc<SessionRegistry>` to look sessions up by
  /// id when a deadline fires — the two are built in two steps to break
  /// the cycle.
  pub fn set_timer_sink(&self, timer_sink: Arc<dyn TimerSink>) {
    *self.timer_sink.write() = Some(timer_sink);
  }

  /// Creates a new session for `game_id`. Errors with `AlreadyExists`
  /// unless `join_or_create` is set, in which case an existing session is
  /// returned instead of erroring.
  pub fn create(
    &self,
    game_id: String,
    board_config: BoardConfig,
    scoring_config: ScoringConfig,
    join_or_create: bool,
  ) -> Result<Arc<Session>> {
    let mut sessions = self.sessions.write();
    if let Some(existing) = sessions.get(&game_id) {
      return if join_or_create { Ok(existing.clone()) } else { Err(ServerError::AlreadyExists(game_id)) };
    }
    let generator = Arc::new(WorldGenerator::new(&game_id, &board_config));
    let session = Arc::new(Session::with_timer_sink(
      game_id.clone(),
      board_config,
      scoring_config,
      generator,
      self.leaderboard_sink.clone(),
      self.timer_sink.read().clone(),
    ));
    sessions.insert(game_id, session.clone());
    Ok(session)
  }

  /// Restores a session from a persisted [`SessionSnapshot`] (S8).
  /// Chunk overlays are restored separately, directly into the returned
  /// session's chunk manager, since they are keyed by chunk rather than
  /// by session.
  pub fn restore(&self, snapshot: &SessionSnapshot) -> Arc<Session> {
    let mut sessions = self.sessions.write();
    let generator = Arc::new(WorldGenerator::new(&snapshot.game_id, &snapshot.board_config));
    let session = Arc::new(Session::with_timer_sink(
      snapshot.game_id.clone(),
      snapshot.board_config,
      snapshot.scoring_config,
      generator,
      self.leaderboard_sink.clone(),
      self.timer_sink.read().clone(),
    ));
    session.restore_from_snapshot(snapshot);
    sessions.insert(snapshot.game_id.clone(), session.clone());
    session
  }

  pub fn get(&self, game_id: &str) -> Result<Arc<Session>> {
    self.sessions.read().get(game_id).cloned().ok_or_else(|| ServerError::SessionNotFound(game_id.to_string()))
  }

  pub fn all(&self) -> Vec<Arc<Session>> { self.sessions.read().values().cloned().collect() }

  /// Stops accepting new mutating calls on the session and removes it
  /// from the registry. The caller is responsible for
  /// persisting a final snapshot first.
  pub fn retire(&self, game_id: &str) -> Result<()> {
    let mut sessions = self.sessions.write();
    let session = sessions.remove(game_id).ok_or_else(|| ServerError::SessionNotFound(game_id.to_string()))?;
    session.lock_for_teardown();
    Ok(())
  }
}

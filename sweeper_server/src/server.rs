//! `GameServer`: the single integration seam an external transport binds
//! to. Owns the `SessionRegistry` and `TimerWheel`, exposes one
//! method per inbound intent, and never assumes anything about how those
//! intents arrived (WebSocket, in-process call, test harness, whatever).

use crate::config::{BoardConfig, ScoringConfig};
use crate::error::Result;
use crate::events::{ConnId, ConnSender, PlayerId};
use crate::persistence::PersistenceGateway;
use crate::session::player::ChunkViewport;
use crate::session::registry::SessionRegistry;
use crate::timer::TimerWheel;
use std::sync::Arc;
use sweeper_common::math::ChunkId;

/// Optional per-field overrides applied on top of the default
/// `ScoringConfig` at `createGame` time. Any field left
/// `None` keeps the default.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct ScoringConfigOverrides {
  pub first_place_points: Option<u32>,
  pub second_place_points: Option<u32>,
  pub third_place_points: Option<u32>,
  pub number_reveal_points: Option<u32>,
  pub mine_hit_penalty: Option<u32>,
  pub lockout_duration_ms: Option<u64>,
  pub mine_reveal_delay_ms: Option<u64>,
  pub flag_place_points: Option<u32>,
  pub flag_remove_points: Option<u32>,
}

impl ScoringConfigOverrides {
  fn apply(self, base: ScoringConfig) -> ScoringConfig {
    ScoringConfig {
      first_place_points: self.first_place_points.unwrap_or(base.first_place_points),
      second_place_points: self.second_place_points.unwrap_or(base.second_place_points),
      third_place_points: self.third_place_points.unwrap_or(base.third_place_points),
      number_reveal_points: self.number_reveal_points.unwrap_or(base.number_reveal_points),
      mine_hit_penalty: self.mine_hit_penalty.unwrap_or(base.mine_hit_penalty),
      lockout_duration_ms: self.lockout_duration_ms.unwrap_or(base.lockout_duration_ms),
      mine_reveal_delay_ms: self.mine_reveal_delay_ms.unwrap_or(base.mine_reveal_delay_ms),
      flag_place_points: self.flag_place_points.unwrap_or(base.flag_place_points),
      flag_remove_points: self.flag_remove_points.unwrap_or(base.flag_remove_points),
    }
  }
}

pub struct GameCreated {
  pub game_id: String,
  pub player_id: PlayerId,
}

pub struct GameJoined {
  pub game_id: String,
  pub player_id: PlayerId,
  pub players: Vec<crate::session::player::Player>,
}

/// Every inbound intent a transport adapter can deliver. Kept as an
/// enum so a transport can decode a wire message straight into one of
/// these without the core knowing anything about the wire format.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Intent {
  CreateGame { game_id: String, board_config: BoardConfig, scoring_overrides: ScoringConfigOverrides, username: Option<String> },
  JoinGame { game_id: String, username: Option<String> },
  Reconnect { game_id: String, player_id: PlayerId },
  RevealTile { game_id: String, x: i32, y: i32 },
  FlagTile { game_id: String, x: i32, y: i32 },
  ChordClick { game_id: String, x: i32, y: i32 },
  SubscribeToChunk { game_id: String, cx: i32, cy: i32 },
  UnsubscribeFromChunk { game_id: String, cx: i32, cy: i32 },
  UpdateViewport { game_id: String, min_cx: i32, min_cy: i32, max_cx: i32, max_cy: i32 },
}

/// Owns the registry and timer wheel, and exposes one method per inbound
/// intent. The methods that establish a connection (`create_game`,
/// `join_game`, `reconnect`) take the caller-supplied `ConnSender` so the
/// facade never has to know how outbound events actually reach the
/// client.
pub struct GameServer {
  registry: Arc<SessionRegistry>,
  timer_wheel: Arc<TimerWheel>,
  gateway: Arc<dyn PersistenceGateway>,
}

impl GameServer {
  pub fn new(timer_tick_ms: u64, gateway: Arc<dyn PersistenceGateway>, leaderboard_sink: Option<crossbeam_channel::Sender<(String, crate::events::ServerEvent)>>) -> Self {
    let registry = Arc::new(SessionRegistry::new(leaderboard_sink));
    let timer_wheel = TimerWheel::spawn(registry.clone(), timer_tick_ms);
    registry.set_timer_sink(timer_wheel.clone());
    GameServer { registry, timer_wheel, gateway }
  }

  pub fn registry(&self) -> &Arc<SessionRegistry> { &self.registry }

  pub fn create_game(
    &self,
    game_id: String,
    board_config: BoardConfig,
    scoring_overrides: ScoringConfigOverrides,
    conn_id: ConnId,
    username: Option<String>,
    sender: ConnSender,
  ) -> Result<GameCreated> {
    let scoring_config = scoring_overrides.apply(ScoringConfig::default());
    let session = self.registry.create(game_id.clone(), board_config, scoring_config, false)?;
    let joined = session.join(conn_id, username, sender)?;
    Ok(GameCreated { game_id, player_id: joined.player_id })
  }

  pub fn join_game(&self, game_id: String, conn_id: ConnId, username: Option<String>, sender: ConnSender) -> Result<GameJoined> {
    let session = self.registry.get(&game_id)?;
    let joined = session.join(conn_id, username, sender)?;
    Ok(GameJoined { game_id, player_id: joined.player_id, players: joined.players })
  }

  pub fn reconnect(&self, game_id: String, player_id: PlayerId, conn_id: ConnId, sender: ConnSender) -> Result<Vec<crate::session::player::Player>> {
    let session = self.registry.get(&game_id)?;
    session.reconnect(player_id, conn_id, sender)
  }

  pub fn reveal_tile(&self, game_id: &str, player_id: PlayerId, x: i32, y: i32) -> Result<()> {
    self.registry.get(game_id)?.reveal(player_id, x, y)
  }

  pub fn flag_tile(&self, game_id: &str, player_id: PlayerId, x: i32, y: i32) -> Result<()> {
    self.registry.get(game_id)?.flag(player_id, x, y)
  }

  pub fn chord_click(&self, game_id: &str, player_id: PlayerId, x: i32, y: i32) -> Result<()> {
    self.registry.get(game_id)?.chord(player_id, x, y)
  }

  pub fn subscribe_to_chunk(&self, game_id: &str, player_id: PlayerId, chunk_id: ChunkId) -> Result<()> {
    self.registry.get(game_id)?.subscribe_chunk(player_id, chunk_id)
  }

  pub fn unsubscribe_from_chunk(&self, game_id: &str, player_id: PlayerId, chunk_id: ChunkId) -> Result<()> {
    self.registry.get(game_id)?.unsubscribe_chunk(player_id, chunk_id)
  }

  pub fn update_viewport(&self, game_id: &str, player_id: PlayerId, viewport: ChunkViewport) -> Result<()> {
    self.registry.get(game_id)?.set_viewport(player_id, viewport)
  }

  pub fn leave(&self, game_id: &str, player_id: PlayerId) -> Result<()> {
    self.registry.get(game_id)?.leave(player_id)
  }

  /// Persists every currently-known session through the configured
  /// gateway. Errors for one session are logged, not propagated, so a
  /// single bad session never blocks shutdown of the rest. Sessions are
  /// independent, so snapshotting and saving them fans out across
  /// `rayon`'s global pool rather than persisting one at a time.
  pub fn persist_all(&self) {
    use rayon::prelude::*;
    self.registry.all().par_iter().for_each(|session| {
      let snapshot = session.snapshot();
      if let Err(e) = self.gateway.save_session(&snapshot) {
        error!("failed to persist session {} on shutdown: {e}", snapshot.game_id);
      }
    });
  }

  /// Restores every session found in `game_ids` from the gateway, wiring
  /// each through this server's registry and timer wheel.
  pub fn restore_all(&self, game_ids: &[String]) {
    for game_id in game_ids {
      match self.gateway.load_session(game_id) {
        Ok(Some(snapshot)) => {
          self.registry.restore(&snapshot);
        }
        Ok(None) => warn!("no persisted snapshot found for game {game_id}, skipping restore"),
        Err(e) => error!("failed to load session {game_id}: {e}"),
      }
    }
  }

  pub fn shutdown(&self) {
    self.timer_wheel.stop();
    self.persist_all();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::persistence::InMemoryGateway;
  use uuid::Uuid;

  fn server() -> GameServer { GameServer::new(50, Arc::new(InMemoryGateway::new()), None) }

  fn dummy_sender() -> (ConnSender, crossbeam_channel::Receiver<crate::events::ServerEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ConnSender::new(Uuid::new_v4(), tx), rx)
  }

  #[test]
  fn create_then_join_reaches_the_same_session() {
    let server = server();
    let (sender_a, _rx_a) = dummy_sender();
    let created = server
      .create_game("g1".into(), BoardConfig::default(), ScoringConfigOverrides::default(), sender_a.conn_id(), Some("alice".into()), sender_a)
      .unwrap();
    let (sender_b, _rx_b) = dummy_sender();
    let joined = server.join_game("g1".into(), sender_b.conn_id(), Some("bob".into()), sender_b).unwrap();
    assert_eq!(joined.game_id, created.game_id);
    assert_eq!(joined.players.len(), 2);
  }

  #[test]
  fn scoring_overrides_only_replace_the_fields_set() {
    let overrides = ScoringConfigOverrides { mine_hit_penalty: Some(99), ..Default::default() };
    let merged = overrides.apply(ScoringConfig::default());
    assert_eq!(merged.mine_hit_penalty, 99);
    assert_eq!(merged.first_place_points, ScoringConfig::default().first_place_points);
  }

  #[test]
  fn reveal_on_an_unknown_game_is_not_found() {
    let server = server();
    let err = server.reveal_tile("nope", Uuid::new_v4(), 0, 0).unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
  }

  #[test]
  fn shutdown_persists_every_live_session() {
    let server = server();
    let (sender, _rx) = dummy_sender();
    server.create_game("g1".into(), BoardConfig::default(), ScoringConfigOverrides::default(), sender.conn_id(), None, sender).unwrap();
    server.shutdown();
  }
}

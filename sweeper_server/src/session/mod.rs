//! One game: players, the chunk manager, the mine-reveal state machine,
//! and the session-level exclusive lease everything mutating runs under
//!.

pub mod action;
pub mod player;
pub mod registry;

use crate::config::{BoardConfig, ScoringConfig};
use crate::error::{Result, ServerError};
use crate::events::{ConnId, ConnSender, MineContributor, PlayerId, ServerEvent, UpdateBus};
use crate::subscription::SubscriptionRouter;
use crate::timer::TimerSink;
use crate::world::ChunkManager;
use crate::world::WorldGenerator;
use parking_lot::Mutex;
use player::{ChunkViewport, Player, PlayerStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use sweeper_common::math::Coordinate;

pub fn now_ms() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as u64
}

/// A single contributor to a [`MineReveal`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Contributor {
  pub player_id: PlayerId,
  pub position: u8,
  pub timestamp_ms: u64,
  pub points: u32,
}

/// The delayed, multi-contributor mine-reveal state machine for one mine
/// coordinate. `contributors` is always sorted by `timestamp_ms`;
/// `revealed` is a one-way latch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MineReveal {
  pub contributors: Vec<Contributor>,
  pub revealed: bool,
  pub reveal_at_ms: Option<u64>,
}

impl MineReveal {
  /// Records a correct flag from `player_id`. A player already present is
  /// a no-op (unflagging/reflagging never re-scores). Returns the
  /// new contributor's record when one was actually added.
  fn record_flag(&mut self, scoring: &ScoringConfig, player_id: PlayerId, now_ms: u64) -> Option<Contributor> {
    if self.revealed || self.contributors.iter().any(|c| c.player_id == player_id) {
      return None;
    }
    let position = (self.contributors.len() + 1) as u8;
    let points = scoring.place_points(position as usize);
    let contributor = Contributor { player_id, position, timestamp_ms: now_ms, points };
    self.contributors.push(contributor.clone());
    if position == 1 {
      self.reveal_at_ms = Some(now_ms + scoring.mine_reveal_delay_ms);
    }
    Some(contributor)
  }

  fn to_wire_contributors(&self) -> Vec<MineContributor> {
    self.contributors.iter().map(|c| MineContributor { player_id: c.player_id, position: c.position, points: c.points }).collect()
  }
}

pub struct JoinResult {
  pub player_id: PlayerId,
  pub players: Vec<player::Player>,
}

pub(crate) struct SessionState {
  pub players: HashMap<PlayerId, Player>,
  pub chunk_manager: ChunkManager,
  pub mine_reveals: HashMap<Coordinate, MineReveal>,
  pub subscriptions: SubscriptionRouter,
  pub bus: UpdateBus,
  pub game_over: bool,
  pub winner: Option<PlayerId>,
  pub locked: bool,
  pub ever_had_player: bool,
}

impl SessionState {
  fn session_recipients(&self) -> Vec<ConnId> { self.players.values().map(|p| p.conn_id).collect() }

  fn chunk_recipients(&self, chunk_id: sweeper_common::math::ChunkId) -> Vec<ConnId> {
    self.subscriptions.subscribers_of(chunk_id)
  }
}

/// A resolved outbound event: the set of connections it goes to, and the
/// event itself. Built while the session lease is held; actually sent
/// after it is released.
pub(crate) struct Dispatch {
  pub recipients: Vec<ConnId>,
  pub event: ServerEvent,
}

pub struct Session {
  pub game_id: String,
  pub board_config: BoardConfig,
  pub scoring_config: ScoringConfig,
  generator: Arc<WorldGenerator>,
  leaderboard_sink: Option<crossbeam_channel::Sender<(String, ServerEvent)>>,
  timer_sink: Option<Arc<dyn TimerSink>>,
  state: Mutex<SessionState>,
}

impl Session {
  pub fn new(
    game_id: String,
    board_config: BoardConfig,
    scoring_config: ScoringConfig,
    generator: Arc<WorldGenerator>,
    leaderboard_sink: Option<crossbeam_channel::Sender<(String, ServerEvent)>>,
  ) -> Self {
    Self::with_timer_sink(game_id, board_config, scoring_config, generator, leaderboard_sink, None)
  }

  /// Same as [`Session::new`], additionally wiring a [`TimerSink`] so a
  /// correct first flag on a mine schedules its delayed reveal. Used by [`registry::SessionRegistry`] once a
  /// [`crate::timer::TimerWheel`] is available.
  pub fn with_timer_sink(
    game_id: String,
    board_config: BoardConfig,
    scoring_config: ScoringConfig,
    generator: Arc<WorldGenerator>,
    leaderboard_sink: Option<crossbeam_channel::Sender<(String, ServerEvent)>>,
    timer_sink: Option<Arc<dyn TimerSink>>,
  ) -> Self {
    let chunk_manager = ChunkManager::new(board_config.chunk_size, generator.clone());
    Session {
      game_id,
      board_config,
      scoring_config,
      generator,
      leaderboard_sink,
      timer_sink,
      state: Mutex::new(SessionState {
        players: HashMap::new(),
        chunk_manager,
        mine_reveals: HashMap::new(),
        subscriptions: SubscriptionRouter::new(),
        bus: UpdateBus::new(),
        game_over: false,
        winner: None,
        locked: false,
        ever_had_player: false,
      }),
    }
  }

  pub fn generator(&self) -> &Arc<WorldGenerator> { &self.generator }

  /// Sends every resolved dispatch after the lease guarding `state` has
  /// already been dropped by the caller.
  fn flush(&self, senders: Vec<(Vec<ConnSender>, ServerEvent)>) {
    for (recipients, event) in senders {
      for sender in recipients {
        sender.send(event.clone());
      }
    }
    // Forward a narrow subset to the leaderboard collaborator (out of
    // core scope beyond this single forwarding point).
  }

  /// Resolves each [`Dispatch`]'s recipient conn ids into live
  /// [`ConnSender`] clones while the lease is still held, then drops the
  /// lease and actually sends.
  fn dispatch_all(&self, state: parking_lot::MutexGuard<SessionState>, dispatches: Vec<Dispatch>) {
    let mut resolved = Vec::with_capacity(dispatches.len());
    for d in &dispatches {
      let senders: Vec<ConnSender> =
        d.recipients.iter().filter_map(|id| state.bus.recipients_snapshot().get(id).cloned()).collect();
      resolved.push((senders, d.event.clone()));
    }
    let leaderboard_sink = self.leaderboard_sink.clone();
    let game_id = self.game_id.clone();
    drop(state);
    self.flush(resolved);
    if let Some(sink) = leaderboard_sink {
      for d in &dispatches {
        if matches!(d.event, ServerEvent::ScoreUpdate {.. } | ServerEvent::GameOver {.. }) {
          let _ = sink.send((game_id.clone(), d.event.clone()));
        }
      }
    }
  }

  pub fn join(&self, conn_id: ConnId, username: Option<String>, sender: ConnSender) -> Result<JoinResult> {
    let mut state = self.state.lock();
    if state.game_over {
      return Err(ServerError::GameOver);
    }
    let player_id = uuid::Uuid::new_v4();
    let username = username.unwrap_or_else(|| format!("player-{}", &player_id.to_string()[..8]));
    let player = Player::new(player_id, conn_id, username, now_ms());
    let summary = player.summary();
    state.bus.register(sender);
    state.players.insert(player_id, player);
    state.ever_had_player = true;
    let players: Vec<Player> = state.players.values().cloned().collect();
    let recipients = state.session_recipients();
    self.dispatch_all(state, vec![Dispatch { recipients, event: ServerEvent::PlayerJoined { player: summary } }]);
    Ok(JoinResult { player_id, players })
  }

  pub fn leave(&self, player_id: PlayerId) -> Result<()> {
    let mut state = self.state.lock();
    let player = state.players.remove(&player_id).ok_or(ServerError::NotInGame)?;
    for chunk_id in state.subscriptions.remove_all(player.conn_id) {
      state.chunk_manager.unsubscribe(chunk_id);
    }
    state.bus.remove(player.conn_id);
    let became_empty = state.players.is_empty();
    if became_empty && state.ever_had_player {
      state.game_over = true;
      state.winner = None;
    }
    let recipients = state.session_recipients();
    self.dispatch_all(state, vec![Dispatch { recipients, event: ServerEvent::PlayerLeft { player_id } }]);
    Ok(())
  }

  /// Subscribes `conn_id` to `chunk_id` if not already, draining its
  /// pending fills to fixpoint and queuing the initial snapshot.
  /// A no-op dispatch-wise if the subscription already existed.
  fn subscribe_one(state: &mut SessionState, conn_id: ConnId, chunk_id: sweeper_common::math::ChunkId, dispatches: &mut Vec<Dispatch>) {
    let is_new = state.subscriptions.subscribe(conn_id, chunk_id);
    if !is_new {
      return;
    }
    state.chunk_manager.subscribe(chunk_id);
    let drained = state.chunk_manager.drain_on_subscribe(chunk_id);
    for (id, cells) in drained {
      let recipients = state.chunk_recipients(id);
      let tiles = cells.iter().map(crate::events::TileDelta::from_cell).collect();
      dispatches.push(Dispatch { recipients, event: ServerEvent::TilesUpdate { chunk_id: id, tiles } });
    }
    let tiles = state
      .chunk_manager
      .get(chunk_id)
      .map(|c| c.overlay_entries())
      .unwrap_or_default()
      .into_iter()
      .map(|(local, overlay)| {
        let global = chunk_id.to_global(local, state.chunk_manager.size());
        crate::events::TileDelta { x: global.x(), y: global.y(), revealed: overlay.revealed, flagged: overlay.flagged, is_mine: None, adjacent_mines: None }
      })
      .collect();
    dispatches.push(Dispatch { recipients: vec![conn_id], event: ServerEvent::ChunkData { chunk_id, tiles } });
  }

  fn unsubscribe_one(state: &mut SessionState, conn_id: ConnId, chunk_id: sweeper_common::math::ChunkId) {
    let now_empty = state.subscriptions.unsubscribe(conn_id, chunk_id);
    if now_empty {
      state.chunk_manager.unsubscribe(chunk_id);
    }
  }

  pub fn set_viewport(&self, player_id: PlayerId, viewport: ChunkViewport) -> Result<()> {
    let mut state = self.state.lock();
    if state.locked {
      return Err(ServerError::GameOver);
    }
    let previous = {
      let player = state.players.get(&player_id).ok_or(ServerError::NotInGame)?;
      player.viewport
    };
    let (to_sub, to_unsub) = SubscriptionRouter::resolve_viewport_change(previous, viewport);
    let conn_id = state.players.get(&player_id).unwrap().conn_id;

    let mut dispatches = Vec::new();
    for chunk_id in to_sub {
      Self::subscribe_one(&mut state, conn_id, chunk_id, &mut dispatches);
    }
    for chunk_id in to_unsub {
      Self::unsubscribe_one(&mut state, conn_id, chunk_id);
    }
    state.players.get_mut(&player_id).unwrap().viewport = Some(viewport);
    self.dispatch_all(state, dispatches);
    Ok(())
  }

  /// Subscribes to a single chunk outside of a viewport rectangle, e.g. for a client that streams chunks on demand
  /// rather than maintaining a rectangular viewport.
  pub fn subscribe_chunk(&self, player_id: PlayerId, chunk_id: sweeper_common::math::ChunkId) -> Result<()> {
    let mut state = self.state.lock();
    if state.locked {
      return Err(ServerError::GameOver);
    }
    let conn_id = state.players.get(&player_id).ok_or(ServerError::NotInGame)?.conn_id;
    let mut dispatches = Vec::new();
    Self::subscribe_one(&mut state, conn_id, chunk_id, &mut dispatches);
    self.dispatch_all(state, dispatches);
    Ok(())
  }

  pub fn unsubscribe_chunk(&self, player_id: PlayerId, chunk_id: sweeper_common::math::ChunkId) -> Result<()> {
    let mut state = self.state.lock();
    let conn_id = state.players.get(&player_id).ok_or(ServerError::NotInGame)?.conn_id;
    Self::unsubscribe_one(&mut state, conn_id, chunk_id);
    Ok(())
  }

  /// Reveals `(x, y)` on behalf of `player_id`.
  pub fn reveal(&self, player_id: PlayerId, x: i32, y: i32) -> Result<()> {
    let mut state = self.state.lock();
    let mut dispatches = action::validate(&mut state, player_id)?;
    dispatches.extend(action::reveal(&mut state, &self.scoring_config, player_id, x, y, now_ms()));
    self.dispatch_all(state, dispatches);
    Ok(())
  }

  pub fn flag(&self, player_id: PlayerId, x: i32, y: i32) -> Result<()> {
    let mut state = self.state.lock();
    let mut dispatches = action::validate(&mut state, player_id)?;
    let (flag_dispatches, reveal_deadline) = action::flag(&mut state, &self.scoring_config, player_id, x, y, now_ms());
    dispatches.extend(flag_dispatches);
    self.dispatch_all(state, dispatches);
    if let Some(deadline) = reveal_deadline {
      if let Some(sink) = &self.timer_sink {
        sink.schedule(self.game_id.clone(), Coordinate::new(x, y), deadline);
      }
    }
    Ok(())
  }

  pub fn chord(&self, player_id: PlayerId, x: i32, y: i32) -> Result<()> {
    let mut state = self.state.lock();
    let mut dispatches = action::validate(&mut state, player_id)?;
    dispatches.extend(action::chord(&mut state, &self.scoring_config, player_id, x, y, now_ms())?);
    self.dispatch_all(state, dispatches);
    Ok(())
  }

  /// Called by the [`crate::timer::TimerWheel`] when a mine-reveal
  /// deadline for `coordinate` elapses.
  pub fn timer_fired(&self, coordinate: Coordinate) {
    let mut state = self.state.lock();
    let now = now_ms();
    let Some(reveal) = state.mine_reveals.get(&coordinate) else { return };
    if reveal.revealed {
      return;
    }
    let Some(reveal_at) = reveal.reveal_at_ms else { return };
    if now < reveal_at {
      return;
    }
    let contributors = {
      let reveal = state.mine_reveals.get_mut(&coordinate).unwrap();
      reveal.revealed = true;
      reveal.to_wire_contributors()
    };
    state.chunk_manager.set_cell_overlay(
      coordinate,
      crate::world::PointOverlay { revealed: true, flagged: true },
    );
    let (chunk_id, _) = coordinate.to_chunk(state.chunk_manager.size());
    let recipients = state.chunk_recipients(chunk_id);
    self.dispatch_all(
      state,
      vec![Dispatch { recipients, event: ServerEvent::MineRevealed { x: coordinate.x(), y: coordinate.y(), contributors } }],
    );
  }

  /// Administrative end-of-game call: picks the highest-scoring
  /// player, ties broken by earliest join.
  pub fn end_game(&self) -> Result<()> {
    let mut state = self.state.lock();
    if state.game_over {
      return Ok(());
    }
    let winner = state
      .players
      .values()
      .max_by(|a, b| a.score.cmp(&b.score).then(b.joined_at_ms.cmp(&a.joined_at_ms)))
      .map(|p| p.id);
    state.game_over = true;
    state.winner = winner;
    let recipients = state.session_recipients();
    self.dispatch_all(state, vec![Dispatch { recipients, event: ServerEvent::GameOver { winner } }]);
    Ok(())
  }

  pub fn is_game_over(&self) -> bool { self.state.lock().game_over }
  pub fn player_count(&self) -> usize { self.state.lock().players.len() }

  /// Sets the teardown latch: once locked, a
  /// racing mutating call fails fast instead of touching half-torn-down
  /// state.
  pub fn lock_for_teardown(&self) { self.state.lock().locked = true; }

  /// Repopulates player and mine-reveal state from a persisted
  /// [`registry::SessionSnapshot`] (S8). Restored players have no
  /// live connection until [`Session::reconnect`] re-registers one; they
  /// are excluded from broadcast recipients until then.
  pub(crate) fn restore_from_snapshot(&self, snapshot: &registry::SessionSnapshot) {
    let mut state = self.state.lock();
    for record in &snapshot.players {
      let mut player = Player::new(record.id, ConnId::nil(), record.username.clone(), record.joined_at_ms);
      player.score = record.score;
      if let Some(locked_until_ms) = record.locked_until_ms {
        player.lock_out(locked_until_ms);
      }
      state.players.insert(record.id, player);
    }
    for record in &snapshot.mine_reveals {
      state.mine_reveals.insert(
        Coordinate::new(record.x, record.y),
        MineReveal { contributors: record.contributors.clone(), revealed: record.revealed, reveal_at_ms: record.reveal_at_ms },
      );
    }
    state.game_over = snapshot.game_over;
    state.winner = snapshot.winner;
    state.ever_had_player = !snapshot.players.is_empty();
  }

  /// Re-associates an existing player id with a fresh connection (the
  /// `reconnect` intent). Errors `NotInGame` if the player id is
  /// unknown, e.g. it was never part of this session or has been pruned.
  pub fn reconnect(&self, player_id: PlayerId, conn_id: ConnId, sender: ConnSender) -> Result<Vec<Player>> {
    let mut state = self.state.lock();
    let player = state.players.get_mut(&player_id).ok_or(ServerError::NotInGame)?;
    player.conn_id = conn_id;
    state.bus.register(sender);
    Ok(state.players.values().cloned().collect())
  }

  pub fn snapshot(&self) -> registry::SessionSnapshot {
    let state = self.state.lock();
    registry::SessionSnapshot {
      game_id: self.game_id.clone(),
      board_config: self.board_config,
      scoring_config: self.scoring_config,
      players: state
        .players
        .values()
        .map(|p| registry::PlayerRecord {
          id: p.id,
          username: p.username.clone(),
          score: p.score,
          locked_until_ms: match p.status {
            PlayerStatus::LockedOut { locked_until_ms } => Some(locked_until_ms),
            PlayerStatus::Active => None,
          },
          joined_at_ms: p.joined_at_ms,
        })
        .collect(),
      mine_reveals: state
        .mine_reveals
        .iter()
        .map(|(coord, reveal)| registry::MineRevealRecord {
          x: coord.x(),
          y: coord.y(),
          contributors: reveal.contributors.clone(),
          revealed: reveal.revealed,
          reveal_at_ms: reveal.reveal_at_ms,
        })
        .collect(),
      game_over: state.game_over,
      winner: state.winner,
      updated_at_ms: now_ms(),
    }
  }
}

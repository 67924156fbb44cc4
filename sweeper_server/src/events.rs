//! Typed outbound event dispatch. Every domain event a session
//! produces flows through here on its way to whichever connections care
//! about it; the core never depends on a wire format.

use crate::world::Cell;
use serde::{Deserialize, Serialize};
use sweeper_common::math::ChunkId;
use uuid::Uuid;

pub type PlayerId = Uuid;
pub type ConnId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerStatus {
  Active,
  LockedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
  pub player_id: PlayerId,
  pub username: String,
  pub score: u32,
  pub status: PlayerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreReason {
  Reveal,
  FlagMine,
  FlagPlace,
  FlagRemove,
  Chord,
  MineHit,
}

/// One tile's observable state, used both for single-tile and batched
/// updates. `is_mine`/`adjacent_mines` are only populated once a tile is
/// actually revealed — an unrevealed flagged tile never leaks whether it
/// is a mine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileDelta {
  pub x: i32,
  pub y: i32,
  pub revealed: bool,
  pub flagged: bool,
  pub is_mine: Option<bool>,
  pub adjacent_mines: Option<u8>,
}

impl TileDelta {
  pub fn from_cell(cell: &Cell) -> Self {
    TileDelta {
      x: cell.x,
      y: cell.y,
      revealed: cell.revealed,
      flagged: cell.flagged,
      is_mine: Some(cell.is_mine),
      adjacent_mines: Some(cell.adjacent_mines),
    }
  }

  pub fn flag_only(x: i32, y: i32, flagged: bool) -> Self {
    TileDelta { x, y, revealed: false, flagged, is_mine: None, adjacent_mines: None }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineContributor {
  pub player_id: PlayerId,
  pub position: u8,
  pub points: u32,
}

/// Every domain event a [`crate::session::Session`] can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
  TileUpdate { chunk_id: ChunkId, tile: TileDelta },
  TilesUpdate { chunk_id: ChunkId, tiles: Vec<TileDelta> },
  ScoreUpdate { player_id: PlayerId, new_score: u32, delta: i32, reason: ScoreReason },
  PlayerStatusUpdate { player_id: PlayerId, status: PlayerStatus, locked_until_ms: Option<u64> },
  MineRevealed { x: i32, y: i32, contributors: Vec<MineContributor> },
  PlayerJoined { player: PlayerSummary },
  PlayerLeft { player_id: PlayerId },
  GameOver { winner: Option<PlayerId> },
  ChunkData { chunk_id: ChunkId, tiles: Vec<TileDelta> },
}

/// A cloneable handle to one connection's outbound queue. A disconnected
/// receiver is not a panic: the action that produced the event must never
/// fail just because one recipient went away mid-dispatch.
#[derive(Clone)]
pub struct ConnSender {
  conn_id: ConnId,
  tx: crossbeam_channel::Sender<ServerEvent>,
}

impl ConnSender {
  pub fn new(conn_id: ConnId, tx: crossbeam_channel::Sender<ServerEvent>) -> Self {
    ConnSender { conn_id, tx }
  }

  pub fn conn_id(&self) -> ConnId { self.conn_id }

  pub fn send(&self, event: ServerEvent) {
    if self.tx.send(event).is_err() {
      debug!("dropping event for disconnected connection {}", self.conn_id);
    }
  }
}

/// Resolves and dispatches events to the connections that should receive
/// them. A [`crate::session::Session`] owns one of these for its players;
/// the [`crate::subscription::SubscriptionRouter`] supplies chunk
/// recipient sets.
#[derive(Default)]
pub struct UpdateBus {
  recipients: std::collections::HashMap<ConnId, ConnSender>,
}

impl UpdateBus {
  pub fn new() -> Self { UpdateBus { recipients: std::collections::HashMap::new() } }

  pub fn register(&mut self, sender: ConnSender) { self.recipients.insert(sender.conn_id(), sender); }

  pub fn remove(&mut self, conn_id: ConnId) { self.recipients.remove(&conn_id); }

  pub fn send_to(&self, conn_id: ConnId, event: ServerEvent) {
    if let Some(sender) = self.recipients.get(&conn_id) {
      sender.send(event);
    }
  }

  pub fn broadcast(&self, conn_ids: &[ConnId], event: ServerEvent) {
    for conn_id in conn_ids {
      self.send_to(*conn_id, event.clone());
    }
  }

  /// A read-only view of the currently registered recipients, used by
  /// [`crate::session::Session`] to resolve conn ids into live senders
  /// while its lease is held, before dispatching after the lease is
  /// released.
  pub fn recipients_snapshot(&self) -> &std::collections::HashMap<ConnId, ConnSender> { &self.recipients }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn send_to_disconnected_recipient_is_silently_dropped() {
    let mut bus = UpdateBus::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let conn_id = Uuid::new_v4();
    bus.register(ConnSender::new(conn_id, tx));
    drop(rx);
    bus.send_to(conn_id, ServerEvent::PlayerLeft { player_id: conn_id });
  }

  #[test]
  fn broadcast_reaches_every_listed_recipient() {
    let mut bus = UpdateBus::new();
    let mut ids = Vec::new();
    let mut receivers = Vec::new();
    for _ in 0..3 {
      let (tx, rx) = crossbeam_channel::unbounded();
      let conn_id = Uuid::new_v4();
      bus.register(ConnSender::new(conn_id, tx));
      ids.push(conn_id);
      receivers.push(rx);
    }
    bus.broadcast(&ids, ServerEvent::GameOver { winner: None });
    for rx in receivers {
      assert!(matches!(rx.try_recv(), Ok(ServerEvent::GameOver { winner: None })));
    }
  }
}

//! Saves/loads session metadata and per-chunk sparse overlays. A
//! plain trait contract, plus two reference implementations: an in-memory
//! store used by tests and by the CLI's default run mode, and an
//! opt-in file-backed store for exercising a restart without wiring in an
//! external database driver.

use crate::error::{PersistenceError, Result};
use crate::session::registry::SessionSnapshot;
use crate::world::PointOverlay;
use parking_lot::RwLock;
use std::collections::HashMap;
use sweeper_common::math::{ChunkId, LocalCoord};

pub type ChunkOverlay = Vec<(LocalCoord, PointOverlay)>;

/// Best-effort durable storage for session and chunk state. The
/// core treats every failure here as transient: it logs and surfaces a
/// `TransientIO` error, but never corrupts in-memory state over it.
pub trait PersistenceGateway: Send + Sync {
  fn save_session(&self, snapshot: &SessionSnapshot) -> Result<()>;
  fn load_session(&self, game_id: &str) -> Result<Option<SessionSnapshot>>;
  fn save_chunk(&self, game_id: &str, chunk_id: ChunkId, overlay: ChunkOverlay) -> Result<()>;
  fn load_chunk(&self, game_id: &str, chunk_id: ChunkId) -> Result<Option<ChunkOverlay>>;
}

/// An in-process store guarded by a single [`parking_lot::RwLock`] per
/// table. The default gateway for the CLI entry point and for tests: it
/// never touches disk, so nothing survives a restart, but it round-trips
/// exactly.
#[derive(Default)]
pub struct InMemoryGateway {
  sessions: RwLock<HashMap<String, SessionSnapshot>>,
  chunks: RwLock<HashMap<(String, ChunkId), ChunkOverlay>>,
}

impl InMemoryGateway {
  pub fn new() -> Self { InMemoryGateway::default() }
}

impl PersistenceGateway for InMemoryGateway {
  fn save_session(&self, snapshot: &SessionSnapshot) -> Result<()> {
    self.sessions.write().insert(snapshot.game_id.clone(), snapshot.clone());
    Ok(())
  }

  fn load_session(&self, game_id: &str) -> Result<Option<SessionSnapshot>> {
    Ok(self.sessions.read().get(game_id).cloned())
  }

  fn save_chunk(&self, game_id: &str, chunk_id: ChunkId, overlay: ChunkOverlay) -> Result<()> {
    self.chunks.write().insert((game_id.to_string(), chunk_id), overlay);
    Ok(())
  }

  fn load_chunk(&self, game_id: &str, chunk_id: ChunkId) -> Result<Option<ChunkOverlay>> {
    Ok(self.chunks.read().get(&(game_id.to_string(), chunk_id)).cloned())
  }
}

/// Persists each session/chunk document as its own JSON file under
/// `data_dir`: `sessions/<gameId>.json` and
/// `chunks/<gameId>/<cx>_<cy>.json`. Gated behind the `file-persistence`
/// feature since it is reference/test scaffolding, not a production
/// driver.
#[cfg(feature = "file-persistence")]
pub struct FileGateway {
  data_dir: std::path::PathBuf,
}

#[cfg(feature = "file-persistence")]
impl FileGateway {
  pub fn new(data_dir: impl Into<std::path::PathBuf>) -> Self { FileGateway { data_dir: data_dir.into() } }

  fn session_path(&self, game_id: &str) -> std::path::PathBuf {
    self.data_dir.join("sessions").join(format!("{game_id}.json"))
  }

  fn chunk_path(&self, game_id: &str, chunk_id: ChunkId) -> std::path::PathBuf {
    self.data_dir.join("chunks").join(game_id).join(format!("{}_{}.json", chunk_id.cx(), chunk_id.cy()))
  }
}

#[cfg(feature = "file-persistence")]
impl PersistenceGateway for FileGateway {
  fn save_session(&self, snapshot: &SessionSnapshot) -> Result<()> {
    let path = self.session_path(&snapshot.game_id);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(PersistenceError::from)?;
    }
    let file = std::fs::File::create(path).map_err(PersistenceError::from)?;
    serde_json::to_writer(file, snapshot).map_err(PersistenceError::from)?;
    Ok(())
  }

  fn load_session(&self, game_id: &str) -> Result<Option<SessionSnapshot>> {
    let path = self.session_path(game_id);
    if !path.exists() {
      return Ok(None);
    }
    let file = std::fs::File::open(path).map_err(PersistenceError::from)?;
    let snapshot = serde_json::from_reader(file).map_err(PersistenceError::from)?;
    Ok(Some(snapshot))
  }

  fn save_chunk(&self, game_id: &str, chunk_id: ChunkId, overlay: ChunkOverlay) -> Result<()> {
    let path = self.chunk_path(game_id, chunk_id);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(PersistenceError::from)?;
    }
    let file = std::fs::File::create(path).map_err(PersistenceError::from)?;
    serde_json::to_writer(file, &overlay).map_err(PersistenceError::from)?;
    Ok(())
  }

  fn load_chunk(&self, game_id: &str, chunk_id: ChunkId) -> Result<Option<ChunkOverlay>> {
    let path = self.chunk_path(game_id, chunk_id);
    if !path.exists() {
      return Ok(None);
    }
    let file = std::fs::File::open(path).map_err(PersistenceError::from)?;
    let overlay = serde_json::from_reader(file).map_err(PersistenceError::from)?;
    Ok(Some(overlay))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{BoardConfig, ScoringConfig};
  use pretty_assertions::assert_eq;

  fn sample_snapshot() -> SessionSnapshot {
    SessionSnapshot {
      game_id: "g1".into(),
      board_config: BoardConfig::default(),
      scoring_config: ScoringConfig::default(),
      players: vec![],
      mine_reveals: vec![],
      game_over: false,
      winner: None,
      updated_at_ms: 0,
    }
  }

  #[test]
  fn in_memory_gateway_round_trips_a_session() {
    let gateway = InMemoryGateway::new();
    gateway.save_session(&sample_snapshot()).unwrap();
    let loaded = gateway.load_session("g1").unwrap().unwrap();
    assert_eq!(loaded.game_id, "g1");
  }

  #[test]
  fn in_memory_gateway_reports_unknown_session_as_none() {
    let gateway = InMemoryGateway::new();
    assert!(gateway.load_session("missing").unwrap().is_none());
  }

  #[test]
  fn in_memory_gateway_round_trips_a_chunk_overlay() {
    let gateway = InMemoryGateway::new();
    let overlay = vec![(LocalCoord::new(1, 2), PointOverlay { revealed: true, flagged: false })];
    gateway.save_chunk("g1", ChunkId::new(0, 0), overlay.clone()).unwrap();
    let loaded = gateway.load_chunk("g1", ChunkId::new(0, 0)).unwrap().unwrap();
    assert_eq!(loaded, overlay);
  }

  #[cfg(feature = "file-persistence")]
  #[test]
  fn file_gateway_round_trips_a_session_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = FileGateway::new(dir.path());
    gateway.save_session(&sample_snapshot()).unwrap();
    let reopened = FileGateway::new(dir.path());
    let loaded = reopened.load_session("g1").unwrap().unwrap();
    assert_eq!(loaded.game_id, "g1");
  }
}

//! Owns every chunk for one session; routes flood-fill seeds across chunk
//! boundaries and holds seeds back for chunks nobody is watching yet
//!. This is the back-pressure mechanism: unobserved space is
//! generated lazily, on first subscription.

use super::{Cell, Chunk, PointOverlay, WorldGenerator};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use sweeper_common::math::{ChunkId, Coordinate, LocalCoord};

/// What [`ChunkManager::reveal_and_propagate`] produced: the cells revealed
/// in the chunk the intent originated in (for the caller to score), and
/// any other chunks that ended up revealing cells as the flood drained
/// into already-subscribed neighbours.
pub struct RevealOutcome {
  pub origin_chunk: ChunkId,
  pub origin_cells: Vec<Cell>,
  pub other_chunks: Vec<(ChunkId, Vec<Cell>)>,
}

pub struct ChunkManager {
  size: i32,
  chunks: HashMap<ChunkId, Chunk>,
  pending: HashMap<ChunkId, HashSet<LocalCoord>>,
  generator: Arc<WorldGenerator>,
}

impl ChunkManager {
  pub fn new(size: i32, generator: Arc<WorldGenerator>) -> Self {
    ChunkManager { size, chunks: HashMap::new(), pending: HashMap::new(), generator }
  }

  pub fn size(&self) -> i32 { self.size }

  pub fn get_or_create(&mut self, id: ChunkId) -> &mut Chunk {
    self.chunks.entry(id).or_insert_with(|| Chunk::new(id, self.size))
  }

  pub fn get(&self, id: ChunkId) -> Option<&Chunk> { self.chunks.get(&id) }

  /// Restores a chunk loaded from persistence. Overwrites anything
  /// already loaded for this id, since this is only ever called before a
  /// chunk has any subscribers or pending seeds of its own.
  pub fn restore(&mut self, id: ChunkId, entries: Vec<(LocalCoord, PointOverlay)>) {
    self.chunks.insert(id, Chunk::from_overlay(id, self.size, entries));
  }

  pub fn cell_overlay(&self, coordinate: Coordinate) -> PointOverlay {
    let (chunk_id, local) = coordinate.to_chunk(self.size);
    self.chunks.get(&chunk_id).map(|c| c.get(local)).unwrap_or_default()
  }

  pub fn set_cell_overlay(&mut self, coordinate: Coordinate, overlay: PointOverlay) {
    let (chunk_id, local) = coordinate.to_chunk(self.size);
    self.get_or_create(chunk_id).set(local, overlay);
  }

  pub fn is_mine(&self, x: i32, y: i32) -> bool { self.generator.is_mine(x, y) }

  pub fn adjacent_count(&self, x: i32, y: i32) -> u8 { self.generator.adjacent_count(x, y) }

  pub fn has_subscribers(&self, id: ChunkId) -> bool {
    self.chunks.get(&id).map(|c| c.has_subscribers()).unwrap_or(false)
  }

  pub fn subscribe(&mut self, id: ChunkId) { self.get_or_create(id).add_subscriber(); }

  pub fn unsubscribe(&mut self, id: ChunkId) {
    if let Some(chunk) = self.chunks.get_mut(&id) {
      chunk.remove_subscriber();
    }
  }

  fn merge_crossings(&mut self, crossings: HashMap<ChunkId, Vec<LocalCoord>>) {
    for (id, locals) in crossings {
      self.pending.entry(id).or_default().extend(locals);
    }
  }

  /// Runs flood-fill starting at `(gx, gy)`, then drains every seed that
  /// lands in an already-subscribed chunk to fixpoint. Seeds that land in
  /// a chunk nobody watches stay in `pending` for a later subscription to
  /// drain.
  pub fn reveal_and_propagate(&mut self, gx: i32, gy: i32) -> RevealOutcome {
    let coordinate = Coordinate::new(gx, gy);
    let (origin_chunk, local) = coordinate.to_chunk(self.size);
    self.get_or_create(origin_chunk);

    let mut visited = HashSet::new();
    let result = {
      let chunk = self.chunks.get_mut(&origin_chunk).unwrap();
      chunk.local_flood_fill(local, &mut visited, &self.generator)
    };
    let origin_cells = result.revealed;
    self.merge_crossings(result.crossings);

    let other_chunks = self.drain_subscribed_pending(&mut visited);
    RevealOutcome { origin_chunk, origin_cells, other_chunks }
  }

  /// Processes every seed queued for `id`, sharing `visited` with whatever
  /// propagation is already in progress. Returns the cells this chunk
  /// revealed; any further crossings are merged back into `pending`.
  pub fn process_pending(&mut self, id: ChunkId, visited: &mut HashSet<Coordinate>) -> Vec<Cell> {
    let Some(seeds) = self.pending.remove(&id) else { return Vec::new() };
    if seeds.is_empty() {
      return Vec::new();
    }
    self.get_or_create(id);
    let chunk = self.chunks.get_mut(&id).unwrap();
    let mut revealed = Vec::new();
    let mut new_crossings: HashMap<ChunkId, Vec<LocalCoord>> = HashMap::new();
    for seed in seeds {
      let result = chunk.local_flood_fill(seed, visited, &self.generator);
      revealed.extend(result.revealed);
      for (target, locals) in result.crossings {
        new_crossings.entry(target).or_default().extend(locals);
      }
    }
    self.merge_crossings(new_crossings);
    revealed
  }

  /// Repeatedly drains any chunk that (a) has pending seeds and (b) has at
  /// least one subscriber, until no such chunk remains. Draining one
  /// chunk can add fresh pending seeds to another chunk that is already
  /// subscribed, which must then also be drained, so this loops to a
  /// fixpoint rather than doing a single pass.
  fn drain_subscribed_pending(
    &mut self,
    visited: &mut HashSet<Coordinate>,
  ) -> Vec<(ChunkId, Vec<Cell>)> {
    let mut out = Vec::new();
    loop {
      let next = self
        .pending
        .iter()
        .find(|(id, seeds)| !seeds.is_empty() && self.has_subscribers(**id))
        .map(|(id, _)| *id);
      let Some(id) = next else { break };
      let cells = self.process_pending(id, visited);
      if !cells.is_empty() {
        out.push((id, cells));
      }
    }
    out
  }

  /// Called when a connection newly subscribes to `id`: drains any seeds
  /// already waiting for it (and any chain reaction into other
  /// already-subscribed chunks) to fixpoint, so the subscriber's initial
  /// snapshot is never stale relative to what it's about to receive as
  /// deltas.
  pub fn drain_on_subscribe(&mut self, id: ChunkId) -> Vec<(ChunkId, Vec<Cell>)> {
    let _ = id; // the chunk itself is picked up by drain_subscribed_pending via has_subscribers
    let mut visited = HashSet::new();
    self.drain_subscribed_pending(&mut visited)
  }

  pub fn pending_chunk_ids(&self) -> Vec<ChunkId> {
    self.pending.iter().filter(|(_, s)| !s.is_empty()).map(|(id, _)| *id).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BoardConfig;

  fn manager(game_id: &str, threshold: f64) -> ChunkManager {
    let board = BoardConfig { mine_threshold: threshold, ..Default::default() };
    let generator = Arc::new(WorldGenerator::new(game_id, &board));
    ChunkManager::new(board.chunk_size, generator)
  }

  #[test]
  fn reveal_without_subscribers_leaves_crossings_pending() {
    let mut mgr = manager("pending-test", 1.0); // no mines anywhere
    let outcome = mgr.reveal_and_propagate(15, 5);
    assert_eq!(outcome.origin_chunk, ChunkId::new(0, 0));
    assert!(!outcome.origin_cells.is_empty());
    // Nobody subscribes to chunk (1,0), so it should have pending seeds
    // and zero other_chunks reported this call.
    assert!(mgr.pending_chunk_ids().contains(&ChunkId::new(1, 0)));
  }

  #[test]
  fn subscribing_later_drains_pending_seeds() {
    let mut mgr = manager("drain-test", 1.0);
    mgr.reveal_and_propagate(15, 5);
    assert!(mgr.pending_chunk_ids().contains(&ChunkId::new(1, 0)));

    mgr.subscribe(ChunkId::new(1, 0));
    let drained = mgr.drain_on_subscribe(ChunkId::new(1, 0));
    assert!(drained.iter().any(|(id, cells)| *id == ChunkId::new(1, 0) && !cells.is_empty()));
    assert!(!mgr.pending_chunk_ids().contains(&ChunkId::new(1, 0)));
  }

  #[test]
  fn reveal_propagates_immediately_into_already_subscribed_neighbour() {
    let mut mgr = manager("subscribed-test", 1.0);
    mgr.subscribe(ChunkId::new(1, 0));
    let outcome = mgr.reveal_and_propagate(15, 5);
    assert!(outcome.other_chunks.iter().any(|(id, cells)| *id == ChunkId::new(1, 0) && !cells.is_empty()));
  }

  #[test]
  fn a_revealed_cell_stays_revealed_on_a_second_identical_reveal() {
    let mut mgr = manager("idempotent-reveal", 1.0);
    let first = mgr.reveal_and_propagate(5, 5);
    assert!(!first.origin_cells.is_empty());
    let second = mgr.reveal_and_propagate(5, 5);
    assert!(second.origin_cells.is_empty());
  }
}

//! Tracks which connection is subscribed to which chunks, and resolves a
//! viewport change into the subscribe/unsubscribe sets that drives.

use crate::events::ConnId;
use crate::session::player::ChunkViewport;
use std::collections::{HashMap, HashSet};
use sweeper_common::math::ChunkId;

#[derive(Default)]
pub struct SubscriptionRouter {
  subs: HashMap<ConnId, HashSet<ChunkId>>,
  by_chunk: HashMap<ChunkId, HashSet<ConnId>>,
}

impl SubscriptionRouter {
  pub fn new() -> Self { SubscriptionRouter::default() }

  pub fn subscribers_of(&self, chunk_id: ChunkId) -> Vec<ConnId> {
    self.by_chunk.get(&chunk_id).map(|s| s.iter().copied().collect()).unwrap_or_default()
  }

  /// Adds `conn_id` as a subscriber of `chunk_id`. Returns `true` if this
  /// is a newly-established subscription (the caller must then drain the
  /// chunk's pending fills and send an initial `chunkData` snapshot).
  pub fn subscribe(&mut self, conn_id: ConnId, chunk_id: ChunkId) -> bool {
    let newly_chunk = self.subs.entry(conn_id).or_default().insert(chunk_id);
    self.by_chunk.entry(chunk_id).or_default().insert(conn_id);
    newly_chunk
  }

  /// Removes `conn_id` from `chunk_id`'s subscribers. Returns `true` if
  /// the chunk now has no subscribers left.
  pub fn unsubscribe(&mut self, conn_id: ConnId, chunk_id: ChunkId) -> bool {
    if let Some(set) = self.subs.get_mut(&conn_id) {
      set.remove(&chunk_id);
      if set.is_empty() {
        self.subs.remove(&conn_id);
      }
    }
    if let Some(set) = self.by_chunk.get_mut(&chunk_id) {
      set.remove(&conn_id);
      let now_empty = set.is_empty();
      if now_empty {
        self.by_chunk.remove(&chunk_id);
      }
      now_empty
    } else {
      true
    }
  }

  pub fn remove_all(&mut self, conn_id: ConnId) -> Vec<ChunkId> {
    let Some(chunks) = self.subs.remove(&conn_id) else { return Vec::new() };
    for chunk_id in &chunks {
      if let Some(set) = self.by_chunk.get_mut(chunk_id) {
        set.remove(&conn_id);
        if set.is_empty() {
          self.by_chunk.remove(chunk_id);
        }
      }
    }
    chunks.into_iter().collect()
  }

  /// Resolves a viewport transition into the chunks newly entering and
  /// leaving cover, by intersecting the previous and current rectangles
  /// in chunk space.
  pub fn resolve_viewport_change(
    previous: Option<ChunkViewport>,
    current: ChunkViewport,
  ) -> (Vec<ChunkId>, Vec<ChunkId>) {
    let current_set: HashSet<ChunkId> = current.chunk_ids().into_iter().collect();
    let previous_set: HashSet<ChunkId> = previous.map(|v| v.chunk_ids().into_iter().collect()).unwrap_or_default();

    let to_subscribe = current_set.difference(&previous_set).copied().collect();
    let to_unsubscribe = previous_set.difference(&current_set).copied().collect();
    (to_subscribe, to_unsubscribe)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  #[test]
  fn second_subscription_to_same_chunk_is_not_new() {
    let mut router = SubscriptionRouter::new();
    let conn = Uuid::new_v4();
    let chunk = ChunkId::new(0, 0);
    assert!(router.subscribe(conn, chunk));
    assert!(!router.subscribe(conn, chunk));
  }

  #[test]
  fn unsubscribe_reports_when_chunk_becomes_empty() {
    let mut router = SubscriptionRouter::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let chunk = ChunkId::new(2, 2);
    router.subscribe(a, chunk);
    router.subscribe(b, chunk);
    assert!(!router.unsubscribe(a, chunk));
    assert!(router.unsubscribe(b, chunk));
  }

  #[test]
  fn viewport_change_only_touches_the_difference() {
    let previous = ChunkViewport { min: ChunkId::new(0, 0), max: ChunkId::new(1, 1) };
    let current = ChunkViewport { min: ChunkId::new(1, 0), max: ChunkId::new(2, 1) };
    let (sub, unsub) = SubscriptionRouter::resolve_viewport_change(Some(previous), current);
    assert!(sub.contains(&ChunkId::new(2, 0)));
    assert!(sub.contains(&ChunkId::new(2, 1)));
    assert!(unsub.contains(&ChunkId::new(0, 0)));
    assert!(unsub.contains(&ChunkId::new(0, 1)));
    assert!(!sub.contains(&ChunkId::new(1, 0)));
    assert!(!unsub.contains(&ChunkId::new(1, 0)));
  }

  #[test]
  fn remove_all_clears_every_chunk_for_a_connection() {
    let mut router = SubscriptionRouter::new();
    let conn = Uuid::new_v4();
    router.subscribe(conn, ChunkId::new(0, 0));
    router.subscribe(conn, ChunkId::new(1, 0));
    let removed = router.remove_all(conn);
    assert_eq!(removed.len(), 2);
    assert!(router.subscribers_of(ChunkId::new(0, 0)).is_empty());
  }
}

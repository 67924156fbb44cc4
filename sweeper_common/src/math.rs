//! Coordinate math for the infinite board: global [`Coordinate`]s, the
//! [`ChunkId`] they fall into, and the local coordinate within that chunk.

use serde::{Deserialize, Serialize};
use std::{
  fmt,
  ops::{Add, Sub},
};

/// The default chunk side length. Chunks are square.
pub const DEFAULT_CHUNK_SIZE: i32 = 16;

/// A signed position on the infinite board.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
  x: i32,
  y: i32,
}

impl Coordinate {
  #[inline(always)]
  pub const fn new(x: i32, y: i32) -> Self { Coordinate { x, y } }
  #[inline(always)]
  pub const fn x(&self) -> i32 { self.x }
  #[inline(always)]
  pub const fn y(&self) -> i32 { self.y }

  /// Returns the chunk this coordinate falls into, along with the local
  /// coordinate within that chunk, for the given chunk side length.
  #[inline]
  pub fn to_chunk(self, size: i32) -> (ChunkId, LocalCoord) {
    let cx = self.x.div_euclid(size);
    let cy = self.y.div_euclid(size);
    let lx = (self.x - size * cx) as u8;
    let ly = (self.y - size * cy) as u8;
    (ChunkId::new(cx, cy), LocalCoord::new(lx, ly))
  }

  /// Returns the 8 Moore neighbours of this coordinate, in a fixed order.
  /// The order matters for nothing observable, but is kept stable so tests
  /// can assert on it.
  #[inline]
  pub fn neighbours(self) -> [Coordinate; 8] {
    [
      Coordinate::new(self.x - 1, self.y - 1),
      Coordinate::new(self.x, self.y - 1),
      Coordinate::new(self.x + 1, self.y - 1),
      Coordinate::new(self.x - 1, self.y),
      Coordinate::new(self.x + 1, self.y),
      Coordinate::new(self.x - 1, self.y + 1),
      Coordinate::new(self.x, self.y + 1),
      Coordinate::new(self.x + 1, self.y + 1),
    ]
  }
}

impl fmt::Display for Coordinate {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "({}, {})", self.x, self.y) }
}

impl Add for Coordinate {
  type Output = Self;
  fn add(self, other: Self) -> Self { Coordinate::new(self.x + other.x, self.y + other.y) }
}

impl Sub for Coordinate {
  type Output = Self;
  fn sub(self, other: Self) -> Self { Coordinate::new(self.x - other.x, self.y - other.y) }
}

/// Identifies one chunk: `(cx, cy) = (floor(x / S), floor(y / S))`.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkId {
  cx: i32,
  cy: i32,
}

impl ChunkId {
  #[inline(always)]
  pub const fn new(cx: i32, cy: i32) -> Self { ChunkId { cx, cy } }
  #[inline(always)]
  pub const fn cx(&self) -> i32 { self.cx }
  #[inline(always)]
  pub const fn cy(&self) -> i32 { self.cy }

  /// Returns the global coordinate of local `(lx, ly)` within this chunk.
  #[inline]
  pub fn to_global(&self, local: LocalCoord, size: i32) -> Coordinate {
    Coordinate::new(self.cx * size + local.x() as i32, self.cy * size + local.y() as i32)
  }

  /// Returns the chunk adjacent to this one in the given direction, offset
  /// by one chunk. Used when a flood-fill seed crosses a chunk boundary.
  #[inline]
  pub fn offset(&self, dcx: i32, dcy: i32) -> Self { ChunkId::new(self.cx + dcx, self.cy + dcy) }
}

impl fmt::Display for ChunkId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "ChunkId({}, {})", self.cx, self.cy)
  }
}

/// A coordinate local to one chunk, always in `[0, S)`.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCoord {
  x: u8,
  y: u8,
}

impl LocalCoord {
  #[inline(always)]
  pub const fn new(x: u8, y: u8) -> Self { LocalCoord { x, y } }
  #[inline(always)]
  pub const fn x(&self) -> u8 { self.x }
  #[inline(always)]
  pub const fn y(&self) -> u8 { self.y }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chunk_conversion_is_well_defined_for_negative_globals() {
    let (chunk, local) = Coordinate::new(-1, -1).to_chunk(16);
    assert_eq!(chunk, ChunkId::new(-1, -1));
    assert_eq!(local, LocalCoord::new(15, 15));

    let (chunk, local) = Coordinate::new(-16, 0).to_chunk(16);
    assert_eq!(chunk, ChunkId::new(-1, 0));
    assert_eq!(local, LocalCoord::new(0, 0));
  }

  #[test]
  fn chunk_round_trips_through_global() {
    let size = 16;
    let original = Coordinate::new(-33, 47);
    let (chunk, local) = original.to_chunk(size);
    assert_eq!(chunk.to_global(local, size), original);
  }

  #[test]
  fn neighbours_are_eight_distinct_adjacent_cells() {
    let c = Coordinate::new(5, 5);
    let n = c.neighbours();
    assert_eq!(n.len(), 8);
    for neighbour in n {
      let dx = (neighbour.x() - c.x()).abs();
      let dy = (neighbour.y() - c.y()).abs();
      assert!(dx <= 1 && dy <= 1 && (dx, dy) != (0, 0));
    }
  }
}

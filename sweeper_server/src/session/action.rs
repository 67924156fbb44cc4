//! Validates and executes reveal / flag / chord intents against a locked
//! session, and computes the score deltas each produces.

use super::player::PlayerStatus;
use super::{now_ms, Dispatch, SessionState};
use crate::config::ScoringConfig;
use crate::error::{Result, ServerError};
use crate::events::{PlayerId, PlayerStatus as WireStatus, ScoreReason, ServerEvent, TileDelta};
use crate::world::PointOverlay;
use sweeper_common::math::Coordinate;

/// Runs the shared precondition checks every mutating intent starts with
///: session not over, player known, not locked out. Reactivating an
/// expired lockout produces a `playerStatusUpdate` that must be emitted
/// before whatever the intent itself produces (S9).
pub(crate) fn validate(state: &mut SessionState, player_id: PlayerId) -> Result<Vec<Dispatch>> {
  if state.locked || state.game_over {
    return Err(ServerError::GameOver);
  }
  let now = now_ms();
  let reactivated = {
    let player = state.players.get_mut(&player_id).ok_or(ServerError::NotInGame)?;
    if let PlayerStatus::LockedOut { locked_until_ms } = player.status {
      if now < locked_until_ms {
        return Err(ServerError::LockedOut { locked_until_ms });
      }
    }
    player.reactivate_if_expired(now)
  };
  if !reactivated {
    return Ok(Vec::new());
  }
  let recipients = state.session_recipients();
  Ok(vec![Dispatch {
    recipients,
    event: ServerEvent::PlayerStatusUpdate { player_id, status: WireStatus::Active, locked_until_ms: None },
  }])
}

/// Builds the three-event mine-hit sequence shared by `reveal` and
/// `chord`.
fn mine_hit(state: &mut SessionState, scoring: &ScoringConfig, player_id: PlayerId, coordinate: Coordinate, now: u64) -> Vec<Dispatch> {
  state.chunk_manager.set_cell_overlay(coordinate, PointOverlay { revealed: true, flagged: false });
  let adjacent_mines = state.chunk_manager.adjacent_count(coordinate.x(), coordinate.y());
  let (delta, new_score, locked_until_ms) = {
    let player = state.players.get_mut(&player_id).unwrap();
    let delta = player.apply_penalty(scoring.mine_hit_penalty);
    let until = now + scoring.lockout_duration_ms;
    player.lock_out(until);
    (delta, player.score, until)
  };
  let (chunk_id, _) = coordinate.to_chunk(state.chunk_manager.size());
  let session_recipients = state.session_recipients();
  let chunk_recipients = state.chunk_recipients(chunk_id);
  vec![
    Dispatch {
      recipients: session_recipients.clone(),
      event: ServerEvent::ScoreUpdate { player_id, new_score, delta, reason: ScoreReason::MineHit },
    },
    Dispatch {
      recipients: session_recipients,
      event: ServerEvent::PlayerStatusUpdate { player_id, status: WireStatus::LockedOut, locked_until_ms: Some(locked_until_ms) },
    },
    Dispatch {
      recipients: chunk_recipients,
      event: ServerEvent::TileUpdate {
        chunk_id,
        tile: TileDelta { x: coordinate.x(), y: coordinate.y(), revealed: true, flagged: false, is_mine: Some(true), adjacent_mines: Some(adjacent_mines) },
      },
    },
  ]
}

/// Reveal: mine hit, no-op on already-revealed/flagged, or flood-fill with
/// per-chunk `tilesUpdate` broadcasts.
pub(crate) fn reveal(state: &mut SessionState, scoring: &ScoringConfig, player_id: PlayerId, x: i32, y: i32, now: u64) -> Vec<Dispatch> {
  let coordinate = Coordinate::new(x, y);
  let overlay = state.chunk_manager.cell_overlay(coordinate);
  if overlay.revealed || overlay.flagged {
    return Vec::new();
  }
  if state.chunk_manager.is_mine(x, y) {
    return mine_hit(state, scoring, player_id, coordinate, now);
  }

  let outcome = state.chunk_manager.reveal_and_propagate(x, y);
  let mut dispatches = Vec::new();
  award_number_cells(state, player_id, scoring, &outcome.origin_cells, ScoreReason::Reveal, &mut dispatches);
  emit_chunk_deltas(state, outcome.origin_chunk, outcome.origin_cells, outcome.other_chunks, &mut dispatches);
  dispatches
}

/// Flag: toggles the cell's shared overlay bit for display, and
/// separately decides scoring. For a mine, whether this call counts as a
/// correct-flag contribution is gated on `player_id` not already being a
/// contributor of that mine's [`super::MineReveal`] — not on which way the
/// shared overlay bit happened to flip, since a second player's flag can
/// toggle the bit back to `false` while still being their own first
/// correct flag. Every other cell awards flat flag/unflag points off the
/// overlay toggle as before. The second return value is the mine-reveal
/// deadline, when this call just created one (the first correct flag on
/// that mine), for the caller to hand to the [`crate::timer::TimerWheel`].
pub(crate) fn flag(
  state: &mut SessionState,
  scoring: &ScoringConfig,
  player_id: PlayerId,
  x: i32,
  y: i32,
  now: u64,
) -> (Vec<Dispatch>, Option<u64>) {
  let coordinate = Coordinate::new(x, y);
  let overlay = state.chunk_manager.cell_overlay(coordinate);
  if overlay.revealed {
    return (Vec::new(), None);
  }
  let new_flagged = !overlay.flagged;
  state.chunk_manager.set_cell_overlay(coordinate, PointOverlay { revealed: false, flagged: new_flagged });
  let (chunk_id, _) = coordinate.to_chunk(state.chunk_manager.size());
  let mut dispatches = vec![Dispatch {
    recipients: state.chunk_recipients(chunk_id),
    event: ServerEvent::TileUpdate { chunk_id, tile: TileDelta::flag_only(x, y, new_flagged) },
  }];

  let mut reveal_deadline = None;
  let is_mine = state.chunk_manager.is_mine(x, y);
  if is_mine {
    let reveal = state.mine_reveals.entry(coordinate).or_default();
    let contributor = reveal.record_flag(scoring, player_id, now);
    if let Some(contributor) = contributor {
      reveal_deadline = reveal.reveal_at_ms;
      let (delta, new_score) = {
        let player = state.players.get_mut(&player_id).unwrap();
        (player.award(contributor.points), player.score)
      };
      dispatches.push(Dispatch {
        recipients: state.session_recipients(),
        event: ServerEvent::ScoreUpdate { player_id, new_score, delta, reason: ScoreReason::FlagMine },
      });
    }
  } else {
    let points = if new_flagged { scoring.flag_place_points } else { scoring.flag_remove_points };
    if points > 0 {
      let (delta, new_score) = {
        let player = state.players.get_mut(&player_id).unwrap();
        (player.award(points) as i32, player.score)
      };
      let reason = if new_flagged { ScoreReason::FlagPlace } else { ScoreReason::FlagRemove };
      dispatches.push(Dispatch {
        recipients: state.session_recipients(),
        event: ServerEvent::ScoreUpdate { player_id, new_score, delta, reason },
      });
    }
  }
  (dispatches, reveal_deadline)
}

/// Chord: only valid on a revealed, non-mine, non-zero cell whose
/// adjacent flag/revealed-mine count matches `adjacentMines` exactly
///.
pub(crate) fn chord(state: &mut SessionState, scoring: &ScoringConfig, player_id: PlayerId, x: i32, y: i32, now: u64) -> Result<Vec<Dispatch>> {
  let coordinate = Coordinate::new(x, y);
  let overlay = state.chunk_manager.cell_overlay(coordinate);
  if !overlay.revealed {
    return Err(ServerError::InvalidInput("cell is not revealed".into()));
  }
  if state.chunk_manager.is_mine(x, y) {
    return Err(ServerError::InvalidInput("cannot chord a mine".into()));
  }
  let adjacent_mines = state.chunk_manager.adjacent_count(x, y) as u32;
  if adjacent_mines == 0 {
    return Err(ServerError::InvalidInput("cannot chord a zero-adjacency cell".into()));
  }

  let neighbours = coordinate.neighbours();
  let mut satisfied = 0u32;
  for n in neighbours {
    let o = state.chunk_manager.cell_overlay(n);
    if o.flagged {
      satisfied += 1;
    } else if o.revealed && state.chunk_manager.is_mine(n.x(), n.y()) {
      satisfied += 1;
    }
  }
  if satisfied != adjacent_mines {
    return Ok(Vec::new()); // not enough information yet: silent no-op
  }

  let mut dispatches = Vec::new();
  let mut number_cells_total = Vec::new();
  for n in neighbours {
    let o = state.chunk_manager.cell_overlay(n);
    if o.revealed || o.flagged {
      continue;
    }
    if state.chunk_manager.is_mine(n.x(), n.y()) {
      dispatches.extend(mine_hit(state, scoring, player_id, n, now));
      break; // short-circuit remaining neighbours on the first mine hit
    }
    let outcome = state.chunk_manager.reveal_and_propagate(n.x(), n.y());
    number_cells_total.extend(outcome.origin_cells.iter().filter(|c| c.adjacent_mines > 0).copied());
    emit_chunk_deltas(state, outcome.origin_chunk, outcome.origin_cells, outcome.other_chunks, &mut dispatches);
  }

  if !number_cells_total.is_empty() {
    let points = number_cells_total.len() as u32 * scoring.number_reveal_points;
    let (delta, new_score) = {
      let player = state.players.get_mut(&player_id).unwrap();
      (player.award(points) as i32, player.score)
    };
    dispatches.push(Dispatch {
      recipients: state.session_recipients(),
      event: ServerEvent::ScoreUpdate { player_id, new_score, delta, reason: ScoreReason::Chord },
    });
  }
  Ok(dispatches)
}

fn award_number_cells(
  state: &mut SessionState,
  player_id: PlayerId,
  scoring: &ScoringConfig,
  cells: &[crate::world::Cell],
  reason: ScoreReason,
  dispatches: &mut Vec<Dispatch>,
) {
  let number_cells = cells.iter().filter(|c| c.adjacent_mines > 0).count() as u32;
  if number_cells == 0 {
    return;
  }
  let points = number_cells * scoring.number_reveal_points;
  let (delta, new_score) = {
    let player = state.players.get_mut(&player_id).unwrap();
    (player.award(points) as i32, player.score)
  };
  dispatches.push(Dispatch {
    recipients: state.session_recipients(),
    event: ServerEvent::ScoreUpdate { player_id, new_score, delta, reason },
  });
}

fn emit_chunk_deltas(
  state: &SessionState,
  origin_chunk: sweeper_common::math::ChunkId,
  origin_cells: Vec<crate::world::Cell>,
  other_chunks: Vec<(sweeper_common::math::ChunkId, Vec<crate::world::Cell>)>,
  dispatches: &mut Vec<Dispatch>,
) {
  if !origin_cells.is_empty() {
    let tiles = origin_cells.iter().map(TileDelta::from_cell).collect();
    dispatches.push(Dispatch {
      recipients: state.chunk_recipients(origin_chunk),
      event: ServerEvent::TilesUpdate { chunk_id: origin_chunk, tiles },
    });
  }
  for (chunk_id, cells) in other_chunks {
    if cells.is_empty() {
      continue;
    }
    let tiles = cells.iter().map(TileDelta::from_cell).collect();
    dispatches.push(Dispatch { recipients: state.chunk_recipients(chunk_id), event: ServerEvent::TilesUpdate { chunk_id, tiles } });
  }
}

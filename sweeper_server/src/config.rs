//! Typed configuration structs. `ScoringConfig` and `BoardConfig`
//! travel with a [`crate::session::Session`] so that a session created with
//! overrides stays reproducible from its persisted snapshot; `ServerConfig`
//! is process-wide and loaded once at startup via
//! [`sweeper_common::config::load_layered`].

use serde::{Deserialize, Serialize};

/// Environment knobs for one session's board (mine density, cache caps).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
  pub chunk_size: i32,
  pub mine_threshold: f64,
  pub mine_cache_cap: usize,
  pub count_cache_cap: usize,
}

impl Default for BoardConfig {
  fn default() -> Self {
    BoardConfig { chunk_size: 16, mine_threshold: 0.85, mine_cache_cap: 10_000, count_cache_cap: 5_000 }
  }
}

/// Points and timings that drive scoring, lockout, and the delayed
/// mine-reveal state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
  pub first_place_points: u32,
  pub second_place_points: u32,
  pub third_place_points: u32,
  pub number_reveal_points: u32,
  pub mine_hit_penalty: u32,
  pub lockout_duration_ms: u64,
  pub mine_reveal_delay_ms: u64,
  pub flag_place_points: u32,
  pub flag_remove_points: u32,
}

impl Default for ScoringConfig {
  fn default() -> Self {
    ScoringConfig {
      first_place_points: 5,
      second_place_points: 3,
      third_place_points: 1,
      number_reveal_points: 1,
      mine_hit_penalty: 10,
      lockout_duration_ms: 5_000,
      mine_reveal_delay_ms: 3_000,
      flag_place_points: 2,
      flag_remove_points: 0,
    }
  }
}

impl ScoringConfig {
  /// Points awarded to the contributor at 1-based `position` in a mine's
  /// contributor list. Position 4 and beyond earn nothing, but are still
  /// recorded.
  pub fn place_points(&self, position: usize) -> u32 {
    match position {
      1 => self.first_place_points,
      2 => self.second_place_points,
      3 => self.third_place_points,
      _ => 0,
    }
  }
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub log_level: String,
  pub timer_tick_ms: u64,
  pub bind_address: String,
  pub data_dir: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    ServerConfig {
      log_level: "info".into(),
      timer_tick_ms: 1_000,
      bind_address: "0.0.0.0:25566".into(),
      data_dir: "data".into(),
    }
  }
}

/// The embedded default configuration, written to disk for reference
/// alongside any on-disk override, the way a first-run server leaves a
/// `server-default.toml` next to the one an operator actually edits.
pub const DEFAULT_SERVER_TOML: &str = include_str!("default.toml");

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_default_parses_as_server_config() {
    let cfg: ServerConfig = toml::from_str(DEFAULT_SERVER_TOML).unwrap();
    assert_eq!(cfg, ServerConfig::default());
  }

  #[test]
  fn place_points_are_zero_past_third() {
    let cfg = ScoringConfig::default();
    assert_eq!(cfg.place_points(1), 5);
    assert_eq!(cfg.place_points(2), 3);
    assert_eq!(cfg.place_points(3), 1);
    assert_eq!(cfg.place_points(4), 0);
    assert_eq!(cfg.place_points(100), 0);
  }
}

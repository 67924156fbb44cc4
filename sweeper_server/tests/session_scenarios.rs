//! End-to-end scenarios driving the public `GameServer` facade the way an
//! external transport adapter would: create/join a game, push intents,
//! drain the per-connection outbound channel. Complements the
//! component-level `#[cfg(test)]` suites colocated with each module; this
//! file only exercises the seam a transport actually binds to.

use std::sync::Arc;

use sweeper_server::config::BoardConfig;
use sweeper_server::events::{ConnSender, PlayerStatus as WireStatus, ScoreReason, ServerEvent};
use sweeper_server::persistence::InMemoryGateway;
use sweeper_server::server::ScoringConfigOverrides;
use sweeper_server::GameServer;
use sweeper_server::world::WorldGenerator;
use uuid::Uuid;

fn server() -> GameServer {
  GameServer::new(50, Arc::new(InMemoryGateway::new()), None)
}

fn connect() -> (ConnSender, crossbeam_channel::Receiver<ServerEvent>) {
  let (tx, rx) = crossbeam_channel::unbounded();
  (ConnSender::new(Uuid::new_v4(), tx), rx)
}

fn drain<T>(rx: &crossbeam_channel::Receiver<T>) -> Vec<T> {
  std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn find_mine(gen: &WorldGenerator, bound: i32) -> (i32, i32) {
  for y in -bound..bound {
    for x in -bound..bound {
      if gen.is_mine(x, y) {
        return (x, y);
      }
    }
  }
  panic!("no mine found in scan range");
}

/// Two connections join the same game id through `GameServer`, and a
/// reveal by one is visible as a score update on its own channel.
#[test]
fn create_join_and_reveal_flow_through_the_game_server_facade() {
  let server = server();
  let board = BoardConfig::default();
  let gen = WorldGenerator::new("e2e-reveal", &board);
  let (x, y) = {
    let mut found = None;
    'search: for yy in -100..100 {
      for xx in -100..100 {
        if !gen.is_mine(xx, yy) && gen.adjacent_count(xx, yy) > 0 {
          found = Some((xx, yy));
          break 'search;
        }
      }
    }
    found.expect("a non-mine cell with a nonzero adjacent count")
  };

  let (host_sender, host_rx) = connect();
  let created = server
    .create_game("e2e-reveal".into(), board, ScoringConfigOverrides::default(), host_sender.conn_id(), Some("host".into()), host_sender)
    .unwrap();

  let (guest_sender, _guest_rx) = connect();
  let joined = server.join_game("e2e-reveal".into(), guest_sender.conn_id(), Some("guest".into()), guest_sender).unwrap();
  assert_eq!(joined.players.len(), 2);
  drain(&host_rx);

  server.reveal_tile("e2e-reveal", created.player_id, x, y).unwrap();
  let events = drain(&host_rx);
  assert!(events.iter().any(|e| matches!(e, ServerEvent::ScoreUpdate { reason: ScoreReason::Reveal, .. })));
}

/// Hitting a mine through the facade locks the acting player out, visible
/// to every connection in the session.
#[test]
fn mine_hit_through_the_facade_locks_the_player_out() {
  let server = server();
  let board = BoardConfig::default();
  let gen = WorldGenerator::new("e2e-mine-hit", &board);
  let (x, y) = find_mine(&gen, 100);

  let (sender, rx) = connect();
  let created = server
    .create_game("e2e-mine-hit".into(), board, ScoringConfigOverrides::default(), sender.conn_id(), Some("host".into()), sender)
    .unwrap();
  drain(&rx);

  server.reveal_tile("e2e-mine-hit", created.player_id, x, y).unwrap();
  let events = drain(&rx);
  assert!(events.iter().any(|e| matches!(e, ServerEvent::PlayerStatusUpdate { status: WireStatus::LockedOut, .. })));

  let err = server.reveal_tile("e2e-mine-hit", created.player_id, x + 50, y + 50).unwrap_err();
  assert_eq!(err.kind(), sweeper_server::ErrorKind::LockedOut);
}

/// Per-field scoring overrides supplied to `createGame` really do change
/// in-game scoring.
#[test]
fn scoring_overrides_supplied_at_create_time_change_reveal_payout() {
  let server = server();
  let board = BoardConfig::default();
  let gen = WorldGenerator::new("e2e-overrides", &board);
  let (x, y) = {
    let mut found = None;
    'search: for yy in -100..100 {
      for xx in -100..100 {
        if !gen.is_mine(xx, yy) && gen.adjacent_count(xx, yy) > 0 {
          found = Some((xx, yy));
          break 'search;
        }
      }
    }
    found.expect("a non-mine cell with a nonzero adjacent count")
  };

  let overrides = ScoringConfigOverrides { number_reveal_points: Some(7), ..Default::default() };
  let (sender, rx) = connect();
  let created = server.create_game("e2e-overrides".into(), board, overrides, sender.conn_id(), None, sender).unwrap();
  drain(&rx);

  server.reveal_tile("e2e-overrides", created.player_id, x, y).unwrap();
  let events = drain(&rx);
  assert!(events.iter().any(|e| matches!(e, ServerEvent::ScoreUpdate { delta: 7, .. })));
}

/// A session persisted mid-game and restored under a fresh `GameServer`
/// reproduces its players and scores, exercised at the facade level
/// rather than directly against the registry.
#[test]
fn restoring_a_persisted_game_reproduces_its_players() {
  let gateway = Arc::new(InMemoryGateway::new());
  let board = BoardConfig::default();

  let (player_id, original_game_id) = {
    let server = GameServer::new(50, gateway.clone(), None);
    let (sender, rx) = connect();
    let created = server
      .create_game("e2e-restore".into(), board, ScoringConfigOverrides::default(), sender.conn_id(), Some("host".into()), sender)
      .unwrap();
    drain(&rx);
    server.persist_all();
    (created.player_id, created.game_id)
  };

  let restored_server = GameServer::new(50, gateway, None);
  restored_server.restore_all(&[original_game_id.clone()]);
  let err = restored_server.reveal_tile(&original_game_id, player_id, 0, 0);
  // The restored player has no live connection sender registered yet
  // (reconnect is required before it can receive events), but the action
  // itself must still be accepted: the player exists in the restored
  // session.
  assert!(err.is_ok() || matches!(err, Err(e) if e.kind() != sweeper_server::ErrorKind::NotInGame));
}

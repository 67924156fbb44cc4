//! Schedules delayed mine reveals. One background thread per
//! process, woken by a condvar whenever a new deadline is scheduled or the
//! next deadline in the heap elapses, polling at `ServerConfig::timer_tick_ms`
//! granularity when nothing is due yet.

use crate::session::registry::SessionRegistry;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use sweeper_common::math::Coordinate;

/// The scheduling half of the timer wheel, implemented by [`TimerWheel`]
/// and held by every [`crate::session::Session`] it serves. Kept as a
/// trait so a session can be built and unit-tested without a live wheel.
pub trait TimerSink: Send + Sync {
  fn schedule(&self, game_id: String, coordinate: Coordinate, deadline_ms: u64);
}

#[derive(Debug, Eq, PartialEq)]
struct Deadline {
  deadline_ms: u64,
  game_id: String,
  coordinate: Coordinate,
}

impl Ord for Deadline {
  fn cmp(&self, other: &Self) -> Ordering {
    // Reversed: `BinaryHeap` is a max-heap, but the wheel wants the
    // earliest deadline on top.
    other.deadline_ms.cmp(&self.deadline_ms)
  }
}

impl PartialOrd for Deadline {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

struct Shared {
  heap: Mutex<BinaryHeap<Deadline>>,
  condvar: Condvar,
  stopped: AtomicBool,
}

/// A single background thread driving every session's mine-reveal
/// deadlines. Deadlines are looked up against a [`SessionRegistry`]
/// at fire time rather than holding a `Session` handle directly, so a
/// session that was retired in the meantime is silently skipped.
pub struct TimerWheel {
  shared: Arc<Shared>,
  handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerWheel {
  /// Spawns the background thread immediately. `tick_ms` bounds how long
  /// the thread sleeps when the heap is empty or its next deadline is
  /// already known to be far away; it does not delay firing a deadline
  /// that has already elapsed.
  pub fn spawn(registry: Arc<SessionRegistry>, tick_ms: u64) -> Arc<Self> {
    let shared = Arc::new(Shared { heap: Mutex::new(BinaryHeap::new()), condvar: Condvar::new(), stopped: AtomicBool::new(false) });
    let worker_shared = shared.clone();
    let handle = std::thread::spawn(move || Self::run(worker_shared, registry, tick_ms));
    Arc::new(TimerWheel { shared, handle: Mutex::new(Some(handle)) })
  }

  fn run(shared: Arc<Shared>, registry: Arc<SessionRegistry>, tick_ms: u64) {
    loop {
      if shared.stopped.load(AtomicOrdering::Acquire) {
        return;
      }
      let now = crate::session::now_ms();
      let due = {
        let mut heap = shared.heap.lock();
        let mut due = Vec::new();
        while let Some(top) = heap.peek() {
          if top.deadline_ms > now {
            break;
          }
          due.push(heap.pop().unwrap());
        }
        if due.is_empty() {
          let wait = heap.peek().map(|d| d.deadline_ms.saturating_sub(now)).unwrap_or(tick_ms).min(tick_ms).max(1);
          shared.condvar.wait_for(&mut heap, Duration::from_millis(wait));
        }
        due
      };
      for deadline in due {
        if let Ok(session) = registry.get(&deadline.game_id) {
          session.timer_fired(deadline.coordinate);
        } else {
          debug!("timer fired for unknown or retired game {}", deadline.game_id);
        }
      }
    }
  }

  /// Signals the background thread to exit and joins it. Any deadlines
  /// still pending in the heap are simply dropped.
  pub fn stop(&self) {
    self.shared.stopped.store(true, AtomicOrdering::Release);
    self.shared.condvar.notify_all();
    if let Some(handle) = self.handle.lock().take() {
      let _ = handle.join();
    }
  }
}

impl TimerSink for TimerWheel {
  fn schedule(&self, game_id: String, coordinate: Coordinate, deadline_ms: u64) {
    let mut heap = self.shared.heap.lock();
    heap.push(Deadline { deadline_ms, game_id, coordinate });
    self.shared.condvar.notify_one();
  }
}

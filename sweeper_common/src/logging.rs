//! A small hand-rolled `log::Log` implementation: one timestamped line per
//! record, coloured when stdout is a tty, module path + line number in
//! debug builds only. No external logging framework — this is all a
//! long-running session server needs, and it keeps startup (and tests)
//! free of global logger initialisation order headaches.

use log::{Level, LevelFilter, Metadata, Record};
use parking_lot::Mutex;
use std::io::{self, Write};

/// Initializes the process logger at [`LevelFilter::Info`].
pub fn init(name: &str) { init_with_level(name, LevelFilter::Info) }

/// Initializes the process logger at the given level, writing to stdout.
pub fn init_with_level(name: &str, level: LevelFilter) {
  init_with_level_writer(name, level, io::stdout())
}

/// Initializes the process logger at the given level, writing to `writer`.
/// `name` is currently unused by the formatter but kept so callers can
/// thread a process/service name through without an API break later.
pub fn init_with_level_writer<W: Write + Send + Sync + 'static>(
  _name: &str,
  level: LevelFilter,
  writer: W,
) {
  #[cfg(unix)]
  let isatty = unsafe { libc::isatty(libc::STDOUT_FILENO) } != 0;
  #[cfg(not(unix))]
  let isatty = false;

  struct Logger<W> {
    writer: Mutex<W>,
    color: bool,
  }

  impl<W: Write> Logger<W> {
    fn log_inner(&self, record: &Record) -> io::Result<()> {
      let now = chrono::Local::now();
      let mut w = self.writer.lock();
      write!(w, "{} ", now.format("%Y-%m-%d %H:%M:%S%.3f"))?;
      #[cfg(debug_assertions)]
      {
        if let Some(path) = record.module_path() {
          write!(w, "{path}")?;
        }
        if let Some(line) = record.line() {
          write!(w, ":{line}")?;
        }
        write!(w, " ")?;
      }
      if self.color {
        match record.level() {
          Level::Trace => write!(w, "[\x1b[36mTRACE\x1b[0m]")?,
          Level::Debug => write!(w, "[\x1b[34mDEBUG\x1b[0m]")?,
          Level::Info => write!(w, "[\x1b[32mINFO\x1b[0m]")?,
          Level::Warn => write!(w, "[\x1b[33mWARN\x1b[0m]")?,
          Level::Error => write!(w, "[\x1b[31m\x1b[1mERROR\x1b[0m]")?,
        }
      } else {
        match record.level() {
          Level::Trace => write!(w, "[TRACE]")?,
          Level::Debug => write!(w, "[DEBUG]")?,
          Level::Info => write!(w, "[INFO]")?,
          Level::Warn => write!(w, "[WARN]")?,
          Level::Error => write!(w, "[ERROR]")?,
        }
      }
      writeln!(w, " {}", record.args())?;
      Ok(())
    }
  }

  impl<W: Write + Send + Sync> log::Log for Logger<W> {
    fn enabled(&self, _metadata: &Metadata) -> bool { true }

    fn log(&self, record: &Record) {
      if self.enabled(record.metadata()) {
        let _ = self.log_inner(record);
      }
    }

    fn flush(&self) {}
  }

  // Only the first call in a process wins; a second call (e.g. from a test
  // harness that already installed a logger) is a silent no-op rather than
  // a panic.
  let _ = log::set_boxed_logger(Box::new(Logger { writer: Mutex::new(writer), color: isatty }))
    .map(|()| log::set_max_level(level));
}

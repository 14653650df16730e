//! Rotating file writer
//!
//! Owns the active file handle and an in-memory byte buffer, serialized
//! by a single mutex shared with two background tasks: a periodic
//! flush+fsync loop and a rotate-on-boundary loop. Rotation renames the
//! active file to a timestamped name and recreates it; a retention sweep
//! after each timed rotation deletes rotated files older than
//! `cut_interval * max_files`.

use chrono::Utc;
use parking_lot::Mutex;
use regex::Regex;
use sherlog_core::{constants, Error, FileWriterConfig, Level, Result, WriteErrorPolicy};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::rotation;

/// The currently-open file receiving writes.
struct ActiveFile {
    file: File,
    path: PathBuf,
}

/// Mutable writer state, guarded by the mutex in [`Shared`].
struct Inner {
    active: Option<ActiveFile>,
    /// Bytes accepted but not yet written to the file. Always drained
    /// before the active handle is closed or replaced.
    buf: Vec<u8>,
    /// Bytes written to the active file since it was (re)opened. Reset to
    /// the on-disk size on reopen, not to zero.
    bytes_written: u64,
    closed: bool,
}

/// State shared between the public handle and the background loops.
struct Shared {
    config: FileWriterConfig,
    level: Level,
    /// Resolved active file name (template with the level applied)
    file_name: String,
    /// Matches rotated siblings of the active file: `^<name>\..+`
    rotated_match: Regex,
    inner: Mutex<Inner>,
}

/// Leveled, file-backed log sink with buffered writes, time-based
/// rotation, and retention cleanup.
///
/// All operations are serialized by one lock; rotation strictly separates
/// bytes written before a boundary (flushed to the archived file) from
/// bytes written after (landing in the fresh file).
pub struct RotatingFileWriter {
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
    started: AtomicBool,
}

impl RotatingFileWriter {
    /// Create a writer for one level. Zero/empty config fields get their
    /// defaults; nothing touches the disk until [`init`](Self::init) or
    /// the first [`write`](Self::write).
    pub fn new(config: FileWriterConfig, level: Level) -> Result<Self> {
        let config = config.normalize()?;
        let file_name = rotation::active_file_name(&config.name, level, config.naming);
        let rotated_match = Regex::new(&format!(r"^{}\..+", regex::escape(&file_name)))
            .map_err(|e| Error::config(format!("bad retention pattern: {e}")))?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                level,
                file_name,
                rotated_match,
                inner: Mutex::new(Inner {
                    active: None,
                    buf: Vec::new(),
                    bytes_written: 0,
                    closed: false,
                }),
            }),
            shutdown_tx,
            started: AtomicBool::new(false),
        })
    }

    /// The level this writer serves.
    pub fn level(&self) -> Level {
        self.shared.level
    }

    /// Path of the active file.
    pub fn path(&self) -> PathBuf {
        self.shared.active_path()
    }

    /// Bytes written to the active file since it was (re)opened,
    /// including bytes still sitting in the buffer.
    pub fn bytes_written(&self) -> u64 {
        self.shared.inner.lock().bytes_written
    }

    /// Open the log directory and file, performing a catch-up rotation if
    /// the on-disk active file is stale, then start the background flush
    /// and rotate loops. Must be called from within a tokio runtime.
    ///
    /// A pre-existing non-empty active file whose rotation boundary has
    /// already passed is archived under its modification time before a
    /// fresh file is created.
    pub fn init(&self) -> Result<()> {
        self.shared.create_dir()?;
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(Error::WriterClosed);
            }
            self.shared.open_for_init(&mut inner)?;
        }

        if !self.started.swap(true, Ordering::SeqCst) {
            self.spawn_flush_loop();
            if self.shared.config.cut_interval_secs > 0 {
                self.spawn_rotate_loop();
            }
        }
        Ok(())
    }

    /// Append `data` to the buffer, lazily opening the file when none is
    /// active. The buffer is drained to disk when it reaches the
    /// configured size; size-based rotation (when enabled) is checked
    /// before the byte counter is updated.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let res = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                Err(Error::WriterClosed)
            } else {
                self.shared.write_buffered(&mut inner, data)
            }
        };

        match res {
            Err(e) if self.shared.config.on_write_error == WriteErrorPolicy::Exit => {
                error!("log write failed, exiting: {}", e);
                let _ = self.sync();
                std::process::exit(2);
            }
            other => other,
        }
    }

    /// Force the buffer to disk and fsync the file. A stronger durability
    /// point than waiting for the flush loop.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        self.shared.flush(&mut inner)
    }

    /// Final flush+fsync, release the file handle, and stop both
    /// background loops. Idempotent; writes after close fail with
    /// [`Error::WriterClosed`].
    pub fn close(&self) -> Result<()> {
        let res = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Ok(());
            }
            let res = self.shared.flush(&mut inner);
            inner.active = None;
            inner.closed = true;
            res
        };
        // no receivers just means the loops never started
        let _ = self.shutdown_tx.send(());
        res
    }

    /// Periodic flush+fsync; bounds the data-loss window on crash to one
    /// flush interval.
    fn spawn_flush_loop(&self) {
        let shared = Arc::clone(&self.shared);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = Duration::from_secs(shared.config.flush_interval_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let mut inner = shared.inner.lock();
                        if inner.closed {
                            break;
                        }
                        if let Err(e) = shared.flush(&mut inner) {
                            warn!("periodic log flush failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    /// Sleep until the next cut boundary, rotate, sweep, repeat. The wait
    /// is recomputed from the wall clock each pass, so a missed wake-up
    /// (system suspend) self-corrects to the next real boundary instead
    /// of firing a burst of catch-up rotations.
    fn spawn_rotate_loop(&self) {
        let shared = Arc::clone(&self.shared);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let cut = shared.config.cut_interval_secs;
            loop {
                let now = Utc::now().timestamp();
                let boundary = rotation::next_cut_boundary(now, cut);
                let wait = Duration::from_secs((boundary - now).max(0) as u64);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if !shared.rotate_and_sweep(boundary) {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }
}

impl Shared {
    fn active_path(&self) -> PathBuf {
        self.config.dir.join(&self.file_name)
    }

    fn create_dir(&self) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(constants::LOG_DIR_MODE);
        }
        builder.create(&self.config.dir)?;
        Ok(())
    }

    /// First open/rotation decision: archive a stale pre-existing file
    /// under its modification time, otherwise open whatever is there.
    fn open_for_init(&self, inner: &mut Inner) -> Result<()> {
        let path = self.active_path();
        let stamp = match fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 && self.config.cut_interval_secs > 0 => {
                let mtime = unix_secs(meta.modified()?);
                let now = Utc::now().timestamp();
                if now >= rotation::next_cut_boundary(mtime, self.config.cut_interval_secs) {
                    Some(mtime)
                } else {
                    None
                }
            }
            _ => None,
        };
        self.rotate(inner, stamp)
    }

    fn write_buffered(&self, inner: &mut Inner, data: &[u8]) -> Result<usize> {
        if inner.active.is_none() {
            // lazy open: append to whatever is on disk, no forced archive
            self.rotate(inner, None)?;
        }

        let max = self.config.max_size_bytes;
        if max > 0 && inner.bytes_written > 0 && inner.bytes_written + data.len() as u64 >= max {
            self.rotate(inner, Some(Utc::now().timestamp()))?;
        }

        inner.buf.extend_from_slice(data);
        inner.bytes_written += data.len() as u64;
        if inner.buf.len() >= self.config.buffer_size {
            self.drain_buffer(inner)?;
        }
        Ok(data.len())
    }

    /// Write buffered bytes to the active file, recreating it first if it
    /// vanished from disk (external deletion, crash between rename and
    /// recreate). No fsync.
    fn drain_buffer(&self, inner: &mut Inner) -> Result<()> {
        let Inner {
            active,
            buf,
            bytes_written,
            ..
        } = inner;
        if buf.is_empty() {
            return Ok(());
        }
        let Some(active) = active.as_mut() else {
            return Ok(());
        };
        if !active.path.exists() {
            warn!("active log file {} vanished, recreating", active.path.display());
            active.file = create_active(&active.path)?;
            *bytes_written = buf.len() as u64;
        }
        active.file.write_all(buf)?;
        buf.clear();
        Ok(())
    }

    /// Drain the buffer and fsync the active file.
    fn flush(&self, inner: &mut Inner) -> Result<()> {
        self.drain_buffer(inner)?;
        if let Some(active) = inner.active.as_ref() {
            active.file.sync_all()?;
        }
        Ok(())
    }

    /// Flush and replace the active file.
    ///
    /// With `archive_stamp` set, a non-empty active file is renamed to
    /// its rotated name for that timestamp and a fresh file is created;
    /// without one, the on-disk file is simply (re)opened for append. A
    /// missing active file is recreated either way, which makes recovery
    /// after a crash mid-rotation idempotent.
    fn rotate(&self, inner: &mut Inner, archive_stamp: Option<i64>) -> Result<()> {
        self.flush(inner)?;
        let path = self.active_path();

        match fs::metadata(&path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // first-ever rotation: nothing to rename
                inner.active = Some(ActiveFile {
                    file: create_active(&path)?,
                    path,
                });
                inner.bytes_written = 0;
            }
            Err(e) => return Err(e.into()),
            Ok(meta) if meta.len() == 0 => {
                // nothing worth archiving
                inner.active = Some(ActiveFile {
                    file: open_append(&path)?,
                    path,
                });
                inner.bytes_written = 0;
            }
            Ok(meta) => match archive_stamp {
                Some(stamp) => {
                    // close the old handle before the rename; a failure
                    // past this point leaves no active file and the next
                    // write reopens lazily
                    inner.active = None;
                    self.archive(&path, stamp)?;
                    inner.active = Some(ActiveFile {
                        file: create_active(&path)?,
                        path,
                    });
                    inner.bytes_written = 0;
                }
                None => {
                    inner.active = Some(ActiveFile {
                        file: open_append(&path)?,
                        path,
                    });
                    inner.bytes_written = meta.len();
                }
            },
        }
        Ok(())
    }

    /// Rename the active file to its rotated name for `stamp`. Collisions
    /// (two size rotations within one suffix granule) get a numeric
    /// disambiguator.
    fn archive(&self, path: &Path, stamp: i64) -> Result<()> {
        let rotated =
            rotation::rotated_file_name(&self.file_name, self.config.cut_interval_secs, stamp);
        let mut target = self.config.dir.join(&rotated);
        let mut n = 1u32;
        while target.exists() {
            target = self.config.dir.join(format!("{rotated}.{n}"));
            n += 1;
        }
        fs::rename(path, &target)?;
        debug!("rotated {} -> {}", path.display(), target.display());
        Ok(())
    }

    /// Timer-path rotation plus retention sweep. Returns false once the
    /// writer is closed so the loop can stop.
    fn rotate_and_sweep(&self, boundary: i64) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        // the boundary that just elapsed names the archived file
        let stamp = boundary - self.config.cut_interval_secs;
        if let Err(e) = self.rotate(&mut inner, Some(stamp)) {
            error!("log rotation failed: {}", e);
        }
        self.sweep();
        true
    }

    /// Delete rotated files whose modification time is at or before
    /// `now - cut_interval * max_files`. Best-effort: individual failures
    /// are swallowed, the active file is never touched.
    fn sweep(&self) {
        if self.config.max_files == 0 {
            return;
        }
        let cutoff =
            Utc::now().timestamp() - self.config.cut_interval_secs * self.config.max_files as i64;
        let entries = match fs::read_dir(&self.config.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("retention sweep could not list {}: {}", self.config.dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == self.file_name || !self.rotated_match.is_match(name) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else { continue };
            if unix_secs(modified) <= cutoff {
                if let Err(e) = fs::remove_file(entry.path()) {
                    debug!("retention sweep could not remove {}: {}", name, e);
                }
            }
        }
    }
}

fn create_active(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(constants::LOG_FILE_MODE);
    }
    opts.open(path)
}

fn open_append(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(constants::LOG_FILE_MODE);
    }
    opts.open(path)
}

fn unix_secs(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

//! The run lock held by every open [`ResourceStore`](super::ResourceStore).
//!
//! A pipeline run reads entries it staged a phase earlier, so a second writer
//! interleaving with it could leave an embedding entry built against bytes that
//! are no longer in the store. Writers take `res/.resforge.lock` exclusively;
//! readers share it. The lock is advisory and released when the file closes.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::LOCK_FILENAME;

/// How a store handle may use the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
  /// Read entries and the manifest.
  Shared,
  /// Also stage entries and attach provenance.
  Exclusive,
}

/// The run holding the store exclusively, as recorded in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
  pub pid: u32,
  pub command: String,
  pub started_at_unix: u64,
}

impl Holder {
  fn current(command: &str) -> Self {
    Self {
      pid: std::process::id(),
      command: command.to_string(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default(),
    }
  }
}

#[derive(Debug, Error)]
pub enum RunLockError {
  #[error("{}", busy_message(.holder, .lock_path))]
  Busy {
    holder: Option<Holder>,
    lock_path: PathBuf,
  },

  #[error("failed to {action} {path}: {source}")]
  Io {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn busy_message(holder: &Option<Holder>, lock_path: &Path) -> String {
  let who = match holder {
    Some(h) => format!(
      "`resforge {}` (PID {}, started at unix time {})",
      h.command, h.pid, h.started_at_unix
    ),
    None => "another resforge run".to_string(),
  };
  format!(
    "resource store is in use by {}\nif no resforge process is running, remove {}",
    who,
    lock_path.display()
  )
}

pub(crate) struct RunLock {
  _file: File,
  access: Access,
}

impl RunLock {
  pub(crate) fn acquire(res_dir: &Path, access: Access, command: &str) -> Result<Self, RunLockError> {
    let lock_path = res_dir.join(LOCK_FILENAME);
    let io_err = |action, source| RunLockError::Io {
      action,
      path: lock_path.clone(),
      source,
    };

    let mut file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(|e| io_err("open", e))?;

    if !try_lock(&file, access).map_err(|e| io_err("lock", e))? {
      return Err(RunLockError::Busy {
        holder: read_holder(&mut file).ok(),
        lock_path: lock_path.clone(),
      });
    }

    if access == Access::Exclusive {
      write_holder(&mut file, &Holder::current(command)).map_err(|e| io_err("write", e))?;
    }

    debug!(path = %lock_path.display(), ?access, command, "locked resource store");
    Ok(Self { _file: file, access })
  }

  pub(crate) fn access(&self) -> Access {
    self.access
  }

  /// The recorded holder, read through the locked handle.
  #[cfg(test)]
  pub(crate) fn holder(&self) -> io::Result<Holder> {
    read_holder(&mut &self._file)
  }
}

fn read_holder(mut file: impl Read + Seek) -> io::Result<Holder> {
  file.seek(SeekFrom::Start(0))?;
  let mut contents = String::new();
  file.read_to_string(&mut contents)?;
  serde_json::from_str(&contents).map_err(io::Error::other)
}

fn write_holder(file: &mut File, holder: &Holder) -> io::Result<()> {
  file.set_len(0)?;
  file.seek(SeekFrom::Start(0))?;
  serde_json::to_writer(&mut *file, holder).map_err(io::Error::other)?;
  file.flush()
}

/// Non-blocking; `Ok(false)` when another handle holds a conflicting lock.
#[cfg(unix)]
fn try_lock(file: &File, access: Access) -> io::Result<bool> {
  use rustix::fs::{FlockOperation, flock};

  let operation = match access {
    Access::Shared => FlockOperation::NonBlockingLockShared,
    Access::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };
  match flock(file, operation) {
    Ok(()) => Ok(true),
    Err(e) if e == rustix::io::Errno::WOULDBLOCK => Ok(false),
    Err(e) => Err(e.into()),
  }
}

#[cfg(windows)]
fn try_lock(file: &File, access: Access) -> io::Result<bool> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};
  use windows_sys::Win32::System::IO::OVERLAPPED;

  let mut flags = LOCKFILE_FAIL_IMMEDIATELY;
  if access == Access::Exclusive {
    flags |= LOCKFILE_EXCLUSIVE_LOCK;
  }

  // SAFETY: the handle is owned by `file` and outlives the call; a zeroed
  // OVERLAPPED locks from offset 0.
  let locked = unsafe {
    let mut overlapped: OVERLAPPED = std::mem::zeroed();
    LockFileEx(file.as_raw_handle() as HANDLE, flags, 0, 1, 0, &mut overlapped)
  };
  if locked != 0 {
    return Ok(true);
  }

  let err = io::Error::last_os_error();
  if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
    Ok(false)
  } else {
    Err(err)
  }
}

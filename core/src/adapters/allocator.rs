//! File-backed forwarder port allocator.
//!
//! The allocation record is a single big-endian `u16` holding the last port
//! handed out on this host. Every allocation is a read-modify-write of that
//! record performed under an exclusive `flock`, so concurrent processes never
//! receive the same port.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::ports::PortAllocatorPort;

/// Size of the allocation record in bytes.
const RECORD_LEN: usize = std::mem::size_of::<u16>();

/// Compute the port that follows the stored record.
///
/// A stored `0` means the record is uninitialized. The counter wraps back to
/// the default port instead of overflowing past `u16::MAX`.
pub fn next_port(stored: u16, default_port: u16) -> u16 {
    match stored {
        0 | u16::MAX => default_port,
        last => last + 1,
    }
}

/// Allocator persisting its counter in a shared file.
#[derive(Debug, Clone)]
pub struct FilePortAllocator {
    path: PathBuf,
    default_port: u16,
}

impl FilePortAllocator {
    /// Create an allocator using the record at `path`.
    pub fn new(path: impl Into<PathBuf>, default_port: u16) -> Self {
        Self {
            path: path.into(),
            default_port,
        }
    }

    /// Create an allocator whose record lives in the host temp directory.
    pub fn in_temp_dir(file_name: &str, default_port: u16) -> Self {
        Self::new(std::env::temp_dir().join(file_name), default_port)
    }

    /// Path of the allocation record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Port returned when the record is uninitialized.
    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Allocate a port on the calling thread.
    ///
    /// Blocks while another process holds the record lock.
    pub fn allocate_blocking(&self) -> Result<u16> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::allocation(&self.path, e))?;

        let mut guard = lock_exclusive(file, &self.path)?;

        let stored = read_record(&mut guard).map_err(|e| Error::allocation(&self.path, e))?;
        let port = next_port(stored, self.default_port);
        write_record(&mut guard, port).map_err(|e| Error::allocation(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            previous = stored,
            port = port,
            "Allocated forwarder port"
        );
        Ok(port)
    }

    /// Read the last allocated port without changing it.
    pub fn peek(&self) -> Result<u16> {
        match File::open(&self.path) {
            Ok(mut file) => read_record(&mut file).map_err(|e| Error::allocation(&self.path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::allocation(&self.path, e)),
        }
    }
}

impl PortAllocatorPort for FilePortAllocator {
    async fn allocate(&self) -> Result<u16> {
        let allocator = self.clone();
        tokio::task::spawn_blocking(move || allocator.allocate_blocking())
            .await
            .map_err(|e| Error::allocation(&self.path, io::Error::new(io::ErrorKind::Other, e)))?
    }
}

#[cfg(unix)]
type RecordGuard = nix::fcntl::Flock<File>;

#[cfg(unix)]
fn lock_exclusive(file: File, path: &Path) -> Result<RecordGuard> {
    use nix::fcntl::{Flock, FlockArg};

    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| Error::Lock {
        path: path.to_path_buf(),
        reason: errno.to_string(),
    })
}

// No flock outside unix; the record is still updated, only without exclusion.
#[cfg(not(unix))]
struct RecordGuard(File);

#[cfg(not(unix))]
impl std::ops::Deref for RecordGuard {
    type Target = File;

    fn deref(&self) -> &File {
        &self.0
    }
}

#[cfg(not(unix))]
impl std::ops::DerefMut for RecordGuard {
    fn deref_mut(&mut self) -> &mut File {
        &mut self.0
    }
}

#[cfg(not(unix))]
fn lock_exclusive(file: File, path: &Path) -> Result<RecordGuard> {
    tracing::warn!(path = %path.display(), "File locking unavailable on this platform");
    Ok(RecordGuard(file))
}

/// Read the record; missing or short content counts as `0`.
fn read_record(file: &mut File) -> io::Result<u16> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = [0u8; RECORD_LEN];
    let mut filled = 0;
    while filled < RECORD_LEN {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    if filled < RECORD_LEN {
        return Ok(0);
    }
    Ok(u16::from_be_bytes(buf))
}

fn write_record(file: &mut File, port: u16) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&port.to_be_bytes())?;
    file.flush()
}

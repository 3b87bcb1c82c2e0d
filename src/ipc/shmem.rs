// src/ipc/shmem.rs
//! Read access to the squeezelite visualization segment.
//!
//! The producer owns the segment and its `pthread_rwlock_t`. We map it
//! read/write only because taking a read lock writes to the lock word.

use std::ffi::CString;
use std::io;
use std::marker::PhantomData;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::{self, NonNull};
use std::slice;

use tracing::debug;

use super::{Heartbeat, Segment, SegmentOpener, copy_latest};
use crate::error::IpcError;

/// Samples in the producer's ring (interleaved, so half as many frames).
pub const VIS_BUF_SIZE: usize = 16384;

/// Segment name prefix; the producer appends its MAC address.
pub const SEGMENT_PREFIX: &str = "/squeezelite-";

#[repr(C)]
struct VisLayout {
    rwlock: libc::pthread_rwlock_t,
    buf_size: u32,
    buf_index: u32,
    running: u8,
    rate: u32,
    updated: libc::time_t,
    buffer: [i16; VIS_BUF_SIZE],
}

/// Name of the segment a producer with hardware address `mac` publishes.
pub fn segment_name(mac: &str) -> String {
    format!("{SEGMENT_PREFIX}{}", mac.to_ascii_lowercase())
}

/// An owned mapping of the producer segment. Dropping it unmaps.
pub struct SharedSegment {
    name: String,
    map: NonNull<VisLayout>,
    _fd: OwnedFd,
}

// The mapping is plain shared memory guarded by the producer's rwlock.
unsafe impl Send for SharedSegment {}

impl SharedSegment {
    pub fn open(name: &str) -> Result<Self, IpcError> {
        let c_name = CString::new(name)
            .map_err(|_| IpcError::InvalidLayout(format!("segment name {name:?} contains NUL")))?;

        let raw = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o666) };
        if raw < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.kind() {
                io::ErrorKind::NotFound => IpcError::NotFound(name.to_string()),
                _ => IpcError::Map(err),
            });
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let size = mem::size_of::<VisLayout>();
        let mut stat: libc::stat = unsafe { mem::zeroed() };
        if unsafe { libc::fstat(fd.as_raw_fd(), &mut stat) } != 0 {
            return Err(IpcError::Map(io::Error::last_os_error()));
        }
        if (stat.st_size as usize) < size {
            return Err(IpcError::InvalidLayout(format!(
                "{name} is {} bytes, expected at least {size}",
                stat.st_size
            )));
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(IpcError::Map(io::Error::last_os_error()));
        }
        let map = NonNull::new(addr.cast::<VisLayout>())
            .ok_or_else(|| IpcError::Map(io::Error::other("mmap returned null")))?;

        Ok(Self {
            name: name.to_string(),
            map,
            _fd: fd,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_lock(&self) -> Result<ReadGuard<'_>, IpcError> {
        let lock = unsafe { ptr::addr_of_mut!((*self.map.as_ptr()).rwlock) };
        let rc = unsafe { libc::pthread_rwlock_rdlock(lock) };
        if rc != 0 {
            return Err(IpcError::LockFailure(rc));
        }
        Ok(ReadGuard {
            lock,
            _segment: PhantomData,
        })
    }
}

impl Segment for SharedSegment {
    fn heartbeat(&self) -> Result<Heartbeat, IpcError> {
        let _guard = self.read_lock()?;
        let vis = self.map.as_ptr();
        // SAFETY: the mapping covers a whole VisLayout and we hold the read lock.
        let beat = unsafe {
            Heartbeat {
                playing: ptr::addr_of!((*vis).running).read_volatile() != 0,
                updated: ptr::addr_of!((*vis).updated).read_volatile() as i64,
                sample_rate: ptr::addr_of!((*vis).rate).read_volatile(),
                ring_len: ptr::addr_of!((*vis).buf_size).read_volatile(),
            }
        };
        Ok(beat)
    }

    fn read_latest(&self, samples: usize, out: &mut Vec<i16>) -> Result<Option<u32>, IpcError> {
        out.clear();
        let _guard = self.read_lock()?;
        let vis = self.map.as_ptr();

        // SAFETY: as above.
        let (running, rate, len, index) = unsafe {
            (
                ptr::addr_of!((*vis).running).read_volatile() != 0,
                ptr::addr_of!((*vis).rate).read_volatile(),
                ptr::addr_of!((*vis).buf_size).read_volatile() as usize,
                ptr::addr_of!((*vis).buf_index).read_volatile() as usize,
            )
        };
        if !running {
            return Ok(None);
        }
        if len == 0 || len > VIS_BUF_SIZE || len % 2 != 0 {
            return Err(IpcError::InvalidLayout(format!("ring length {len}")));
        }

        // SAFETY: len <= VIS_BUF_SIZE and the producer does not write while we
        // hold the read lock.
        let ring = unsafe { slice::from_raw_parts(ptr::addr_of!((*vis).buffer).cast::<i16>(), len) };
        copy_latest(ring, index, samples, out);
        Ok(Some(rate))
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.map.as_ptr().cast(), mem::size_of::<VisLayout>());
        }
        debug!(segment = %self.name, "unmapped");
    }
}

struct ReadGuard<'a> {
    lock: *mut libc::pthread_rwlock_t,
    _segment: PhantomData<&'a SharedSegment>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_rwlock_unlock(self.lock);
        }
    }
}

/// Opens a fixed segment name, or works it out from the host's MAC address
/// on every attempt when no name was configured.
#[derive(Debug, Clone)]
pub struct ShmOpener {
    name: Option<String>,
    interface: Option<String>,
}

impl ShmOpener {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            interface: None,
        }
    }

    /// Derive the name from the hardware address, optionally of one interface.
    pub fn discover(interface: Option<String>) -> Self {
        Self {
            name: None,
            interface,
        }
    }

    fn resolve(&self) -> Result<String, IpcError> {
        if let Some(name) = &self.name {
            return Ok(name.clone());
        }
        super::mac::hardware_address(self.interface.as_deref())
            .map(|mac| segment_name(&mac))
            .ok_or_else(|| IpcError::NotFound(format!("{SEGMENT_PREFIX}<no hardware address>")))
    }
}

impl SegmentOpener for ShmOpener {
    type Segment = SharedSegment;

    fn open(&mut self) -> Result<SharedSegment, IpcError> {
        let name = self.resolve()?;
        SharedSegment::open(&name)
    }

    fn describe(&self) -> String {
        match (&self.name, &self.interface) {
            (Some(name), _) => name.clone(),
            (None, Some(iface)) => format!("{SEGMENT_PREFIX}<mac of {iface}>"),
            (None, None) => format!("{SEGMENT_PREFIX}<mac>"),
        }
    }
}

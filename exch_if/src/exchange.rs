//! Seqlock shared-memory channels.
//!
//! Each channel is a named file-backed memory region holding a small header
//! and a single plain-old-data payload. One process owns the write side of a
//! channel; any number of processes may read it. Writes bump a sequence
//! counter to an odd value, mutate the payload in place, then bump the
//! counter to the next even value. Readers snapshot the counter, copy the
//! payload, and retry if the counter moved or was odd, so a reader never
//! blocks and never observes a torn payload.
//!
//! The header carries the payload size so a reader compiled against a
//! different struct layout fails at open time rather than silently
//! misinterpreting bytes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use memmap2::{MmapMut, MmapOptions};
use thiserror::Error;

// Standard
use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Size of the region header preceding the payload.
///
/// Layout: `{payload_size: u32, _pad: u32, seq: AtomicU64}`, keeping the
/// payload 16-byte aligned.
const HEADER_SIZE: usize = 16;

/// Environment variable overriding the directory holding the channel files.
const EXCHANGE_DIR_VAR: &str = "EXCAHAUL_EXCHANGE_DIR";

/// Default directory for the channel files.
const DEFAULT_EXCHANGE_DIR: &str = "/dev/shm";

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Marker for types which may be placed on an exchange, the serial wire or a
/// UDP datagram.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with no padding-sensitive invariants,
/// no pointers, and be valid for any bit pattern that a well-behaved peer
/// process can produce.
pub unsafe trait ExchangeSafe: Copy + Sized + 'static {}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised when opening an exchange channel.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Cannot open the exchange region file: {0}")]
    FileError(#[from] std::io::Error),

    #[error(
        "Exchange payload size mismatch: region holds {found} bytes but this \
         process expects {expected} bytes (stale region or mismatched build?)")]
    SizeMismatch { expected: usize, found: usize },
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One named seqlock channel holding a payload of type `T`.
pub struct Exchange<T: ExchangeSafe> {
    map: MmapMut,

    /// Sequence value at the last `updated()` poll.
    last_seen_seq: u64,

    _payload: PhantomData<T>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: ExchangeSafe> Exchange<T> {
    /// Open (creating if required) the named channel in the exchange
    /// directory.
    pub fn open(name: &str) -> Result<Self, ExchangeError> {
        Self::open_path(exchange_dir().join(name))
    }

    /// Open (creating if required) a channel at an explicit path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, ExchangeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let total_len = (HEADER_SIZE + size_of::<T>()) as u64;
        let fresh = file.metadata()?.len() == 0;

        if fresh {
            file.set_len(total_len)?;
        }
        else if file.metadata()?.len() != total_len {
            return Err(ExchangeError::SizeMismatch {
                expected: size_of::<T>(),
                found: (file.metadata()?.len() as usize)
                    .saturating_sub(HEADER_SIZE),
            });
        }

        let mut map = unsafe { MmapOptions::new().map_mut(&file)? };

        // Stamp or validate the payload size in the header
        let size_header =
            unsafe { &mut *(map.as_mut_ptr() as *mut u32) };
        if fresh {
            *size_header = size_of::<T>() as u32;
        }
        else if *size_header != size_of::<T>() as u32 {
            return Err(ExchangeError::SizeMismatch {
                expected: size_of::<T>(),
                found: *size_header as usize,
            });
        }

        Ok(Self {
            map,
            last_seen_seq: 0,
            _payload: PhantomData,
        })
    }

    /// Mutate the payload inside one seqlock write region.
    ///
    /// All changes made by `func` become visible to readers atomically, as
    /// one snapshot. The channel's single-writer convention is the caller's
    /// responsibility.
    pub fn write<R>(&mut self, func: impl FnOnce(&mut T) -> R) -> R {
        self.seq().fetch_add(1, Ordering::AcqRel);
        fence(Ordering::Release);

        let payload = unsafe {
            &mut *(self.map.as_mut_ptr().add(HEADER_SIZE) as *mut T)
        };
        let result = func(payload);

        self.seq().fetch_add(1, Ordering::Release);

        result
    }

    /// Replace the entire payload in one write region.
    pub fn publish(&mut self, value: T) {
        self.write(|payload| *payload = value);
    }

    /// Copy out the last committed snapshot of the payload.
    ///
    /// Never blocks: if a write is in flight the read retries over the
    /// copy, which is bounded by the writer's own (short) write region. A
    /// writer that died mid-write leaves the region permanently odd; after
    /// a generous retry budget the copy is returned as-is rather than
    /// hanging the control loop.
    pub fn read(&self) -> T {
        let mut retries = 0u32;
        loop {
            let seq_before = self.seq().load(Ordering::Acquire);

            let value =
                unsafe { std::ptr::read_volatile(self.payload_ptr() as *const T) };

            fence(Ordering::Acquire);
            let seq_after = self.seq().load(Ordering::Relaxed);

            if seq_before == seq_after && seq_before & 1 == 0 {
                return value;
            }

            retries += 1;
            if retries > 10_000 {
                return value;
            }
            std::hint::spin_loop();
        }
    }

    /// True if the channel has been written since the last `updated` call on
    /// this handle.
    pub fn updated(&mut self) -> bool {
        let seq = self.seq().load(Ordering::Acquire);

        if seq != self.last_seen_seq && seq & 1 == 0 {
            self.last_seen_seq = seq;
            true
        }
        else {
            false
        }
    }

    fn seq(&self) -> &AtomicU64 {
        // The u64 at offset 8 is 8-byte aligned since the map is page aligned
        unsafe { &*(self.map.as_ptr().add(8) as *const AtomicU64) }
    }

    fn payload_ptr(&self) -> *const T {
        unsafe { self.map.as_ptr().add(HEADER_SIZE) as *const T }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The directory holding the channel region files.
pub fn exchange_dir() -> PathBuf {
    match std::env::var(EXCHANGE_DIR_VAR) {
        Ok(dir) => dir.into(),
        Err(_) => DEFAULT_EXCHANGE_DIR.into(),
    }
}

/// View a plain-old-data value as its raw bytes.
pub fn bytes_of<T: ExchangeSafe>(value: &T) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>())
    }
}

/// Reconstruct a plain-old-data value from raw bytes, or `None` if the
/// length does not match the type exactly.
pub fn pod_read<T: ExchangeSafe>(bytes: &[u8]) -> Option<T> {
    if bytes.len() != size_of::<T>() {
        return None;
    }
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Debug)]
    #[repr(C)]
    struct Probe {
        a: u64,
        b: u64,
    }
    unsafe impl ExchangeSafe for Probe {}

    fn temp_channel() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.exchange");
        (dir, path)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, path) = temp_channel();

        let mut writer = Exchange::<Probe>::open_path(&path).unwrap();
        let reader = Exchange::<Probe>::open_path(&path).unwrap();

        assert_eq!(reader.read(), Probe { a: 0, b: 0 });

        writer.publish(Probe { a: 7, b: 11 });
        assert_eq!(reader.read(), Probe { a: 7, b: 11 });
    }

    #[test]
    fn test_updated_tracks_writes() {
        let (_dir, path) = temp_channel();

        let mut writer = Exchange::<Probe>::open_path(&path).unwrap();
        let mut reader = Exchange::<Probe>::open_path(&path).unwrap();

        assert!(!reader.updated());

        writer.publish(Probe { a: 1, b: 2 });
        assert!(reader.updated());
        assert!(!reader.updated());

        writer.write(|p| p.a += 1);
        assert!(reader.updated());
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let (_dir, path) = temp_channel();

        let _writer = Exchange::<Probe>::open_path(&path).unwrap();

        #[derive(Clone, Copy)]
        #[repr(C)]
        struct Bigger {
            a: u64,
            b: u64,
            c: u64,
        }
        unsafe impl ExchangeSafe for Bigger {}

        match Exchange::<Bigger>::open_path(&path) {
            Err(ExchangeError::SizeMismatch { expected, found }) => {
                assert_eq!(expected, 24);
                assert_eq!(found, 16);
            }
            other => panic!("expected size mismatch, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_concurrent_reads_never_torn() {
        let (_dir, path) = temp_channel();

        let mut writer = Exchange::<Probe>::open_path(&path).unwrap();
        writer.publish(Probe { a: 0, b: 1 });
        let path2 = path.clone();

        let reader_thread = std::thread::spawn(move || {
            let reader = Exchange::<Probe>::open_path(&path2).unwrap();
            for _ in 0..20_000 {
                let p = reader.read();
                // The writer always keeps b == a + 1, so any torn snapshot
                // breaks this relation.
                assert_eq!(p.b, p.a + 1);
            }
        });

        for i in 0..20_000u64 {
            writer.write(|p| {
                p.a = i;
                p.b = i + 1;
            });
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn test_pod_bytes_roundtrip() {
        let probe = Probe { a: 3, b: 4 };
        let bytes = bytes_of(&probe);
        assert_eq!(bytes.len(), 16);
        assert_eq!(pod_read::<Probe>(bytes), Some(probe));
        assert_eq!(pod_read::<Probe>(&bytes[1..]), None);
    }
}

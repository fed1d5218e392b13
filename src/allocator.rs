//! Host memory for tensor storage and operator workspaces.
//!
//! Every buffer is a [`Block`]: a zero-initialised, 64-byte aligned heap
//! region released when the block is dropped. Caller tensors allocate blocks
//! directly; operators request their halo workspaces through the context's
//! [`Allocator`], which accounts for (and may cap) the bytes in use.

use crate::error::AllocError;
use core::ptr::NonNull;
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::sync::Arc;

/// Alignment of every block; wide enough for any vector register in use.
pub const BLOCK_ALIGN: usize = 64;

/// Shared handle to a context allocator.
pub type AllocatorHandle = Arc<dyn Allocator>;

/// Source of workspace memory.
///
/// Implementations must serialise concurrent requests themselves.
pub trait Allocator: Send + Sync + core::fmt::Debug {
    /// Allocates `bytes` zeroed bytes.
    fn allocate(&self, bytes: usize) -> Result<Block, AllocError>;

    /// Bytes currently handed out and not yet released.
    fn bytes_in_use(&self) -> usize;
}

/// An owned, aligned, zeroed heap allocation.
#[derive(Debug)]
pub struct Block {
    ptr: NonNull<u8>,
    len: usize,
    ledger: Option<Arc<Ledger>>,
}

// SAFETY: a `Block` exclusively owns its allocation; concurrent access to the
// bytes goes through raw pointers whose disjointness the scheduler guarantees.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    /// Allocates an unaccounted block.
    pub fn zeroed(len: usize) -> Result<Self, AllocError> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
                ledger: None,
            });
        }
        let layout = Self::layout(len)?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocError::OutOfMemory { requested: len })?;
        Ok(Self {
            ptr,
            len,
            ledger: None,
        })
    }

    fn layout(len: usize) -> Result<Layout, AllocError> {
        Layout::from_size_align(len, BLOCK_ALIGN).map_err(|_| AllocError::Layout { requested: len })
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: allocated in `zeroed` with this exact layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
        if let Some(ledger) = &self.ledger {
            ledger.release(self.len);
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    in_use: usize,
    peak: usize,
}

/// Byte accounting shared between an allocator and the blocks it handed out.
#[derive(Debug)]
struct Ledger {
    limit: Option<usize>,
    state: Mutex<LedgerState>,
}

impl Ledger {
    fn reserve(&self, bytes: usize) -> Result<(), AllocError> {
        let mut state = self.state.lock();
        let next = state.in_use.saturating_add(bytes);
        if let Some(limit) = self.limit {
            if next > limit {
                return Err(AllocError::LimitExceeded {
                    requested: bytes,
                    in_use: state.in_use,
                    limit,
                });
            }
        }
        state.in_use = next;
        state.peak = state.peak.max(next);
        Ok(())
    }

    fn release(&self, bytes: usize) {
        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(bytes);
    }
}

/// Default allocator: system heap with optional byte limit.
#[derive(Debug, Clone)]
pub struct HostAllocator {
    ledger: Arc<Ledger>,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Refuses requests that would push the bytes in use above `limit`.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            ledger: Arc::new(Ledger {
                limit,
                state: Mutex::new(LedgerState::default()),
            }),
        }
    }

    /// Highest number of bytes in use at any point.
    pub fn peak_bytes(&self) -> usize {
        self.ledger.state.lock().peak
    }
}

impl Default for HostAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for HostAllocator {
    fn allocate(&self, bytes: usize) -> Result<Block, AllocError> {
        self.ledger.reserve(bytes)?;
        match Block::zeroed(bytes) {
            Ok(mut block) => {
                if !block.is_empty() {
                    block.ledger = Some(Arc::clone(&self.ledger));
                }
                Ok(block)
            }
            Err(err) => {
                self.ledger.release(bytes);
                Err(err)
            }
        }
    }

    fn bytes_in_use(&self) -> usize {
        self.ledger.state.lock().in_use
    }
}

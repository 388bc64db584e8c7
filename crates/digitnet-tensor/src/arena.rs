use core::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::{Tensor, TensorError};

/// The arena every tensor is allocated from.
///
/// The arena does the bookkeeping of the buffers it hands out: how many tensors are alive, how
/// many bytes they hold and, when a capacity is set, whether a new buffer still fits. A tensor
/// gives its bytes back exactly once, when its owner drops it or hands it to
/// [release](Arena::release).
///
/// Computations creating intermediate tensors should run inside [run_scoped](Arena::run_scoped):
/// every tensor allocated in the closure that is not part of its returned value is released
/// before the call returns, even when the closure fails.
///
/// Cloning an arena returns a new handle on the same bookkeeping.
#[derive(Clone, Default)]
pub struct Arena {
    state: Arc<ArenaState>,
}

#[derive(Default)]
struct ArenaState {
    capacity: Option<usize>,
    live_tensors: AtomicUsize,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicU64,
    releases: AtomicU64,
    depth: AtomicUsize,
}

/// Snapshot of the arena bookkeeping.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Number of tensors currently alive.
    pub live_tensors: usize,
    /// Bytes held by the tensors currently alive.
    pub live_bytes: usize,
    /// Highest value `live_bytes` reached.
    pub peak_bytes: usize,
    /// Number of allocations since the arena was created.
    pub allocations: u64,
    /// Number of releases since the arena was created.
    pub releases: u64,
}

/// The bytes a single tensor holds in its arena, given back on drop.
pub(crate) struct Allocation {
    arena: Arena,
    bytes: usize,
}

impl Arena {
    /// Creates an arena without a capacity limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an arena refusing allocations once `bytes` are in use.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            state: Arc::new(ArenaState {
                capacity: Some(bytes),
                ..Default::default()
            }),
        }
    }

    /// The capacity of the arena in bytes, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.state.capacity
    }

    /// Number of tensors currently alive.
    pub fn live_tensors(&self) -> usize {
        self.state.live_tensors.load(Ordering::Acquire)
    }

    /// Bytes held by the tensors currently alive.
    pub fn live_bytes(&self) -> usize {
        self.state.live_bytes.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the arena bookkeeping.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats::new(
            self.live_tensors(),
            self.live_bytes(),
            self.state.peak_bytes.load(Ordering::Acquire),
            self.state.allocations.load(Ordering::Acquire),
            self.state.releases.load(Ordering::Acquire),
        )
    }

    /// Whether both handles point to the same arena.
    pub fn same(&self, other: &Arena) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Runs a computation in its own allocation scope.
    ///
    /// The tensors owned by the closure are released when it returns. The returned value is
    /// promoted to the calling scope. On error the intermediates are released before the
    /// error propagates.
    ///
    /// # Notes
    ///
    /// The leak check logged when the scope ends compares global counters, it is only exact when
    /// no other thread allocates from the same arena in the meantime.
    pub fn run_scoped<T, E, F>(&self, func: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        T: TensorCollection,
    {
        let scope = Scope::enter(self);
        let result = func();

        match &result {
            Ok(value) => scope.exit(value.tensor_count()),
            Err(_) => scope.abort(),
        }

        result
    }

    /// Releases a tensor that outlived the scope it was created in.
    pub fn release(&self, tensor: Tensor) {
        if !self.same(tensor.arena()) {
            log::warn!(
                "Releasing a tensor of shape {} through an arena it was not allocated from",
                tensor.shape()
            );
        }

        log::trace!(
            "Released tensor of shape {} ({} bytes)",
            tensor.shape(),
            tensor.num_bytes()
        );
        core::mem::drop(tensor);
    }

    pub(crate) fn reserve(&self, bytes: usize) -> Result<Allocation, TensorError> {
        let mut current = self.state.live_bytes.load(Ordering::Acquire);

        let next = loop {
            let next = current + bytes;

            if let Some(capacity) = self.state.capacity {
                if next > capacity {
                    return Err(TensorError::AllocationExhausted {
                        requested: bytes,
                        live: current,
                        capacity,
                    });
                }
            }

            match self.state.live_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break next,
                Err(actual) => current = actual,
            }
        };

        self.state.peak_bytes.fetch_max(next, Ordering::AcqRel);
        self.state.live_tensors.fetch_add(1, Ordering::AcqRel);
        self.state.allocations.fetch_add(1, Ordering::AcqRel);

        Ok(Allocation {
            arena: self.clone(),
            bytes,
        })
    }

    fn free(&self, bytes: usize) {
        self.state.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
        self.state.live_tensors.fetch_sub(1, Ordering::AcqRel);
        self.state.releases.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Allocation {
    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.arena.free(self.bytes);
    }
}

/// Bookkeeping of one [run_scoped](Arena::run_scoped) call.
///
/// The depth is restored on drop so a panicking closure leaves the arena consistent.
struct Scope<'a> {
    arena: &'a Arena,
    depth: usize,
    live_before: usize,
    allocations_before: u64,
}

impl<'a> Scope<'a> {
    fn enter(arena: &'a Arena) -> Self {
        let depth = arena.state.depth.fetch_add(1, Ordering::AcqRel) + 1;

        Self {
            arena,
            depth,
            live_before: arena.live_tensors(),
            allocations_before: arena.state.allocations.load(Ordering::Acquire),
        }
    }

    fn allocated(&self) -> u64 {
        self.arena.state.allocations.load(Ordering::Acquire) - self.allocations_before
    }

    fn exit(self, promoted: usize) {
        let live = self.arena.live_tensors();
        let expected = self.live_before + promoted;

        log::trace!(
            "Scope {} allocated {} tensors, {} promoted to the enclosing scope",
            self.depth,
            self.allocated(),
            promoted
        );

        if live > expected {
            log::debug!(
                "Scope {} ended with {} tensors alive, expected at most {}",
                self.depth,
                live,
                expected
            );
        }
    }

    fn abort(self) {
        log::trace!(
            "Scope {} aborted after allocating {} tensors, intermediates released",
            self.depth,
            self.allocated()
        );
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.arena.state.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Values that may hold tensors, so a scope knows how many of them are promoted.
pub trait TensorCollection {
    /// Number of tensors owned by the value.
    fn tensor_count(&self) -> usize;
}

impl TensorCollection for Tensor {
    fn tensor_count(&self) -> usize {
        1
    }
}

impl<T: TensorCollection> TensorCollection for Vec<T> {
    fn tensor_count(&self) -> usize {
        self.iter().map(TensorCollection::tensor_count).sum()
    }
}

impl<T: TensorCollection> TensorCollection for Option<T> {
    fn tensor_count(&self) -> usize {
        self.as_ref().map_or(0, TensorCollection::tensor_count)
    }
}

impl<T: TensorCollection> TensorCollection for Box<T> {
    fn tensor_count(&self) -> usize {
        self.as_ref().tensor_count()
    }
}

impl<T: TensorCollection, const N: usize> TensorCollection for [T; N] {
    fn tensor_count(&self) -> usize {
        self.iter().map(TensorCollection::tensor_count).sum()
    }
}

macro_rules! tensor_free {
    ($($ty:ty),*) => {
        $(
            impl TensorCollection for $ty {
                fn tensor_count(&self) -> usize {
                    0
                }
            }
        )*
    };
}

tensor_free!((), bool, f32, f64, u8, u32, u64, usize, i32, i64, String);

macro_rules! tensor_tuple {
    ($($name:ident),+) => {
        impl<$($name: TensorCollection),+> TensorCollection for ($($name,)+) {
            #[allow(non_snake_case)]
            fn tensor_count(&self) -> usize {
                let ($($name,)+) = self;
                0 $(+ $name.tensor_count())+
            }
        }
    };
}

tensor_tuple!(A);
tensor_tuple!(A, B);
tensor_tuple!(A, B, C);
tensor_tuple!(A, B, C, D);

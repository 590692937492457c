use std::{
    alloc::Layout,
    fmt,
    ptr::NonNull,
    sync::OnceLock,
};

use crossbeam::channel;
use log::trace;

use crate::alloc::{AllocError, Allocator, Global};

const DEFAULT_CAPACITY: usize = 64;

/// An allocator that recycles freed control blocks.
///
/// A pool serves one layout: the layout of the first request it sees, which in practice is the
/// control block for one kind of [`Shared`]. Freed blocks of that layout are parked in a bounded
/// queue and handed out again by the next allocation; everything else is passed through to
/// [`Global`].
///
/// You usually define a static pool for every type you allocate often.
///
/// ```
/// # use shareptr::{Pool, Shared};
/// static POOL: Pool = Pool::new();
///
/// let s = Shared::new_in(5_u64, &POOL);
/// drop(s);
/// assert!(POOL.len() == 1);
///
/// let _s = Shared::new_in(6_u64, &POOL);
/// assert!(POOL.len() == 0);
/// ```
///
/// [`Shared`]: crate::Shared
pub struct Pool {
    capacity: usize,
    layout: OnceLock<Layout>,
    channel: OnceLock<(
        channel::Sender<AllowSend<NonNull<u8>>>,
        channel::Receiver<AllowSend<NonNull<u8>>>,
    )>,
}

struct AllowSend<T>(T);

unsafe impl<T> Send for AllowSend<T> {}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl Pool {
    /// Creates a pool that keeps up to 64 freed blocks.
    pub const fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a pool that keeps up to `capacity` freed blocks. A capacity of `0` recycles
    /// nothing.
    pub const fn with_capacity(capacity: usize) -> Self {
        Pool {
            capacity,
            layout: OnceLock::new(),
            channel: OnceLock::new(),
        }
    }

    fn channel(
        &self,
    ) -> &(
        channel::Sender<AllowSend<NonNull<u8>>>,
        channel::Receiver<AllowSend<NonNull<u8>>>,
    ) {
        self.channel.get_or_init(|| channel::bounded(self.capacity))
    }

    /// The most freed blocks this pool keeps.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of freed blocks waiting to be reused.
    pub fn len(&self) -> usize {
        self.channel.get().map_or(0, |(_, recv)| recv.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every parked block to [`Global`].
    pub fn clear(&self) {
        let (Some(&layout), Some((_, recv))) = (self.layout.get(), self.channel.get()) else {
            return;
        };

        while let Ok(AllowSend(ptr)) = recv.try_recv() {
            unsafe { Global.deallocate(ptr, layout) }
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Allocator for Pool {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if *self.layout.get_or_init(|| layout) == layout {
            if let Ok(AllowSend(ptr)) = self.channel().1.try_recv() {
                trace!("reusing pooled block {:p}", ptr);
                return Ok(ptr);
            }
        }

        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if self.layout.get() == Some(&layout) {
            if let Err(err) = self.channel().0.try_send(AllowSend(ptr)) {
                // the pool is full.
                Global.deallocate(err.into_inner().0, layout);
            }
            return;
        }

        Global.deallocate(ptr, layout)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.clear();
    }
}

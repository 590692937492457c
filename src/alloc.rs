use std::{alloc::Layout, fmt, ptr::NonNull};

use thiserror::Error;

/// Returned when an [`Allocator`] cannot satisfy a request.
#[derive(Clone, Copy, PartialEq, Eq, Error)]
#[error("failed to allocate {} bytes aligned to {}", .layout.size(), .layout.align())]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    /// Creates an error for a failed request of `layout`.
    pub fn new(layout: Layout) -> Self {
        AllocError { layout }
    }

    /// The layout of the request that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl fmt::Debug for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocError")
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}

/// A source of memory for control blocks.
///
/// Control blocks never ask for a zero sized layout. An allocator is moved into the block it
/// allocated and is used exactly once more, to free that block. Because the block erases the
/// allocator's type, allocators stored in a [`Shared`] must be `'static`; share a single pool
/// between blocks with a `&'static` reference or a cheap clonable handle.
///
/// # Safety
///
/// Memory returned by `allocate` must be valid for reads and writes of `layout.size()` bytes,
/// aligned to `layout.align()`, and stay valid until it is passed to `deallocate` on this
/// allocator (or a clone of it) with the same layout.
///
/// [`Shared`]: crate::Shared
pub unsafe trait Allocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the same `layout`, and
    /// must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocates uninitialized storage for one `U`.
    fn allocate_one<U>(&self) -> Result<NonNull<U>, AllocError> {
        self.allocate(Layout::new::<U>()).map(NonNull::cast)
    }

    /// # Safety
    ///
    /// See [`Allocator::deallocate`]; `ptr` must come from `allocate_one::<U>`.
    unsafe fn deallocate_one<U>(&self, ptr: NonNull<U>) {
        self.deallocate(ptr.cast(), Layout::new::<U>())
    }
}

unsafe impl<A> Allocator for &A
where
    A: Allocator + ?Sized,
{
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}

/// The process wide allocator, see [`std::alloc::alloc`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Global;

unsafe impl Allocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);

        NonNull::new(unsafe { std::alloc::alloc(layout) }).ok_or(AllocError::new(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

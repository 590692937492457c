//! Control blocks.
//!
//! Every block starts with a [`Header`] holding the two counts and a pointer to a vtable that is
//! monomorphised for the concrete block type. Handles only ever see `NonNull<Header>`, which is
//! what lets one `Shared<T>` type cover any deleter and allocator.

use std::{
    cell::Cell,
    mem::{self, ManuallyDrop, MaybeUninit},
    process,
    ptr::{self, NonNull},
};

use log::{debug, trace};

use crate::{
    alloc::{AllocError, Allocator},
    delete::Deleter,
};

struct BlockVTable {
    /// Ends the lifetime of the managed object. The block itself stays allocated.
    destroy_object: unsafe fn(NonNull<Header>),
    /// Frees the block. For inline blocks this also frees the object's storage.
    release_storage: unsafe fn(NonNull<Header>),
}

#[repr(C)]
pub(crate) struct Header {
    strong: Cell<usize>,
    weak: Cell<usize>,
    /// Set while `destroy_object` runs. The block must not be freed underneath it.
    destroying: Cell<bool>,
    vtable: &'static BlockVTable,
}

impl Header {
    fn new(vtable: &'static BlockVTable) -> Self {
        Header {
            strong: Cell::new(1),
            weak: Cell::new(0),
            destroying: Cell::new(false),
            vtable,
        }
    }

    pub(crate) fn strong(&self) -> usize {
        self.strong.get()
    }

    pub(crate) fn weak(&self) -> usize {
        self.weak.get()
    }

    pub(crate) fn inc_strong(&self) {
        self.strong.set(checked_inc(self.strong.get()));
    }

    pub(crate) fn inc_weak(&self) {
        self.weak.set(checked_inc(self.weak.get()));
    }
}

// a count can only reach `usize::MAX` if handles were leaked with `mem::forget`. wrapping around
// would free the object while it is still referenced, so we give up instead.
fn checked_inc(n: usize) -> usize {
    match n.checked_add(1) {
        Some(n) => n,
        None => process::abort(),
    }
}

/// Drops one strong reference, destroying the object and possibly the block.
///
/// # Safety
///
/// `block` must be a live block and the caller must own one of its strong references.
pub(crate) unsafe fn release_strong(block: NonNull<Header>) {
    let header = block.as_ref();
    debug_assert!(header.strong.get() > 0);

    let strong = header.strong.get() - 1;
    header.strong.set(strong);
    if strong != 0 {
        return;
    }

    // a `Weak` dropped by the object's own destructor must not free the block under us.
    header.destroying.set(true);
    trace!("destroying object of block {:p}", block);
    (header.vtable.destroy_object)(block);
    header.destroying.set(false);

    if header.weak.get() == 0 {
        release_storage(block);
    }
}

/// Drops one weak reference, freeing the block if nothing else refers to it.
///
/// # Safety
///
/// `block` must be a live block and the caller must own one of its weak references.
pub(crate) unsafe fn release_weak(block: NonNull<Header>) {
    let header = block.as_ref();
    debug_assert!(header.weak.get() > 0);

    let weak = header.weak.get() - 1;
    header.weak.set(weak);
    if weak != 0 || header.strong.get() != 0 || header.destroying.get() {
        return;
    }

    release_storage(block);
}

unsafe fn release_storage(block: NonNull<Header>) {
    let release = block.as_ref().vtable.release_storage;
    trace!("releasing block {:p}", block);
    release(block);
}

/// A block managing an object that lives in a separate allocation.
#[repr(C)]
pub(crate) struct ExternalBlock<T: ?Sized, D, A> {
    header: Header,
    object: *mut T,
    deleter: ManuallyDrop<D>,
    alloc: ManuallyDrop<A>,
}

impl<T, D, A> ExternalBlock<T, D, A>
where
    T: ?Sized,
    D: Deleter<T>,
    A: Allocator,
{
    const VTABLE: BlockVTable = BlockVTable {
        destroy_object: Self::destroy_object,
        release_storage: Self::release_storage,
    };

    /// Allocates a block owning `object` with a strong count of one.
    ///
    /// On failure the deleter has already been run on `object`.
    pub(crate) fn allocate(
        object: NonNull<T>,
        mut deleter: D,
        alloc: A,
    ) -> Result<NonNull<Header>, AllocError> {
        let block = match alloc.allocate_one::<Self>() {
            Ok(block) => block,
            Err(err) => {
                debug!("external block allocation failed: {}", err);
                deleter.delete(object.as_ptr());
                return Err(err);
            }
        };

        unsafe {
            block.as_ptr().write(ExternalBlock {
                header: Header::new(&Self::VTABLE),
                object: object.as_ptr(),
                deleter: ManuallyDrop::new(deleter),
                alloc: ManuallyDrop::new(alloc),
            });
        }
        trace!("created external block {:p}", block);

        Ok(block.cast())
    }

    unsafe fn destroy_object(block: NonNull<Header>) {
        let this = block.cast::<Self>().as_ptr();
        let object = (*this).object;

        (*this).deleter.delete(object);
    }

    unsafe fn release_storage(block: NonNull<Header>) {
        let this = block.cast::<Self>();

        let alloc = ManuallyDrop::take(&mut (*this.as_ptr()).alloc);
        ManuallyDrop::drop(&mut (*this.as_ptr()).deleter);
        alloc.deallocate_one(this);
    }
}

/// A block storing the managed object inline, next to the counts.
#[repr(C)]
pub(crate) struct InlineBlock<T, A> {
    header: Header,
    alloc: ManuallyDrop<A>,
    value: MaybeUninit<T>,
}

impl<T, A> InlineBlock<T, A>
where
    A: Allocator,
{
    const VTABLE: BlockVTable = BlockVTable {
        destroy_object: Self::destroy_object,
        release_storage: Self::release_storage,
    };

    /// Allocates a block, then constructs the value with `init` directly into it.
    ///
    /// Counts are published only once the value is in place. If `init` panics the block is freed
    /// before the panic continues.
    pub(crate) fn allocate<F>(
        init: F,
        alloc: A,
    ) -> Result<(NonNull<Header>, NonNull<T>), AllocError>
    where
        F: FnOnce() -> T,
    {
        struct Unwind<'a, B, A: Allocator> {
            block: NonNull<B>,
            alloc: &'a A,
        }

        impl<B, A: Allocator> Drop for Unwind<'_, B, A> {
            fn drop(&mut self) {
                unsafe { self.alloc.deallocate_one(self.block) }
            }
        }

        let block = match alloc.allocate_one::<Self>() {
            Ok(block) => block,
            Err(err) => {
                debug!("inline block allocation failed: {}", err);
                return Err(err);
            }
        };

        let unwind = Unwind {
            block,
            alloc: &alloc,
        };
        let value = init();
        mem::forget(unwind);

        let object = unsafe {
            let this = block.as_ptr();
            ptr::addr_of_mut!((*this).header).write(Header::new(&Self::VTABLE));
            ptr::addr_of_mut!((*this).alloc).write(ManuallyDrop::new(alloc));

            let object = ptr::addr_of_mut!((*this).value).cast::<T>();
            object.write(value);
            NonNull::new_unchecked(object)
        };
        trace!("created inline block {:p}", block);

        Ok((block.cast(), object))
    }

    unsafe fn destroy_object(block: NonNull<Header>) {
        let this = block.cast::<Self>().as_ptr();

        ptr::drop_in_place(ptr::addr_of_mut!((*this).value).cast::<T>());
    }

    unsafe fn release_storage(block: NonNull<Header>) {
        let this = block.cast::<Self>();

        let alloc = ManuallyDrop::take(&mut (*this.as_ptr()).alloc);
        alloc.deallocate_one(this);
    }
}

use std::{fmt, ptr::NonNull};

use crate::{
    block::{self, Header},
    shared::Shared,
};

/// A weak pointer to an allocation. Weak pointers keep the control block alive, but not the
/// object inside it.
///
/// Weak pointers cannot provide a reference to the stored value because the value may be dropped
/// as soon as the last [`Shared`] goes away. Instead you must first [`lock`][Weak::lock] the weak
/// pointer, which hands out a new strong reference through the same control block.
pub struct Weak<T: ?Sized> {
    ptr: NonNull<T>,
    block: NonNull<Header>,
}

impl<T: ?Sized> Weak<T> {
    /// See [`Shared::downgrade`].
    ///
    /// # Panics
    ///
    /// Panics if `shared` is empty.
    pub fn new(shared: &Shared<T>) -> Self {
        let Some((ptr, block)) = shared.parts() else {
            panic!("cannot observe an empty `Shared`");
        };
        unsafe { block.as_ref() }.inc_weak();

        Weak { ptr, block }
    }

    fn header(&self) -> &Header {
        unsafe { self.block.as_ref() }
    }

    /// Whether the object has been destroyed.
    pub fn expired(&self) -> bool {
        self.header().strong() == 0
    }

    /// Gets a new strong reference to the object, or an empty [`Shared`] if it is already gone.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::mem::drop;
    /// # use shareptr::Shared;
    /// let s = Shared::new(5);
    /// let w = s.downgrade();
    ///
    /// let l = w.lock();
    /// assert!(*l == 5);
    /// assert!(Shared::ptr_eq(&s, &l));
    /// assert!(s.use_count() == 2);
    ///
    /// drop(l);
    /// drop(s);
    /// assert!(w.expired());
    /// assert!(w.lock().is_empty());
    /// ```
    pub fn lock(&self) -> Shared<T> {
        self.upgrade().unwrap_or_default()
    }

    /// Like [`Weak::lock`], returning `None` instead of an empty `Shared`.
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let header = self.header();
        if header.strong() == 0 {
            return None;
        }
        header.inc_strong();

        Some(unsafe { Shared::from_parts(self.ptr, self.block) })
    }

    /// Number of strong pointers to the allocation; `0` once expired.
    pub fn use_count(&self) -> usize {
        self.header().strong()
    }

    /// Number of weak pointers to the allocation, including `self`.
    pub fn weak_count(&self) -> usize {
        self.header().weak()
    }

    /// Whether both weak pointers observe the same control block.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        unsafe { block::release_weak(self.block) }
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        self.header().inc_weak();

        Weak {
            ptr: self.ptr,
            block: self.block,
        }
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    fn from(value: &Shared<T>) -> Self {
        Self::new(value)
    }
}

impl<T> fmt::Debug for Weak<T>
where
    T: fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("Weak");
        if let Some(strong) = self.upgrade() {
            f.field(&&*strong);
        }
        f.finish()
    }
}

use std::{
    alloc::handle_alloc_error,
    fmt,
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::NonNull,
};

use crate::{
    alloc::{AllocError, Allocator, Global},
    block::{self, ExternalBlock, Header, InlineBlock},
    delete::{DefaultDelete, Deleter},
    weak::Weak,
};

/// A reference counted pointer, similar to [`Rc`], whose control block may come from a custom
/// allocator and may manage an object through a custom deleter.
///
/// A `Shared` is either empty or holds one strong reference to a control block. The object is
/// destroyed when the last strong reference goes away; the block is freed once no [`Weak`]
/// refers to it either.
///
/// [`Rc`]: std::rc::Rc
pub struct Shared<T: ?Sized> {
    inner: Option<Inner<T>>,
    _owns: PhantomData<T>,
}

struct Inner<T: ?Sized> {
    ptr: NonNull<T>,
    block: NonNull<Header>,
}

impl<T: ?Sized> Clone for Inner<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Inner<T> {}

impl<T> Shared<T> {
    /// Moves `value` into a new control block allocated from [`Global`].
    ///
    /// The value and the counts share one allocation.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shareptr::Shared;
    /// let s = Shared::new(5);
    /// assert!(*s == 5);
    /// assert!(s.use_count() == 1);
    /// ```
    pub fn new(value: T) -> Self {
        Self::new_in(value, Global)
    }

    /// Fallible form of [`Shared::new`].
    pub fn try_new(value: T) -> Result<Self, AllocError> {
        Self::try_new_in(value, Global)
    }

    /// Allocates a control block and constructs the value inside it by calling `init`.
    ///
    /// If `init` panics the block is freed and nothing is leaked.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shareptr::Shared;
    /// let s = Shared::new_with(|| vec![1, 2, 3]);
    /// assert!(s.len() == 3);
    /// ```
    pub fn new_with<F>(init: F) -> Self
    where
        F: FnOnce() -> T,
    {
        Self::new_with_in(init, Global)
    }

    /// Fallible form of [`Shared::new_with`].
    pub fn try_new_with<F>(init: F) -> Result<Self, AllocError>
    where
        F: FnOnce() -> T,
    {
        Self::try_new_with_in(init, Global)
    }

    /// Like [`Shared::new`], but the control block is allocated from `alloc`.
    ///
    /// Aborts through [`handle_alloc_error`] if the allocator fails; use [`Shared::try_new_in`]
    /// to handle the failure.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shareptr::{Global, Shared};
    /// let s = Shared::new_in(String::from("a"), Global);
    /// assert!(s.as_str() == "a");
    /// ```
    pub fn new_in<A>(value: T, alloc: A) -> Self
    where
        A: Allocator + 'static,
    {
        Self::new_with_in(|| value, alloc)
    }

    /// Fallible form of [`Shared::new_in`].
    pub fn try_new_in<A>(value: T, alloc: A) -> Result<Self, AllocError>
    where
        A: Allocator + 'static,
    {
        Self::try_new_with_in(|| value, alloc)
    }

    /// Like [`Shared::new_with`], with the control block allocated from `alloc`.
    pub fn new_with_in<F, A>(init: F, alloc: A) -> Self
    where
        F: FnOnce() -> T,
        A: Allocator + 'static,
    {
        match Self::try_new_with_in(init, alloc) {
            Ok(shared) => shared,
            Err(err) => handle_alloc_error(err.layout()),
        }
    }

    /// The most general constructor for inline blocks. All other `new` variants forward here.
    pub fn try_new_with_in<F, A>(init: F, alloc: A) -> Result<Self, AllocError>
    where
        F: FnOnce() -> T,
        A: Allocator + 'static,
    {
        let (block, ptr) = InlineBlock::<T, A>::allocate(init, alloc)?;

        Ok(unsafe { Self::from_parts(ptr, block) })
    }
}

impl<T: ?Sized> Shared<T> {
    /// Creates a `Shared` that owns nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shareptr::Shared;
    /// let s = Shared::<i32>::empty();
    /// assert!(s.is_empty());
    /// assert!(s.use_count() == 0);
    /// ```
    pub const fn empty() -> Self {
        Shared {
            inner: None,
            _owns: PhantomData,
        }
    }

    /// Takes ownership of a boxed value. The box's allocation is kept; only the control block is
    /// allocated.
    pub fn from_box(value: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(value)) }
    }

    /// Takes ownership of a pointer obtained from [`Box::into_raw`].
    ///
    /// A null pointer yields an empty `Shared` and allocates nothing.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::<T>::into_raw`, and must not be used by the caller
    /// afterwards.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self::from_raw_in(ptr, DefaultDelete, Global)
    }

    /// Takes ownership of `ptr`, to be destroyed by `deleter` once the last strong reference is
    /// gone.
    ///
    /// A null pointer yields an empty `Shared`; `deleter` is dropped without being called.
    ///
    /// # Safety
    ///
    /// Unless null, `ptr` must be valid for reads and writes until `deleter` is invoked on it, and
    /// nothing else may mutate or free the object in the meantime. Calling `deleter` with `ptr`
    /// exactly once must be sound.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shareptr::Shared;
    /// let raw = Box::into_raw(Box::new(7));
    /// let s = unsafe {
    ///     Shared::from_raw_with_deleter(raw, |p: *mut i32| drop(Box::from_raw(p)))
    /// };
    /// assert!(*s == 7);
    /// ```
    pub unsafe fn from_raw_with_deleter<D>(ptr: *mut T, deleter: D) -> Self
    where
        D: Deleter<T> + 'static,
    {
        Self::from_raw_in(ptr, deleter, Global)
    }

    /// Like [`Shared::from_raw_with_deleter`], with the control block allocated from `alloc`.
    ///
    /// # Safety
    ///
    /// See [`Shared::from_raw_with_deleter`].
    pub unsafe fn from_raw_in<D, A>(ptr: *mut T, deleter: D, alloc: A) -> Self
    where
        D: Deleter<T> + 'static,
        A: Allocator + 'static,
    {
        match Self::try_from_raw_in(ptr, deleter, alloc) {
            Ok(shared) => shared,
            Err(err) => handle_alloc_error(err.layout()),
        }
    }

    /// Fallible form of [`Shared::from_raw_in`].
    ///
    /// If the control block cannot be allocated, `deleter` is run on `ptr` before the error is
    /// returned, so the object is never leaked.
    ///
    /// # Safety
    ///
    /// See [`Shared::from_raw_with_deleter`].
    pub unsafe fn try_from_raw_in<D, A>(
        ptr: *mut T,
        deleter: D,
        alloc: A,
    ) -> Result<Self, AllocError>
    where
        D: Deleter<T> + 'static,
        A: Allocator + 'static,
    {
        let Some(ptr) = NonNull::new(ptr) else {
            return Ok(Self::empty());
        };
        let block = ExternalBlock::<T, D, A>::allocate(ptr, deleter, alloc)?;

        Ok(Self::from_parts(ptr, block))
    }

    /// # Safety
    ///
    /// The caller transfers one strong reference to `block` into the new `Shared`, and `ptr` must
    /// stay valid for as long as the block's object is alive.
    pub(crate) unsafe fn from_parts(ptr: NonNull<T>, block: NonNull<Header>) -> Self {
        Shared {
            inner: Some(Inner { ptr, block }),
            _owns: PhantomData,
        }
    }

    pub(crate) fn parts(&self) -> Option<(NonNull<T>, NonNull<Header>)> {
        self.inner.map(|inner| (inner.ptr, inner.block))
    }

    fn header(&self) -> Option<&Header> {
        self.inner.map(|inner| unsafe { inner.block.as_ref() })
    }

    /// Whether `self` owns nothing.
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Gets the number of strong pointers to this allocation, or `0` if `self` is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::mem::drop;
    /// # use shareptr::Shared;
    /// let s1 = Shared::new(5);
    /// assert!(s1.use_count() == 1);
    ///
    /// let s2 = s1.clone();
    /// assert!(s1.use_count() == 2);
    ///
    /// drop(s2);
    /// assert!(s1.use_count() == 1);
    /// ```
    pub fn use_count(&self) -> usize {
        self.header().map_or(0, Header::strong)
    }

    /// Gets the number of weak pointers to this allocation, or `0` if `self` is empty.
    pub fn weak_count(&self) -> usize {
        self.header().map_or(0, Header::weak)
    }

    /// Gets a reference to the object, or `None` if `self` is empty.
    pub fn get(&self) -> Option<&T> {
        self.inner.map(|inner| unsafe { inner.ptr.as_ref() })
    }

    /// Mutable access to the object, if `self` is the only handle to it (strong or weak).
    ///
    /// # Examples
    ///
    /// ```
    /// # use shareptr::Shared;
    /// let mut s = Shared::new(1);
    /// *s.get_mut().unwrap() += 1;
    /// assert!(*s == 2);
    ///
    /// let t = s.clone();
    /// assert!(s.get_mut().is_none());
    /// # drop(t);
    /// ```
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let header = self.header()?;
        if header.strong() != 1 || header.weak() != 0 {
            return None;
        }

        self.inner.map(|inner| unsafe { &mut *inner.ptr.as_ptr() })
    }

    /// Gets the cached pointer to the object, or `None` if `self` is empty.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.inner.map(|inner| inner.ptr)
    }

    /// Creates a new weak pointer to the allocation.
    ///
    /// # Panics
    ///
    /// Panics if `self` is empty; an observer needs a live owner to attach to.
    pub fn downgrade(&self) -> Weak<T> {
        Weak::new(self)
    }

    /// Gives up this strong reference, leaving `self` empty.
    pub fn reset(&mut self) {
        if let Some(inner) = self.inner.take() {
            unsafe { block::release_strong(inner.block) }
        }
    }

    /// Moves the reference out, leaving `self` empty. The counts do not change.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Exchanges the references held by `self` and `other`. The counts do not change.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other)
    }

    /// Whether both handles share a control block. Two empty handles are equal.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.inner.map(|inner| inner.block) == other.inner.map(|inner| inner.block)
    }

    /// Projects the handle onto something borrowed from the object, keeping the same control
    /// block. This is how a `Shared<T>` becomes a `Shared<dyn Trait>` or a pointer to one of the
    /// object's fields.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::fmt::Display;
    /// # use shareptr::Shared;
    /// let s = Shared::new(5);
    /// let d = Shared::map::<dyn Display, _>(s.clone(), |v| v);
    ///
    /// assert!(d.to_string() == "5");
    /// assert!(s.use_count() == 2);
    /// ```
    pub fn map<U, F>(this: Self, f: F) -> Shared<U>
    where
        T: 'static,
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        let Some(inner) = this.inner else {
            return Shared::empty();
        };
        let ptr = NonNull::from(f(unsafe { inner.ptr.as_ref() }));
        mem::forget(this);

        unsafe { Shared::from_parts(ptr, inner.block) }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        if let Some(header) = self.header() {
            header.inc_strong();
        }

        Shared {
            inner: self.inner,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        // the new reference is taken before the old one is released.
        let mut next = source.clone();
        self.swap(&mut next);
    }
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty `Shared`"),
        }
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T> fmt::Debug for Shared<T>
where
    T: fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("Shared(<empty>)"),
        }
    }
}

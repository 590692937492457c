use std::fmt;

/// Destroys an object managed through an external control block.
///
/// The deleter runs once, when the last [`Shared`] pointing at the block goes away. It receives
/// the pointer the block was created with and is responsible for both dropping the object and
/// releasing whatever memory holds it.
///
/// Any `FnMut(*mut T)` closure is a deleter.
///
/// [`Shared`]: crate::Shared
pub trait Deleter<T: ?Sized> {
    fn delete(&mut self, ptr: *mut T);
}

impl<T, F> Deleter<T> for F
where
    T: ?Sized,
    F: FnMut(*mut T),
{
    fn delete(&mut self, ptr: *mut T) {
        self(ptr)
    }
}

/// Reclaims a pointer obtained from [`Box::into_raw`].
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultDelete;

impl fmt::Debug for DefaultDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultDelete")
    }
}

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    fn delete(&mut self, ptr: *mut T) {
        // constructors taking a `DefaultDelete` require a pointer from `Box::into_raw`.
        drop(unsafe { Box::from_raw(ptr) });
    }
}

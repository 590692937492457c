//! Single threaded reference counted [`Shared`] and [`Weak`] pointers.
//!
//! The provided pointer types behave like [`std::rc::Rc`] and [`std::rc::Weak`]. The key
//! difference is the control block: it is type erased, so one `Shared<T>` type covers objects
//! stored in two different ways.
//!
//! - [`Shared::new`] and friends store the object inline with the counts, in a single allocation
//!   obtained from any [`Allocator`].
//! - [`Shared::from_raw_in`] and friends manage an object that was allocated elsewhere. The
//!   object is destroyed by a [`Deleter`] and only the control block comes from the allocator.
//!
//! Either way the object is dropped as soon as the last `Shared` goes away, and the control block
//! is freed once the last `Weak` goes away as well. A `Weak` can be [locked][Weak::lock] into a
//! new `Shared` for as long as the object is alive.
//!
//! Reference counts are not atomic. Neither pointer type is [`Send`] or [`Sync`].
//!
//! ```
//! # use std::mem::drop;
//! # use shareptr::Shared;
//! let a = Shared::new(42);
//! let b = a.clone();
//! let w = b.downgrade();
//! assert!(a.use_count() == 2);
//!
//! drop(a);
//! drop(b);
//! assert!(w.expired());
//! ```

mod alloc;
mod block;
mod delete;
#[cfg(feature = "pool")]
mod pool;
mod shared;
mod weak;

pub use crate::alloc::{AllocError, Allocator, Global};
pub use crate::delete::{DefaultDelete, Deleter};
#[cfg(feature = "pool")]
pub use crate::pool::Pool;
pub use crate::shared::Shared;
pub use crate::weak::Weak;

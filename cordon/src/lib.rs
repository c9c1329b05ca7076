/*
   cordon, a disjunction-partitioned cycle-tracking garbage collector.
   Copyright (C) 2026 cordon contributors.

   This program is free software: you can redistribute it and/or modify
   it under the terms of the GNU General Public License as published by
   the Free Software Foundation, either version 3 of the License, or
   (at your option) any later version.

   This program is distributed in the hope that it will be useful,
   but WITHOUT ANY WARRANTY; without even the implied warranty of
   MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
   GNU General Public License for more details.

   You should have received a copy of the GNU General Public License
   along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! `cordon`, a tracing garbage collector partitioned into isolated
//! collection arenas ("disjunctions"), designed to coexist with
//! deterministic reference counting.
//!
//! Most of what makes `cordon` different from a plain `Rc`/`Arc` is that a
//! [`Gc`](gc::Gc) pointer may participate in a reference cycle without
//! leaking: acyclic garbage is reclaimed the moment its reference count hits
//! zero, and cyclic garbage is reclaimed by an occasional stop-the-world
//! mark-and-sweep pass, restricted to a single **disjunction** — a closed
//! sub-universe of allocations that only ever point at each other.
//!
//! # Module structure
//!
//! - [`disjoint`] is the collection engine: the object registry, root set,
//!   action caches, and the mark-sweep algorithm, all scoped to one
//!   disjunction.
//! - [`handle`] is the shared/weak ownership pair for an entire disjunction,
//!   with `Arc`/`Weak`-like lock/upgrade semantics.
//! - [`container`] is the process-wide registry of every live disjunction,
//!   plus the thread-local notion of "my current disjunction" and the
//!   background collector thread.
//! - [`gc`] is the user-facing smart pointer, [`Gc`](gc::Gc).
//!
//! # Example
//!
//! ```
//! use cordon::{gc::Gc, Collectable};
//! use std::cell::RefCell;
//!
//! #[derive(Collectable)]
//! struct Node {
//!     next: RefCell<Option<Gc<Node>>>,
//! }
//!
//! let a = Gc::new(Node { next: RefCell::new(None) });
//! *a.next.borrow_mut() = Some(a.clone());
//! drop(a); // cyclic, but reclaimed on the next collection
//! cordon::container::local().module().blocking_collect();
//! ```
//!
//! # Optional features
//!
//! `derive` (default) re-exports `#[derive(Collectable)]` from
//! `cordon_derive`. `diagnostics` exposes read-only introspection over a
//! disjunction's internal counters, useful for tests and the bench crate.

#![warn(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions, clippy::result_unit_err)]

use std::{
    fmt,
    mem::{size_of, MaybeUninit},
    ptr::{addr_of, addr_of_mut, copy_nonoverlapping, NonNull},
};

mod error;
mod impls;

pub mod container;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod disjoint;
pub mod gc;
pub mod handle;

pub use error::DisjunctionViolation;
pub use gc::Gc;

// Re-export #[derive(Collectable)].
#[cfg(feature = "derive")]
extern crate cordon_derive;

/// Derive macro available if `cordon` is built with `features = ["derive"]`.
#[cfg(feature = "derive")]
pub use cordon_derive::Collectable;

/// The trait every garbage-collectable type must implement.
///
/// This should usually be implemented with `#[derive(Collectable)]`. Only
/// types that store garbage-collected pointers behind raw pointers or other
/// unsafe machinery need a manual implementation.
///
/// # Safety
///
/// An incorrect implementation causes the collector to under-count or
/// mis-route outgoing edges, which leads to use-after-free or premature
/// reclamation. Both [`Collectable::route_immutable`] and
/// [`Collectable::route_mutable`] must enumerate every [`Gc`] this value
/// transitively owns, exactly once per call, for the collector to remain
/// sound.
pub unsafe trait Collectable {
    /// Enumerate every outgoing arc owned by this value, regardless of
    /// whether it sits behind interior mutability.
    ///
    /// Used by the mark phase of a collection: this must visit *every* arc,
    /// since marking must see the whole graph.
    fn route_immutable(&self, visitor: &mut dyn Visitor);

    /// Enumerate only the arcs the collector can assume are stable for the
    /// duration of phase-1 unrooting: those embedded directly in this
    /// value, not reachable only through some interior-mutability wrapper
    /// that a mutator could repoint before the mark phase runs.
    ///
    /// The default forwards to
    /// [`route_immutable`](Collectable::route_immutable), which is correct
    /// for a leaf type with no wrapped fields of its own. Wrapper types
    /// that introduce an interior-mutability boundary (see `impls.rs`)
    /// override this to report nothing, since their contents cannot be
    /// trusted not to change out from under an in-progress collection;
    /// `#[derive(Collectable)]` generates a `route_mutable` that forwards
    /// to each field's own `route_mutable` rather than relying on this
    /// default, so a wrapped field's override still takes effect.
    fn route_mutable(&self, visitor: &mut dyn Visitor) {
        self.route_immutable(visitor);
    }
}

/// A visitor for the arcs discovered while routing a [`Collectable`] value.
///
/// Implementors of [`Collectable`] never need to write their own visitor;
/// `cordon`'s collection engine supplies the ones it needs internally.
pub trait Visitor {
    /// Visit one outgoing arc slot.
    fn visit_slot(&mut self, slot: disjoint::SlotAddr);
}

#[repr(align(16))]
#[repr(C)]
#[derive(Clone, Copy)]
/// A pointer to a managed allocation, extracted out as raw data.
///
/// Holds both the pointer and its metadata behind an unknown
/// interpretation, so the object registry can store pointers to
/// allocations of arbitrary, even `?Sized`, types in one homogeneous list.
/// We trust that all pointers (even to `dyn` types) fit in two words.
pub(crate) struct ErasedPtr([usize; 2]);

impl ErasedPtr {
    /// Construct a new erased pointer from a reference.
    ///
    /// # Panics
    ///
    /// Panics if the size of a pointer to `T` exceeds the size of an
    /// `ErasedPtr`. No pointer type known to us has this property.
    pub(crate) fn new<T: ?Sized>(reference: NonNull<T>) -> ErasedPtr {
        let mut ptr = ErasedPtr([0; 2]);
        let ptr_size = size_of::<NonNull<T>>();
        assert!(
            ptr_size <= size_of::<ErasedPtr>(),
            "pointers to T are too big for storage"
        );
        unsafe {
            // SAFETY: `ptr.0` has at least `ptr_size` bytes, and `reference`
            // has exactly `ptr_size` bytes.
            copy_nonoverlapping(
                addr_of!(reference).cast::<u8>(),
                addr_of_mut!(ptr.0).cast::<u8>(),
                ptr_size,
            );
        }
        ptr
    }

    /// Recover a pointer of a particular type from this erased pointer.
    ///
    /// # Safety
    ///
    /// `T` must be the same type this pointer was constructed with via
    /// [`ErasedPtr::new`].
    pub(crate) unsafe fn specify<T: ?Sized>(self) -> NonNull<T> {
        let mut box_ref: MaybeUninit<NonNull<T>> = MaybeUninit::zeroed();
        copy_nonoverlapping(
            addr_of!(self.0).cast::<u8>(),
            addr_of_mut!(box_ref).cast::<u8>(),
            size_of::<NonNull<T>>(),
        );
        box_ref.assume_init()
    }
}

impl fmt::Debug for ErasedPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErasedPtr({:x?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        alloc::{dealloc, Layout},
        mem::align_of,
    };

    use super::*;

    #[test]
    fn erased_align() {
        assert_eq!(align_of::<ErasedPtr>(), 16);
    }

    #[test]
    fn erased_alloc() {
        let orig_ptr = Box::leak(Box::new(7u8));
        let erased_ptr = ErasedPtr::new(NonNull::from(orig_ptr));

        unsafe {
            let remade_ptr = erased_ptr.specify::<u8>();
            dealloc(remade_ptr.as_ptr(), Layout::for_value(remade_ptr.as_ref()));
        }
    }
}

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

//! [`Gc`], the user-facing managed pointer.

use std::{cell::Cell, fmt, ops::Deref, ptr::NonNull};

use crate::{
    disjoint::{route_fn_for, DisjointModule, DisjunctionTag, Record, Slot},
    handle::DisjunctionHandle,
    Collectable, DisjunctionViolation, ErasedPtr,
};

/// A managed pointer into a disjunction.
///
/// `Gc<T>` behaves like `Rc<T>`: cloning it is cheap, dereferencing it
/// borrows the pointee, and dropping the last clone eventually frees it.
/// Unlike `Rc<T>`, `Gc<T>` may form a reference cycle without leaking —
/// cyclic garbage is reclaimed the next time its disjunction collects.
///
/// Every `Gc<T>` belongs to exactly one disjunction (see
/// [`crate::container`]), fixed at construction. Repointing one `Gc<T>`
/// at a value owned by a different disjunction is rejected with
/// [`DisjunctionViolation`] rather than silently creating a cross-arena
/// pointer, since the collector relies on disjunctions being closed
/// sub-universes.
pub struct Gc<T: Collectable + ?Sized> {
    slot: NonNull<Slot>,
    disjunction: DisjunctionHandle,
    _marker: std::marker::PhantomData<T>,
}

unsafe impl<T: Collectable + ?Sized + Sync> Sync for Gc<T> {}
unsafe impl<T: Collectable + ?Sized + Send + Sync> Send for Gc<T> {}

impl<T: Collectable + 'static> Gc<T> {
    /// Allocate `value` in the calling thread's current disjunction (see
    /// [`crate::container::local`]).
    #[must_use]
    pub fn new(value: T) -> Gc<T> {
        Gc::new_in(value, crate::container::local())
    }

    /// Allocate `value` in a specific disjunction.
    #[must_use]
    pub fn new_in(value: T, disjunction: DisjunctionHandle) -> Gc<T> {
        let tag = disjunction.tag();
        let module = disjunction.module();
        let slot = alloc_slot(tag);

        let obj = ErasedPtr::new(NonNull::from(Box::leak(Box::new(value))));
        let record = Box::new(Record::new(
            obj,
            destroy_thunk::<T>,
            deallocate_thunk::<T>,
            route_fn_for::<T>(),
            tag,
        ));
        unsafe {
            module.create_bind_new(slot, record);
        }
        Gc {
            slot,
            disjunction,
            _marker: std::marker::PhantomData,
        }
    }

    /// Allocate `value` in `disjunction` via a fallible constructor,
    /// forcing a collection and retrying once if the disjunction's
    /// [`CollectionStrategy::ALLOCFAIL`](crate::disjoint::CollectionStrategy::ALLOCFAIL)
    /// strategy bit is set and the first attempt reports exhaustion.
    ///
    /// Plain [`Gc::new`]/[`Gc::new_in`] never observe an allocation
    /// failure in practice, since the global allocator aborts rather than
    /// returning an error; this entry point exists for callers who
    /// construct the value through a fallible path (e.g. a custom
    /// allocator) and want the collect-and-retry policy applied
    /// uniformly.
    pub fn try_new_in<F>(disjunction: DisjunctionHandle, mut alloc: F) -> Option<Gc<T>>
    where
        F: FnMut() -> Option<T>,
    {
        if let Some(value) = alloc() {
            return Some(Gc::new_in(value, disjunction));
        }
        if disjunction
            .module()
            .strategy()
            .contains(crate::disjoint::CollectionStrategy::ALLOCFAIL)
        {
            disjunction.module().blocking_collect();
            return alloc().map(|value| Gc::new_in(value, disjunction));
        }
        None
    }
}

impl<T: Collectable + ?Sized> Gc<T> {
    /// Whether two `Gc`s point at the same allocation.
    #[must_use]
    pub fn ptr_eq(a: &Gc<T>, b: &Gc<T>) -> bool {
        unsafe { a.slot.as_ref().target.get() == b.slot.as_ref().target.get() }
    }

    /// The disjunction this pointer belongs to.
    #[must_use]
    pub fn disjunction(&self) -> DisjunctionHandle {
        self.disjunction.clone()
    }

    fn module(&self) -> &DisjointModule {
        self.disjunction.module()
    }

    /// Repoint `self` at `other`'s current target.
    ///
    /// # Errors
    /// Returns [`DisjunctionViolation`] and leaves `self` unchanged if
    /// `other` belongs to a different disjunction than `self`.
    pub fn repoint(&mut self, other: &Gc<T>) -> Result<(), DisjunctionViolation> {
        unsafe { self.module().repoint(self.slot, other.slot) }
    }

    /// Repoint `self` at nothing.
    pub fn clear(&mut self) {
        unsafe { self.module().repoint_null(self.slot) }
    }

    /// Swap the targets of `self` and `other` without touching either
    /// value's reference count.
    ///
    /// # Errors
    /// Returns [`DisjunctionViolation`] and leaves both pointers unchanged
    /// if the swap would aim either pointer at a record from a different
    /// disjunction (only possible if `self` and `other` belong to
    /// different disjunctions to begin with).
    pub fn swap(&mut self, other: &mut Gc<T>) -> Result<(), DisjunctionViolation> {
        unsafe { self.module().repoint_swap(self.slot, other.slot) }
    }
}

impl<T: Collectable + ?Sized> Deref for Gc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        let target = unsafe { self.slot.as_ref() }
            .target
            .get()
            .expect("dereferenced a Gc pointing at nothing");
        unsafe { target.as_ref().obj().specify::<T>().as_ref() }
    }
}

impl<T: Collectable + ?Sized> Clone for Gc<T> {
    fn clone(&self) -> Gc<T> {
        let tag = self.disjunction.tag();
        let slot = alloc_slot(tag);
        unsafe {
            self.module()
                .create_alias(slot, self.slot)
                .expect("cloning a Gc never crosses disjunctions");
        }
        Gc {
            slot,
            disjunction: self.disjunction.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Collectable + ?Sized> Drop for Gc<T> {
    fn drop(&mut self) {
        unsafe {
            self.module().destroy(self.slot);
            drop(Box::from_raw(self.slot.as_ptr()));
        }
    }
}

impl<T: Collectable + ?Sized + fmt::Debug> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        T::fmt(self, f)
    }
}

impl<T: Collectable + ?Sized + fmt::Display> fmt::Display for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        T::fmt(self, f)
    }
}

unsafe impl<T: Collectable + ?Sized> Collectable for Gc<T> {
    fn route_immutable(&self, visitor: &mut dyn crate::Visitor) {
        visitor.visit_slot(self.slot);
    }
}

fn alloc_slot(tag: DisjunctionTag) -> NonNull<Slot> {
    NonNull::from(Box::leak(Box::new(Slot {
        target: Cell::new(None),
        tag,
    })))
}

/// # Safety
/// `ptr` must have been produced by [`ErasedPtr::new`] from a `Box<T>`
/// whose value has not yet been dropped.
unsafe fn destroy_thunk<T: ?Sized>(ptr: ErasedPtr) {
    let specified: NonNull<T> = ptr.specify();
    std::ptr::drop_in_place(specified.as_ptr());
}

/// # Safety
/// `ptr` must have already had its value destroyed via
/// [`destroy_thunk`], and must have originally been produced by
/// [`ErasedPtr::new`] from a `Box<T>`. Only frees memory; does not run
/// `T`'s destructor again (mirroring `Box<T>`'s own drop glue, which
/// likewise computes the layout from a reference before deallocating).
unsafe fn deallocate_thunk<T: ?Sized>(ptr: ErasedPtr) {
    let specified: NonNull<T> = ptr.specify();
    let layout = std::alloc::Layout::for_value(specified.as_ref());
    if layout.size() != 0 {
        std::alloc::dealloc(specified.as_ptr().cast::<u8>(), layout);
    }
}

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

//! Implementations of [`Collectable`] for common standard library types.

use std::{
    cell::RefCell,
    collections::{BinaryHeap, HashSet, LinkedList, VecDeque},
    sync::atomic::{
        AtomicBool, AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicIsize, AtomicU16, AtomicU32,
        AtomicU64, AtomicU8, AtomicUsize,
    },
};

use parking_lot::Mutex as ParkingMutex;

use super::Collectable;
use crate::Visitor;

unsafe impl<T> Collectable for &T {
    #[inline]
    fn route_immutable(&self, _visitor: &mut dyn Visitor) {}
}

/// `RefCell` is the canonical interior-mutability boundary: its contents can
/// be swapped out for an unrelated value between collections, so only
/// `route_immutable` (used for marking, which always runs against a
/// momentarily-frozen snapshot) may recurse into it. `route_mutable` (used
/// for phase-1 unrooting) must not assume the borrowed content is stable,
/// and reports no arcs of its own — the arcs it may currently hold are
/// still reachable via `route_immutable` during marking.
unsafe impl<T: Collectable + ?Sized> Collectable for RefCell<T> {
    #[inline]
    fn route_immutable(&self, visitor: &mut dyn Visitor) {
        self.borrow().route_immutable(visitor);
    }

    #[inline]
    fn route_mutable(&self, _visitor: &mut dyn Visitor) {}
}

/// Same reasoning as `RefCell`: a `parking_lot::Mutex` can be repointed by
/// another thread between the unrooting pass and the mark pass, so it must
/// not be treated as a stable arc for phase-1 purposes.
unsafe impl<T: Collectable + ?Sized> Collectable for ParkingMutex<T> {
    #[inline]
    fn route_immutable(&self, visitor: &mut dyn Visitor) {
        self.lock().route_immutable(visitor);
    }

    #[inline]
    fn route_mutable(&self, _visitor: &mut dyn Visitor) {}
}

unsafe impl<T: Collectable> Collectable for Option<T> {
    #[inline]
    fn route_immutable(&self, visitor: &mut dyn Visitor) {
        if let Some(v) = self {
            v.route_immutable(visitor);
        }
    }

    #[inline]
    fn route_mutable(&self, visitor: &mut dyn Visitor) {
        if let Some(v) = self {
            v.route_mutable(visitor);
        }
    }
}

unsafe impl<T: Collectable, E: Collectable> Collectable for Result<T, E> {
    #[inline]
    fn route_immutable(&self, visitor: &mut dyn Visitor) {
        match self {
            Ok(v) => v.route_immutable(visitor),
            Err(e) => e.route_immutable(visitor),
        }
    }

    #[inline]
    fn route_mutable(&self, visitor: &mut dyn Visitor) {
        match self {
            Ok(v) => v.route_mutable(visitor),
            Err(e) => e.route_mutable(visitor),
        }
    }
}

/// Implement [`Collectable`] for a sequence type with `iter()`.
macro_rules! collectable_collection_impl {
    ($x: ty) => {
        unsafe impl<T: Collectable> Collectable for $x {
            #[inline]
            fn route_immutable(&self, visitor: &mut dyn Visitor) {
                self.iter().for_each(|elem| elem.route_immutable(visitor));
            }

            #[inline]
            fn route_mutable(&self, visitor: &mut dyn Visitor) {
                self.iter().for_each(|elem| elem.route_mutable(visitor));
            }
        }
    };
}

collectable_collection_impl!(Vec<T>);
collectable_collection_impl!(VecDeque<T>);
collectable_collection_impl!(LinkedList<T>);
collectable_collection_impl!([T]);

/// Implement [`Collectable`] for a set-like type with `iter()`.
macro_rules! collectable_set_impl {
    ($x: ty) => {
        unsafe impl<T: Collectable> Collectable for $x {
            #[inline]
            fn route_immutable(&self, visitor: &mut dyn Visitor) {
                self.iter().for_each(|elem| elem.route_immutable(visitor));
            }

            #[inline]
            fn route_mutable(&self, visitor: &mut dyn Visitor) {
                self.iter().for_each(|elem| elem.route_mutable(visitor));
            }
        }
    };
}

collectable_set_impl!(HashSet<T>);
collectable_set_impl!(BinaryHeap<T>);

/// Implement [`Collectable`] for a type with no outgoing arcs at all.
macro_rules! collectable_trivial_impl {
    ($x: ty) => {
        unsafe impl Collectable for $x {
            #[inline]
            fn route_immutable(&self, _visitor: &mut dyn Visitor) {}
        }
    };
}

collectable_trivial_impl!(());
collectable_trivial_impl!(bool);
collectable_trivial_impl!(char);
collectable_trivial_impl!(String);

collectable_trivial_impl!(u8);
collectable_trivial_impl!(u16);
collectable_trivial_impl!(u32);
collectable_trivial_impl!(u64);
collectable_trivial_impl!(u128);
collectable_trivial_impl!(usize);

collectable_trivial_impl!(i8);
collectable_trivial_impl!(i16);
collectable_trivial_impl!(i32);
collectable_trivial_impl!(i64);
collectable_trivial_impl!(i128);
collectable_trivial_impl!(isize);

collectable_trivial_impl!(f32);
collectable_trivial_impl!(f64);

collectable_trivial_impl!(AtomicBool);
collectable_trivial_impl!(AtomicUsize);
collectable_trivial_impl!(AtomicIsize);
collectable_trivial_impl!(AtomicU8);
collectable_trivial_impl!(AtomicU16);
collectable_trivial_impl!(AtomicU32);
collectable_trivial_impl!(AtomicU64);
collectable_trivial_impl!(AtomicI8);
collectable_trivial_impl!(AtomicI16);
collectable_trivial_impl!(AtomicI32);
collectable_trivial_impl!(AtomicI64);

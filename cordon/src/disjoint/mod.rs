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

//! The disjoint module: one independent collection arena ("disjunction").
//!
//! A disjoint module owns an object registry ([`list::ObjList`]), a root
//! set, several action caches used while a collection is in progress, the
//! identity of the current collector thread, and an ignore-counter. It
//! implements every mutator operation in spec §4.1 and the `collect`
//! algorithm in spec §4.2.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::Visitor;

mod list;
mod module;

pub(crate) use list::Record;
pub(crate) use module::route_fn_for;
pub use module::{CollectionStrategy, DisjointModule};

/// An opaque token identifying the disjoint module an object or slot
/// belongs to. Immutable once captured; compared only by address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct DisjunctionTag(pub(crate) NonNull<()>);

unsafe impl Send for DisjunctionTag {}
unsafe impl Sync for DisjunctionTag {}

/// Which variant of the router contract is being invoked.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum RouteMode {
    /// Visits every outgoing arc. Used by the mark phase.
    Immutable,
    /// Visits only arcs that are stable for the duration of unrooting —
    /// those not reachable solely through an interior-mutability wrapper.
    /// Used by phase-1 unrooting.
    Mutable,
}

/// A type-erased router thunk, monomorphized once per concrete type at
/// registration time.
pub(crate) type ErasedRouteFn = unsafe fn(crate::ErasedPtr, &mut dyn Visitor, RouteMode);

/// The conceptual container holding one edge from some enclosing structure
/// to an object record: an arc slot.
///
/// The core never allocates a `Slot` — that is the external interface's
/// job (see [`crate::gc::Gc`]) — it only reads and repoints the `target`
/// field through a [`SlotAddr`].
pub(crate) struct Slot {
    /// The record this slot currently points at, or `None`.
    pub(crate) target: Cell<Option<NonNull<Record>>>,
    /// The disjunction this slot was created in. Immutable for the slot's
    /// lifetime.
    pub(crate) tag: DisjunctionTag,
}

/// The address of an arc slot, used as the key for the root set and every
/// action cache.
pub type SlotAddr = NonNull<Slot>;

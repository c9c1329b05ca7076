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

//! Read-only introspection into a disjunction's internal counters.
//!
//! Gated behind the `diagnostics` feature: useful for tests and the bench
//! crate, but not part of the stable contract most consumers should
//! depend on.

use crate::handle::DisjunctionHandle;

/// A snapshot of one disjoint module's internal bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleCounts {
    /// Records currently linked into the registry.
    pub registered: usize,
    /// Slots currently in the root set.
    pub roots: usize,
    /// Records awaiting registration, pending the collector's exit.
    pub add_cache: usize,
    /// Records whose reference count reached zero during an in-progress
    /// collection, awaiting resolution.
    pub ref_count_del_cache: usize,
    /// Whether a collection is currently in progress on this module.
    pub collecting: bool,
}

/// Snapshot `disjunction`'s internal counters.
#[must_use]
pub fn inspect(disjunction: &DisjunctionHandle) -> ModuleCounts {
    disjunction.module().diagnostics()
}

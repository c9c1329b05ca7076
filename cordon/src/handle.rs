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

//! The shared/weak ownership pair for a whole disjunction.
//!
//! [`DisjunctionHandle`] and [`WeakDisjunctionHandle`] behave like
//! `Arc`/`Weak`, except the strong and weak counts that would ordinarily be
//! two separate atomics are packed into one [`AtomicU64`] tag word so that
//! every transition — incrementing a count, or upgrading a weak handle
//! into a strong one — is a single read-modify-write, with no window in
//! which a concurrent reader can observe a torn, inconsistent
//! strong/weak pair.

use std::{
    ptr::NonNull,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::disjoint::DisjointModule;

const STRONG_BITS: u32 = 32;

const STRONG_SHIFT: u32 = 0;
const WEAK_SHIFT: u32 = STRONG_BITS;

const STRONG_MASK: u64 = (1 << STRONG_BITS) - 1;
const WEAK_MASK: u64 = u64::MAX >> STRONG_BITS;

#[inline]
fn strong_of(tag: u64) -> u64 {
    (tag >> STRONG_SHIFT) & STRONG_MASK
}

#[inline]
fn weak_of(tag: u64) -> u64 {
    (tag >> WEAK_SHIFT) & WEAK_MASK
}

#[inline]
fn pack(strong: u64, weak: u64) -> u64 {
    (strong << STRONG_SHIFT) | (weak << WEAK_SHIFT)
}

/// The heap allocation shared by every strong and weak handle to one
/// disjunction.
struct HandleData {
    /// Packed `(strong, weak)` tag word. `strong` is the number of live
    /// [`DisjunctionHandle`]s; `weak` is the number of live
    /// [`WeakDisjunctionHandle`]s plus one while `strong > 0` (the implicit
    /// weak reference every strong handle set holds on the allocation).
    tag: AtomicU64,
    /// Set, with `Release`, once the last strong handle has finished its
    /// final collection and emptiness check. A weak handle that is about to
    /// free `HandleData` because it observes `strong == 0` and itself holds
    /// the last weak reference must spin-wait (`Acquire`) on this flag
    /// first: the strong dropper's CAS publishes `strong == 0` before it is
    /// done touching `module`, so without this flag a racing weak drop
    /// could free the allocation out from under it.
    destroyed: AtomicBool,
    module: DisjointModule,
}

/// A strong handle to a disjunction: while at least one of these is alive,
/// the disjunction's module — its registry, root set, and action caches —
/// is guaranteed to exist.
pub struct DisjunctionHandle {
    data: NonNull<HandleData>,
}

/// A non-owning handle to a disjunction that does not keep its module
/// alive.
///
/// [`WeakDisjunctionHandle::upgrade`] produces a [`DisjunctionHandle`] only
/// if the disjunction has not yet been torn down (its registry and root
/// set empty, its last strong handle dropped).
pub struct WeakDisjunctionHandle {
    data: NonNull<HandleData>,
}

unsafe impl Send for DisjunctionHandle {}
unsafe impl Sync for DisjunctionHandle {}
unsafe impl Send for WeakDisjunctionHandle {}
unsafe impl Sync for WeakDisjunctionHandle {}

impl DisjunctionHandle {
    /// Create a new disjunction with a single strong handle.
    #[must_use]
    pub fn new() -> DisjunctionHandle {
        let data = Box::leak(Box::new(HandleData {
            tag: AtomicU64::new(pack(1, 1)),
            destroyed: AtomicBool::new(false),
            module: DisjointModule::new(),
        }));
        DisjunctionHandle {
            data: NonNull::from(data),
        }
    }

    /// The module this handle owns.
    #[must_use]
    pub fn module(&self) -> &DisjointModule {
        &unsafe { self.data.as_ref() }.module
    }

    /// An opaque, address-based identity for this disjunction, stable for
    /// as long as any handle (strong or weak) to it is alive.
    #[must_use]
    pub(crate) fn tag(&self) -> crate::disjoint::DisjunctionTag {
        crate::disjoint::DisjunctionTag(self.data.cast())
    }

    /// Derive a weak handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakDisjunctionHandle {
        let data = unsafe { self.data.as_ref() };
        let mut current = data.tag.load(Ordering::Relaxed);
        loop {
            let next = pack(strong_of(current), weak_of(current) + 1);
            match data.tag.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        WeakDisjunctionHandle { data: self.data }
    }
}

impl std::fmt::Debug for DisjunctionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = unsafe { self.data.as_ref() }.tag.load(Ordering::Relaxed);
        f.debug_struct("DisjunctionHandle")
            .field("strong", &strong_of(tag))
            .field("weak", &weak_of(tag))
            .finish()
    }
}

impl std::fmt::Debug for WeakDisjunctionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = unsafe { self.data.as_ref() }.tag.load(Ordering::Relaxed);
        f.debug_struct("WeakDisjunctionHandle")
            .field("strong", &strong_of(tag))
            .field("weak", &weak_of(tag))
            .finish()
    }
}

impl Default for DisjunctionHandle {
    fn default() -> DisjunctionHandle {
        DisjunctionHandle::new()
    }
}

impl Clone for DisjunctionHandle {
    fn clone(&self) -> DisjunctionHandle {
        let data = unsafe { self.data.as_ref() };
        let mut current = data.tag.load(Ordering::Relaxed);
        loop {
            let next = pack(strong_of(current) + 1, weak_of(current));
            match data.tag.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        DisjunctionHandle { data: self.data }
    }
}

impl Drop for DisjunctionHandle {
    fn drop(&mut self) {
        let data = unsafe { self.data.as_ref() };
        let mut current = data.tag.load(Ordering::Relaxed);
        loop {
            let new_strong = strong_of(current) - 1;
            // Dropping the last strong handle also releases the implicit
            // weak reference it held on the allocation.
            let new_weak = if new_strong == 0 {
                weak_of(current) - 1
            } else {
                weak_of(current)
            };
            let next = pack(new_strong, new_weak);
            match data.tag.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if new_strong == 0 {
                        data.module.blocking_collect();
                        if !data.module.is_empty() {
                            tracing::error!(
                                "disjunction torn down with live registrations or roots; aborting"
                            );
                            std::process::abort();
                        }
                        data.destroyed.store(true, Ordering::Release);
                        if new_weak == 0 {
                            drop(unsafe { Box::from_raw(self.data.as_ptr()) });
                        }
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }
}

impl WeakDisjunctionHandle {
    /// Attempt to produce a strong handle. Fails if the disjunction's last
    /// strong handle has already been dropped.
    ///
    /// `self` itself already holds one count in the weak field for the
    /// duration of this call, so the allocation cannot be freed out from
    /// under the read-modify-write loop below even if some other thread
    /// drops the last strong handle concurrently.
    #[must_use]
    pub fn upgrade(&self) -> Option<DisjunctionHandle> {
        let data = unsafe { self.data.as_ref() };
        let mut current = data.tag.load(Ordering::Relaxed);
        loop {
            if strong_of(current) == 0 {
                return None;
            }
            let next = pack(strong_of(current) + 1, weak_of(current));
            match data.tag.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(DisjunctionHandle { data: self.data }),
                Err(actual) => current = actual,
            }
        }
    }

    /// Whether this disjunction's last strong handle has already dropped.
    ///
    /// This load only needs [`Ordering::Acquire`]: the caller is merely
    /// deciding whether to attempt an upgrade (which itself performs a
    /// full `AcqRel` read-modify-write), not relying on this read to
    /// establish a happens-before edge with the data the disjunction owns.
    #[must_use]
    pub fn expired(&self) -> bool {
        let data = unsafe { self.data.as_ref() };
        strong_of(data.tag.load(Ordering::Acquire)) == 0
    }
}

impl Clone for WeakDisjunctionHandle {
    fn clone(&self) -> WeakDisjunctionHandle {
        let data = unsafe { self.data.as_ref() };
        let mut current = data.tag.load(Ordering::Relaxed);
        loop {
            let next = pack(strong_of(current), weak_of(current) + 1);
            match data.tag.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        WeakDisjunctionHandle { data: self.data }
    }
}

impl Drop for WeakDisjunctionHandle {
    fn drop(&mut self) {
        let data = unsafe { self.data.as_ref() };
        let mut current = data.tag.load(Ordering::Relaxed);
        loop {
            let new_weak = weak_of(current) - 1;
            let next = pack(strong_of(current), new_weak);
            match data.tag.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if strong_of(current) == 0 && new_weak == 0 {
                        while !data.destroyed.load(Ordering::Acquire) {
                            std::hint::spin_loop();
                        }
                        drop(unsafe { Box::from_raw(self.data.as_ptr()) });
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_handle_has_single_strong_reference() {
        let handle = DisjunctionHandle::new();
        let weak = handle.downgrade();
        assert!(weak.upgrade().is_some());
    }

    #[test]
    fn expires_after_last_strong_drop() {
        let handle = DisjunctionHandle::new();
        let weak = handle.downgrade();
        drop(handle);
        assert!(weak.expired());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn clone_keeps_disjunction_alive() {
        let a = DisjunctionHandle::new();
        let b = a.clone();
        let weak = a.downgrade();
        drop(a);
        assert!(!weak.expired());
        drop(b);
        assert!(weak.expired());
    }
}

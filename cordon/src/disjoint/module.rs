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

//! The disjoint module engine: mutator operations (spec §4.1) and the
//! stop-the-world `collect()` algorithm (spec §4.2).

use std::{
    cell::UnsafeCell,
    collections::{HashMap, HashSet},
    ptr::NonNull,
    sync::atomic::{AtomicU64, AtomicU8, Ordering},
    thread::ThreadId,
    time::Duration,
};

use parking_lot::Mutex;

use super::{list::ObjList, ErasedRouteFn, Record, RouteMode, SlotAddr};
use crate::{DisjunctionViolation, ErasedPtr, Visitor};

/// The auto-collect tactics a disjoint module follows.
///
/// A bit-set: `TIMED` means the background thread sweeps this module on its
/// regular schedule; `ALLOCFAIL` means the external `Gc::new` should retry
/// once after a failed allocation by forcing a collection first. Neither bit
/// set (`MANUAL`) means nothing but an explicit `collect()`/
/// `blocking_collect()` call ever runs this module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionStrategy(u8);

impl CollectionStrategy {
    /// No automatic collection.
    pub const MANUAL: CollectionStrategy = CollectionStrategy(0);
    /// The background thread periodically collects this module.
    pub const TIMED: CollectionStrategy = CollectionStrategy(1 << 0);
    /// `Gc::new` collects and retries once after an allocation failure.
    pub const ALLOCFAIL: CollectionStrategy = CollectionStrategy(1 << 1);

    fn bits(self) -> u8 {
        self.0
    }

    fn from_bits(bits: u8) -> CollectionStrategy {
        CollectionStrategy(bits)
    }

    /// Whether this strategy includes every bit of `other`.
    #[must_use]
    pub fn contains(self, other: CollectionStrategy) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CollectionStrategy {
    type Output = CollectionStrategy;
    fn bitor(self, rhs: CollectionStrategy) -> CollectionStrategy {
        CollectionStrategy(self.0 | rhs.0)
    }
}

/// State mutated only while `internal_mutex` is held: the action caches,
/// collector identity, and ignore-counter of spec §3/§4.1.
struct MutatorState {
    /// Newly registered records not yet folded into the registry.
    objs_add_cache: Vec<Box<Record>>,
    /// Pending root operations.
    roots_add_cache: HashSet<SlotAddr>,
    /// Pending unroot operations. Disjoint from `roots_add_cache` by
    /// construction (inserting into one removes from the other).
    roots_remove_cache: HashSet<SlotAddr>,
    /// Pending arc-slot repointings, keyed by slot address.
    handle_repoint_cache: HashMap<SlotAddr, Option<NonNull<Record>>>,
    /// Records whose reference count fell to zero during a collection.
    ref_count_del_cache: HashSet<NonNullRecord>,
    /// The thread currently running `collect()` on this module, if any.
    collector_thread: Option<ThreadId>,
    /// Set for the duration of a collection; routes ref-count-zero
    /// deletions into `ref_count_del_cache` instead of acting immediately.
    cache_ref_count_del_actions: bool,
    /// Balanced `begin_ignore`/`end_ignore` depth.
    ignore_collect_count: usize,
}

/// A `NonNull<Record>` wrapper solely so it can be used as a `HashSet` key;
/// `NonNull` already implements `Hash`, but naming the alias keeps the
/// cache field declarations readable.
type NonNullRecord = NonNull<Record>;

impl MutatorState {
    fn new() -> MutatorState {
        MutatorState {
            objs_add_cache: Vec::new(),
            roots_add_cache: HashSet::new(),
            roots_remove_cache: HashSet::new(),
            handle_repoint_cache: HashMap::new(),
            ref_count_del_cache: HashSet::new(),
            collector_thread: None,
            cache_ref_count_del_actions: false,
            ignore_collect_count: 0,
        }
    }

    fn caches_empty(&self) -> bool {
        self.objs_add_cache.is_empty()
            && self.roots_add_cache.is_empty()
            && self.roots_remove_cache.is_empty()
            && self.handle_repoint_cache.is_empty()
            && self.ref_count_del_cache.is_empty()
    }
}

/// One independent collection arena.
///
/// All mutator operations serialize on `internal_mutex` (the `state`
/// field here). The registry and root set live outside that lock so the
/// collector can read a frozen snapshot of them without holding the
/// mutex across the mark phase — sound because, while a collection is in
/// progress, every other mutator thread is routed into the action caches
/// instead of touching the registry or root set directly (see
/// `registry_mut`/`roots_mut`).
pub struct DisjointModule {
    state: Mutex<MutatorState>,
    registry: UnsafeCell<ObjList>,
    roots: UnsafeCell<HashSet<SlotAddr>>,
    strategy: AtomicU8,
    sleep_millis: AtomicU64,
}

// SAFETY: `registry` and `roots` are only ever touched by code holding
// `state` locked, or (during `collect`'s no-mutex phases) exclusively by
// the thread recorded in `collector_thread` — no other thread can reach
// them meanwhile, since `state`'s own invariant routes every other
// mutator into the action caches while a collector is active.
unsafe impl Sync for DisjointModule {}

impl Default for DisjointModule {
    fn default() -> DisjointModule {
        DisjointModule::new()
    }
}

impl DisjointModule {
    /// Construct a fresh, empty disjoint module.
    #[must_use]
    pub fn new() -> DisjointModule {
        DisjointModule {
            state: Mutex::new(MutatorState::new()),
            registry: UnsafeCell::new(ObjList::new()),
            roots: UnsafeCell::new(HashSet::new()),
            strategy: AtomicU8::new(CollectionStrategy::TIMED.bits()),
            sleep_millis: AtomicU64::new(1000),
        }
    }

    /// # Safety
    /// Caller must hold `state` locked, or be the sole thread with access
    /// during a `collect()` window with no mutex held.
    unsafe fn registry_mut(&self) -> &mut ObjList {
        &mut *self.registry.get()
    }

    /// # Safety
    /// See [`DisjointModule::registry_mut`].
    unsafe fn roots_mut(&self) -> &mut HashSet<SlotAddr> {
        &mut *self.roots.get()
    }

    /// The current collection strategy bit-mask.
    #[must_use]
    pub fn strategy(&self) -> CollectionStrategy {
        CollectionStrategy::from_bits(self.strategy.load(Ordering::Relaxed))
    }

    /// Replace the collection strategy bit-mask.
    pub fn set_strategy(&self, strategy: CollectionStrategy) {
        self.strategy.store(strategy.bits(), Ordering::Relaxed);
    }

    /// How long the background thread sleeps between timed sweeps of this
    /// module.
    #[must_use]
    pub fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_millis.load(Ordering::Relaxed))
    }

    /// Set the background thread's sleep duration for this module.
    pub fn set_sleep_time(&self, duration: Duration) {
        #[allow(clippy::cast_possible_truncation)]
        self.sleep_millis
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether the calling thread is currently running `collect()` on this
    /// module (i.e. whether a router callback on this thread is reentrant).
    #[must_use]
    pub fn this_is_collector_thread(&self) -> bool {
        self.state.lock().collector_thread == Some(std::thread::current().id())
    }

    /// Resolve a slot's logical current target, honoring any pending
    /// cached repoint (`__get_current_target` of spec §4.1).
    ///
    /// # Safety
    /// `slot` must be a live, non-dangling slot.
    unsafe fn current_target(
        state: &MutatorState,
        slot: SlotAddr,
    ) -> Option<NonNull<Record>> {
        if let Some(&cached) = state.handle_repoint_cache.get(&slot) {
            cached
        } else {
            slot.as_ref().target.get()
        }
    }

    fn apply_root(&self, state: &mut MutatorState, slot: SlotAddr) {
        if state.collector_thread.is_none() {
            unsafe { self.roots_mut() }.insert(slot);
        } else {
            state.roots_remove_cache.remove(&slot);
            state.roots_add_cache.insert(slot);
        }
    }

    fn apply_unroot(&self, state: &mut MutatorState, slot: SlotAddr) {
        if state.collector_thread.is_none() {
            unsafe { self.roots_mut() }.remove(&slot);
        } else {
            state.roots_add_cache.remove(&slot);
            state.roots_remove_cache.insert(slot);
        }
    }

    fn apply_repoint(&self, state: &mut MutatorState, slot: SlotAddr, target: Option<NonNull<Record>>) {
        if state.collector_thread.is_none() {
            unsafe { slot.as_ref() }.target.set(target);
        } else {
            state.handle_repoint_cache.insert(slot, target);
        }
    }

    fn register(&self, state: &mut MutatorState, record: Box<Record>) -> NonNull<Record> {
        if state.collector_thread.is_none() {
            unsafe { self.registry_mut() }.push_back(record)
        } else {
            let ptr = NonNull::from(record.as_ref());
            state.objs_add_cache.push(record);
            ptr
        }
    }

    /// Decrement `target`'s reference count, applying the deferred-delete
    /// discipline of spec §4.1. Returns a record ready for `destroy`/
    /// `deallocate` once `state` is unlocked, if the decrement emptied it
    /// and it is safe to act immediately.
    ///
    /// # Safety
    /// `target` must currently be a live record registered in this module,
    /// either already in the registry or in `state.objs_add_cache`.
    unsafe fn dec_ref_count(&self, state: &mut MutatorState, target: NonNull<Record>) -> Option<Box<Record>> {
        let rec = &mut *target.as_ptr();
        debug_assert!(rec.ref_count > 0);
        rec.ref_count -= 1;
        if rec.ref_count != 0 {
            return None;
        }
        if let Some(idx) = state
            .objs_add_cache
            .iter()
            .position(|b| std::ptr::eq(b.as_ref(), target.as_ptr()))
        {
            return Some(state.objs_add_cache.swap_remove(idx));
        }
        if !state.cache_ref_count_del_actions {
            return Some(self.registry_mut().unlink(target));
        }
        debug_assert!(state.collector_thread.is_some());
        state.ref_count_del_cache.insert(target);
        None
    }

    unsafe fn inc_ref_count(target: NonNull<Record>) {
        (*target.as_ptr()).ref_count += 1;
    }

    // ---- public mutator operations (spec §4.1) ----

    /// `create_null`: bind a freshly allocated, untargeted slot and root it.
    ///
    /// # Safety
    /// `slot` must be freshly allocated, not yet rooted, with `target ==
    /// None`.
    pub(crate) unsafe fn create_null(&self, slot: SlotAddr) {
        let mut state = self.state.lock();
        self.apply_root(&mut state, slot);
    }

    /// `create_bind_new`: bind a fresh slot to a fresh record (ref count 1)
    /// and register the record.
    ///
    /// # Safety
    /// `slot` must be freshly allocated, not yet rooted, with `target ==
    /// None`; `record.ref_count` must be `1` and `record.tag` must equal
    /// `slot`'s tag.
    pub(crate) unsafe fn create_bind_new(&self, slot: SlotAddr, record: Box<Record>) {
        let mut state = self.state.lock();
        let ptr = self.register(&mut state, record);
        slot.as_ref().target.set(Some(ptr));
        self.apply_root(&mut state, slot);
    }

    /// `create_alias`: bind a fresh slot to `src`'s current target.
    ///
    /// # Safety
    /// `slot` must be freshly allocated, not yet rooted, with `target ==
    /// None`; `src` must be a live slot.
    ///
    /// # Errors
    /// Returns [`DisjunctionViolation`] if `src` currently targets a record
    /// from a different disjunction than `slot`.
    pub(crate) unsafe fn create_alias(
        &self,
        slot: SlotAddr,
        src: SlotAddr,
    ) -> Result<(), DisjunctionViolation> {
        let mut state = self.state.lock();
        let target = Self::current_target(&state, src);
        if let Some(t) = target {
            if t.as_ref().tag != slot.as_ref().tag {
                return Err(DisjunctionViolation);
            }
            Self::inc_ref_count(t);
        }
        slot.as_ref().target.set(target);
        self.apply_root(&mut state, slot);
        Ok(())
    }

    /// `destroy`: unroot `slot`, drop any pending repoint for it, and
    /// decrement its current target's reference count.
    ///
    /// # Safety
    /// `slot` must be a live, currently rooted slot about to be deallocated
    /// by the caller.
    pub(crate) unsafe fn destroy(&self, slot: SlotAddr) {
        let mut state = self.state.lock();
        self.apply_unroot(&mut state, slot);
        state.handle_repoint_cache.remove(&slot);
        let target = Self::current_target(&state, slot);
        let to_destroy = match target {
            Some(t) => self.dec_ref_count(&mut state, t),
            None => None,
        };
        drop(state);
        if let Some(record) = to_destroy {
            unsafe {
                record.destroy();
                record.deallocate();
            }
        }
    }

    /// `unroot`: remove `slot` from the root set without touching its
    /// target.
    ///
    /// # Safety
    /// `slot` must be a live slot.
    pub(crate) unsafe fn unroot(&self, slot: SlotAddr) {
        let mut state = self.state.lock();
        self.apply_unroot(&mut state, slot);
    }

    /// `repoint_null`: aim `slot` at nothing, decrementing its old target.
    ///
    /// # Safety
    /// `slot` must be a live slot.
    pub(crate) unsafe fn repoint_null(&self, slot: SlotAddr) {
        let mut state = self.state.lock();
        let old = Self::current_target(&state, slot);
        self.apply_repoint(&mut state, slot, None);
        let to_destroy = match old {
            Some(t) => self.dec_ref_count(&mut state, t),
            None => None,
        };
        drop(state);
        if let Some(record) = to_destroy {
            unsafe {
                record.destroy();
                record.deallocate();
            }
        }
    }

    /// `repoint`: aim `slot` at `new`'s current target, rebalancing
    /// reference counts, iff the targets actually differ.
    ///
    /// # Safety
    /// `slot` and `new` must be live slots.
    ///
    /// # Errors
    /// Returns [`DisjunctionViolation`] if `new`'s current target belongs to
    /// a different disjunction than `slot`.
    pub(crate) unsafe fn repoint(&self, slot: SlotAddr, new: SlotAddr) -> Result<(), DisjunctionViolation> {
        let mut state = self.state.lock();
        let old = Self::current_target(&state, slot);
        let new_target = Self::current_target(&state, new);
        if old == new_target {
            return Ok(());
        }
        if let Some(t) = new_target {
            if t.as_ref().tag != slot.as_ref().tag {
                return Err(DisjunctionViolation);
            }
        }
        self.apply_repoint(&mut state, slot, new_target);
        if let Some(t) = new_target {
            Self::inc_ref_count(t);
        }
        let to_destroy = match old {
            Some(t) => self.dec_ref_count(&mut state, t),
            None => None,
        };
        drop(state);
        if let Some(record) = to_destroy {
            unsafe {
                record.destroy();
                record.deallocate();
            }
        }
        Ok(())
    }

    /// `repoint_swap`: exchange `a` and `b`'s current targets. No reference
    /// count change, since the net effect on every record is zero.
    ///
    /// # Safety
    /// `a` and `b` must be live slots.
    ///
    /// # Errors
    /// Returns [`DisjunctionViolation`] if either slot's new target would
    /// belong to a different disjunction than the slot itself.
    pub(crate) unsafe fn repoint_swap(&self, a: SlotAddr, b: SlotAddr) -> Result<(), DisjunctionViolation> {
        let mut state = self.state.lock();
        let ta = Self::current_target(&state, a);
        let tb = Self::current_target(&state, b);
        if ta == tb {
            return Ok(());
        }
        if let Some(t) = tb {
            if t.as_ref().tag != a.as_ref().tag {
                return Err(DisjunctionViolation);
            }
        }
        if let Some(t) = ta {
            if t.as_ref().tag != b.as_ref().tag {
                return Err(DisjunctionViolation);
            }
        }
        // Both cache writes happen under this single lock acquisition, so no
        // intervening destroy can observe either slot mid-swap (spec §9,
        // "swap under collection").
        self.apply_repoint(&mut state, a, tb);
        self.apply_repoint(&mut state, b, ta);
        Ok(())
    }

    /// Begin a region in which `collect()` is suppressed on this module.
    pub fn begin_ignore(&self) {
        self.state.lock().ignore_collect_count += 1;
    }

    /// End a region started by [`DisjointModule::begin_ignore`].
    pub fn end_ignore(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.ignore_collect_count > 0);
        state.ignore_collect_count -= 1;
    }

    /// Run one collection pass over this module.
    ///
    /// Returns `true` if the collection completed (or was unnecessary —
    /// suppressed by an ignore-sentry, or a reentrant no-op call from
    /// inside a running collection on this same thread). Returns `false`
    /// if another thread is already collecting this module; callers that
    /// must block should use [`DisjointModule::blocking_collect`].
    pub fn collect(&self) -> bool {
        let this_thread = std::thread::current().id();

        // Phase 0 — admission.
        {
            let mut state = self.state.lock();
            if state.ignore_collect_count > 0 {
                return true;
            }
            match state.collector_thread {
                Some(t) if t == this_thread => return true,
                Some(_) => return false,
                None => {}
            }
            state.collector_thread = Some(this_thread);
            state.cache_ref_count_del_actions = true;
            debug_assert!(state.caches_empty());
        }
        tracing::trace!("collection admitted, unrooting");

        // Phase 1 — prepare snapshot (no mutex held).
        //
        // SAFETY: every other mutator thread now routes through the action
        // caches instead of the registry/root set, because
        // `collector_thread` is set; we are the only thread touching them.
        unsafe {
            for mut record in self.registry_mut().iter() {
                record.as_mut().mark = false;
                let mut unrooter = Unrooter { module: self };
                record.as_ref().route(&mut unrooter, RouteMode::Mutable);
            }
        }

        let mut root_objs: Vec<NonNull<Record>>;
        // Phase 2 — drain caches that add information (under mutex).
        {
            let mut state = self.state.lock();
            for mut record in std::mem::take(&mut state.objs_add_cache) {
                record.mark = false;
                unsafe { self.registry_mut() }.push_back(record);
            }
            for slot in std::mem::take(&mut state.roots_add_cache) {
                unsafe { self.roots_mut() }.insert(slot);
            }
            for slot in std::mem::take(&mut state.roots_remove_cache) {
                unsafe { self.roots_mut() }.remove(&slot);
            }
            for (slot, target) in std::mem::take(&mut state.handle_repoint_cache) {
                unsafe { slot.as_ref() }.target.set(target);
            }
            root_objs = unsafe { self.roots_mut() }
                .iter()
                .filter_map(|slot| unsafe { slot.as_ref().target.get() })
                .collect();
            root_objs.sort_unstable();
            root_objs.dedup();
        }

        // Phase 3 — mark (no mutex held).
        tracing::trace!(roots = root_objs.len(), "marking");
        unsafe {
            let mut marker = Marker;
            for root in &root_objs {
                mark_from(*root, &mut marker);
            }
        }

        // Phase 4 — sweep.
        let del_list: Vec<Box<Record>> = unsafe {
            let registry = self.registry_mut();
            let unmarked: Vec<NonNull<Record>> = registry
                .iter()
                .filter(|r| !r.as_ref().mark)
                .collect();
            unmarked.into_iter().map(|r| registry.unlink(r)).collect()
        };
        tracing::trace!(swept = del_list.len(), "sweep complete");

        // Phase 5 — destroy unreachables (do not deallocate yet).
        for record in &del_list {
            unsafe { record.destroy() };
        }

        // Phase 6 — resume immediate ref-count deletion (under mutex), and
        // unlink every record whose ref count dropped to zero during the
        // collection but was not itself swept above. `dec_ref_count` runs
        // synchronously at the mutator call site regardless of collection
        // state, so a zero ref count is never stale — it already accounts
        // for any repoint cached for phase 9. Such a record only looked
        // reachable in phase 3 because marking followed a slot's old,
        // not-yet-repointed target; it is genuine garbage.
        let deferred_del_list: Vec<Box<Record>> = {
            let mut state = self.state.lock();
            state.cache_ref_count_del_actions = false;
            for record in &del_list {
                state
                    .ref_count_del_cache
                    .remove(&NonNull::from(record.as_ref()));
            }
            let remaining = std::mem::take(&mut state.ref_count_del_cache);
            unsafe {
                let registry = self.registry_mut();
                remaining.into_iter().map(|r| registry.unlink(r)).collect()
            }
        };

        // Phase 7 — deallocate unreachables.
        for record in &del_list {
            unsafe { record.deallocate() };
        }
        drop(del_list);

        // Phase 8 — destroy and deallocate the records unlinked in phase 6.
        for record in &deferred_del_list {
            unsafe { record.destroy() };
        }
        for record in &deferred_del_list {
            unsafe { record.deallocate() };
        }
        drop(deferred_del_list);

        // Phase 9 — exit collection (under mutex).
        {
            let mut state = self.state.lock();
            state.collector_thread = None;
            for record in std::mem::take(&mut state.objs_add_cache) {
                unsafe { self.registry_mut() }.push_back(record);
            }
            for slot in std::mem::take(&mut state.roots_add_cache) {
                unsafe { self.roots_mut() }.insert(slot);
            }
            for slot in std::mem::take(&mut state.roots_remove_cache) {
                unsafe { self.roots_mut() }.remove(&slot);
            }
            for (slot, target) in std::mem::take(&mut state.handle_repoint_cache) {
                unsafe { slot.as_ref() }.target.set(target);
            }
        }
        tracing::trace!("collection finished");

        true
    }

    /// Loop `collect()` until it returns `true`.
    pub fn blocking_collect(&self) {
        while !self.collect() {
            std::thread::yield_now();
        }
    }

    /// Whether the registry and root set are both empty, used by the
    /// owning handle to assert the usage invariant at teardown (spec §7,
    /// error kind 2).
    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        let _state = self.state.lock();
        unsafe { self.registry_mut().is_empty() && self.roots_mut().is_empty() }
    }

    #[cfg(feature = "diagnostics")]
    pub(crate) fn diagnostics(&self) -> crate::diagnostics::ModuleCounts {
        let state = self.state.lock();
        crate::diagnostics::ModuleCounts {
            registered: unsafe { self.registry_mut().len() },
            roots: unsafe { self.roots_mut().len() },
            add_cache: state.objs_add_cache.len(),
            ref_count_del_cache: state.ref_count_del_cache.len(),
            collecting: state.collector_thread.is_some(),
        }
    }
}

/// A [`Visitor`] used during phase 1 that erases every mutable arc slot it
/// sees from the root set.
struct Unrooter<'a> {
    module: &'a DisjointModule,
}

impl Visitor for Unrooter<'_> {
    fn visit_slot(&mut self, slot: SlotAddr) {
        unsafe { self.module.roots_mut() }.remove(&slot);
    }
}

/// A [`Visitor`] used during phase 3 that marks every arc slot's current
/// target and recurses into it if not already marked.
struct Marker;

impl Visitor for Marker {
    fn visit_slot(&mut self, slot: SlotAddr) {
        if let Some(target) = unsafe { slot.as_ref().target.get() } {
            mark_from(target, self);
        }
    }
}

/// Depth-first mark from `record`, recursing through its immutable route.
fn mark_from(mut record: NonNull<Record>, visitor: &mut Marker) {
    unsafe {
        if record.as_ref().mark {
            return;
        }
        record.as_mut().mark = true;
        record.as_ref().route(visitor, RouteMode::Immutable);
    }
}

/// Build a monomorphized, type-erased router thunk for `T`.
pub(crate) fn route_thunk<T: crate::Collectable + ?Sized>(
    ptr: ErasedPtr,
    visitor: &mut dyn Visitor,
    mode: RouteMode,
) {
    unsafe {
        let specified: NonNull<T> = ptr.specify();
        match mode {
            RouteMode::Immutable => specified.as_ref().route_immutable(visitor),
            RouteMode::Mutable => specified.as_ref().route_mutable(visitor),
        }
    }
}

pub(crate) fn route_fn_for<T: crate::Collectable + ?Sized>() -> ErasedRouteFn {
    route_thunk::<T>
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{route_fn_for, Record, SlotAddr};
    use crate::disjoint::{DisjunctionTag, Slot};
    use crate::{Collectable, ErasedPtr, Visitor};

    use super::DisjointModule;

    struct DropCounted(&'static AtomicUsize);

    impl Drop for DropCounted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    unsafe impl Collectable for DropCounted {
        fn route_immutable(&self, _visitor: &mut dyn Visitor) {}
    }

    unsafe fn destroy_thunk(ptr: ErasedPtr) {
        std::ptr::drop_in_place(ptr.specify::<DropCounted>().as_ptr());
    }

    unsafe fn deallocate_thunk(ptr: ErasedPtr) {
        let specified: std::ptr::NonNull<DropCounted> = ptr.specify();
        let layout = std::alloc::Layout::for_value(specified.as_ref());
        std::alloc::dealloc(specified.as_ptr().cast::<u8>(), layout);
    }

    fn leak_counter() -> &'static AtomicUsize {
        Box::leak(Box::new(AtomicUsize::new(0)))
    }

    fn make_tag() -> DisjunctionTag {
        DisjunctionTag(std::ptr::NonNull::from(Box::leak(Box::new(()))))
    }

    fn make_slot(tag: DisjunctionTag) -> SlotAddr {
        std::ptr::NonNull::from(Box::leak(Box::new(Slot {
            target: Cell::new(None),
            tag,
        })))
    }

    fn make_record(tag: DisjunctionTag, counter: &'static AtomicUsize) -> Box<Record> {
        let obj = ErasedPtr::new(std::ptr::NonNull::from(Box::leak(Box::new(DropCounted(
            counter,
        )))));
        Box::new(Record::new(
            obj,
            destroy_thunk,
            deallocate_thunk,
            route_fn_for::<DropCounted>(),
            tag,
        ))
    }

    #[test]
    fn bind_new_then_destroy_drops_exactly_once() {
        let module = DisjointModule::new();
        let tag = make_tag();
        let counter = leak_counter();
        let slot = make_slot(tag);

        unsafe { module.create_bind_new(slot, make_record(tag, counter)) };
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        unsafe { module.destroy(slot) };
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert!(module.is_empty());
    }

    #[test]
    fn alias_keeps_target_alive_until_both_drop() {
        let module = DisjointModule::new();
        let tag = make_tag();
        let counter = leak_counter();
        let a = make_slot(tag);
        let b = make_slot(tag);

        unsafe { module.create_bind_new(a, make_record(tag, counter)) };
        unsafe { module.create_alias(b, a).unwrap() };
        unsafe { module.destroy(a) };
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        unsafe { module.destroy(b) };
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn alias_across_disjunctions_is_rejected() {
        let module = DisjointModule::new();
        let tag_a = make_tag();
        let tag_b = make_tag();
        let counter = leak_counter();
        let a = make_slot(tag_a);
        let b = make_slot(tag_b);

        unsafe { module.create_bind_new(a, make_record(tag_a, counter)) };
        let result = unsafe { module.create_alias(b, a) };
        assert!(result.is_err());
        unsafe { module.destroy(a) };
        unsafe { module.create_null(b) };
        unsafe { module.destroy(b) };
    }

    #[test]
    fn collect_reclaims_an_unrooted_record_even_with_a_positive_ref_count() {
        // A record's reference count alone never frees it — only root
        // reachability does. Unrooting a record whose count is still
        // positive (simulating one reachable only via a since-severed
        // cycle) must still be swept on the next collection.
        let module = DisjointModule::new();
        let tag = make_tag();
        let counter = leak_counter();
        let slot = make_slot(tag);

        unsafe { module.create_bind_new(slot, make_record(tag, counter)) };
        unsafe { module.unroot(slot) };

        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert!(module.collect());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn collect_leaves_a_rooted_record_alone() {
        let module = DisjointModule::new();
        let tag = make_tag();
        let counter = leak_counter();
        let slot = make_slot(tag);

        unsafe { module.create_bind_new(slot, make_record(tag, counter)) };
        assert!(module.collect());
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        unsafe { module.destroy(slot) };
    }

    #[test]
    fn begin_ignore_suppresses_collection() {
        let module = DisjointModule::new();
        module.begin_ignore();
        assert!(module.collect());
        module.end_ignore();
    }
}

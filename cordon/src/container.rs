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

//! The process-wide registry of every live disjunction, the notion of
//! "my current disjunction" for the calling thread, and the background
//! collector thread that periodically sweeps every registered disjunction
//! under [`CollectionStrategy::TIMED`](crate::disjoint::CollectionStrategy::TIMED).

use std::{
    cell::{Cell, RefCell},
    panic::AssertUnwindSafe,
    ptr,
    sync::OnceLock,
    thread::JoinHandle,
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::handle::{DisjunctionHandle, WeakDisjunctionHandle};

/// The registry of every disjunction created with a background-managed
/// lifetime: weak handles the background thread visits on its sweep, plus
/// a `collecting` flag the sweep sets so reentrant registrations during a
/// sweep queue up instead of deadlocking on the same mutex.
struct Registry {
    disjunctions: Mutex<Vec<WeakDisjunctionHandle>>,
    add_cache: Mutex<Vec<WeakDisjunctionHandle>>,
    collecting: std::sync::atomic::AtomicBool,
}

impl Registry {
    fn new() -> Registry {
        Registry {
            disjunctions: Mutex::new(Vec::new()),
            add_cache: Mutex::new(Vec::new()),
            collecting: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn register(&self, weak: WeakDisjunctionHandle) {
        use std::sync::atomic::Ordering;
        if self.collecting.load(Ordering::Acquire) {
            self.add_cache.lock().push(weak);
        } else {
            self.disjunctions.lock().push(weak);
        }
    }

    /// Cull expired weak handles, and force-collect every survivor if
    /// `force_collect` is set; otherwise only survivors whose own
    /// [`CollectionStrategy::TIMED`](crate::disjoint::CollectionStrategy::TIMED)
    /// bit is set are collected.
    fn sweep(&self, force_collect: bool) {
        use std::sync::atomic::Ordering;
        self.collecting.store(true, Ordering::Release);
        {
            let mut live = self.disjunctions.lock();
            live.retain(|weak| {
                if let Some(handle) = weak.upgrade() {
                    if force_collect
                        || handle.module().strategy().contains(
                            crate::disjoint::CollectionStrategy::TIMED,
                        )
                    {
                        handle.module().blocking_collect();
                    }
                    true
                } else {
                    false
                }
            });
            live.append(&mut self.add_cache.lock());
        }
        self.collecting.store(false, Ordering::Release);
    }

    fn len(&self) -> usize {
        self.disjunctions.lock().len()
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

static PRIMARY: OnceCell<DisjunctionHandle> = OnceCell::new();

thread_local! {
    /// The disjunction new [`Gc`](crate::gc::Gc) allocations on this thread
    /// bind to, absent an explicit override.
    static LOCAL: RefCell<Option<DisjunctionHandle>> = const { RefCell::new(None) };

    /// A raw escape hatch for the window after this thread-local's own
    /// destructor has run but while some other thread-local destructor
    /// (running after it, per an unspecified order) still drops a `Gc`
    /// that needs `local()`. Rust gives no ordering guarantee between
    /// sibling thread-locals' destructors, so `local()` falls back to this
    /// raw pointer — valid exactly until the primary disjunction's own
    /// static storage (via [`PRIMARY`]) is gone, which outlives every
    /// thread-local.
    static LOCAL_DETOUR: Cell<*const DisjunctionHandle> = const { Cell::new(ptr::null()) };
}

/// The calling thread's current disjunction: the thread-local one if set
/// via [`enter`], otherwise the lazily-created process-wide primary
/// disjunction.
#[must_use]
pub fn local() -> DisjunctionHandle {
    if let Some(handle) = LOCAL.with(|cell| cell.borrow().clone()) {
        return handle;
    }
    let detour = LOCAL_DETOUR.with(Cell::get);
    if !detour.is_null() {
        // SAFETY: only ever set to `&'static PRIMARY`'s contents, which
        // outlive every thread-local destructor.
        return unsafe { &*detour }.clone();
    }
    primary()
}

/// The process-wide primary disjunction, created lazily on first use and
/// registered with the background collector.
#[must_use]
pub fn primary() -> DisjunctionHandle {
    let handle = PRIMARY.get_or_init(create_new_disjunction).clone();
    LOCAL_DETOUR.with(|cell| cell.set(PRIMARY.get().map_or(ptr::null(), |h| h as *const _)));
    handle
}

/// Run `f` with the calling thread's current disjunction temporarily set
/// to `handle`, restoring whatever it was before on return (even if `f`
/// panics).
pub fn enter<R>(handle: DisjunctionHandle, f: impl FnOnce() -> R) -> R {
    let previous = LOCAL.with(|cell| cell.replace(Some(handle)));
    struct Restore<'a>(&'a std::thread::LocalKey<RefCell<Option<DisjunctionHandle>>>, Option<DisjunctionHandle>);
    impl Drop for Restore<'_> {
        fn drop(&mut self) {
            self.0.with(|cell| *cell.borrow_mut() = self.1.take());
        }
    }
    let _restore = Restore(&LOCAL, previous);
    f()
}

/// Construct a fresh disjunction and register it with the background
/// collector so that a [`CollectionStrategy::TIMED`](crate::disjoint::CollectionStrategy::TIMED)
/// sweep reaches it even after every strong handle but one (the caller's)
/// has gone out of scope.
#[must_use]
pub fn create_new_disjunction() -> DisjunctionHandle {
    let handle = DisjunctionHandle::new();
    registry().register(handle.downgrade());
    ensure_background_thread();
    handle
}

static BACKGROUND: OnceCell<JoinHandle<()>> = OnceCell::new();

fn ensure_background_thread() {
    BACKGROUND.get_or_init(|| {
        std::thread::Builder::new()
            .name("cordon-collector".to_owned())
            .spawn(background_loop)
            .expect("failed to spawn cordon background collector thread")
    });
}

fn background_loop() {
    loop {
        std::thread::sleep(std::time::Duration::from_millis(1000));
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| registry().sweep(false)));
        if let Err(payload) = result {
            tracing::error!(
                panic = %panic_message(&payload),
                "cordon background collector panicked; aborting process"
            );
            std::process::abort();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// Run one background-registry sweep right now instead of waiting for the
/// collector thread's next scheduled pass: cull every weak handle whose
/// disjunction has already been torn down, and, if `do_collect` is set,
/// force a blocking collection on every surviving disjunction regardless
/// of its own [`CollectionStrategy`](crate::disjoint::CollectionStrategy).
///
/// With `do_collect` false this only culls — useful for tests asserting
/// that an expired disjunction actually leaves the registry rather than
/// lingering as a dead weak handle.
pub fn background_collect(do_collect: bool) {
    registry().sweep(do_collect);
}

/// Force every registered disjunction to collect immediately, regardless
/// of its [`CollectionStrategy`](crate::disjoint::CollectionStrategy).
///
/// Primarily useful in tests, where waiting for the background thread's
/// sleep interval is undesirable.
pub fn collect_all() {
    background_collect(true);
}

/// The number of disjunctions currently tracked by the background
/// registry.
///
/// Exists for tests that want to observe the registry shrink after a
/// sweep culls an expired handle.
#[must_use]
pub fn registered_count() -> usize {
    registry().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_defaults_to_primary() {
        let a = local();
        let b = local();
        assert!(DisjunctionHandle::tag(&a) == DisjunctionHandle::tag(&b));
    }

    #[test]
    fn enter_overrides_then_restores() {
        let outer = local();
        let inner = create_new_disjunction();
        enter(inner.clone(), || {
            assert!(DisjunctionHandle::tag(&local()) == DisjunctionHandle::tag(&inner));
        });
        assert!(DisjunctionHandle::tag(&local()) == DisjunctionHandle::tag(&outer));
    }
}

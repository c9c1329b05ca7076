//! End-to-end tests exercising a whole disjunction: allocation, cyclic
//! reclamation, cross-disjunction rejection, and background cleanup.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use cordon::{container, disjoint::CollectionStrategy, Collectable, Gc};

static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

struct DropCounted;

impl Drop for DropCounted {
    fn drop(&mut self) {
        DROP_COUNT.fetch_add(1, Ordering::SeqCst);
    }
}

unsafe impl Collectable for DropCounted {
    fn route_immutable(&self, _visitor: &mut dyn cordon::Visitor) {}
}

#[derive(Collectable)]
struct Node {
    _payload: DropCounted,
    next: RefCell<Option<Gc<Node>>>,
}

fn new_node() -> Gc<Node> {
    Gc::new(Node {
        _payload: DropCounted,
        next: RefCell::new(None),
    })
}

/// An 11-node ring, reachable only through itself, must be fully reclaimed
/// by a mark-sweep pass once every external handle is dropped.
#[test]
fn reclaims_a_cyclic_ring() {
    let before = DROP_COUNT.load(Ordering::SeqCst);
    let disjunction = container::create_new_disjunction();
    disjunction.module().set_strategy(CollectionStrategy::MANUAL);

    {
        let nodes: Vec<Gc<Node>> = (0..11)
            .map(|_| Gc::new_in(
                Node { _payload: DropCounted, next: RefCell::new(None) },
                disjunction.clone(),
            ))
            .collect();
        for i in 0..11 {
            *nodes[i].next.borrow_mut() = Some(nodes[(i + 1) % 11].clone());
        }
        // every node now participates in a cycle; dropping `nodes` leaves
        // each node's ref count at 1 (from the next-pointer of its
        // predecessor), so none are collected by reference counting alone.
    }

    assert_eq!(DROP_COUNT.load(Ordering::SeqCst), before);
    disjunction.module().blocking_collect();
    assert_eq!(DROP_COUNT.load(Ordering::SeqCst), before + 11);
}

/// Repeatedly rotating three pointers through a cycle, with the rotation
/// itself picked at random each iteration, should never leak or double-free,
/// with or without intervening collections.
#[test]
fn rotation_stress() {
    fastrand::seed(0xC0FFEE);
    let disjunction = container::create_new_disjunction();
    disjunction.module().set_strategy(CollectionStrategy::MANUAL);

    let mut a = Gc::new_in(Node { _payload: DropCounted, next: RefCell::new(None) }, disjunction.clone());
    let mut b = Gc::new_in(Node { _payload: DropCounted, next: RefCell::new(None) }, disjunction.clone());
    let mut c = Gc::new_in(Node { _payload: DropCounted, next: RefCell::new(None) }, disjunction.clone());

    for i in 0..1_000_000 {
        *a.next.borrow_mut() = Some(b.clone());
        *b.next.borrow_mut() = Some(c.clone());
        *c.next.borrow_mut() = Some(a.clone());
        match fastrand::u8(0..3) {
            0 => std::mem::swap(&mut a, &mut b),
            1 => std::mem::swap(&mut b, &mut c),
            _ => std::mem::swap(&mut a, &mut c),
        }
        if i % 200 == 0 {
            disjunction.module().blocking_collect();
        }
    }

    drop(a);
    drop(b);
    drop(c);
    disjunction.module().blocking_collect();
}

/// Aiming a pointer at a value from a different disjunction is rejected,
/// not silently accepted.
#[test]
fn cross_disjunction_repoint_is_rejected() {
    let left = container::create_new_disjunction();
    let right = container::create_new_disjunction();

    let mut a = new_node_in(&left);
    let b = new_node_in(&right);

    let err = a.repoint(&b);
    assert!(err.is_err());
}

fn new_node_in(disjunction: &cordon::handle::DisjunctionHandle) -> Gc<Node> {
    Gc::new_in(
        Node { _payload: DropCounted, next: RefCell::new(None) },
        disjunction.clone(),
    )
}

#[derive(Collectable)]
struct Holder {
    _payload: DropCounted,
    loop_back: RefCell<Option<Gc<Holder>>>,
    peer: RefCell<Option<Gc<Node>>>,
}

fn new_holder_in(disjunction: &cordon::handle::DisjunctionHandle, peer: Gc<Node>) -> Gc<Holder> {
    Gc::new_in(
        Holder {
            _payload: DropCounted,
            loop_back: RefCell::new(None),
            peer: RefCell::new(Some(peer)),
        },
        disjunction.clone(),
    )
}

/// A reference count hitting zero for a record that the in-progress mark
/// phase still considers reachable (because the slot pointing at it is
/// nested behind a `RefCell` owned by a record being swept in the same
/// pass) must still resolve by the end of that same collection, not leak in
/// the deferred-delete cache forever.
///
/// `peer`'s only reference lives in `holder.peer`, a `RefCell`-wrapped
/// field, so it is never unrooted by phase 1 and stays marked throughout the
/// mark phase independent of `holder`. `holder` is self-owning (the same
/// reclaim idiom as [`reclaims_a_self_owning_record`]), so it is swept and
/// destroyed in this pass; destroying it drops `holder.peer`, taking
/// `peer`'s ref count to zero mid-collection. That drop must still end up
/// destroying `peer` before `blocking_collect` returns.
#[test]
fn deferred_ref_count_delete_resolves() {
    let before = DROP_COUNT.load(Ordering::SeqCst);
    let disjunction = container::create_new_disjunction();
    disjunction.module().set_strategy(CollectionStrategy::MANUAL);

    let peer = new_node_in(&disjunction);
    let holder = new_holder_in(&disjunction, peer);
    *holder.loop_back.borrow_mut() = Some(holder.clone());
    drop(holder);

    disjunction.module().blocking_collect();
    assert_eq!(DROP_COUNT.load(Ordering::SeqCst), before + 2);
}

/// A self-owning record (a node whose only outgoing arc points at itself)
/// is collected once its external handle drops.
#[test]
fn reclaims_a_self_owning_record() {
    let before = DROP_COUNT.load(Ordering::SeqCst);
    let disjunction = container::create_new_disjunction();
    disjunction.module().set_strategy(CollectionStrategy::MANUAL);

    let node = new_node_in(&disjunction);
    *node.next.borrow_mut() = Some(node.clone());
    drop(node);

    disjunction.module().blocking_collect();
    assert_eq!(DROP_COUNT.load(Ordering::SeqCst), before + 1);
}

/// A disjunction with no strong handles left anywhere but the background
/// registry's weak one is dropped from the registry on the next sweep,
/// rather than kept alive forever.
#[test]
fn expired_disjunction_is_culled_from_background_registry() {
    let handle = container::create_new_disjunction();
    let weak = handle.downgrade();
    let before = container::registered_count();
    drop(handle);
    assert!(weak.expired());

    container::background_collect(false);
    // `registered_count` reads a registry shared with every other test in
    // this binary, so this can only assert a strict decrease, not an exact
    // value: a concurrently running test may register its own disjunction
    // between the two reads.
    assert!(
        container::registered_count() < before,
        "expected the background sweep to have culled the expired handle"
    );
}

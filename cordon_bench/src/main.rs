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

//! Benchmarks for the `cordon` garbage collection crate.
//!
//! Mirrors the shape of a random-mutation graph churn benchmark: a pool of
//! nodes gets allocations, aliases, and removals applied at random, then a
//! collection is forced and the wall time reported. `std::rc::Rc` and
//! `std::sync::Arc` are benchmarked alongside `cordon::Gc` as a baseline —
//! neither can form cycles, so they're run on an acyclic access pattern
//! while `cordon::Gc` is run on the full (cycle-producing) one.

use std::{
    fmt::Display,
    rc::Rc,
    sync::{Arc, Mutex},
    thread::{self, available_parallelism, scope},
    time::{Duration, Instant},
};

use cordon::{container, disjoint::CollectionStrategy, Collectable, Gc};
use parking_lot::Mutex as ParkingMutex;

struct BenchmarkData {
    name: &'static str,
    test: &'static str,
    n_threads: usize,
    n_ops: usize,
    duration: Duration,
}

impl Display for BenchmarkData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.name,
            self.test,
            self.n_threads,
            self.n_ops,
            self.duration.as_micros()
        )
    }
}

/// A single-threaded node with a growable child list. Used for `cordon`'s
/// own `Gc`, which tolerates the cycles this benchmark's random mutations
/// will eventually produce.
#[derive(Collectable)]
struct Node {
    children: std::cell::RefCell<Vec<Gc<Node>>>,
}

impl Node {
    fn new_in(disjunction: &cordon::handle::DisjunctionHandle) -> Gc<Node> {
        Gc::new_in(
            Node {
                children: std::cell::RefCell::new(Vec::new()),
            },
            disjunction.clone(),
        )
    }
}

/// Same shape, but with a `Send + Sync` interior so `Gc<SyncNode>` can be
/// shared and mutated across threads.
#[derive(Collectable)]
struct SyncNode {
    children: ParkingMutex<Vec<Gc<SyncNode>>>,
}

impl SyncNode {
    fn new_in(disjunction: &cordon::handle::DisjunctionHandle) -> Gc<SyncNode> {
        Gc::new_in(
            SyncNode {
                children: ParkingMutex::new(Vec::new()),
            },
            disjunction.clone(),
        )
    }
}

fn main() {
    const N_ITERS: usize = 1_000_000;

    for _ in 0..100 {
        println!("{}", cordon_single_threaded(N_ITERS));
        println!("{}", rc_single_threaded(N_ITERS));

        for n_threads in 1..=available_parallelism().unwrap().get() {
            println!("{}", cordon_multi_threaded(N_ITERS, n_threads));
        }
        for n_threads in 1..available_parallelism().unwrap().get() {
            println!("{}", arc_multi_threaded(N_ITERS, n_threads));
        }
    }
}

/// Allocate, alias, and remove `cordon::Gc<Node>`s at random, letting
/// cycles form, then force a collection and time the whole run.
fn cordon_single_threaded(n_iters: usize) -> BenchmarkData {
    fastrand::seed(12345);
    let disjunction = container::create_new_disjunction();
    disjunction.module().set_strategy(CollectionStrategy::MANUAL);
    let mut nodes: Vec<Gc<Node>> = (0..50).map(|_| Node::new_in(&disjunction)).collect();

    let tic = Instant::now();
    for _ in 0..n_iters {
        if nodes.is_empty() {
            nodes.push(Node::new_in(&disjunction));
            continue;
        }
        match fastrand::u8(0..4) {
            0 => nodes.push(Node::new_in(&disjunction)),
            1 => {
                if nodes.len() > 1 {
                    let from = fastrand::usize(0..nodes.len());
                    let to = fastrand::usize(0..nodes.len());
                    let child = nodes[to].clone();
                    nodes[from].children.borrow_mut().push(child);
                }
            }
            2 => {
                nodes.swap_remove(fastrand::usize(0..nodes.len()));
            }
            3 => {
                let from = fastrand::usize(0..nodes.len());
                let mut children = nodes[from].children.borrow_mut();
                if !children.is_empty() {
                    let idx = fastrand::usize(0..children.len());
                    children.swap_remove(idx);
                }
            }
            _ => unreachable!(),
        }
    }
    drop(nodes);
    disjunction.module().blocking_collect();
    let toc = Instant::now();

    BenchmarkData {
        name: "cordon",
        test: "single_threaded",
        n_threads: 1,
        n_ops: n_iters,
        duration: toc.duration_since(tic),
    }
}

/// Same access pattern reduced to a DAG (no aliasing of a node onto an
/// existing node's own ancestry), run with `Rc` for a no-cycle baseline.
fn rc_single_threaded(n_iters: usize) -> BenchmarkData {
    fastrand::seed(12345);
    let mut nodes: Vec<Rc<std::cell::RefCell<Vec<Rc<()>>>>> =
        (0..50).map(|_| Rc::new(std::cell::RefCell::new(Vec::new()))).collect();

    let tic = Instant::now();
    for _ in 0..n_iters {
        if nodes.is_empty() {
            nodes.push(Rc::new(std::cell::RefCell::new(Vec::new())));
            continue;
        }
        match fastrand::u8(0..2) {
            0 => nodes.push(Rc::new(std::cell::RefCell::new(Vec::new()))),
            1 => {
                nodes.swap_remove(fastrand::usize(0..nodes.len()));
            }
            _ => unreachable!(),
        }
    }
    drop(nodes);
    let toc = Instant::now();

    BenchmarkData {
        name: "std::rc::Rc",
        test: "single_threaded",
        n_threads: 1,
        n_ops: n_iters,
        duration: toc.duration_since(tic),
    }
}

/// Run the same churn pattern as [`cordon_single_threaded`] but spread
/// across `n_threads`, all mutating a single shared disjunction.
fn cordon_multi_threaded(n_iters: usize, n_threads: usize) -> BenchmarkData {
    let disjunction = container::create_new_disjunction();
    disjunction.module().set_strategy(CollectionStrategy::MANUAL);
    let groups: Vec<Mutex<Vec<Gc<SyncNode>>>> = (0..(n_threads * 10))
        .map(|_| Mutex::new((0..50).map(|_| SyncNode::new_in(&disjunction)).collect()))
        .collect();

    let tic = Instant::now();
    scope(|s| {
        for i in 0..n_threads {
            let groups = &groups;
            let disjunction = disjunction.clone();
            thread::Builder::new()
                .name(format!("cordon-bench-{i}"))
                .spawn_scoped(s, move || {
                    fastrand::seed(12345 + i as u64);
                    for _ in 0..(n_iters / n_threads) {
                        let g1_id = fastrand::usize(0..groups.len());
                        match fastrand::u8(0..4) {
                            0 => groups[g1_id].lock().unwrap().push(SyncNode::new_in(&disjunction)),
                            1 => {
                                let g2_id = fastrand::usize(0..groups.len());
                                let (g1, g2) = if g1_id <= g2_id {
                                    let mut g1 = groups[g1_id].lock().unwrap();
                                    if g1_id == g2_id {
                                        if g1.len() < 2 {
                                            continue;
                                        }
                                        let i1 = fastrand::usize(0..g1.len());
                                        let i2 = fastrand::usize(0..g1.len());
                                        let child = g1[i2].clone();
                                        g1[i1].children.lock().push(child);
                                        continue;
                                    }
                                    let g2 = groups[g2_id].lock().unwrap();
                                    (g1, g2)
                                } else {
                                    let g2 = groups[g2_id].lock().unwrap();
                                    let g1 = groups[g1_id].lock().unwrap();
                                    (g1, g2)
                                };
                                if g1.is_empty() || g2.is_empty() {
                                    continue;
                                }
                                let i1 = fastrand::usize(0..g1.len());
                                let i2 = fastrand::usize(0..g2.len());
                                let child = g2[i2].clone();
                                g1[i1].children.lock().push(child);
                            }
                            2 => {
                                let mut guard = groups[g1_id].lock().unwrap();
                                if guard.is_empty() {
                                    continue;
                                }
                                let idx = fastrand::usize(0..guard.len());
                                guard.swap_remove(idx);
                            }
                            3 => {
                                let guard = groups[g1_id].lock().unwrap();
                                if guard.is_empty() {
                                    continue;
                                }
                                let mut children =
                                    guard[fastrand::usize(0..guard.len())].children.lock();
                                if !children.is_empty() {
                                    let idx = fastrand::usize(0..children.len());
                                    children.swap_remove(idx);
                                }
                            }
                            _ => unreachable!(),
                        }
                    }
                })
                .unwrap();
        }
    });
    drop(groups);
    disjunction.module().blocking_collect();
    let duration = Instant::now().duration_since(tic);

    BenchmarkData {
        name: "cordon",
        test: "multi_threaded",
        n_threads,
        n_ops: (n_iters / n_threads) * n_threads,
        duration,
    }
}

fn arc_multi_threaded(n_iters: usize, n_threads: usize) -> BenchmarkData {
    let groups: Vec<Mutex<Vec<Arc<()>>>> = (0..(n_threads * 10))
        .map(|_| Mutex::new((0..50).map(|_| Arc::new(())).collect()))
        .collect();

    let tic = Instant::now();
    scope(|s| {
        for i in 0..n_threads {
            let groups = &groups;
            thread::Builder::new()
                .name(format!("arc-bench-{i}"))
                .spawn_scoped(s, move || {
                    fastrand::seed(12345 + i as u64);
                    for _ in 0..(n_iters / n_threads) {
                        let g_id = fastrand::usize(0..groups.len());
                        let mut guard = groups[g_id].lock().unwrap();
                        match fastrand::u8(0..2) {
                            0 => guard.push(Arc::new(())),
                            1 => {
                                if !guard.is_empty() {
                                    let idx = fastrand::usize(0..guard.len());
                                    guard.swap_remove(idx);
                                }
                            }
                            _ => unreachable!(),
                        }
                    }
                })
                .unwrap();
        }
    });
    let duration = Instant::now().duration_since(tic);

    BenchmarkData {
        name: "std::sync::Arc",
        test: "multi_threaded",
        n_threads,
        n_ops: (n_iters / n_threads) * n_threads,
        duration,
    }
}

//! The phase executor: applies one tick phase to every vehicle or node,
//! either inline or fanned out over a fixed worker pool. Each call is a
//! complete fork-join - it returns only once the whole phase has been
//! applied, which is the barrier between phases.

use crate::graph::node::Node;
use crate::simulation::MultiThreadingConfig;
use crate::vehicle::Vehicle;
use rayon::prelude::*;

pub(crate) enum StepExecutor {
    /// Single-threaded reference strategy.
    Sequential,
    /// Fork-join over a fixed-size worker pool, one task per contiguous
    /// chunk of the phase's working set.
    Parallel {
        pool: rayon::ThreadPool,
        vehicles_per_chunk: usize,
        nodes_per_chunk: usize,
    },
}

impl StepExecutor {
    pub fn new(config: &MultiThreadingConfig) -> Self {
        if config.n_threads <= 1 {
            return Self::Sequential;
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_threads)
            .build()
            .expect("failed to create worker pool");
        log::debug!("worker pool with {} threads", config.n_threads);
        Self::Parallel {
            pool,
            vehicles_per_chunk: config.vehicles_per_chunk.max(1),
            nodes_per_chunk: config.nodes_per_chunk.max(1),
        }
    }

    /// Applies `f` to every vehicle and returns the per-vehicle outputs.
    ///
    /// The outputs are gathered in the input order regardless of which
    /// worker ran which chunk, so the caller can apply the resulting
    /// transitions deterministically.
    pub fn vehicle_phase<T, F>(&self, vehicles: &mut [&mut Vehicle], f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&mut Vehicle) -> T + Sync,
    {
        match self {
            Self::Sequential => vehicles.iter_mut().map(|veh| f(veh)).collect(),
            Self::Parallel {
                pool,
                vehicles_per_chunk,
                ..
            } => {
                let batches: Vec<Vec<T>> = pool.install(|| {
                    vehicles
                        .par_chunks_mut(*vehicles_per_chunk)
                        .map(|chunk| chunk.iter_mut().map(|veh| f(veh)).collect())
                        .collect()
                });
                batches.into_iter().flatten().collect()
            }
        }
    }

    /// Applies `f` to every node. Node updates produce no transitions; each
    /// node only mutates its own arbitration state.
    pub fn node_phase<F>(&self, nodes: &mut [&mut Node], f: F)
    where
        F: Fn(&mut Node) + Sync,
    {
        match self {
            Self::Sequential => nodes.iter_mut().for_each(|node| f(node)),
            Self::Parallel {
                pool,
                nodes_per_chunk,
                ..
            } => pool.install(|| {
                nodes
                    .par_chunks_mut(*nodes_per_chunk)
                    .for_each(|chunk| chunk.iter_mut().for_each(|node| f(node)));
            }),
        }
    }
}

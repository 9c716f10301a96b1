//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::Error;
use crate::task::{Worker, WorkerHandle, join_all};

/// A named target that a check or an operation can be run against.
pub trait Node {
    fn node_name(&self) -> &str;
}

// ===== impl Node =====

impl<N> Node for Arc<N>
where
    N: Node + ?Sized,
{
    fn node_name(&self) -> &str {
        (**self).node_name()
    }
}

// ===== global functions =====

/// Runs `target` against every node in parallel, one worker per node.
///
/// Waits for all workers with [`join_all`] and returns the results keyed by
/// node name. The first worker failure observed aborts the run.
pub fn parallel_run<N, R, E, F>(
    nodes: &[N],
    timeout: Duration,
    target: F,
) -> Result<BTreeMap<String, R>, Error>
where
    N: Node + Clone + Send + 'static,
    R: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(N) -> Result<R, E> + Send + Sync + 'static,
{
    info!(nodes = %nodes.len(), ?timeout, "running in parallel");

    let target = Arc::new(target);
    let mut workers = nodes
        .iter()
        .map(|node| {
            let node = node.clone();
            let target = target.clone();
            Worker::new(node.node_name().to_owned(), move || (target)(node))
                .start()
        })
        .collect::<Result<Vec<WorkerHandle<R>>, Error>>()?;

    join_all(&mut workers, timeout)?;

    let results = workers
        .iter_mut()
        .filter_map(|worker| {
            let output = worker.take_output()?;
            Some((worker.name().to_owned(), output))
        })
        .collect::<BTreeMap<_, _>>();
    debug!(results = %results.len(), "parallel run completed");

    Ok(results)
}

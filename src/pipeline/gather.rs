//! Concurrent gathering with a single, ordered writer.
//!
//! Each collaborator runs on its own named thread and may take as long as it
//! likes. Finished batches cross a bounded channel to the calling thread,
//! which holds them in a reorder buffer and hands them on strictly in plan
//! order. The store only ever sees one writer.

use std::collections::BTreeMap;
use std::error::Error;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};

use super::plan::SourcePlan;
use crate::error::{ConcordanceError, ConcordanceResult, ValidationError};
use crate::relation::RelationBatch;

/// Error type collaborators report. Its only effect is that the batch is
/// treated as absent.
pub type SourceError = Box<dyn Error + Send + Sync>;

/// A collaborator that produces one relation batch.
pub trait RelationSource: Send {
    /// Plan name this source produces.
    fn name(&self) -> &str;

    /// Fetches and parses the batch.
    ///
    /// # Errors
    /// Any failure; the batch is then skipped.
    fn fetch(&mut self) -> Result<RelationBatch, SourceError>;
}

type Delivery = (usize, Result<RelationBatch, SourceError>);

/// Runs every source concurrently and returns the batches that arrived, in
/// plan order.
///
/// # Errors
/// Returns a validation error if a source is not in the plan or two sources
/// share a name, and an internal error if a thread cannot be spawned. No
/// source is started in either case of validation failure.
pub fn gather(
    plan: &SourcePlan,
    sources: Vec<Box<dyn RelationSource>>,
    channel_capacity: usize,
) -> ConcordanceResult<Vec<RelationBatch>> {
    let mut batches = Vec::with_capacity(plan.len());
    drive(plan, sources, channel_capacity, |_, batch| {
        batches.extend(batch);
        Ok(())
    })?;
    Ok(batches)
}

/// Runs every source and calls `on_ready` once per planned source, in plan
/// order, as soon as that source and all earlier ones have settled. Absent
/// batches are passed as `None`.
///
/// If `on_ready` fails, remaining deliveries are discarded and the error is
/// returned after every thread has been joined.
pub(crate) fn drive<F>(
    plan: &SourcePlan,
    sources: Vec<Box<dyn RelationSource>>,
    channel_capacity: usize,
    mut on_ready: F,
) -> ConcordanceResult<()>
where
    F: FnMut(usize, Option<RelationBatch>) -> ConcordanceResult<()>,
{
    let positions = assign_positions(plan, &sources)?;

    let (tx, rx) = bounded::<Delivery>(channel_capacity.max(1));
    let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(sources.len());
    for (mut source, position) in sources.into_iter().zip(positions.iter().copied()) {
        let sender = tx.clone();
        let name = source.name().to_string();
        let spawned = thread::Builder::new()
            .name(format!("concordance-source-{position}"))
            .spawn(move || {
                let result = source.fetch();
                // The writer may already have stopped; nothing to do then.
                let _ = sender.send((position, result));
            });
        match spawned {
            Ok(handle) => handles.push((name, handle)),
            Err(e) => {
                // Unblock threads waiting on a full channel before joining.
                drop(tx);
                drop(rx);
                join_all(handles);
                return Err(ConcordanceError::internal(format!(
                    "failed to spawn thread for source '{name}': {e}"
                )));
            }
        }
    }
    drop(tx);

    let mut pending: Vec<bool> = vec![false; plan.len()];
    for &position in &positions {
        pending[position] = true;
    }

    let result = reorder(plan, &rx, &mut pending, &mut on_ready);
    drop(rx);
    join_all(handles);
    result
}

fn assign_positions(plan: &SourcePlan, sources: &[Box<dyn RelationSource>]) -> Result<Vec<usize>, ValidationError> {
    let mut claimed = BTreeMap::new();
    let mut positions = Vec::with_capacity(sources.len());
    for source in sources {
        let name = source.name();
        let Some(position) = plan.position(name) else {
            return Err(ValidationError::UnplannedSource {
                source_name: name.to_string(),
            });
        };
        if claimed.insert(position, name).is_some() {
            return Err(ValidationError::InvalidPlan {
                reason: format!("two collaborators produce source '{name}'"),
            });
        }
        positions.push(position);
    }
    Ok(positions)
}

/// Reorder buffer: holds early arrivals until every earlier slot settles.
fn reorder<F>(
    plan: &SourcePlan,
    rx: &Receiver<Delivery>,
    pending: &mut [bool],
    on_ready: &mut F,
) -> ConcordanceResult<()>
where
    F: FnMut(usize, Option<RelationBatch>) -> ConcordanceResult<()>,
{
    let mut arrived: BTreeMap<usize, Option<RelationBatch>> = BTreeMap::new();
    let mut next = 0;

    loop {
        while next < plan.len() && !pending[next] {
            let batch = arrived.remove(&next).flatten();
            on_ready(next, batch)?;
            next += 1;
        }
        if next == plan.len() {
            return Ok(());
        }

        let Ok((position, result)) = rx.recv() else {
            break;
        };
        pending[position] = false;
        let name = &plan.sources()[position].name;
        let batch = match result {
            Ok(mut batch) => {
                if batch.source != *name {
                    tracing::warn!(
                        source = %name,
                        reported = %batch.source,
                        "batch reported a different source name; using the planned one"
                    );
                    batch.source.clone_from(name);
                }
                Some(batch)
            }
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "source failed; its batch is absent");
                None
            }
        };
        arrived.insert(position, batch);
    }

    // Every sender is gone. Slots still pending belong to threads that died
    // without reporting.
    for (position, still_pending) in pending.iter_mut().enumerate().skip(next) {
        if *still_pending {
            tracing::warn!(source = %plan.sources()[position].name, "source exited without a batch");
            *still_pending = false;
        }
    }
    while next < plan.len() {
        on_ready(next, arrived.remove(&next).flatten())?;
        next += 1;
    }
    Ok(())
}

fn join_all(handles: Vec<(String, JoinHandle<()>)>) {
    for (name, handle) in handles {
        if handle.join().is_err() {
            tracing::error!(source = %name, "source thread panicked");
        }
    }
}

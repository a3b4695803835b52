//! Compactor
//!
//! One compaction cycle over all sealed segments.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::engine::EngineInner;
use crate::error::{Result, VaultError};
use crate::index::{Location, Relocation};
use crate::record::Record;
use crate::segment::{Segment, SegmentId, SegmentState};
use crate::storage::StorageManager;

/// Result of a compaction cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionStats {
    /// Empty sealed segments removed without a rewrite
    pub empty_removed: usize,
    /// Number of sealed segments rewritten
    pub input_segments: usize,
    /// Records read from the inputs
    pub records_scanned: u64,
    /// Records copied into the output
    pub records_retained: u64,
    /// Records superseded by a later write
    pub obsolete_dropped: u64,
    /// Tombstones dropped
    pub tombstones_dropped: u64,
    /// Size of the inputs
    pub bytes_before: u64,
    /// Size of the output
    pub bytes_after: u64,
    /// The new segment, `None` if nothing survived
    pub output: Option<SegmentId>,
    /// Whether the cycle swapped in its result
    pub committed: bool,
}

impl CompactionStats {
    pub fn records_dropped(&self) -> u64 {
        self.obsolete_dropped + self.tombstones_dropped
    }

    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Run one compaction cycle.
///
/// `cancel` is checked between phases; once set, the cycle abandons its work
/// before the commit point. The commit itself is never interrupted.
pub(crate) fn run_cycle(inner: &EngineInner, cancel: &AtomicBool) -> Result<CompactionStats> {
    let _cycle = inner.compaction_lock.lock();
    let started = Instant::now();

    // Tombstones may only be dropped once no older copy is left on disk
    remove_pending(inner)?;
    let empty_removed = retire_empty(inner);

    let inputs = claim_inputs(inner);
    let Some(newest) = inputs.last().map(|segment| segment.id()) else {
        tracing::debug!("no sealed segments to compact");
        return Ok(CompactionStats {
            empty_removed,
            ..CompactionStats::default()
        });
    };
    let mut claim = InputClaim {
        inputs: &inputs,
        committed: false,
    };

    let output_id = newest.compacted_successor();
    let mut output = CompactionOutput::new(&inner.storage, output_id);
    let mut relocation = Relocation::default();
    let mut stats = CompactionStats {
        empty_removed,
        input_segments: inputs.len(),
        bytes_before: inputs.iter().map(|segment| segment.size()).sum(),
        ..CompactionStats::default()
    };

    for segment in &inputs {
        check_cancelled(cancel)?;
        relocation.retired.insert(segment.id());

        let mut scanner = segment.scan()?;
        for item in scanner.by_ref() {
            let (offset, record) = item?;
            let location = Location::new(segment.id(), offset);
            stats.records_scanned += 1;

            if record.is_tombstone() {
                stats.tombstones_dropped += 1;
                relocation.dropped.insert(location);
                continue;
            }

            let is_latest = inner
                .state
                .read()
                .key_index
                .points_at(&record.key, location);
            if !is_latest {
                stats.obsolete_dropped += 1;
                relocation.dropped.insert(location);
                continue;
            }

            let new_offset = output.append(&record)?;
            relocation
                .moved
                .insert(location, Location::new(output_id, new_offset));
            stats.records_retained += 1;
        }

        // Anything indexed past this point is caught at commit
        if let Some(valid_len) = scanner.torn_tail() {
            tracing::warn!(
                segment = %segment.id(),
                valid_len,
                size = segment.size(),
                "sealed segment ends in unreadable data"
            );
        }
    }

    if stats.records_dropped() == 0 {
        tracing::debug!(inputs = inputs.len(), "nothing to reclaim");
        return Ok(stats);
    }

    check_cancelled(cancel)?;
    let installed = output.finish()?;
    stats.bytes_after = installed.as_ref().map_or(0, |segment| segment.size());
    stats.output = installed.as_ref().map(|segment| segment.id());

    if let Err(e) = commit(inner, &inputs, &relocation, installed.clone()) {
        if let Some(segment) = &installed {
            discard(segment);
        }
        return Err(e);
    }
    claim.committed = true;
    stats.committed = true;

    let removed = remove_retired(inner, &inputs);
    if removed < inputs.len() {
        tracing::warn!(
            pending = inputs.len() - removed,
            "retired segment files left on disk; retrying next cycle"
        );
    }

    tracing::info!(
        inputs = stats.input_segments,
        retained = stats.records_retained,
        obsolete = stats.obsolete_dropped,
        tombstones = stats.tombstones_dropped,
        bytes_before = stats.bytes_before,
        bytes_after = stats.bytes_after,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "compaction cycle committed"
    );

    Ok(stats)
}

/// Retire sealed segments that hold no records. Returns how many files
/// were removed.
fn retire_empty(inner: &EngineInner) -> usize {
    let empty: Vec<Arc<Segment>> = {
        let _writer = inner.writer.lock();
        let mut state = inner.state.write();
        let empty: Vec<Arc<Segment>> = state
            .segments
            .values()
            .filter(|segment| segment.state() == SegmentState::Sealed && segment.is_empty())
            .cloned()
            .collect();
        for segment in &empty {
            state.segments.remove(&segment.id());
            segment.set_state(SegmentState::Retired);
            state.retired.push(Arc::clone(segment));
        }
        empty
    };

    if empty.is_empty() {
        return 0;
    }
    tracing::debug!(count = empty.len(), "retiring empty segments");
    remove_retired(inner, &empty)
}

/// Mark every sealed segment as owned by this cycle, oldest first
fn claim_inputs(inner: &EngineInner) -> Vec<Arc<Segment>> {
    let state = inner.state.read();
    state
        .segments
        .values()
        .filter(|segment| segment.state() == SegmentState::Sealed)
        .inspect(|segment| segment.set_state(SegmentState::Compacting))
        .cloned()
        .collect()
}

/// Swap the compacted result into the live state.
///
/// Refuses to commit if either index still points into an input at a record
/// the scan never read (data past a corrupt header); nothing is changed then.
fn commit(
    inner: &EngineInner,
    inputs: &[Arc<Segment>],
    relocation: &Relocation,
    output: Option<Arc<Segment>>,
) -> Result<()> {
    let _writer = inner.writer.lock();
    let mut state = inner.state.write();

    let unread =
        state.key_index.unaccounted(relocation) + state.time_index.unaccounted(relocation);
    if unread > 0 {
        tracing::error!(unread, "indexed records were not reachable by the compaction scan");
        return Err(VaultError::Compaction(format!(
            "{} indexed records in the input segments could not be read",
            unread
        )));
    }

    // Index updates land before any input file is removed
    let keys_dropped = state.key_index.relocate(relocation);
    let events_dropped = state.time_index.relocate(relocation);

    for segment in inputs {
        state.segments.remove(&segment.id());
        segment.set_state(SegmentState::Retired);
        state.retired.push(Arc::clone(segment));
    }
    if let Some(output) = output {
        state.segments.insert(output.id(), output);
    }

    tracing::debug!(keys_dropped, events_dropped, "compaction indexes updated");
    Ok(())
}

/// Retry deleting files left over from an earlier cycle
fn remove_pending(inner: &EngineInner) -> Result<()> {
    let pending: Vec<Arc<Segment>> = inner.state.read().retired.clone();
    if pending.is_empty() {
        return Ok(());
    }

    let removed = remove_retired(inner, &pending);
    if removed < pending.len() {
        return Err(VaultError::Compaction(format!(
            "{} retired segment files could not be removed",
            pending.len() - removed
        )));
    }
    Ok(())
}

/// Delete retired files oldest first, stopping at the first failure so a
/// surviving file never outlives a newer one that shadowed it. Returns how
/// many were removed.
fn remove_retired(inner: &EngineInner, segments: &[Arc<Segment>]) -> usize {
    let mut removed = HashSet::new();

    for segment in segments {
        match segment.remove_file() {
            Ok(()) => {}
            Err(VaultError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(segment = %segment.id(), error = %e, "failed to remove retired segment");
                break;
            }
        }
        removed.insert(segment.id());
    }

    if !removed.is_empty() {
        if let Err(e) = inner.storage.sync_dir() {
            tracing::warn!(error = %e, "failed to sync data directory after removal");
        }
        inner
            .state
            .write()
            .retired
            .retain(|segment| !removed.contains(&segment.id()));
    }

    removed.len()
}

fn check_cancelled(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Acquire) {
        return Err(VaultError::Compaction("cancelled by shutdown".to_string()));
    }
    Ok(())
}

/// Returns claimed inputs to Sealed unless the cycle committed
struct InputClaim<'a> {
    inputs: &'a [Arc<Segment>],
    committed: bool,
}

impl Drop for InputClaim<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for segment in self.inputs {
            segment.set_state(SegmentState::Sealed);
        }
    }
}

/// The compaction output file, created on the first surviving record and
/// deleted again if the cycle does not get as far as installing it
struct CompactionOutput<'a> {
    storage: &'a StorageManager,
    id: SegmentId,
    segment: Option<Segment>,
}

impl<'a> CompactionOutput<'a> {
    fn new(storage: &'a StorageManager, id: SegmentId) -> Self {
        Self {
            storage,
            id,
            segment: None,
        }
    }

    fn append(&mut self, record: &Record) -> Result<u64> {
        let segment = match self.segment.take() {
            Some(segment) => segment,
            None => self.storage.create_compaction_output(self.id)?,
        };
        self.segment.insert(segment).append(record)
    }

    /// Seal under the permanent name. `None` if nothing was written.
    fn finish(mut self) -> Result<Option<Arc<Segment>>> {
        let Some(segment) = self.segment.take() else {
            return Ok(None);
        };

        if let Err(e) = self.storage.seal(&segment) {
            discard(&segment);
            return Err(e);
        }
        Ok(Some(Arc::new(segment)))
    }
}

impl Drop for CompactionOutput<'_> {
    fn drop(&mut self) {
        if let Some(segment) = self.segment.take() {
            discard(&segment);
        }
    }
}

fn discard(segment: &Segment) {
    if let Err(e) = segment.remove_file() {
        tracing::warn!(
            segment = %segment.id(),
            error = %e,
            "failed to remove abandoned compaction output"
        );
    }
}

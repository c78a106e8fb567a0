//! Propagator
//!
//! The write path and the wave that follows it.
//!
//! # Writes
//!
//! A write first asks the cell's equality policy whether anything changed.
//! If not, it stops there: no dirty mark, no wave. Otherwise the value is
//! stored right away, the id joins the pending set and a wave is requested.
//!
//! # Waves
//!
//! A wave runs in passes. Each pass takes a snapshot of the pending set and
//! clears it, so writes made by recomputation bodies during the pass land in
//! the next one instead of disturbing the iteration.
//!
//! Within a pass:
//!
//! 1. The scheduler collects every derived cell and effect reachable from
//!    the snapshot and orders them, dependencies first.
//! 2. Each node is visited once. It re-runs only if one of its current
//!    dependencies changed in this pass; a derived cell whose new value
//!    equals the old one does not count as changed.
//! 3. If a recomputation picked up a new dependency on a derived cell that
//!    changed after it ran, that cell is re-queued for another pass.
//!
//! Once no writes remain, subscribers are notified once per changed id.
//! Writes made by subscriber callbacks start a fresh wave.
//!
//! # Failure
//!
//! Panics in user code are not caught. They leave the wave half applied:
//! nodes not yet visited keep their stale values, and nothing is notified.
//! The running flag and the tracking stack are restored on the way out.

use std::cell::Cell;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace, warn};

use super::derived::DerivedSlot;
use super::runtime::Inner;
use super::state::StateSlot;
use super::wave::WaveReport;
use crate::error::{GraphError, Result};
use crate::graph::registry::Registry;
use crate::graph::{NodeId, NodeKind};

/// Clears the running flag when the wave ends, however it ends.
struct RunningGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

fn state_slot<T: 'static>(registry: &Registry, id: NodeId) -> Result<&StateSlot<T>> {
    registry
        .state(id)?
        .downcast_ref::<StateSlot<T>>()
        .ok_or(GraphError::TypeMismatch(id))
}

impl Inner {
    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read a state cell, recording the read if `tracked`.
    ///
    /// `f` runs while the registry is borrowed; it must not write.
    pub(crate) fn read_state<T: 'static, R>(
        &self,
        id: NodeId,
        tracked: bool,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        let registry = self.registry.borrow();
        let slot = state_slot::<T>(&registry, id)?;
        if tracked {
            self.tracker.track(id);
        }
        Ok(f(&slot.value))
    }

    /// Read a derived cell's cached value, recording the read if `tracked`.
    pub(crate) fn read_derived<T: 'static, R>(
        &self,
        id: NodeId,
        tracked: bool,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        let cell = self.registry.borrow().derived(id)?;
        let slot = cell
            .as_any()
            .downcast_ref::<DerivedSlot<T>>()
            .ok_or(GraphError::TypeMismatch(id))?;
        if tracked {
            self.tracker.track(id);
        }
        Ok(slot.with_value(f))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// The write path for state cells.
    pub(crate) fn write_state<T: 'static>(&self, id: NodeId, value: T) -> Result<()> {
        {
            let registry = self.registry.borrow();
            let slot = state_slot::<T>(&registry, id)?;
            if slot.equals.equals(&slot.value, &value) {
                return Ok(());
            }
        }

        let previous = {
            let mut registry = self.registry.borrow_mut();
            let slot = registry
                .state_mut(id)?
                .downcast_mut::<StateSlot<T>>()
                .ok_or(GraphError::TypeMismatch(id))?;
            std::mem::replace(&mut slot.value, value)
        };
        // The old value may own handles; drop it outside the borrow.
        drop(previous);

        self.pending.borrow_mut().insert(id);
        self.schedule_wave();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Waves
    // ------------------------------------------------------------------

    pub(crate) fn flush(&self) -> Result<WaveReport> {
        if self.wave_running.get() {
            return Ok(WaveReport::default());
        }
        self.wave_scheduled.set(false);

        let mut report = WaveReport::default();
        let mut changed = IndexSet::new();
        {
            let _running = RunningGuard::enter(&self.wave_running);
            loop {
                let dirty = std::mem::take(&mut *self.pending.borrow_mut());
                if dirty.is_empty() {
                    break;
                }
                if report.passes >= self.config.max_passes_per_wave {
                    self.pending.borrow_mut().extend(dirty);
                    warn!(passes = report.passes, "wave did not settle");
                    return Err(GraphError::WaveDidNotSettle {
                        passes: report.passes,
                    });
                }
                report.passes += 1;
                self.run_pass(dirty, &mut changed, &mut report);
            }
        }

        if report.passes == 0 {
            return Ok(report);
        }

        for id in changed {
            let callbacks = self.subscriptions.borrow().callbacks(id);
            for callback in callbacks {
                callback();
            }
            report.changed.push(id);
        }

        debug!(
            passes = report.passes,
            recomputed = report.recomputed.len(),
            effects_run = report.effects_run.len(),
            changed = report.changed.len(),
            "wave settled"
        );
        Ok(report)
    }

    fn run_pass(
        &self,
        dirty: IndexSet<NodeId>,
        changed_in_wave: &mut IndexSet<NodeId>,
        report: &mut WaveReport,
    ) {
        let order = self.registry.borrow().scheduler().mark_changed(dirty.iter().copied());
        trace!(dirty = dirty.len(), affected = order.len(), "pass started");

        // Step at which each id changed; 0 for the dirty states.
        let mut changed: IndexMap<NodeId, usize> = dirty.iter().map(|id| (*id, 0)).collect();
        // Step at which each node re-ran.
        let mut ran: IndexMap<NodeId, usize> = IndexMap::new();
        changed_in_wave.extend(dirty);
        self.created_in_pass.borrow_mut().clear();

        for (step, id) in order.into_iter().enumerate() {
            let step = step + 1;
            self.pass_step.set(step);
            let kind = {
                let registry = self.registry.borrow();
                let Some(kind) = registry.kind(id) else {
                    // Disposed or cleared while the pass ran.
                    continue;
                };
                let stale = registry
                    .dependencies(id)
                    .is_ok_and(|deps| deps.iter().any(|dep| changed.contains_key(dep)));
                if !stale {
                    continue;
                }
                kind
            };

            ran.insert(id, step);
            match kind {
                NodeKind::Derived => {
                    report.recomputed.push(id);
                    if self.recompute_derived(id) {
                        changed.insert(id, step);
                        changed_in_wave.insert(id);
                    }
                }
                NodeKind::Effect => {
                    report.effects_run.push(id);
                    self.rerun_effect(id);
                }
                NodeKind::State => {}
            }
        }

        self.pass_step.set(0);
        // A node created at a step read whatever that step could see, so it
        // is behind even a cell that changed at that very step.
        let created = std::mem::take(&mut *self.created_in_pass.borrow_mut());

        let late: Vec<NodeId> = {
            let registry = self.registry.borrow();
            changed
                .iter()
                .filter(|(_, changed_at)| **changed_at > 0)
                .filter(|(id, changed_at)| {
                    registry.dependents_of(**id).into_iter().any(|dependent| {
                        let ran_early = ran
                            .get(&dependent)
                            .is_some_and(|ran_at| ran_at < *changed_at);
                        let created_early = created
                            .get(&dependent)
                            .is_some_and(|created_at| created_at <= *changed_at);
                        ran_early || created_early
                    })
                })
                .map(|(id, _)| *id)
                .collect()
        };
        if !late.is_empty() {
            trace!(count = late.len(), "re-queueing cells read before they changed");
            self.pending.borrow_mut().extend(late);
        }
    }

    /// Recompute one derived cell. Returns whether its value changed.
    fn recompute_derived(&self, id: NodeId) -> bool {
        let cell = self.registry.borrow().derived(id);
        let Ok(cell) = cell else {
            return false;
        };

        let (changed, dependencies) = self.tracker.run_tracked(id, || cell.recompute());
        self.registry.borrow_mut().set_dependencies(id, dependencies);
        trace!(node = %id, changed, "recomputed derived");
        changed
    }

    /// Run an effect's outstanding cleanup, then the effect again.
    fn rerun_effect(&self, id: NodeId) {
        let begun = self.registry.borrow_mut().begin_effect_run(id);
        let Some((run, cleanup)) = begun else {
            return;
        };

        if let Some(cleanup) = cleanup {
            cleanup.run();
            // The cleanup may have disposed its own effect.
            if !self.registry.borrow().contains_effect(id) {
                return;
            }
        }

        let (cleanup, dependencies) = self.tracker.run_tracked(id, || run());
        let leftover = self
            .registry
            .borrow_mut()
            .finish_effect_run(id, dependencies, cleanup);
        if let Some(cleanup) = leftover {
            // Disposed during its own run.
            cleanup.run();
        }
        trace!(node = %id, "effect re-ran");
    }
}

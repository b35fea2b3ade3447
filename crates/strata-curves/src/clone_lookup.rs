//! Deep-copy utility preserving shared and cyclic reference topology.
//!
//! Calibrated models are cloned for scenario analysis. Instruments may share
//! underlying components (a payment schedule, a cached cash-flow piece), and
//! a faithful clone must map every original to exactly one clone: two
//! instruments sharing a component before the copy share the corresponding
//! cloned component afterwards.
//!
//! Cycles are detected with a per-entry status: an object whose clone is
//! requested while its own clone is still `InProgress` is a cycle, which
//! fails fast with `CyclicDependency`, unless the object under construction
//! registered a partially-built clone via [`CloneLookup::allow_weak`], in
//! which case dependents receive that substitute (`WeaklyShareable`). The
//! three states are deliberately distinct: collapsing `WeaklyShareable` into
//! `InProgress` would turn legitimate back-references into false cycles.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CurveError, CurveResult};
use crate::instruments::CalibrationInstrument;

/// An object that can be deep-copied through a [`CloneLookup`].
pub trait CloneWithLookup: Any + Send + Sync {
    /// Produces a clone, resolving any shared sub-objects through `lookup`.
    fn clone_with_lookup(&self, lookup: &mut CloneLookup) -> CurveResult<Arc<Self>>
    where
        Self: Sized;
}

/// Clone progress for one original object.
enum SharedEntry {
    /// Clone construction has started and not finished.
    InProgress,
    /// A partially-built clone registered as a safe weak-reference substitute.
    WeaklyShareable(Arc<dyn Any + Send + Sync>),
    /// Clone construction finished.
    Done(Arc<dyn Any + Send + Sync>),
}

/// Clone progress for a trait-object instrument.
enum InstrumentEntry {
    InProgress,
    Done(Arc<dyn CalibrationInstrument>),
}

/// Per-clone-operation map from original identity to clone.
///
/// Created at the start of one clone pass and discarded at the end. Identity
/// is the `Arc` data pointer, so the lookup is only meaningful while the
/// originals stay alive, which they do for the duration of the pass.
#[derive(Default)]
pub struct CloneLookup {
    shared: HashMap<usize, SharedEntry>,
    instruments: HashMap<usize, InstrumentEntry>,
}

impl CloneLookup {
    /// Creates an empty lookup for one clone pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the clone of `original`, constructing it on first request.
    ///
    /// # Errors
    ///
    /// Returns `CurveError::CyclicDependency` if `original`'s own clone is
    /// still in progress and no weak substitute was registered.
    pub fn get<T>(&mut self, original: &Arc<T>) -> CurveResult<Arc<T>>
    where
        T: CloneWithLookup,
    {
        let key = Arc::as_ptr(original) as *const () as usize;
        match self.shared.get(&key) {
            Some(SharedEntry::Done(clone) | SharedEntry::WeaklyShareable(clone)) => {
                let clone = Arc::clone(clone);
                clone.downcast::<T>().map_err(|_| {
                    CurveError::cyclic_dependency(format!(
                        "{} (type confusion in clone lookup)",
                        std::any::type_name::<T>()
                    ))
                })
            }
            Some(SharedEntry::InProgress) => Err(CurveError::cyclic_dependency(
                std::any::type_name::<T>(),
            )),
            None => {
                self.shared.insert(key, SharedEntry::InProgress);
                let clone = original.clone_with_lookup(self)?;
                self.shared.insert(
                    key,
                    SharedEntry::Done(Arc::clone(&clone) as Arc<dyn Any + Send + Sync>),
                );
                Ok(clone)
            }
        }
    }

    /// Registers a partially-constructed clone of `original` as a safe
    /// non-owning substitute for back-references encountered before the
    /// clone completes.
    pub fn allow_weak<T>(&mut self, original: &Arc<T>, partial: Arc<T>)
    where
        T: CloneWithLookup,
    {
        let key = Arc::as_ptr(original) as *const () as usize;
        self.shared.insert(
            key,
            SharedEntry::WeaklyShareable(partial as Arc<dyn Any + Send + Sync>),
        );
    }

    /// Returns the clone of a trait-object instrument, constructing it on
    /// first request. Instruments sharing components resolve those through
    /// the same lookup, preserving the sharing topology.
    ///
    /// # Errors
    ///
    /// Returns `CurveError::CyclicDependency` on an instrument cycle.
    pub fn get_instrument(
        &mut self,
        original: &Arc<dyn CalibrationInstrument>,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>> {
        let key = Arc::as_ptr(original) as *const () as usize;
        match self.instruments.get(&key) {
            Some(InstrumentEntry::Done(clone)) => Ok(Arc::clone(clone)),
            Some(InstrumentEntry::InProgress) => Err(CurveError::cyclic_dependency(
                original.description(),
            )),
            None => {
                self.instruments.insert(key, InstrumentEntry::InProgress);
                let clone = original.clone_with_lookup(self)?;
                self.instruments
                    .insert(key, InstrumentEntry::Done(Arc::clone(&clone)));
                Ok(clone)
            }
        }
    }
}

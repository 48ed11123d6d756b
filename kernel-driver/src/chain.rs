//! Ordered, rollback-safe resource acquisition.
//!
//! A driver brings itself up as a fixed sequence of steps (device number,
//! class, node, cdev, ...). Each step knows how to undo itself. When step
//! `k` refuses, steps `k-1 .. 0` are undone in reverse order and step `k`'s
//! release never runs. When every step succeeds the caller receives a
//! [`Teardown`] which undoes the whole chain exactly once.
//!
//! The chain is generic over the context `C` the steps mutate, so the same
//! machinery serves a full [`crate::driver::DriverCore`] and the small
//! samples that only create a proc entry or request an interrupt line.

use std::error::Error;
use std::fmt;
use std::mem;

use log::Level;

type Acquire<C, E> = Box<dyn FnOnce(&mut C) -> Result<(), E>>;
type Release<C> = Box<dyn FnOnce(&mut C) + Send + Sync>;

struct AcquisitionStep<C, E> {
    name: &'static str,
    acquire: Acquire<C, E>,
    release: Release<C>,
}

/// Builder for an ordered list of acquisition steps.
pub struct ResourceChain<C, E> {
    label: String,
    steps: Vec<AcquisitionStep<C, E>>,
}

impl<C, E: fmt::Display> ResourceChain<C, E> {
    /// `label` tags every log line the chain emits (normally the driver name).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step. `acquire` is responsible for its own atomicity: when
    /// it returns `Err` it must not leave anything behind, because its
    /// `release` will not be called.
    pub fn step<A, R>(mut self, name: &'static str, acquire: A, release: R) -> Self
    where
        A: FnOnce(&mut C) -> Result<(), E> + 'static,
        R: FnOnce(&mut C) + Send + Sync + 'static,
    {
        self.steps.push(AcquisitionStep {
            name,
            acquire: Box::new(acquire),
            release: Box::new(release),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order.
    pub fn run(self, ctx: &mut C) -> Result<Teardown<C>, FailedAt<E>> {
        let ResourceChain { label, steps } = self;
        let mut done: Vec<(&'static str, Release<C>)> = Vec::with_capacity(steps.len());

        for (index, step) in steps.into_iter().enumerate() {
            let AcquisitionStep {
                name,
                acquire,
                release,
            } = step;

            match acquire(ctx) {
                Ok(()) => {
                    crate::pr!(Level::Debug, label, "acquired {}", name);
                    done.push((name, release));
                }
                Err(source) => {
                    crate::pr!(
                        Level::Warn,
                        label,
                        "step {} ({}) failed: {}; rolling back {} step(s)",
                        index,
                        name,
                        source,
                        done.len()
                    );
                    unwind(&label, done, ctx);
                    return Err(FailedAt {
                        index,
                        step: name,
                        source,
                    });
                }
            }
        }

        Ok(Teardown { label, steps: done })
    }
}

fn unwind<C>(label: &str, steps: Vec<(&'static str, Release<C>)>, ctx: &mut C) {
    for (name, release) in steps.into_iter().rev() {
        release(ctx);
        crate::pr!(Level::Debug, label, "released {}", name);
    }
}

/// Releases for a fully acquired chain. Consumed by [`Teardown::teardown`],
/// so a chain cannot be torn down twice.
pub struct Teardown<C> {
    label: String,
    steps: Vec<(&'static str, Release<C>)>,
}

impl<C> Teardown<C> {
    /// Undo every step, last acquired first.
    pub fn teardown(mut self, ctx: &mut C) {
        let steps = mem::take(&mut self.steps);
        unwind(&self.label, steps, ctx);
    }

    /// Step names in acquisition order.
    pub fn steps(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<C> Drop for Teardown<C> {
    fn drop(&mut self) {
        if !self.steps.is_empty() {
            crate::pr!(
                Level::Warn,
                self.label,
                "dropped without teardown, {} resource(s) leaked",
                self.steps.len()
            );
        }
    }
}

impl<C> fmt::Debug for Teardown<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("label", &self.label)
            .field("steps", &self.steps().collect::<Vec<_>>())
            .finish()
    }
}

/// Which step refused, and why. `index` is 0-based.
#[derive(Debug)]
pub struct FailedAt<E> {
    pub index: usize,
    pub step: &'static str,
    pub source: E,
}

impl<E> FailedAt<E> {
    pub fn into_source(self) -> E {
        self.source
    }
}

impl<E: fmt::Display> fmt::Display for FailedAt<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({}) failed: {}", self.index, self.step, self.source)
    }
}

impl<E: Error + 'static> Error for FailedAt<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

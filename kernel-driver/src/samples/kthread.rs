//! Two counting threads, the second sleeping twice as long as the first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::Level;

use crate::chain::{ResourceChain, Teardown};
use crate::error::{DriverError, ModuleError};
use crate::kernel::{Kernel, Module, ModuleParams};
use crate::worker::{KThread, StopToken};

pub const DEFAULT_INTERVAL_MS: u64 = 1000;
const THREADS: [&str; 2] = ["kthread_1", "kthread_2"];
const TAG: &str = "kthread";

fn thread_function(nr: u32, interval: Duration, counter: Arc<AtomicU32>, stop: StopToken) {
    while !stop.should_stop() {
        let val = counter.fetch_add(1, Ordering::Relaxed);
        crate::pr!(Level::Info, TAG, "Thread {} is executed! Counter val: {}", nr, val);
        if stop.sleep(interval * nr) {
            break;
        }
    }
    crate::pr!(Level::Info, TAG, "Thread {} finished execution!", nr);
}

pub struct KThreads {
    threads: Vec<KThread>,
    teardown: Teardown<Vec<KThread>>,
    counters: [Arc<AtomicU32>; 2],
}

impl KThreads {
    /// Iterations thread `nr` (1 or 2) has run.
    pub fn count(&self, nr: usize) -> u32 {
        self.counters
            .get(nr.wrapping_sub(1))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn running(&self) -> usize {
        self.threads.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Module for KThreads {
    const NAME: &'static str = "kthread";

    fn init(_kernel: &Kernel, params: &ModuleParams) -> Result<Self, ModuleError> {
        crate::pr!(Level::Info, TAG, "Init threads");
        let interval = Duration::from_millis(params.get("interval_ms", DEFAULT_INTERVAL_MS)?);
        let counters = [Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0))];

        let mut chain = ResourceChain::<Vec<KThread>, DriverError>::new(TAG);
        for (nr, (name, counter)) in (1u32..).zip(THREADS.into_iter().zip(counters.iter().cloned())) {
            chain = chain.step(
                name,
                move |threads: &mut Vec<KThread>| {
                    let thread = KThread::run(name, move |stop| {
                        thread_function(nr, interval, counter, stop)
                    })
                    .map_err(|source| DriverError::Spawn {
                        name: name.to_owned(),
                        source,
                    })?;
                    crate::pr!(Level::Info, TAG, "Thread {} was created and it is running now!", nr);
                    threads.push(thread);
                    Ok(())
                },
                |threads: &mut Vec<KThread>| {
                    if let Some(thread) = threads.pop() {
                        thread.stop();
                    }
                },
            );
        }

        let mut threads = Vec::with_capacity(THREADS.len());
        let teardown = chain.run(&mut threads)?;
        Ok(Self {
            threads,
            teardown,
            counters,
        })
    }

    fn exit(self, _kernel: &Kernel) {
        crate::pr!(Level::Info, TAG, "Stopping both threads and exiting!");
        let KThreads {
            mut threads,
            teardown,
            ..
        } = self;
        teardown.teardown(&mut threads);
    }
}

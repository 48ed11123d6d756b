//! File-operation table and per-open session state.
//!
//!  * [`FileOperations`] is what a node, proc entry or sysfs attribute
//!    dispatches to. Every operation has a default, so an implementor
//!    only fills in what it supports.
//!  * [`OpenFile`] identifies one open session and the task that opened it.
//!  * [`PollTable`] collects the wait signals a `poll` registers on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::poll::DEFAULT_POLLMASK;

use crate::error::FileError;
use crate::notify::Task;
use crate::uaccess::{UserSlice, UserSliceMut};
use crate::wait::WaitSignal;

pub type PollMask = u32;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identity of one open file description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// One open session: who opened the file.
#[derive(Debug, Clone)]
pub struct OpenFile {
    id: SessionId,
    task: Task,
}

impl OpenFile {
    pub fn new(task: Task) -> Self {
        Self {
            id: SessionId::next(),
            task,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn task(&self) -> &Task {
        &self.task
    }
}

/// Wait signals registered by a `poll` call (`poll_wait`).
#[derive(Default)]
pub struct PollTable {
    waiters: Vec<Arc<WaitSignal>>,
}

impl PollTable {
    pub fn poll_wait(&mut self, signal: &Arc<WaitSignal>) {
        self.waiters.push(Arc::clone(signal));
    }

    pub fn waiters(&self) -> &[Arc<WaitSignal>] {
        &self.waiters
    }
}

/*──────────────────────────── file operations ───────────────────────────*/

pub trait FileOperations: Send {
    fn open(&mut self, _file: &OpenFile) -> Result<(), FileError> {
        Ok(())
    }

    fn release(&mut self, _file: &OpenFile) {}

    fn read(&mut self, _file: &OpenFile, _buf: &mut UserSliceMut<'_>) -> Result<usize, FileError> {
        Err(FileError::NotSupported("read"))
    }

    fn write(&mut self, _file: &OpenFile, _buf: &UserSlice<'_>) -> Result<usize, FileError> {
        Err(FileError::NotSupported("write"))
    }

    /// `arg` is absent for commands that carry no argument.
    fn unlocked_ioctl(
        &mut self,
        _file: &OpenFile,
        _cmd: u32,
        _arg: Option<&mut UserSliceMut<'_>>,
    ) -> Result<(), FileError> {
        Err(FileError::NotSupported("unlocked_ioctl"))
    }

    /// Non-blocking readiness check. Implementors register the signals a
    /// blocking caller should sleep on with [`PollTable::poll_wait`].
    fn poll(&mut self, _file: &OpenFile, _table: &mut PollTable) -> PollMask {
        DEFAULT_POLLMASK
    }
}

/// File operations shared between the registry, the VFS and their owner.
pub type SharedOps = Arc<Mutex<dyn FileOperations>>;

pub fn share<T: FileOperations + 'static>(ops: T) -> SharedOps {
    Arc::new(Mutex::new(ops))
}

/// Lock, carrying on with the inner value if a holder panicked.
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;
    impl FileOperations for Bare {}

    #[test]
    fn defaults_refuse_data_and_report_default_mask() {
        let mut ops = Bare;
        let file = OpenFile::new(Task::detached(1));
        let mut out = [0u8; 4];

        let err = ops.read(&file, &mut UserSliceMut::new(&mut out)).unwrap_err();
        assert_eq!(err.errno(), -shared::errno::EINVAL);
        let err = ops.unlocked_ioctl(&file, 0x5267, None).unwrap_err();
        assert_eq!(err.errno(), -shared::errno::ENOTTY);
        assert_eq!(ops.poll(&file, &mut PollTable::default()), DEFAULT_POLLMASK);
    }

    #[test]
    fn sessions_are_distinct() {
        let a = OpenFile::new(Task::detached(7));
        let b = OpenFile::new(Task::detached(7));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.task().pid(), 7);
    }
}

//! Minimal path namespace: `/dev` nodes, `/proc` and `/sys` entries.
//!
//! A node refers to a device number; opening it looks the number up in the
//! registry and dispatches to whatever file operations are bound there.
//! Proc and sysfs entries carry their file operations directly.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::devnum::DeviceNumber;
use shared::poll::{POLLIN, POLLRDNORM};

use crate::device::{OpenFile, PollMask, PollTable, SessionId, SharedOps, lock};
use crate::error::{FileError, VfsError};
use crate::notify::Task;
use crate::registry::EndpointRegistry;
use crate::uaccess::{UserSlice, UserSliceMut};
use crate::wait::SignalPending;

enum Entry {
    Dir,
    Node(DeviceNumber),
    File(SharedOps),
}

/// Directories that exist from boot.
const SKELETON: [&str; 5] = ["/dev", "/proc", "/sys", "/sys/class", "/sys/kernel"];

pub struct VirtualFs {
    registry: Arc<EndpointRegistry>,
    entries: Mutex<BTreeMap<String, Entry>>,
}

fn parent(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some(("", _)) if path.len() > 1 => Some("/"),
        Some((dir, _)) if !dir.is_empty() => Some(dir),
        _ => None,
    }
}

impl VirtualFs {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_owned(), Entry::Dir);
        for dir in SKELETON {
            entries.insert(dir.to_owned(), Entry::Dir);
        }
        Self {
            registry,
            entries: Mutex::new(entries),
        }
    }

    fn insert(&self, path: &str, entry: Entry) -> Result<(), VfsError> {
        let mut entries = lock(&self.entries);
        if entries.contains_key(path) {
            return Err(VfsError::Exists(path.to_owned()));
        }
        match parent(path).and_then(|p| entries.get(p)) {
            Some(Entry::Dir) => {}
            _ => return Err(VfsError::NoParent(path.to_owned())),
        }
        entries.insert(path.to_owned(), entry);
        Ok(())
    }

    pub fn mkdir(&self, path: &str) -> Result<(), VfsError> {
        self.insert(path, Entry::Dir)
    }

    /// `device_create`: a node for `number`.
    pub fn mknod(&self, path: &str, number: DeviceNumber) -> Result<(), VfsError> {
        self.insert(path, Entry::Node(number))
    }

    /// `proc_create` / `sysfs_create_file`.
    pub fn create_file(&self, path: &str, ops: SharedOps) -> Result<(), VfsError> {
        self.insert(path, Entry::File(ops))
    }

    /// Remove one entry. Directories must be empty.
    pub fn remove(&self, path: &str) -> Result<(), VfsError> {
        let mut entries = lock(&self.entries);
        match entries.get(path) {
            None => return Err(VfsError::NotFound(path.to_owned())),
            Some(Entry::Dir) => {
                let prefix = format!("{path}/");
                if entries.keys().any(|k| k.starts_with(&prefix)) {
                    return Err(VfsError::NotEmpty(path.to_owned()));
                }
            }
            Some(_) => {}
        }
        entries.remove(path);
        Ok(())
    }

    pub fn exists(&self, path: &str) -> bool {
        lock(&self.entries).contains_key(path)
    }

    /// Device number behind a node.
    pub fn node(&self, path: &str) -> Option<DeviceNumber> {
        match lock(&self.entries).get(path) {
            Some(Entry::Node(number)) => Some(*number),
            _ => None,
        }
    }

    /// Immediate children of `dir`, by name.
    pub fn list(&self, dir: &str) -> Vec<String> {
        lock(&self.entries)
            .keys()
            .filter(|k| parent(k) == Some(dir))
            .filter_map(|k| k.rsplit_once('/').map(|(_, name)| name.to_owned()))
            .collect()
    }

    pub fn open(&self, path: &str, task: Task) -> Result<File, FileError> {
        let ops = match lock(&self.entries).get(path) {
            Some(Entry::File(ops)) => Arc::clone(ops),
            Some(Entry::Node(number)) => self
                .registry
                .ops(*number)
                .ok_or(VfsError::NoDevice(*number))?,
            Some(Entry::Dir) => return Err(VfsError::IsDirectory(path.to_owned()).into()),
            None => return Err(VfsError::NotFound(path.to_owned()).into()),
        };

        let file = OpenFile::new(task);
        lock(&ops).open(&file)?;
        Ok(File { ops, file })
    }
}

/*──────────────────────────────── handle ────────────────────────────────*/

/// An open file. Closing (dropping) it calls `release`.
pub struct File {
    ops: SharedOps,
    file: OpenFile,
}

impl File {
    pub fn session(&self) -> SessionId {
        self.file.id()
    }

    pub fn read(&self, buf: &mut UserSliceMut<'_>) -> Result<usize, FileError> {
        lock(&self.ops).read(&self.file, buf)
    }

    /// Read up to `count` bytes into a fresh vector.
    pub fn read_bytes(&self, count: usize) -> Result<Vec<u8>, FileError> {
        let mut out = vec![0u8; count];
        let n = self.read(&mut UserSliceMut::new(&mut out))?;
        out.truncate(n.min(count));
        Ok(out)
    }

    pub fn write(&self, buf: &UserSlice<'_>) -> Result<usize, FileError> {
        lock(&self.ops).write(&self.file, buf)
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> Result<usize, FileError> {
        self.write(&UserSlice::new(bytes))
    }

    pub fn ioctl(&self, cmd: u32, arg: Option<&mut UserSliceMut<'_>>) -> Result<(), FileError> {
        lock(&self.ops).unlocked_ioctl(&self.file, cmd, arg)
    }

    /// Non-blocking readiness.
    pub fn poll(&self) -> PollMask {
        lock(&self.ops).poll(&self.file, &mut PollTable::default())
    }

    /// Block until the file reports readable, consuming the readiness.
    /// The driver lock is not held while sleeping.
    pub fn poll_blocking(&self, pending: &SignalPending) -> Result<PollMask, FileError> {
        let mut table = PollTable::default();
        let mask = lock(&self.ops).poll(&self.file, &mut table);
        match table.waiters().first() {
            None => Ok(mask),
            Some(signal) => {
                signal.wait_until_ready(pending)?;
                Ok(POLLIN | POLLRDNORM)
            }
        }
    }

    /// As [`Self::poll_blocking`], returning `0` when `timeout` elapses.
    pub fn poll_timeout(
        &self,
        pending: &SignalPending,
        timeout: Duration,
    ) -> Result<PollMask, FileError> {
        let mut table = PollTable::default();
        let mask = lock(&self.ops).poll(&self.file, &mut table);
        match table.waiters().first() {
            None => Ok(mask),
            Some(signal) => Ok(if signal.wait_timeout(pending, timeout)? {
                POLLIN | POLLRDNORM
            } else {
                0
            }),
        }
    }

    pub fn close(self) {}
}

impl Drop for File {
    fn drop(&mut self) {
        lock(&self.ops).release(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FileOperations, share};
    use crate::registry::IdentityRequest;

    struct Greeting;

    impl FileOperations for Greeting {
        fn read(&mut self, _: &OpenFile, buf: &mut UserSliceMut<'_>) -> Result<usize, FileError> {
            let text = b"hi\n";
            let n = buf.len().min(text.len());
            buf.copy_to_user(&text[..n])?;
            Ok(n)
        }
    }

    fn fs() -> (Arc<EndpointRegistry>, VirtualFs) {
        let registry = Arc::new(EndpointRegistry::new());
        let fs = VirtualFs::new(Arc::clone(&registry));
        (registry, fs)
    }

    #[test]
    fn entries_need_a_parent_directory() {
        let (_, fs) = fs();
        assert_eq!(
            fs.create_file("/proc/hello/dummy", share(Greeting)),
            Err(VfsError::NoParent("/proc/hello/dummy".into()))
        );
        fs.mkdir("/proc/hello").unwrap();
        fs.create_file("/proc/hello/dummy", share(Greeting)).unwrap();
        assert_eq!(fs.list("/proc/hello"), ["dummy"]);
    }

    #[test]
    fn non_empty_directory_cannot_be_removed() {
        let (_, fs) = fs();
        fs.mkdir("/proc/hello").unwrap();
        fs.create_file("/proc/hello/dummy", share(Greeting)).unwrap();
        assert_eq!(
            fs.remove("/proc/hello"),
            Err(VfsError::NotEmpty("/proc/hello".into()))
        );
        fs.remove("/proc/hello/dummy").unwrap();
        fs.remove("/proc/hello").unwrap();
        assert!(!fs.exists("/proc/hello"));
    }

    #[test]
    fn node_without_bound_driver_is_enodev() {
        let (registry, fs) = fs();
        let r = registry.register(IdentityRequest::Fixed(91), "x").unwrap();
        fs.mknod("/dev/x", r.endpoint.number()).unwrap();

        let err = fs.open("/dev/x", Task::detached(1)).err().unwrap();
        assert_eq!(err.errno(), -shared::errno::ENODEV);

        registry.cdev_add(r.endpoint.number(), share(Greeting)).unwrap();
        let file = fs.open("/dev/x", Task::detached(1)).unwrap();
        assert_eq!(file.read_bytes(16).unwrap(), b"hi\n");
    }

    #[test]
    fn missing_path_is_enoent() {
        let (_, fs) = fs();
        let err = fs.open("/dev/nothing", Task::detached(1)).err().unwrap();
        assert_eq!(err.errno(), -shared::errno::ENOENT);
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent("/dev"), Some("/"));
        assert_eq!(parent("/dev/lkm_poll"), Some("/dev"));
        assert_eq!(parent("/"), None);
    }
}

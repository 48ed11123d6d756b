//! A text file under `/proc/hello`.

use log::Level;
use shared::constants::PROCFS_FILE;

use crate::chain::{ResourceChain, Teardown};
use crate::device::{FileOperations, OpenFile, share};
use crate::error::{DriverError, FileError, ModuleError};
use crate::kernel::{Kernel, Module, ModuleParams};
use crate::uaccess::{UserSlice, UserSliceMut, transferred};

pub const PROC_DIR: &str = "/proc/hello";
pub const GREETING: &str = "Hello from a procfs file\n";
const WRITE_LIMIT: usize = 256;
const TAG: &str = "procfs_test";

struct ProcDummy;

impl FileOperations for ProcDummy {
    fn read(&mut self, _file: &OpenFile, buf: &mut UserSliceMut<'_>) -> Result<usize, FileError> {
        let to_copy = buf.len().min(GREETING.len());
        Ok(transferred(
            to_copy,
            buf.copy_to_user(&GREETING.as_bytes()[..to_copy]),
        ))
    }

    fn write(&mut self, _file: &OpenFile, buf: &UserSlice<'_>) -> Result<usize, FileError> {
        let mut text = [0u8; WRITE_LIMIT];
        let to_copy = buf.len().min(text.len());
        let copied = transferred(to_copy, buf.copy_from_user(&mut text[..to_copy]));
        crate::pr!(
            Level::Info,
            TAG,
            "You have written {} to me",
            String::from_utf8_lossy(&text[..copied])
        );
        Ok(copied)
    }
}

pub struct ProcFs {
    teardown: Teardown<Kernel>,
}

impl Module for ProcFs {
    const NAME: &'static str = "procfs";

    fn init(kernel: &Kernel, _params: &ModuleParams) -> Result<Self, ModuleError> {
        let teardown = ResourceChain::<Kernel, DriverError>::new(TAG)
            .step(
                "proc_mkdir",
                |k: &mut Kernel| Ok(k.vfs.mkdir(PROC_DIR)?),
                |k: &mut Kernel| {
                    let _ = k.vfs.remove(PROC_DIR);
                },
            )
            .step(
                "proc_create",
                |k: &mut Kernel| Ok(k.vfs.create_file(PROCFS_FILE, share(ProcDummy))?),
                |k: &mut Kernel| {
                    let _ = k.vfs.remove(PROCFS_FILE);
                },
            )
            .run(&mut kernel.clone())?;
        crate::pr!(Level::Info, TAG, "Created {}", PROCFS_FILE);
        Ok(Self { teardown })
    }

    fn exit(self, kernel: &Kernel) {
        self.teardown.teardown(&mut kernel.clone());
        crate::pr!(Level::Info, TAG, "Removed {}", PROCFS_FILE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Task;

    #[test]
    fn reads_greeting_and_accepts_writes() {
        let (kernel, _) = Kernel::simulated();
        let module = ProcFs::init(&kernel, &ModuleParams::new()).unwrap();

        let file = kernel.vfs.open(PROCFS_FILE, Task::detached(1)).unwrap();
        assert_eq!(file.read_bytes(100).unwrap(), GREETING.as_bytes());
        assert_eq!(file.read_bytes(5).unwrap(), b"Hello");
        assert_eq!(file.write_bytes(&[b'x'; 300]).unwrap(), WRITE_LIMIT);
        drop(file);

        module.exit(&kernel);
        assert!(!kernel.vfs.exists(PROCFS_FILE));
        assert!(!kernel.vfs.exists(PROC_DIR));
    }

    #[test]
    fn occupied_directory_fails_without_leftovers() {
        let (kernel, _) = Kernel::simulated();
        kernel.vfs.mkdir(PROC_DIR).unwrap();
        let err = ProcFs::init(&kernel, &ModuleParams::new()).err().unwrap();
        assert!(matches!(err, ModuleError::Load(ref f) if f.step == "proc_mkdir"));
        assert!(kernel.vfs.list(PROC_DIR).is_empty());
    }
}

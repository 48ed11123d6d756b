//! Fallible allocation: a scratch word freed straight away and a zeroed
//! record that is kept until unload.

use log::Level;

use crate::chain::{ResourceChain, Teardown};
use crate::error::{AllocationError, DriverError, ModuleError};
use crate::kernel::{Kernel, Module, ModuleParams};

pub const SCRATCH_VALUE: u32 = 0x0A0B_0C0D;
pub const RECORD_VERSION: u8 = 123;
pub const RECORD_TEXT: &str = "This is a test string for my Linux Kernel Module";
pub const TEXT_LEN: usize = 64;
const TAG: &str = "alloc_test";

/// Per-driver record, zeroed on allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverData {
    pub version: u8,
    pub text: [u8; TEXT_LEN],
}

impl Default for DriverData {
    fn default() -> Self {
        Self {
            version: 0,
            text: [0; TEXT_LEN],
        }
    }
}

impl DriverData {
    /// Text up to the first NUL.
    pub fn text(&self) -> String {
        let end = self.text.iter().position(|&b| b == 0).unwrap_or(TEXT_LEN);
        String::from_utf8_lossy(&self.text[..end]).into_owned()
    }

    /// Store `text`, truncated so a terminating NUL always fits.
    pub fn set_text(&mut self, text: &str) {
        let n = text.len().min(TEXT_LEN - 1);
        self.text = [0; TEXT_LEN];
        self.text[..n].copy_from_slice(&text.as_bytes()[..n]);
    }
}

/// `kzalloc`: `count` zeroed values, or `OutOfMemory` when the allocator
/// refuses the request.
pub fn kzalloc<T: Default + Clone>(count: usize) -> Result<Vec<T>, AllocationError> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(count)
        .map_err(|_| AllocationError::OutOfMemory(count.saturating_mul(size_of::<T>())))?;
    values.resize(count, T::default());
    Ok(values)
}

pub struct AllocTest {
    record: Vec<DriverData>,
    teardown: Teardown<Vec<DriverData>>,
}

impl AllocTest {
    pub fn record(&self) -> Option<&DriverData> {
        self.record.first()
    }
}

impl Module for AllocTest {
    const NAME: &'static str = "alloc_test";

    fn init(_kernel: &Kernel, _params: &ModuleParams) -> Result<Self, ModuleError> {
        let mut record = Vec::new();
        let teardown = ResourceChain::<Vec<DriverData>, DriverError>::new(TAG)
            .step(
                "scratch",
                |_: &mut Vec<DriverData>| {
                    let mut word = kzalloc::<u32>(1)?;
                    for slot in &mut word {
                        crate::pr!(Level::Info, TAG, "[kzalloc][Before assigning] - word: {:#x}", slot);
                        *slot = SCRATCH_VALUE;
                        crate::pr!(Level::Info, TAG, "[kzalloc][After assigning] - word: {:#x}", slot);
                    }
                    Ok(())
                },
                |_: &mut Vec<DriverData>| {},
            )
            .step(
                "record",
                |record: &mut Vec<DriverData>| {
                    *record = kzalloc::<DriverData>(1)?;
                    for data in record.iter_mut() {
                        crate::pr!(
                            Level::Info,
                            TAG,
                            "[kzalloc][Before assigning] - version: {}, text: {:?}",
                            data.version,
                            data.text()
                        );
                        data.version = RECORD_VERSION;
                        data.set_text(RECORD_TEXT);
                        crate::pr!(
                            Level::Info,
                            TAG,
                            "[kzalloc][After assigning] - version: {}, text: {:?}",
                            data.version,
                            data.text()
                        );
                    }
                    Ok(())
                },
                |record: &mut Vec<DriverData>| {
                    for data in record.drain(..) {
                        crate::pr!(
                            Level::Info,
                            TAG,
                            "[kzalloc][On module exit] - version: {}, text: {:?}",
                            data.version,
                            data.text()
                        );
                    }
                },
            )
            .run(&mut record)?;
        Ok(Self { record, teardown })
    }

    fn exit(self, _kernel: &Kernel) {
        let AllocTest {
            mut record,
            teardown,
        } = self;
        teardown.teardown(&mut record);
    }
}

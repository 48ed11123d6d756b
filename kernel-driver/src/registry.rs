//! Character-device number space.
//!
//! Key responsibilities:
//! - Hand out device identities, fixed (`register_chrdev`) or dynamic
//!   (`alloc_chrdev_region`).
//! - Report whether a fixed major was fresh or already in use.
//! - Bind file operations to an identity (`cdev_add` / `cdev_del`).
//! - Render the `/proc/devices` view.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use log::Level;
use shared::devnum::DeviceNumber;

use crate::consts::{DYNAMIC_MAJOR_HIGH, DYNAMIC_MAJOR_LOW, MAX_MAJOR, MINORS_PER_MAJOR};
use crate::device::{SharedOps, lock};
use crate::error::{AllocationError, DeregisterError};

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// How a driver wants its identity chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRequest {
    Fixed(u32),
    Dynamic,
}

/// What the registry did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The fixed major was unused.
    Fresh,
    /// The fixed major already had a holder; `existing` is its first identity.
    Shared { existing: DeviceNumber },
    /// A free major was picked for the caller.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Unregistered,
    Registering,
    Active,
    Deregistering,
}

/// A registered identity. Returned to the registry to free it.
#[derive(Debug)]
pub struct Endpoint {
    number: DeviceNumber,
    name: String,
    state: EndpointState,
    registry: u64,
}

impl Endpoint {
    pub fn number(&self) -> DeviceNumber {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: EndpointState) {
        self.state = state;
    }
}

#[derive(Debug)]
pub struct Registration {
    pub endpoint: Endpoint,
    pub outcome: SlotOutcome,
}

impl Registration {
    /// The integer `register_chrdev` style callers see: `0` for a fresh
    /// major, the packed existing identity when shared, the major when
    /// allocated dynamically.
    pub fn status_code(&self) -> i32 {
        match self.outcome {
            SlotOutcome::Fresh => 0,
            SlotOutcome::Shared { existing } => existing.encode() as i32,
            SlotOutcome::Dynamic => self.endpoint.number.major as i32,
        }
    }
}

/*──────────────────────────────── registry ──────────────────────────────*/

/// Thread-safe table of device numbers and their bound file operations.
pub struct EndpointRegistry {
    id: u64,
    reserved: BTreeSet<u32>,
    majors: Mutex<BTreeMap<u32, BTreeMap<u32, String>>>,
    cdevs: Mutex<HashMap<DeviceNumber, SharedOps>>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::with_reserved([])
    }

    /// Majors in `reserved` refuse every registration.
    pub fn with_reserved(reserved: impl IntoIterator<Item = u32>) -> Self {
        Self {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            reserved: reserved.into_iter().collect(),
            majors: Mutex::new(BTreeMap::new()),
            cdevs: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        request: IdentityRequest,
        name: &str,
    ) -> Result<Registration, AllocationError> {
        let mut majors = lock(&self.majors);

        let (number, outcome) = match request {
            IdentityRequest::Fixed(major) => {
                if major == 0 || major > MAX_MAJOR {
                    return Err(AllocationError::OutOfRange(major));
                }
                if self.reserved.contains(&major) {
                    return Err(AllocationError::Unavailable(major));
                }
                match majors.get(&major) {
                    None => (DeviceNumber::new(major, 0), SlotOutcome::Fresh),
                    Some(minors) => {
                        let existing = minors.keys().next().copied().unwrap_or(0);
                        let minor = (0..MINORS_PER_MAJOR)
                            .find(|m| !minors.contains_key(m))
                            .ok_or(AllocationError::MinorsExhausted(major))?;
                        (
                            DeviceNumber::new(major, minor),
                            SlotOutcome::Shared {
                                existing: DeviceNumber::new(major, existing),
                            },
                        )
                    }
                }
            }
            IdentityRequest::Dynamic => {
                let major = (DYNAMIC_MAJOR_LOW..=DYNAMIC_MAJOR_HIGH)
                    .rev()
                    .find(|m| !majors.contains_key(m) && !self.reserved.contains(m))
                    .ok_or(AllocationError::NoDynamicMajor)?;
                (DeviceNumber::new(major, 0), SlotOutcome::Dynamic)
            }
        };

        majors
            .entry(number.major)
            .or_default()
            .insert(number.minor, name.to_owned());

        crate::pr!(
            Level::Info,
            name,
            "registered device number Major: {}, Minor: {}",
            number.major,
            number.minor
        );

        Ok(Registration {
            endpoint: Endpoint {
                number,
                name: name.to_owned(),
                state: EndpointState::Registering,
                registry: self.id,
            },
            outcome,
        })
    }

    /// Free an identity. Any file operations still bound to it are dropped.
    pub fn deregister(&self, mut endpoint: Endpoint) -> Result<(), DeregisterError> {
        let number = endpoint.number;
        if endpoint.registry != self.id {
            return Err(DeregisterError::Unknown(number));
        }

        let mut majors = lock(&self.majors);
        let minors = majors
            .get_mut(&number.major)
            .ok_or(DeregisterError::Unknown(number))?;
        minors
            .remove(&number.minor)
            .ok_or(DeregisterError::Unknown(number))?;
        if minors.is_empty() {
            majors.remove(&number.major);
        }
        drop(majors);

        if lock(&self.cdevs).remove(&number).is_some() {
            crate::pr!(Level::Warn, endpoint.name, "{} was still bound at deregistration", number);
        }

        endpoint.set_state(EndpointState::Unregistered);
        crate::pr!(Level::Info, endpoint.name, "released device number {}", number);
        Ok(())
    }

    /// Name of the holder of `number`, if any.
    pub fn resolve(&self, number: DeviceNumber) -> Option<String> {
        lock(&self.majors)
            .get(&number.major)
            .and_then(|minors| minors.get(&number.minor))
            .cloned()
    }

    pub fn is_registered(&self, number: DeviceNumber) -> bool {
        self.resolve(number).is_some()
    }

    /// Every registered identity, in order.
    pub fn devices(&self) -> Vec<(DeviceNumber, String)> {
        lock(&self.majors)
            .iter()
            .flat_map(|(&major, minors)| {
                minors
                    .iter()
                    .map(move |(&minor, name)| (DeviceNumber::new(major, minor), name.clone()))
            })
            .collect()
    }

    /// `/proc/devices`: one line per major, named after its first holder.
    pub fn proc_devices(&self) -> String {
        let mut out = String::from("Character devices:\n");
        for (major, minors) in lock(&self.majors).iter() {
            if let Some(name) = minors.values().next() {
                let _ = writeln!(out, "{major:>3} {name}");
            }
        }
        out
    }

    /*──────────── cdev binding ───────────*/

    pub fn cdev_add(&self, number: DeviceNumber, ops: SharedOps) -> Result<(), AllocationError> {
        if !self.is_registered(number) {
            return Err(AllocationError::NotRegistered(number));
        }
        let mut cdevs = lock(&self.cdevs);
        if cdevs.contains_key(&number) {
            return Err(AllocationError::AlreadyBound(number));
        }
        cdevs.insert(number, ops);
        Ok(())
    }

    pub fn cdev_del(&self, number: DeviceNumber) -> Option<SharedOps> {
        lock(&self.cdevs).remove(&number)
    }

    /// File operations bound to `number`.
    pub fn ops(&self, number: DeviceNumber) -> Option<SharedOps> {
        lock(&self.cdevs).get(&number).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FileOperations, share};

    struct Inert;
    impl FileOperations for Inert {}

    #[test]
    fn fixed_major_fresh_then_shared() {
        let reg = EndpointRegistry::new();

        let first = reg.register(IdentityRequest::Fixed(91), "my_dev_nr").unwrap();
        assert_eq!(first.outcome, SlotOutcome::Fresh);
        assert_eq!(first.status_code(), 0);
        assert_eq!(first.endpoint.number(), DeviceNumber::new(91, 0));

        let second = reg.register(IdentityRequest::Fixed(91), "other").unwrap();
        let existing = DeviceNumber::new(91, 0);
        assert_eq!(second.outcome, SlotOutcome::Shared { existing });
        assert_eq!(second.status_code(), existing.encode() as i32);
        assert_eq!(second.endpoint.number(), DeviceNumber::new(91, 1));
    }

    #[test]
    fn out_of_range_and_reserved_majors_are_refused() {
        let reg = EndpointRegistry::with_reserved([91]);
        assert_eq!(
            reg.register(IdentityRequest::Fixed(0), "zero").unwrap_err(),
            AllocationError::OutOfRange(0)
        );
        assert_eq!(
            reg.register(IdentityRequest::Fixed(512), "big").unwrap_err(),
            AllocationError::OutOfRange(512)
        );
        assert_eq!(
            reg.register(IdentityRequest::Fixed(91), "taken").unwrap_err(),
            AllocationError::Unavailable(91)
        );
        assert!(reg.devices().is_empty());
    }

    #[test]
    fn dynamic_majors_count_down_and_run_out() {
        let reg = EndpointRegistry::new();
        let a = reg.register(IdentityRequest::Dynamic, "a").unwrap();
        let b = reg.register(IdentityRequest::Dynamic, "b").unwrap();
        assert_eq!(a.endpoint.number().major, DYNAMIC_MAJOR_HIGH);
        assert_eq!(b.endpoint.number().major, DYNAMIC_MAJOR_HIGH - 1);
        assert_eq!(a.outcome, SlotOutcome::Dynamic);
        assert_eq!(a.status_code(), DYNAMIC_MAJOR_HIGH as i32);

        let window = (DYNAMIC_MAJOR_HIGH - DYNAMIC_MAJOR_LOW + 1) as usize;
        for i in 2..window {
            reg.register(IdentityRequest::Dynamic, &format!("d{i}")).unwrap();
        }
        assert_eq!(
            reg.register(IdentityRequest::Dynamic, "late").unwrap_err(),
            AllocationError::NoDynamicMajor
        );
    }

    #[test]
    fn deregister_frees_the_identity() {
        let reg = EndpointRegistry::new();
        let r = reg.register(IdentityRequest::Fixed(91), "x").unwrap();
        let number = r.endpoint.number();
        reg.deregister(r.endpoint).unwrap();

        assert!(!reg.is_registered(number));
        let again = reg.register(IdentityRequest::Fixed(91), "x").unwrap();
        assert_eq!(again.outcome, SlotOutcome::Fresh);
    }

    #[test]
    fn foreign_endpoint_is_unknown() {
        let ours = EndpointRegistry::new();
        let theirs = EndpointRegistry::new();
        let r = theirs.register(IdentityRequest::Fixed(91), "x").unwrap();
        assert_eq!(
            ours.deregister(r.endpoint),
            Err(DeregisterError::Unknown(DeviceNumber::new(91, 0)))
        );
    }

    #[test]
    fn cdev_binding_requires_registration() {
        let reg = EndpointRegistry::new();
        let number = DeviceNumber::new(91, 0);
        assert_eq!(
            reg.cdev_add(number, share(Inert)).unwrap_err(),
            AllocationError::NotRegistered(number)
        );

        let r = reg.register(IdentityRequest::Fixed(91), "x").unwrap();
        reg.cdev_add(number, share(Inert)).unwrap();
        assert_eq!(
            reg.cdev_add(number, share(Inert)).unwrap_err(),
            AllocationError::AlreadyBound(number)
        );
        assert!(reg.ops(number).is_some());

        reg.deregister(r.endpoint).unwrap();
        assert!(reg.ops(number).is_none());
    }

    #[test]
    fn proc_devices_lists_majors() {
        let reg = EndpointRegistry::new();
        reg.register(IdentityRequest::Fixed(91), "my_dev_nr").unwrap();
        reg.register(IdentityRequest::Dynamic, "dummydriver").unwrap();
        assert_eq!(
            reg.proc_devices(),
            "Character devices:\n 91 my_dev_nr\n254 dummydriver\n"
        );
    }
}

//! Driver composition and lifecycle.
//!
//! Key responsibilities:
//! - Describe a driver declaratively ([`DriverSpec`]).
//! - Bring it up through a [`ResourceChain`] so a refused step leaves
//!   nothing behind, and take it down in exact reverse order.
//! - Route file operations on its node to the data plane, the control
//!   plane and the readiness signal ([`DeviceFile`]).
//!
//! Load order: `chrdev_region`, `wait_queue`, `buffer`, `cdev_init`,
//! `cdev_add`, `class`, `device_node`, extras, `worker`. Optional steps are
//! skipped when the [`DriverSpec`] does not ask for them.

use std::sync::{Arc, Mutex};

use log::Level;
use shared::devnum::DeviceNumber;
use shared::ioctl::IoctlCode;
use shared::poll::{DEFAULT_POLLMASK, POLLIN, POLLRDNORM};

use crate::chain::{ResourceChain, Teardown};
use crate::consts::DEFAULT_SIGNAL;
use crate::control::{CommandTable, ControlPlane, Direction};
use crate::data::DataPlane;
use crate::device::{FileOperations, OpenFile, PollMask, PollTable, lock};
use crate::error::{DeliveryError, DriverError, FileError, Interrupted, LoadError};
use crate::kernel::Kernel;
use crate::notify::{EventKind, NotificationChannel, Task};
use crate::registry::{EndpointState, IdentityRequest, Registration, SlotOutcome};
use crate::uaccess::{UserSlice, UserSliceMut};
use crate::wait::{SignalPending, WaitSignal};
use crate::worker::{KThread, StopToken};

/*──────────────────────────────── hooks ─────────────────────────────────*/

/// The readiness signal, notification channel and lifecycle state of one
/// driver. Handed to command handlers, extra steps and the worker.
#[derive(Clone, Debug)]
pub struct DriverHooks {
    ready: Arc<WaitSignal>,
    notifier: Arc<NotificationChannel>,
    state: Arc<Mutex<DriverState>>,
}

impl DriverHooks {
    /// Hooks are created while the driver is [`DriverState::Loading`].
    pub fn new(name: &str, signo: i32) -> Self {
        Self {
            ready: Arc::new(WaitSignal::new(name)),
            notifier: Arc::new(NotificationChannel::new(name, signo)),
            state: Arc::new(Mutex::new(DriverState::Loading)),
        }
    }

    pub fn driver_state(&self) -> DriverState {
        *lock(&self.state)
    }

    fn set_state(&self, state: DriverState) {
        *lock(&self.state) = state;
    }

    /// Mark the device readable and wake one waiter.
    pub fn signal_ready(&self) {
        self.ready.signal_ready();
    }

    pub fn notify(&self, kind: EventKind) -> Result<(), DeliveryError> {
        self.notifier.notify(kind)
    }

    pub fn ready(&self) -> &Arc<WaitSignal> {
        &self.ready
    }

    pub fn notifier(&self) -> &Arc<NotificationChannel> {
        &self.notifier
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Unloaded,
    Loading,
    Active,
    Unloading,
}

/*─────────────────────────────── builder ────────────────────────────────*/

type ExtraAcquire = Box<dyn FnOnce(&Kernel, &DriverHooks) -> Result<(), DriverError>>;
type ExtraRelease = Box<dyn FnOnce(&Kernel) + Send + Sync>;
type WorkerBody = Box<dyn FnOnce(DriverHooks, StopToken) + Send>;

struct Extra {
    name: &'static str,
    acquire: ExtraAcquire,
    release: ExtraRelease,
}

/// Everything a driver is made of, consumed by [`DriverCore::load`].
pub struct DriverSpec<S> {
    name: String,
    identity: IdentityRequest,
    class: Option<String>,
    node: Option<String>,
    capacity: usize,
    signo: i32,
    pollable: bool,
    commands: CommandTable<S>,
    state: S,
    extras: Vec<Extra>,
    worker: Option<(String, WorkerBody)>,
}

impl<S: Send + 'static> DriverSpec<S> {
    /// A driver with a dynamic identity, no buffer and no commands.
    pub fn new(name: &str, state: S) -> Self {
        Self {
            name: name.to_owned(),
            identity: IdentityRequest::Dynamic,
            class: None,
            node: None,
            capacity: 0,
            signo: DEFAULT_SIGNAL,
            pollable: false,
            commands: CommandTable::new(),
            state,
            extras: Vec::new(),
            worker: None,
        }
    }

    pub fn identity(mut self, identity: IdentityRequest) -> Self {
        self.identity = identity;
        self
    }

    /// Device class directory under `/sys/class`.
    pub fn class(mut self, class: &str) -> Self {
        self.class = Some(class.to_owned());
        self
    }

    /// Path of the device node to create.
    pub fn node(mut self, path: &str) -> Self {
        self.node = Some(path.to_owned());
        self
    }

    /// Give the driver a data plane of `capacity` bytes.
    pub fn buffer(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn signal(mut self, signo: i32) -> Self {
        self.signo = signo;
        self
    }

    /// Wire `poll` to the readiness signal. Without it the node answers
    /// every poll with `DEFAULT_POLLMASK` and never blocks.
    pub fn pollable(mut self) -> Self {
        self.pollable = true;
        self
    }

    pub fn commands(mut self, commands: CommandTable<S>) -> Self {
        self.commands = commands;
        self
    }

    /// An additional acquisition step, run after the node exists.
    pub fn extra<A, R>(mut self, name: &'static str, acquire: A, release: R) -> Self
    where
        A: FnOnce(&Kernel, &DriverHooks) -> Result<(), DriverError> + 'static,
        R: FnOnce(&Kernel) + Send + Sync + 'static,
    {
        self.extras.push(Extra {
            name,
            acquire: Box::new(acquire),
            release: Box::new(release),
        });
        self
    }

    /// A background thread started last and stopped first.
    pub fn worker<F>(mut self, name: &str, body: F) -> Self
    where
        F: FnOnce(DriverHooks, StopToken) + Send + 'static,
    {
        self.worker = Some((name.to_owned(), Box::new(body)));
        self
    }
}

/*──────────────────────────── device file ───────────────────────────────*/

/// File operations of a driver's node.
pub struct DeviceFile<S> {
    name: String,
    data: Option<DataPlane>,
    control: ControlPlane<S>,
    state: S,
    hooks: DriverHooks,
    pollable: bool,
}

impl<S> DeviceFile<S> {
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn data(&self) -> Option<&DataPlane> {
        self.data.as_ref()
    }
}

impl<S: Send + 'static> FileOperations for DeviceFile<S> {
    fn open(&mut self, file: &OpenFile) -> Result<(), FileError> {
        crate::pr!(Level::Info, self.name, "open was called by pid {}", file.task().pid());
        Ok(())
    }

    fn release(&mut self, file: &OpenFile) {
        if self.hooks.notifier.release_session(file.id()) {
            crate::pr!(Level::Info, self.name, "consumer {} released", file.task().pid());
        }
        crate::pr!(Level::Info, self.name, "close was called");
    }

    fn read(&mut self, _file: &OpenFile, buf: &mut UserSliceMut<'_>) -> Result<usize, FileError> {
        let data = self.data.as_ref().ok_or(FileError::NotSupported("read"))?;
        Ok(data.read(buf))
    }

    fn write(&mut self, _file: &OpenFile, buf: &UserSlice<'_>) -> Result<usize, FileError> {
        let data = self.data.as_mut().ok_or(FileError::NotSupported("write"))?;
        Ok(data.write(buf, buf.len()))
    }

    fn unlocked_ioctl(
        &mut self,
        file: &OpenFile,
        cmd: u32,
        arg: Option<&mut UserSliceMut<'_>>,
    ) -> Result<(), FileError> {
        let direction = Direction::from_ioc(IoctlCode::decode(cmd).dir);
        self.control
            .dispatch(&mut self.state, file, &self.hooks, cmd, direction, arg)
            .inspect_err(|e| crate::pr!(Level::Warn, self.name, "ioctl: {}", e))?;
        Ok(())
    }

    fn poll(&mut self, _file: &OpenFile, table: &mut PollTable) -> PollMask {
        if !self.pollable {
            return DEFAULT_POLLMASK;
        }
        table.poll_wait(&self.hooks.ready);
        if self.hooks.ready.poll() {
            POLLIN | POLLRDNORM
        } else {
            0
        }
    }
}

/*──────────────────────────────── core ──────────────────────────────────*/

/// What the load chain acquires, in acquisition order.
struct Resources<S> {
    kernel: Kernel,
    name: String,
    registration: Option<Registration>,
    hooks: Option<DriverHooks>,
    data: Option<DataPlane>,
    device: Option<Arc<Mutex<DeviceFile<S>>>>,
    worker: Option<KThread>,
}

impl<S> Resources<S> {
    fn number(&self) -> Result<DeviceNumber, DriverError> {
        self.registration
            .as_ref()
            .map(|r| r.endpoint.number())
            .ok_or(DriverError::MissingResource("chrdev_region"))
    }

    fn hooks(&self) -> Result<DriverHooks, DriverError> {
        self.hooks
            .clone()
            .ok_or(DriverError::MissingResource("wait_queue"))
    }
}

/// A loaded driver. Unloads on drop.
pub struct DriverCore<S: Send + 'static> {
    name: String,
    number: DeviceNumber,
    outcome: SlotOutcome,
    status: i32,
    device: Arc<Mutex<DeviceFile<S>>>,
    hooks: DriverHooks,
    resources: Resources<S>,
    teardown: Option<Teardown<Resources<S>>>,
}

impl<S: Send + 'static> DriverCore<S> {
    pub fn load(kernel: &Kernel, spec: DriverSpec<S>) -> Result<Self, LoadError> {
        let DriverSpec {
            name,
            identity,
            class,
            node,
            capacity,
            signo,
            pollable,
            commands,
            state,
            extras,
            worker,
        } = spec;
        crate::pr!(Level::Info, name, "loading");

        let mut chain = ResourceChain::<Resources<S>, DriverError>::new(name.clone())
            .step(
                "chrdev_region",
                move |res: &mut Resources<S>| {
                    let registration = res.kernel.registry.register(identity, &res.name)?;
                    res.registration = Some(registration);
                    Ok(())
                },
                |res: &mut Resources<S>| {
                    if let Some(Registration { mut endpoint, .. }) = res.registration.take() {
                        endpoint.set_state(EndpointState::Deregistering);
                        if let Err(e) = res.kernel.registry.deregister(endpoint) {
                            crate::pr!(Level::Error, res.name, "{}", e);
                        }
                    }
                },
            )
            .step(
                "wait_queue",
                move |res: &mut Resources<S>| {
                    res.hooks = Some(DriverHooks::new(&res.name, signo));
                    Ok(())
                },
                |res: &mut Resources<S>| {
                    if let Some(hooks) = res.hooks.take() {
                        hooks.notifier.clear_consumer();
                        hooks.set_state(DriverState::Unloaded);
                    }
                },
            );

        if capacity > 0 {
            chain = chain.step(
                "buffer",
                move |res: &mut Resources<S>| {
                    res.data = Some(DataPlane::new(&res.name, capacity)?);
                    Ok(())
                },
                |res: &mut Resources<S>| res.data = None,
            );
        }

        chain = chain
            .step(
                "cdev_init",
                move |res: &mut Resources<S>| {
                    let control = ControlPlane::new(&res.name, commands)?;
                    let hooks = res.hooks()?;
                    res.device = Some(Arc::new(Mutex::new(DeviceFile {
                        name: res.name.clone(),
                        data: res.data.take(),
                        control,
                        state,
                        hooks,
                        pollable,
                    })));
                    Ok(())
                },
                |res: &mut Resources<S>| res.device = None,
            )
            .step(
                "cdev_add",
                |res: &mut Resources<S>| {
                    let number = res.number()?;
                    let device = res
                        .device
                        .clone()
                        .ok_or(DriverError::MissingResource("cdev_init"))?;
                    res.kernel.registry.cdev_add(number, device)?;
                    Ok(())
                },
                |res: &mut Resources<S>| {
                    if let Ok(number) = res.number() {
                        res.kernel.registry.cdev_del(number);
                    }
                },
            );

        if let Some(class) = class {
            let dir = format!("/sys/class/{class}");
            let undo = dir.clone();
            chain = chain.step(
                "class",
                move |res: &mut Resources<S>| Ok(res.kernel.vfs.mkdir(&dir)?),
                move |res: &mut Resources<S>| {
                    let _ = res.kernel.vfs.remove(&undo);
                },
            );
        }

        if let Some(path) = node {
            let undo = path.clone();
            chain = chain.step(
                "device_node",
                move |res: &mut Resources<S>| {
                    let number = res.number()?;
                    Ok(res.kernel.vfs.mknod(&path, number)?)
                },
                move |res: &mut Resources<S>| {
                    let _ = res.kernel.vfs.remove(&undo);
                },
            );
        }

        for Extra {
            name: step,
            acquire,
            release,
        } in extras
        {
            chain = chain.step(
                step,
                move |res: &mut Resources<S>| acquire(&res.kernel, &res.hooks()?),
                move |res: &mut Resources<S>| release(&res.kernel),
            );
        }

        if let Some((thread, body)) = worker {
            chain = chain.step(
                "worker",
                move |res: &mut Resources<S>| {
                    let hooks = res.hooks()?;
                    let handle = KThread::run(&thread, move |stop| body(hooks, stop))
                        .map_err(|source| DriverError::Spawn {
                            name: thread.clone(),
                            source,
                        })?;
                    res.worker = Some(handle);
                    Ok(())
                },
                |res: &mut Resources<S>| {
                    if let Some(handle) = res.worker.take() {
                        handle.stop();
                    }
                },
            );
        }

        let steps = chain.len();
        let mut resources = Resources {
            kernel: kernel.clone(),
            name: name.clone(),
            registration: None,
            hooks: None,
            data: None,
            device: None,
            worker: None,
        };

        let teardown = chain
            .run(&mut resources)
            .inspect_err(|e| crate::pr!(Level::Error, name, "load refused: {}", e))?;

        let parts = resources.device.clone().zip(resources.hooks.clone()).zip(
            resources
                .registration
                .as_ref()
                .map(|r| (r.endpoint.number(), r.outcome, r.status_code())),
        );
        let Some(((device, hooks), (number, outcome, status))) = parts else {
            teardown.teardown(&mut resources);
            return Err(LoadError {
                index: steps,
                step: "activate",
                source: DriverError::MissingResource("cdev_init"),
            });
        };
        if let Some(registration) = resources.registration.as_mut() {
            registration.endpoint.set_state(EndpointState::Active);
        }
        hooks.set_state(DriverState::Active);

        crate::pr!(
            Level::Info,
            name,
            "loaded as {} ({} step(s), status {})",
            number,
            teardown.len(),
            status
        );

        Ok(Self {
            name,
            number,
            outcome,
            status,
            device,
            hooks,
            resources,
            teardown: Some(teardown),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DriverState {
        self.hooks.driver_state()
    }

    pub fn number(&self) -> DeviceNumber {
        self.number
    }

    pub fn outcome(&self) -> SlotOutcome {
        self.outcome
    }

    /// `register_chrdev` style status of the identity request.
    pub fn status_code(&self) -> i32 {
        self.status
    }

    pub fn registration(&self) -> Option<&Registration> {
        self.resources.registration.as_ref()
    }

    pub fn endpoint_state(&self) -> EndpointState {
        self.resources
            .registration
            .as_ref()
            .map_or(EndpointState::Unregistered, |r| r.endpoint.state())
    }

    pub fn hooks(&self) -> &DriverHooks {
        &self.hooks
    }

    /// Inspect or adjust the driver's private state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(lock(&self.device).state_mut())
    }

    /*──────────── file operations without going through a node ───────────*/

    pub fn open(&self, task: Task) -> Result<OpenFile, FileError> {
        let file = OpenFile::new(task);
        lock(&self.device).open(&file)?;
        Ok(file)
    }

    pub fn close(&self, file: OpenFile) {
        lock(&self.device).release(&file);
    }

    pub fn read(&self, file: &OpenFile, dst: &mut UserSliceMut<'_>) -> Result<usize, FileError> {
        lock(&self.device).read(file, dst)
    }

    pub fn write(&self, file: &OpenFile, src: &UserSlice<'_>) -> Result<usize, FileError> {
        lock(&self.device).write(file, src)
    }

    pub fn control(
        &self,
        file: &OpenFile,
        cmd: u32,
        arg: Option<&mut UserSliceMut<'_>>,
    ) -> Result<(), FileError> {
        lock(&self.device).unlocked_ioctl(file, cmd, arg)
    }

    pub fn poll(&self, file: &OpenFile) -> PollMask {
        lock(&self.device).poll(file, &mut PollTable::default())
    }

    /// Block until readable; consumes the readiness.
    pub fn wait_readable(&self, pending: &SignalPending) -> Result<PollMask, Interrupted> {
        self.hooks.ready.wait_until_ready(pending)?;
        Ok(POLLIN | POLLRDNORM)
    }

    /// Release everything in reverse acquisition order.
    pub fn unload(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(teardown) = self.teardown.take() else {
            return;
        };
        self.hooks.set_state(DriverState::Unloading);
        crate::pr!(Level::Info, self.name, "unloading");
        teardown.teardown(&mut self.resources);
        self.hooks.set_state(DriverState::Unloaded);
        crate::pr!(Level::Info, self.name, "unloaded");
    }
}

impl<S: Send + 'static> Drop for DriverCore<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AllocationError;
    use shared::constants::{CMD_UNLOCK, MY_MAJOR};
    use std::time::Duration;

    #[test]
    fn load_and_unload_release_identity() {
        let (kernel, _) = Kernel::simulated();
        let core = DriverCore::load(
            &kernel,
            DriverSpec::new("t", ()).buffer(16).node("/dev/t"),
        )
        .unwrap();
        let number = core.number();
        assert_eq!(core.state(), DriverState::Active);
        assert_eq!(core.endpoint_state(), EndpointState::Active);
        assert!(kernel.registry.ops(number).is_some());
        assert!(kernel.vfs.exists("/dev/t"));

        core.unload();
        assert!(!kernel.registry.is_registered(number));
        assert!(kernel.registry.ops(number).is_none());
        assert!(!kernel.vfs.exists("/dev/t"));
    }

    #[test]
    fn refused_identity_leaves_nothing() {
        let kernel = Kernel::new(
            Arc::new(crate::registry::EndpointRegistry::with_reserved([MY_MAJOR])),
            Arc::new(crate::gpio::SimGpio::new(1)),
        );
        let err = DriverCore::load(
            &kernel,
            DriverSpec::new("t", ())
                .identity(IdentityRequest::Fixed(MY_MAJOR))
                .node("/dev/t"),
        )
        .err()
        .unwrap();

        assert_eq!(err.index, 0);
        assert_eq!(err.step, "chrdev_region");
        assert!(matches!(
            err.source,
            DriverError::Allocation(AllocationError::Unavailable(91))
        ));
        assert!(!kernel.vfs.exists("/dev/t"));
    }

    #[test]
    fn failing_extra_step_rolls_back_node_and_identity() {
        let (kernel, _) = Kernel::simulated();
        let err = DriverCore::load(
            &kernel,
            DriverSpec::new("t", ()).node("/dev/t").extra(
                "refuse",
                |_, _| Err(DriverError::MissingResource("test")),
                |_| {},
            ),
        )
        .err()
        .unwrap();

        assert_eq!(err.step, "refuse");
        assert!(!kernel.vfs.exists("/dev/t"));
        assert!(kernel.registry.devices().is_empty());
    }

    #[test]
    fn unlock_command_wakes_blocked_waiter() {
        let (kernel, _) = Kernel::simulated();
        let core = Arc::new(
            DriverCore::load(
                &kernel,
                DriverSpec::new("poll", ())
                    .pollable()
                    .commands(CommandTable::<()>::new().plain(CMD_UNLOCK, |ctx| {
                        ctx.hooks.signal_ready();
                        Ok(())
                    })),
            )
            .unwrap(),
        );

        let waiter = {
            let core = Arc::clone(&core);
            std::thread::spawn(move || core.wait_readable(&SignalPending::new()))
        };
        std::thread::sleep(Duration::from_millis(20));

        let file = core.open(Task::detached(1)).unwrap();
        core.control(&file, CMD_UNLOCK, None).unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(POLLIN | POLLRDNORM));
        assert_eq!(core.poll(&file), 0);
    }

    #[test]
    fn unpolled_driver_reports_default_mask() {
        let (kernel, _) = Kernel::simulated();
        let core = DriverCore::load(&kernel, DriverSpec::new("t", ()).buffer(8)).unwrap();
        let file = core.open(Task::detached(1)).unwrap();
        assert_eq!(core.poll(&file), DEFAULT_POLLMASK);
        core.hooks().signal_ready();
        assert_eq!(core.poll(&file), DEFAULT_POLLMASK);
    }

    #[test]
    fn extra_steps_run_while_loading() {
        let (kernel, _) = Kernel::simulated();
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let err = DriverCore::load(
            &kernel,
            DriverSpec::new("t", ())
                .extra(
                    "observe",
                    move |_, hooks| {
                        *slot.lock().unwrap() = Some((hooks.driver_state(), hooks.clone()));
                        Ok(())
                    },
                    |_| {},
                )
                .extra(
                    "refuse",
                    |_, _| Err(DriverError::MissingResource("test")),
                    |_| {},
                ),
        )
        .err()
        .unwrap();
        assert_eq!(err.step, "refuse");

        let (during, hooks) = seen.lock().unwrap().take().unwrap();
        assert_eq!(during, DriverState::Loading);
        assert_eq!(hooks.driver_state(), DriverState::Unloaded);
    }

    #[test]
    fn driver_without_buffer_refuses_read() {
        let (kernel, _) = Kernel::simulated();
        let core = DriverCore::load(&kernel, DriverSpec::new("t", ())).unwrap();
        let file = core.open(Task::detached(1)).unwrap();
        let mut out = [0u8; 4];
        let err = core
            .read(&file, &mut UserSliceMut::new(&mut out))
            .unwrap_err();
        assert_eq!(err.errno(), -shared::errno::EINVAL);
    }
}

//! The [`Cell`] handle shared by pipelines, schedulers and callers.

use super::context::{Emission, InitContext, StepContext};
use super::hooks::{Hook, HookSet};
use super::parameter::{ParamInput, ParamValue, Parameter, ParameterSet};
use super::traits::{CellDyn, CellKind};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::registry::CellDescriptor;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Where a cell is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Instantiated, nothing acquired.
    Created,
    /// `initialize` succeeded; the cell may step.
    Initialized,
    /// Resources released after a failed channel open; may initialize again.
    Released,
    /// Shut down for good.
    Closed,
}

/// Implementation plus lifecycle, guarded by the per-cell lock.
///
/// The scheduler holds this lock for the duration of a step and parameter
/// writes take it too, so a change always lands between two frames.
pub(crate) struct CellCore {
    imp: Box<dyn CellDyn>,
    lifecycle: Lifecycle,
}

impl CellCore {
    pub(crate) fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }

    pub(crate) fn renegotiate(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.imp.renegotiate(name, value)
    }
}

pub(crate) type CoreLock = Arc<Mutex<CellCore>>;

struct CellInner {
    name: String,
    type_name: String,
    kind: CellKind,
    params: ParameterSet,
    hooks: HookSet,
    core: CoreLock,
    steps: AtomicU64,
    shutdowns: AtomicU64,
}

/// A named processing unit inside a pipeline.
///
/// Cheap to clone; all clones refer to the same cell.
#[derive(Clone)]
pub struct Cell {
    inner: Arc<CellInner>,
}

impl Cell {
    /// Instantiate `descriptor` under the role `name`.
    pub(crate) fn new(name: &str, descriptor: &CellDescriptor) -> Result<Self> {
        let imp = descriptor.create();
        if imp.kind() != descriptor.kind {
            return Err(Error::init(
                name,
                format!(
                    "factory for '{}' built a {} but the type declares a {}",
                    descriptor.type_name,
                    imp.kind(),
                    descriptor.kind
                ),
            ));
        }

        let core: CoreLock = Arc::new(Mutex::new(CellCore {
            imp,
            lifecycle: Lifecycle::Created,
        }));
        let params = ParameterSet::new(name, &descriptor.parameters, &core);
        let hooks = HookSet::new(name, &descriptor.hooks);

        Ok(Self {
            inner: Arc::new(CellInner {
                name: name.to_string(),
                type_name: descriptor.type_name.clone(),
                kind: descriptor.kind,
                params,
                hooks,
                core,
                steps: AtomicU64::new(0),
                shutdowns: AtomicU64::new(0),
            }),
        })
    }

    /// Role of the cell within its pipeline (e.g. `src`).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registered type identifier (e.g. `TestImage`).
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    /// Capability variant.
    pub fn kind(&self) -> CellKind {
        self.inner.kind
    }

    /// Number of input ports.
    pub fn input_ports(&self) -> usize {
        self.inner.kind.input_ports()
    }

    /// Number of output ports.
    pub fn output_ports(&self) -> usize {
        self.inner.kind.output_ports()
    }

    /// All parameters, in schema order.
    pub fn parameters(&self) -> &ParameterSet {
        &self.inner.params
    }

    /// Look up a parameter.
    pub fn parameter(&self, name: &str) -> Result<Arc<Parameter>> {
        self.inner
            .params
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownParameter {
                cell: self.inner.name.clone(),
                parameter: name.to_string(),
            })
    }

    /// Shorthand for `parameter(name)?.set(value)`.
    pub fn set_parameter(&self, name: &str, value: impl Into<ParamInput>) -> Result<()> {
        self.parameter(name)?.set(value)
    }

    /// Look up a hook.
    pub fn hook(&self, name: &str) -> Result<Arc<Hook>> {
        self.inner
            .hooks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownHook {
                cell: self.inner.name.clone(),
                hook: name.to_string(),
            })
    }

    /// All hooks of this cell.
    pub fn hooks(&self) -> &HookSet {
        &self.inner.hooks
    }

    /// Current lifecycle stage.
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lifecycle
    }

    /// Steps taken since creation.
    pub fn steps(&self) -> u64 {
        self.inner.steps.load(Ordering::Relaxed)
    }

    /// How many times the implementation's `shutdown` has run.
    pub fn shutdown_count(&self) -> u64 {
        self.inner.shutdowns.load(Ordering::Relaxed)
    }

    /// Whether `other` is a handle to the same cell.
    pub fn ptr_eq(&self, other: &Cell) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Acquire resources. No-op when already initialized.
    pub(crate) fn initialize(&self) -> Result<()> {
        let mut core = self.lock_core();
        match core.lifecycle {
            Lifecycle::Initialized => return Ok(()),
            Lifecycle::Closed => {
                return Err(Error::init(&self.inner.name, "cell has been shut down"));
            }
            Lifecycle::Created | Lifecycle::Released => {}
        }

        let ctx = InitContext::new(&self.inner.name, &self.inner.params);
        core.imp.initialize(&ctx).map_err(|e| match e {
            Error::Init { .. } => e,
            other => Error::init(&self.inner.name, other.to_string()),
        })?;
        core.lifecycle = Lifecycle::Initialized;
        tracing::debug!(cell = %self.inner.name, type_name = %self.inner.type_name, "cell initialized");
        Ok(())
    }

    /// Run one step, then fire the hook invocations it staged.
    ///
    /// Errors are always reported as [`Error::Step`] (or the `Timeout`
    /// sub-kind) tagged with this cell's role.
    #[cfg(test)]
    pub(crate) fn step(&self, input: Option<Frame>, tick: u64) -> Result<Option<Frame>> {
        let (output, emissions) = self.step_staged(input, tick)?;
        self.fire(emissions)?;
        Ok(output)
    }

    /// Run one step and hand back the hook invocations it staged, unfired.
    ///
    /// A panic inside the implementation is reported as a step error of
    /// this cell.
    pub(crate) fn step_staged(
        &self,
        input: Option<Frame>,
        tick: u64,
    ) -> Result<(Option<Frame>, Vec<Emission>)> {
        let mut emissions: Vec<Emission> = Vec::new();
        let output = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut core = self.lock_core();
            if !core.is_initialized() {
                return Err(Error::step(
                    &self.inner.name,
                    format!("cannot step a cell in state {:?}", core.lifecycle),
                ));
            }
            let mut ctx = StepContext::new(&self.inner.name, &self.inner.params, tick, &mut emissions);
            core.imp.step(input, &mut ctx).map_err(|e| {
                if e.is_step_error() {
                    e
                } else {
                    Error::step(&self.inner.name, e.to_string())
                }
            })
        }))
        .map_err(|payload| {
            Error::step(&self.inner.name, format!("panicked: {}", panic_message(&*payload)))
        })??;
        self.inner.steps.fetch_add(1, Ordering::Relaxed);
        Ok((output, emissions))
    }

    /// Invoke the observers of staged emissions. Must not be called with
    /// any scheduling lock held.
    pub(crate) fn fire(&self, emissions: Vec<Emission>) -> Result<()> {
        for emission in emissions {
            let Some(hook) = self.inner.hooks.get(&emission.hook) else {
                tracing::warn!(
                    cell = %self.inner.name,
                    hook = %emission.hook,
                    "emission for undeclared hook dropped"
                );
                continue;
            };
            panic::catch_unwind(AssertUnwindSafe(|| {
                hook.fire(emission.frame.as_ref(), &emission.metadata)
            }))
            .map_err(|payload| {
                Error::step(
                    &self.inner.name,
                    format!(
                        "observer of '{}' panicked: {}",
                        emission.hook,
                        panic_message(&*payload)
                    ),
                )
            })?;
        }
        Ok(())
    }

    /// Undo a successful `initialize` while the channel is still open-able.
    pub(crate) fn release(&self) {
        let mut core = self.lock_core();
        if core.lifecycle == Lifecycle::Initialized {
            core.imp.shutdown();
            core.lifecycle = Lifecycle::Released;
            self.inner.shutdowns.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cell = %self.inner.name, "cell released");
        }
    }

    /// Release resources and close the cell's hooks for good.
    ///
    /// Idempotent: returns `true` only for the call that performed the
    /// transition. The implementation's `shutdown` is invoked unless its
    /// resources were already released after a failed open.
    pub fn shutdown(&self) -> bool {
        {
            let mut core = self.lock_core();
            match core.lifecycle {
                Lifecycle::Closed => return false,
                Lifecycle::Released => {}
                Lifecycle::Created | Lifecycle::Initialized => {
                    core.imp.shutdown();
                    self.inner.shutdowns.fetch_add(1, Ordering::Relaxed);
                }
            }
            core.lifecycle = Lifecycle::Closed;
        }
        self.inner.hooks.close_all();
        tracing::debug!(cell = %self.inner.name, "cell shut down");
        true
    }

    fn lock_core(&self) -> std::sync::MutexGuard<'_, CellCore> {
        self.inner
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("name", &self.inner.name)
            .field("type_name", &self.inner.type_name)
            .field("kind", &self.inner.kind)
            .field("params", &self.inner.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{ParamFormat, ParamSpec, Sink, Source};
    use crate::frame::{FrameFormat, PixelFormat};
    use crate::metadata::{Metadata, MetadataValue};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Sensor {
        shutdowns: Arc<AtomicUsize>,
        refuse_resize: bool,
    }

    impl Source for Sensor {
        fn produce(&mut self, ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
            let (w, h) = ctx.params().dimension("Dimension").unwrap_or((1, 1));
            let format = FrameFormat::new(w, h, PixelFormat::Gray8);
            let frame = Frame::new(vec![0u8; format.frame_size()], format, ctx.tick());
            ctx.emit(
                "on_frame",
                Some(frame.clone()),
                Metadata::new().with("tick", MetadataValue::Int(ctx.tick() as i64)),
            );
            Ok(Some(frame))
        }

        fn renegotiate(&mut self, _name: &str, _value: &ParamValue) -> Result<()> {
            if self.refuse_resize {
                return Err(Error::step("sensor", "resize needs restart"));
            }
            Ok(())
        }

        fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn descriptor(shutdowns: Arc<AtomicUsize>, refuse_resize: bool) -> CellDescriptor {
        CellDescriptor::source("Sensor", move || Sensor {
            shutdowns: Arc::clone(&shutdowns),
            refuse_resize,
        })
        .with_param(ParamSpec::new(
            "Dimension",
            ParamFormat::Dimension,
            ParamValue::Dimension {
                width: 4,
                height: 2,
            },
        ))
        .with_hook("on_frame")
    }

    struct Discard;

    impl Sink for Discard {
        fn consume(&mut self, _frame: Frame, _ctx: &mut StepContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_step_requires_initialize() {
        let cell = Cell::new("src", &descriptor(Arc::default(), false)).unwrap();
        assert_eq!(cell.lifecycle(), Lifecycle::Created);
        assert!(cell.step(None, 0).unwrap_err().is_step_error());

        cell.initialize().unwrap();
        let frame = cell.step(None, 0).unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 2));
        assert_eq!(cell.steps(), 1);
    }

    #[test]
    fn test_hook_fires_after_step() {
        let cell = Cell::new("src", &descriptor(Arc::default(), false)).unwrap();
        cell.initialize().unwrap();

        let ticks = Arc::new(StdMutex::new(Vec::new()));
        let ticks_clone = Arc::clone(&ticks);
        cell.hook("on_frame").unwrap().connect(move |frame, meta| {
            assert!(frame.is_some());
            ticks_clone
                .lock()
                .unwrap()
                .push(meta.get("tick").and_then(|v| v.as_i64()).unwrap());
        });

        cell.step(None, 7).unwrap();
        cell.step(None, 8).unwrap();
        assert_eq!(*ticks.lock().unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_staged_hooks_wait_for_fire() {
        let cell = Cell::new("src", &descriptor(Arc::default(), false)).unwrap();
        cell.initialize().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        cell.hook("on_frame").unwrap().connect(move |_, _| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        let (output, emissions) = cell.step_staged(None, 1).unwrap();
        assert!(output.is_some());
        assert_eq!(emissions.len(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        cell.fire(emissions).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    struct Brittle;

    impl Sink for Brittle {
        fn consume(&mut self, _frame: Frame, _ctx: &mut StepContext<'_>) -> Result<()> {
            panic!("sensor cable cut");
        }
    }

    #[test]
    fn test_panicking_step_becomes_step_error() {
        let cell = Cell::new("dst", &CellDescriptor::sink("Brittle", || Brittle)).unwrap();
        cell.initialize().unwrap();
        let format = FrameFormat::new(1, 1, PixelFormat::Gray8);

        let err = cell
            .step(Some(Frame::new(vec![0u8], format, 0)), 0)
            .unwrap_err();
        assert_eq!(err.cell(), Some("dst"));
        assert!(err.to_string().contains("sensor cable cut"), "{err}");
        assert_eq!(cell.steps(), 0);

        // The poisoned cell lock is recovered; teardown still works.
        assert_eq!(cell.lifecycle(), Lifecycle::Initialized);
        assert!(cell.shutdown());
        assert_eq!(cell.shutdown_count(), 1);
    }

    #[test]
    fn test_panicking_observer_becomes_step_error() {
        let cell = Cell::new("src", &descriptor(Arc::default(), false)).unwrap();
        cell.initialize().unwrap();
        cell.hook("on_frame")
            .unwrap()
            .connect(|_, _| panic!("observer blew up"));

        let err = cell.step(None, 0).unwrap_err();
        assert!(err.is_step_error());
        assert!(err.to_string().contains("observer blew up"), "{err}");
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let cell = Cell::new("src", &descriptor(Arc::clone(&shutdowns), false)).unwrap();
        cell.initialize().unwrap();

        assert!(cell.shutdown());
        assert!(!cell.shutdown());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(cell.lifecycle(), Lifecycle::Closed);
        assert!(cell.hook("on_frame").unwrap().is_closed());
        assert!(cell.initialize().is_err());
    }

    #[test]
    fn test_release_then_shutdown_runs_once() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let cell = Cell::new("src", &descriptor(Arc::clone(&shutdowns), false)).unwrap();
        cell.initialize().unwrap();
        cell.release();
        assert_eq!(cell.lifecycle(), Lifecycle::Released);

        cell.shutdown();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(cell.shutdown_count(), 1);
    }

    #[test]
    fn test_never_initialized_cell_is_shut_down() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let cell = Cell::new("src", &descriptor(Arc::clone(&shutdowns), false)).unwrap();
        assert!(cell.shutdown());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_live_parameter_change_resizes_next_frame() {
        let cell = Cell::new("src", &descriptor(Arc::default(), false)).unwrap();
        cell.initialize().unwrap();
        cell.set_parameter("Dimension", "8x6").unwrap();
        let frame = cell.step(None, 0).unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
    }

    #[test]
    fn test_refused_renegotiation_keeps_value() {
        let cell = Cell::new("src", &descriptor(Arc::default(), true)).unwrap();

        // Not initialized yet: no renegotiation involved.
        cell.set_parameter("Dimension", [10, 10]).unwrap();

        cell.initialize().unwrap();
        let err = cell.set_parameter("Dimension", "20x20").unwrap_err();
        assert!(matches!(err, Error::Renegotiation { .. }));
        assert_eq!(
            cell.parameters().dimension("Dimension"),
            Some((10, 10))
        );
    }

    #[test]
    fn test_unknown_parameter_and_hook() {
        let cell = Cell::new("src", &descriptor(Arc::default(), false)).unwrap();
        assert!(matches!(
            cell.parameter("Nope"),
            Err(Error::UnknownParameter { .. })
        ));
        assert!(matches!(cell.hook("on_nope"), Err(Error::UnknownHook { .. })));
    }

    #[test]
    fn test_ports() {
        let sink = Cell::new("dst", &CellDescriptor::sink("Discard", || Discard)).unwrap();
        assert_eq!(sink.kind(), CellKind::Sink);
        assert_eq!((sink.input_ports(), sink.output_ports()), (1, 0));
    }
}

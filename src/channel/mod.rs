//! Channels: independently runnable groups of pipelines.
//!
//! A [`Channel`] owns the pipelines built from its layout and a scheduler
//! that drives them. Failures stay inside the channel: the first step error
//! stops its scheduler, shuts its cells down and closes it, while sibling
//! channels keep running.
//!
//! # Example
//!
//! ```rust
//! use gridstreamer::channel::{Channel, ChannelState};
//! use gridstreamer::config::ChannelConfig;
//! use gridstreamer::registry::CellRegistry;
//! use std::sync::Arc;
//!
//! let channel = Channel::new(
//!     "preview",
//!     Arc::new(CellRegistry::with_builtin()),
//!     ChannelConfig::default(),
//!     Some("{ src: TestImage Dimension='64x48' ! dst: NullSink }"),
//! )
//! .unwrap();
//!
//! channel.open().unwrap();
//! channel.tick().unwrap();
//! assert_eq!(channel.pipeline("BasePipeline").unwrap().frames_delivered(), 1);
//!
//! channel.close().unwrap();
//! assert_eq!(channel.state(), ChannelState::Closed);
//! ```

mod events;
mod scheduler;
mod state;

pub use events::{ChannelEvent, EventReceiver};
pub use state::ChannelState;

use crate::cell::{Cell, CellKind};
use crate::config::{ChannelConfig, SchedulingMode};
use crate::error::{Error, Result};
use crate::layout::LayoutAst;
use crate::observability::{record_channel_error, record_channel_running, trace_state_change};
use crate::pipeline::{Pipeline, PipelineBuilder, default_layout};
use crate::registry::CellRegistry;
use events::EventSender;
use scheduler::{PipelineUnit, SchedulerHandle};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

const OPEN_STATES: [ChannelState; 5] = [
    ChannelState::Idle,
    ChannelState::Ready,
    ChannelState::Running,
    ChannelState::Paused,
    ChannelState::Flushing,
];

/// Build the pipelines of `layout`, or the default two-cell layout when
/// none (or only whitespace) is given.
pub(crate) fn compile(
    registry: &CellRegistry,
    config: &ChannelConfig,
    layout: Option<&str>,
) -> Result<Vec<Pipeline>> {
    let builder = PipelineBuilder::new(registry);
    match layout.map(str::trim).filter(|source| !source.is_empty()) {
        Some(source) => builder.compile(source),
        None => builder.build_layout(&default_layout(&config.default_source, &config.default_sink)),
    }
}

/// State shared between the channel handle and its scheduling threads.
pub(crate) struct Shared {
    name: String,
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    units: RwLock<Arc<Vec<PipelineUnit>>>,
    events: EventSender,
    error: Mutex<Option<Error>>,
    ticks: AtomicU64,
    /// Held for the whole of a lockstep tick, never while observers run.
    tick_lock: Mutex<()>,
    torn_down: AtomicBool,
}

impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> &EventSender {
        &self.events
    }

    pub(crate) fn units(&self) -> Arc<Vec<PipelineUnit>> {
        Arc::clone(&self.units.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn lock_tick(&self) -> MutexGuard<'_, ()> {
        self.tick_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub(crate) fn set_ticks(&self, tick: u64) {
        self.ticks.store(tick, Ordering::Release);
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `to` if the current state is one of `from`.
    ///
    /// Returns the previous state, or the current one when it is not in
    /// `from`.
    fn transition(
        &self,
        from: &[ChannelState],
        to: ChannelState,
    ) -> std::result::Result<ChannelState, ChannelState> {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !from.contains(&*state) {
                return Err(*state);
            }
            std::mem::replace(&mut *state, to)
        };
        if previous != to {
            if previous.is_live() != to.is_live() {
                record_channel_running(to.is_live());
            }
            trace_state_change(&self.name, previous.as_str(), to.as_str());
            self.events.send(ChannelEvent::StateChanged { from: previous, to });
        }
        Ok(previous)
    }

    /// Close the channel after a step failure. Only the first failure
    /// counts.
    pub(crate) fn fail(&self, error: Error) {
        if self.state() == ChannelState::Closed {
            return;
        }
        tracing::error!(channel = %self.name, error = %error, "channel failed");
        record_channel_error(&self.name);
        {
            let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(error.clone());
            }
        }
        self.events.send(ChannelEvent::Error {
            cell: error.cell().map(str::to_string),
            message: error.to_string(),
        });
        self.finish();
    }

    /// Stop `scheduler`, shut every cell down and move to `Closed`.
    fn close(&self, scheduler: Option<SchedulerHandle>) {
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
        if self.state() != ChannelState::Closed {
            self.finish();
            tracing::info!(channel = %self.name, "channel closed");
        }
    }

    fn finish(&self) {
        if !self.torn_down.swap(true, Ordering::AcqRel) {
            shutdown_cells(&self.units(), &self.events);
        }
        if let Ok(previous) = self.transition(&OPEN_STATES, ChannelState::Closed) {
            if previous.is_live() {
                self.events.send(ChannelEvent::Stopped);
            }
        }
    }
}

/// Shut down sinks first, then filters, then sources.
fn shutdown_cells(units: &[PipelineUnit], events: &EventSender) {
    for kind in [CellKind::Sink, CellKind::Filter, CellKind::Source] {
        for unit in units {
            for cell in unit.cells().iter().filter(|cell| cell.kind() == kind) {
                if cell.shutdown() {
                    events.send(ChannelEvent::CellShutdown {
                        pipeline: unit.pipeline().name().to_string(),
                        cell: cell.name().to_string(),
                    });
                }
            }
        }
    }
}

struct ChannelInner {
    shared: Arc<Shared>,
    registry: Arc<CellRegistry>,
    /// Held for the duration of every caller operation. Scheduling threads
    /// never take it, so operations may join them while holding it.
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        let scheduler = self
            .scheduler
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shared.close(scheduler);
    }
}

/// An independently runnable streaming unit containing one or more
/// pipelines.
///
/// Cheap to clone; all clones control the same channel. The channel is
/// closed when the last handle is dropped.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Build a channel from a layout, or from the default layout of
    /// `config` when `layout` is `None` or blank.
    ///
    /// The channel starts `Idle`; no cell is initialized yet.
    pub fn new(
        name: impl Into<String>,
        registry: Arc<CellRegistry>,
        config: ChannelConfig,
        layout: Option<&str>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidName(name));
        }
        let units = compile(&registry, &config, layout)?
            .into_iter()
            .map(|pipeline| PipelineUnit::new(&name, pipeline))
            .collect::<Vec<_>>();
        tracing::debug!(channel = %name, pipelines = units.len(), "channel created");

        let events = EventSender::new(config.event_capacity);
        Ok(Self {
            inner: Arc::new(ChannelInner {
                shared: Arc::new(Shared {
                    name,
                    config,
                    state: Mutex::new(ChannelState::Idle),
                    units: RwLock::new(Arc::new(units)),
                    events,
                    error: Mutex::new(None),
                    ticks: AtomicU64::new(0),
                    tick_lock: Mutex::new(()),
                    torn_down: AtomicBool::new(false),
                }),
                registry,
                scheduler: Mutex::new(None),
            }),
        })
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.inner.shared.name
    }

    /// Channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.shared.config
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.inner.shared.state()
    }

    /// The error that closed the channel, if any.
    pub fn error(&self) -> Option<Error> {
        self.inner
            .shared
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lockstep ticks completed so far. Never blocks, so observers may
    /// call it.
    pub fn ticks(&self) -> u64 {
        self.inner.shared.ticks()
    }

    /// Subscribe to the channel's events.
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.shared.events.subscribe()
    }

    /// Pipelines keyed by name.
    pub fn cells(&self) -> BTreeMap<String, Arc<Pipeline>> {
        self.inner
            .shared
            .units()
            .iter()
            .map(|unit| (unit.pipeline().name().to_string(), Arc::clone(unit.pipeline())))
            .collect()
    }

    /// Pipelines in layout order.
    pub fn pipelines(&self) -> Vec<Arc<Pipeline>> {
        self.inner
            .shared
            .units()
            .iter()
            .map(|unit| Arc::clone(unit.pipeline()))
            .collect()
    }

    /// Pipeline by name.
    pub fn pipeline(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.inner
            .shared
            .units()
            .iter()
            .find(|unit| unit.pipeline().name() == name)
            .map(|unit| Arc::clone(unit.pipeline()))
    }

    /// Cell `role` of pipeline `pipeline`.
    pub fn cell(&self, pipeline: &str, role: &str) -> Option<Cell> {
        self.pipeline(pipeline)
            .and_then(|pipeline| pipeline.cell(role).cloned())
    }

    /// The current graph, with current parameter values.
    pub fn layout(&self) -> LayoutAst {
        LayoutAst {
            pipelines: self
                .inner
                .shared
                .units()
                .iter()
                .map(|unit| unit.pipeline().to_ast())
                .collect(),
        }
    }

    /// Initialize every cell, upstream first. `Idle -> Ready`.
    ///
    /// If a cell fails, the cells already initialized are released and the
    /// channel stays `Idle`.
    pub fn open(&self) -> Result<()> {
        let _scheduler = self.lock_scheduler();
        self.open_locked()
    }

    /// Start streaming.
    ///
    /// Opens an idle channel first and resumes a paused one.
    pub fn run(&self) -> Result<()> {
        let mut scheduler = self.lock_scheduler();
        match self.state() {
            ChannelState::Running | ChannelState::Flushing => {
                Err(Error::AlreadyRunning(self.name().to_string()))
            }
            ChannelState::Closed => Err(self.closed()),
            ChannelState::Paused => self.resume_locked(&scheduler),
            ChannelState::Idle | ChannelState::Ready => {
                self.open_locked()?;
                self.transition("run", &[ChannelState::Ready], ChannelState::Running)?;
                match scheduler::spawn(&self.inner.shared) {
                    Ok(handle) => *scheduler = Some(handle),
                    Err(e) => {
                        let _ = self
                            .inner
                            .shared
                            .transition(&[ChannelState::Running], ChannelState::Ready);
                        return Err(e);
                    }
                }
                self.inner.shared.events.send(ChannelEvent::Started);
                tracing::info!(
                    channel = %self.name(),
                    mode = %self.config().scheduling,
                    "channel running"
                );
                Ok(())
            }
        }
    }

    /// Suspend scheduling at the next tick boundary.
    pub fn pause(&self) -> Result<()> {
        let scheduler = self.lock_scheduler();
        match self.state() {
            ChannelState::Paused => Ok(()),
            ChannelState::Running => {
                if let Some(handle) = scheduler.as_ref() {
                    handle.set_paused(true);
                }
                self.transition("pause", &[ChannelState::Running], ChannelState::Paused)
            }
            state => Err(self.misuse("pause", state)),
        }
    }

    /// Continue a paused channel.
    pub fn resume(&self) -> Result<()> {
        let scheduler = self.lock_scheduler();
        self.resume_locked(&scheduler)
    }

    /// Stop scheduling and keep the cells initialized. `Running/Paused ->
    /// Ready`.
    ///
    /// Waits for in-flight steps; frames not yet delivered are dropped.
    pub fn stop(&self) -> Result<()> {
        let mut scheduler = self.lock_scheduler();
        match self.state() {
            ChannelState::Idle | ChannelState::Ready => Ok(()),
            ChannelState::Closed => Err(self.closed()),
            ChannelState::Running | ChannelState::Paused | ChannelState::Flushing => {
                if let Some(handle) = scheduler.take() {
                    handle.stop();
                }
                self.transition(
                    "stop",
                    &[
                        ChannelState::Running,
                        ChannelState::Paused,
                        ChannelState::Flushing,
                    ],
                    ChannelState::Ready,
                )?;
                self.inner.shared.events.send(ChannelEvent::Stopped);
                Ok(())
            }
        }
    }

    /// Stop scheduling, shut every cell down (sinks, then filters, then
    /// sources) and move to `Closed`. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut scheduler = self.lock_scheduler();
        self.inner.shared.close(scheduler.take());
        Ok(())
    }

    /// Discard frames not yet delivered and let the in-flight tick finish,
    /// without ending the run.
    ///
    /// `Running/Paused -> Flushing -> Running/Paused`. An idle channel is
    /// opened instead; a ready one holds no frames.
    pub fn flush(&self) -> Result<()> {
        let scheduler = self.lock_scheduler();
        match self.state() {
            ChannelState::Idle => self.open_locked(),
            ChannelState::Ready | ChannelState::Flushing => Ok(()),
            ChannelState::Closed => Err(self.closed()),
            live @ (ChannelState::Running | ChannelState::Paused) => {
                self.transition("flush", &[live], ChannelState::Flushing)?;
                if let Some(handle) = scheduler.as_ref() {
                    handle.flush();
                }
                // Wait out a lockstep tick in progress.
                drop(self.inner.shared.lock_tick());
                self.transition("flush", &[ChannelState::Flushing], live)?;
                tracing::debug!(channel = %self.name(), "channel flushed");
                Ok(())
            }
        }
    }

    /// Run exactly one lockstep tick on the calling thread.
    ///
    /// Allowed while `Ready` or `Paused` in lockstep mode. Returns the tick
    /// number. Hook observers run on the calling thread after the tick, with
    /// no channel lock held.
    pub fn tick(&self) -> Result<u64> {
        let mut scheduler = self.lock_scheduler();
        match self.state() {
            ChannelState::Ready | ChannelState::Paused
                if self.config().scheduling == SchedulingMode::Lockstep => {}
            state => return Err(self.misuse("tick", state)),
        }

        let shared = &self.inner.shared;
        let units = shared.units();
        let (tick, staged) = match scheduler::advance_tick(shared, &units) {
            Ok(advanced) => advanced,
            Err(e) => {
                self.abort(scheduler.take(), e.clone());
                return Err(e);
            }
        };
        drop(scheduler);

        if let Err(e) = scheduler::complete_tick(shared, tick, staged) {
            let handle = self.lock_scheduler().take();
            self.abort(handle, e.clone());
            return Err(e);
        }
        Ok(tick)
    }

    /// Replace the pipelines with those of `layout`. Only while `Idle`.
    ///
    /// The new layout is built first; if that fails the current pipelines
    /// are kept.
    pub fn load_layout(&self, layout: &str) -> Result<()> {
        let _scheduler = self.lock_scheduler();
        match self.state() {
            ChannelState::Idle => {}
            state => return Err(self.misuse("load a layout into", state)),
        }

        let shared = &self.inner.shared;
        let units: Vec<PipelineUnit> = compile(&self.inner.registry, &shared.config, Some(layout))?
            .into_iter()
            .map(|pipeline| PipelineUnit::new(&shared.name, pipeline))
            .collect();
        let old = std::mem::replace(
            &mut *shared.units.write().unwrap_or_else(PoisonError::into_inner),
            Arc::new(units),
        );
        shutdown_cells(&old, &shared.events);
        tracing::debug!(channel = %shared.name, "layout replaced");
        Ok(())
    }

    /// Perform the transition that leads to `state`.
    ///
    /// `Ready` opens an idle channel and stops a live one. `Flushing`
    /// flushes (and so ends back where it started). `Idle` is only accepted
    /// when the channel is already idle.
    pub fn request_state(&self, state: ChannelState) -> Result<()> {
        match state {
            ChannelState::Running => self.run(),
            ChannelState::Paused => self.pause(),
            ChannelState::Flushing => self.flush(),
            ChannelState::Closed => self.close(),
            ChannelState::Ready if self.state().is_live() => self.stop(),
            ChannelState::Ready => self.open(),
            ChannelState::Idle => match self.state() {
                ChannelState::Idle => Ok(()),
                current => Err(self.misuse("return to idle", current)),
            },
        }
    }

    /// Whether both handles refer to the same channel.
    pub fn ptr_eq(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn open_locked(&self) -> Result<()> {
        match self.state() {
            ChannelState::Idle => {
                self.initialize_cells()?;
                self.transition("open", &[ChannelState::Idle], ChannelState::Ready)
            }
            ChannelState::Closed => Err(self.closed()),
            ChannelState::Ready
            | ChannelState::Running
            | ChannelState::Paused
            | ChannelState::Flushing => Ok(()),
        }
    }

    fn initialize_cells(&self) -> Result<()> {
        let units = self.inner.shared.units();
        let mut initialized: Vec<&Cell> = Vec::new();
        for cell in units.iter().flat_map(|unit| unit.cells()) {
            if let Err(e) = cell.initialize() {
                tracing::warn!(
                    channel = %self.name(),
                    cell = %cell.name(),
                    error = %e,
                    "open failed, releasing initialized cells"
                );
                for done in initialized.iter().rev() {
                    done.release();
                }
                return Err(e);
            }
            initialized.push(cell);
        }
        Ok(())
    }

    /// Stop `scheduler` and close the channel on `error`.
    fn abort(&self, scheduler: Option<SchedulerHandle>, error: Error) {
        if let Some(handle) = scheduler {
            handle.stop();
        }
        self.inner.shared.fail(error);
    }

    fn resume_locked(&self, scheduler: &Option<SchedulerHandle>) -> Result<()> {
        match self.state() {
            ChannelState::Paused => {
                if let Some(handle) = scheduler.as_ref() {
                    handle.set_paused(false);
                }
                self.transition("resume", &[ChannelState::Paused], ChannelState::Running)
            }
            state => Err(self.misuse("resume", state)),
        }
    }

    fn transition(
        &self,
        operation: &'static str,
        from: &[ChannelState],
        to: ChannelState,
    ) -> Result<()> {
        self.inner
            .shared
            .transition(from, to)
            .map(|_| ())
            .map_err(|state| self.misuse(operation, state))
    }

    fn misuse(&self, operation: &'static str, state: ChannelState) -> Error {
        match state {
            ChannelState::Closed => self.closed(),
            state => Error::InvalidState {
                channel: self.name().to_string(),
                operation,
                state: state.to_string(),
            },
        }
    }

    fn closed(&self) -> Error {
        Error::ClosedChannel(self.name().to_string())
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, Option<SchedulerHandle>> {
        self.inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("mode", &self.config().scheduling)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Lifecycle;
    use std::time::Duration;

    fn channel(layout: &str) -> Channel {
        Channel::new(
            "test",
            Arc::new(CellRegistry::with_builtin()),
            ChannelConfig::default(),
            Some(layout),
        )
        .unwrap()
    }

    const SMALL: &str = "{ src: TestImage Dimension='32x24' ! dst: NullSink }";

    #[test]
    fn test_default_layout() {
        let registry = Arc::new(CellRegistry::with_builtin());
        let channel = Channel::new("c", registry.clone(), ChannelConfig::default(), None).unwrap();
        assert_eq!(
            channel.layout().pipelines[0].cells[0].type_name,
            "TestImage"
        );

        let blank = Channel::new("c", registry, ChannelConfig::default(), Some("  ")).unwrap();
        assert_eq!(blank.pipelines().len(), 1);
    }

    #[test]
    fn test_empty_name() {
        let err = Channel::new(
            " ",
            Arc::new(CellRegistry::with_builtin()),
            ChannelConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
    }

    #[test]
    fn test_open_and_tick() {
        let channel = channel(SMALL);
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(matches!(channel.tick(), Err(Error::InvalidState { .. })));

        channel.open().unwrap();
        assert_eq!(channel.state(), ChannelState::Ready);
        assert_eq!(channel.tick().unwrap(), 1);
        assert_eq!(channel.tick().unwrap(), 2);
        assert_eq!(channel.ticks(), 2);

        let pipeline = channel.pipeline("BasePipeline").unwrap();
        assert_eq!(pipeline.ticks(), 2);
        assert_eq!(pipeline.frames_delivered(), 2);
    }

    #[test]
    fn test_state_misuse() {
        let channel = channel(SMALL);
        assert!(matches!(channel.pause(), Err(Error::InvalidState { .. })));
        assert!(matches!(channel.resume(), Err(Error::InvalidState { .. })));
        channel.stop().unwrap();

        channel.close().unwrap();
        assert!(matches!(channel.run(), Err(Error::ClosedChannel(_))));
        assert!(matches!(channel.pause(), Err(Error::ClosedChannel(_))));
        assert!(matches!(channel.tick(), Err(Error::ClosedChannel(_))));
        assert!(matches!(channel.load_layout(SMALL), Err(Error::ClosedChannel(_))));
    }

    #[test]
    fn test_close_without_open_shuts_down_once() {
        let channel = channel(SMALL);
        let src = channel.cell("BasePipeline", "src").unwrap();
        channel.close().unwrap();
        channel.close().unwrap();
        assert_eq!(src.shutdown_count(), 1);
        assert_eq!(src.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn test_teardown_order() {
        let channel = channel("{ src: TestImage Dimension='8x8' ! mid: Passthrough ! dst: NullSink }");
        let mut events = channel.subscribe();
        channel.open().unwrap();
        channel.close().unwrap();

        let mut order = Vec::new();
        while let Some(event) = events.try_recv() {
            if let ChannelEvent::CellShutdown { cell, .. } = event {
                order.push(cell);
            }
        }
        assert_eq!(order, vec!["dst", "mid", "src"]);
    }

    #[test]
    fn test_load_layout() {
        let channel = channel(SMALL);
        let old_src = channel.cell("BasePipeline", "src").unwrap();

        let err = channel.load_layout("{ src: Bogus ! dst: NullSink }").unwrap_err();
        assert!(matches!(err, Error::UnknownCellType(_)));
        assert!(channel.cell("BasePipeline", "src").unwrap().ptr_eq(&old_src));

        channel
            .load_layout("{ a: TestImage ! b: NullSink ; a: TestImage ! b: NullSink }")
            .unwrap();
        assert_eq!(old_src.lifecycle(), Lifecycle::Closed);
        assert_eq!(channel.pipelines().len(), 2);
        assert!(channel.pipeline("Pipeline1").is_some());

        channel.open().unwrap();
        assert!(matches!(
            channel.load_layout(SMALL),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_request_state() {
        let channel = channel(SMALL);
        channel.request_state("ready".parse().unwrap()).unwrap();
        assert_eq!(channel.state(), ChannelState::Ready);
        assert!(channel.request_state(ChannelState::Idle).is_err());

        channel.request_state(ChannelState::Running).unwrap();
        channel.request_state(ChannelState::Paused).unwrap();
        assert_eq!(channel.state(), ChannelState::Paused);
        channel.request_state(ChannelState::Ready).unwrap();
        assert_eq!(channel.state(), ChannelState::Ready);
        channel.request_state(ChannelState::Closed).unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[test]
    fn test_flush_keeps_tick_numbering() {
        let channel = channel(SMALL);
        channel.open().unwrap();
        assert_eq!(channel.tick().unwrap(), 1);
        channel.flush().unwrap();
        assert_eq!(channel.state(), ChannelState::Ready);
        assert_eq!(channel.tick().unwrap(), 2);

        channel.close().unwrap();
        assert!(matches!(channel.flush(), Err(Error::ClosedChannel(_))));
    }

    #[test]
    fn test_run_pause_resume_stop() {
        let channel = Channel::new(
            "paced",
            Arc::new(CellRegistry::with_builtin()),
            ChannelConfig::default().with_tick_interval(Duration::from_millis(1)),
            Some(SMALL),
        )
        .unwrap();

        channel.run().unwrap();
        assert!(matches!(channel.run(), Err(Error::AlreadyRunning(_))));
        std::thread::sleep(Duration::from_millis(30));

        channel.pause().unwrap();
        channel.pause().unwrap();
        // A tick in flight when pausing may still complete.
        std::thread::sleep(Duration::from_millis(10));
        let paused_at = channel.ticks();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(channel.ticks(), paused_at);

        let manual = channel.tick().unwrap();
        assert_eq!(manual, paused_at + 1);

        channel.resume().unwrap();
        channel.stop().unwrap();
        assert_eq!(channel.state(), ChannelState::Ready);
        assert!(channel.ticks() > 0);

        let src = channel.cell("BasePipeline", "src").unwrap();
        assert_eq!(src.lifecycle(), Lifecycle::Initialized);
        channel.close().unwrap();
        assert_eq!(src.shutdown_count(), 1);
    }
}

//! Scheduling units.
//!
//! Two modes, selected by [`SchedulingMode`]:
//!
//! - **Lockstep**: a single thread runs ticks. Each tick advances every
//!   pipeline by one frame, in layout order, under the channel's tick lock.
//!   [`Channel::tick`](super::Channel::tick) takes the same lock, so manual
//!   and threaded ticks never interleave. Hook observers run after the lock
//!   is released, on the thread that ran the tick.
//! - **Free**: one thread per cell. Adjacent cells are linked by kanal
//!   channels holding a single frame. An upstream cell that finds its link
//!   full waits up to the backpressure timeout and then fails with
//!   [`Error::Timeout`]. A coordinator thread joins the workers and closes
//!   the channel on the first failure.
//!
//! Pause and stop are cooperative: they are observed between steps, never
//! during one. A flush bumps the run's epoch; free-mode frames sent under an
//! older epoch are discarded on arrival.

use super::Shared;
use super::events::ChannelEvent;
use crate::cell::{Cell, CellKind, Emission};
use crate::config::SchedulingMode;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::observability::{
    CellMetrics, TracingConfig, cell_span_if, channel_span_if, record_tick, trace_frame,
};
use crate::pipeline::Pipeline;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

thread_local! {
    static ON_SCHEDULER: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Whether the current thread belongs to a scheduler.
///
/// Observers run on scheduler threads; a stop requested from one of them
/// must not join its own thread.
pub(crate) fn on_scheduler_thread() -> bool {
    ON_SCHEDULER.with(|flag| flag.get())
}

/// Stop, pause and flush signals shared by the units of one run.
pub(crate) struct Control {
    stop: AtomicBool,
    paused: Mutex<bool>,
    wake: Condvar,
    epoch: AtomicU64,
}

impl Control {
    fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            paused: Mutex::new(false),
            wake: Condvar::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Invalidate every frame sent so far. Returns the new epoch.
    pub(crate) fn flush(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _guard = self.lock_paused();
        self.wake.notify_all();
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        *self.lock_paused() = paused;
        self.wake.notify_all();
    }

    /// Block while paused. Returns `false` once a stop was requested.
    fn wait_runnable(&self) -> bool {
        let mut paused = self.lock_paused();
        while *paused && !self.should_stop() {
            paused = self
                .wake
                .wait(paused)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !self.should_stop()
    }

    /// Sleep for `duration`, waking early on stop. Returns `false` once a
    /// stop was requested.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock_paused();
        while !self.should_stop() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            guard = self
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        !self.should_stop()
    }

    fn lock_paused(&self) -> MutexGuard<'_, bool> {
        self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A pipeline together with its cells in order and their metrics.
pub(crate) struct PipelineUnit {
    pipeline: Arc<Pipeline>,
    cells: Vec<Cell>,
    metrics: Vec<CellMetrics>,
}

impl PipelineUnit {
    pub(crate) fn new(channel: &str, pipeline: Pipeline) -> Self {
        let cells = pipeline.cells_in_order();
        let metrics = cells
            .iter()
            .map(|cell| CellMetrics::new(channel, pipeline.name(), cell.name(), cell.kind()))
            .collect();
        Self {
            pipeline: Arc::new(pipeline),
            cells,
            metrics,
        }
    }

    pub(crate) fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub(crate) fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Push one frame from the source through to the sink, staging hook
    /// invocations into `staged`.
    ///
    /// Stops early when the source yields nothing or a filter drops the
    /// frame.
    fn advance(&self, tick: u64, tracing: &TracingConfig, staged: &mut Staged) -> Result<()> {
        let mut frame: Option<Frame> = None;
        for (index, (cell, metrics)) in self.cells.iter().zip(&self.metrics).enumerate() {
            if index > 0 && frame.is_none() {
                break;
            }
            let (output, emissions) =
                step_cell(&self.pipeline, cell, metrics, tracing, frame.take(), tick)?;
            if !emissions.is_empty() {
                staged.push((cell.clone(), emissions));
            }
            frame = output;
        }
        self.pipeline.record_tick();
        Ok(())
    }
}

/// Hook invocations of one tick, in step order.
pub(crate) type Staged = Vec<(Cell, Vec<Emission>)>;

/// Step one cell, recording metrics and deliveries. Hook invocations are
/// returned unfired.
fn step_cell(
    pipeline: &Pipeline,
    cell: &Cell,
    metrics: &CellMetrics,
    tracing: &TracingConfig,
    input: Option<Frame>,
    tick: u64,
) -> Result<(Option<Frame>, Vec<Emission>)> {
    let _span = cell_span_if(tracing, pipeline.name(), cell.name(), cell.type_name()).entered();
    let had_input = input.is_some();
    let started = Instant::now();
    let (output, emissions) = cell.step_staged(input, tick)?;
    metrics.record_step(started.elapsed(), output.as_ref().map(Frame::len), had_input);

    if had_input && cell.kind() == CellKind::Sink {
        pipeline.record_delivery();
    }
    if tracing.frame_events {
        if let Some(frame) = &output {
            trace_frame(pipeline.name(), cell.name(), frame.len(), frame.sequence());
        }
    }
    Ok((output, emissions))
}

/// Advance every pipeline of `units` by one tick under the tick lock.
///
/// Returns the tick number and the hook invocations to hand to
/// [`complete_tick`] once every lock is released.
pub(crate) fn advance_tick(shared: &Shared, units: &[PipelineUnit]) -> Result<(u64, Staged)> {
    let _tick_lock = shared.lock_tick();
    let tick = shared.ticks() + 1;
    let mut staged = Staged::new();
    for unit in units {
        unit.advance(tick, &shared.config().tracing, &mut staged)?;
    }
    shared.set_ticks(tick);
    Ok((tick, staged))
}

/// Fire the hooks staged by tick `tick` and announce it.
pub(crate) fn complete_tick(shared: &Shared, tick: u64, staged: Staged) -> Result<()> {
    for (cell, emissions) in staged {
        cell.fire(emissions)?;
    }
    record_tick(shared.name());
    shared.events().send(ChannelEvent::TickCompleted { tick });
    Ok(())
}

/// Run one lockstep tick over `units`. Returns the tick number.
fn run_tick(shared: &Shared, units: &[PipelineUnit]) -> Result<u64> {
    let (tick, staged) = advance_tick(shared, units)?;
    complete_tick(shared, tick, staged)?;
    Ok(tick)
}

/// The threads of one run of a channel.
pub(crate) struct SchedulerHandle {
    control: Arc<Control>,
    threads: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub(crate) fn set_paused(&self, paused: bool) {
        self.control.set_paused(paused);
    }

    /// Discard frames waiting in links.
    pub(crate) fn flush(&self) {
        let epoch = self.control.flush();
        tracing::debug!(epoch, "links flushed");
    }

    /// Signal every unit to stop and wait for them to finish their
    /// in-flight step.
    pub(crate) fn stop(self) {
        self.control.request_stop();
        if on_scheduler_thread() {
            tracing::debug!("stop requested from a scheduling thread; not joining");
            return;
        }
        for thread in self.threads {
            if thread.join().is_err() {
                tracing::error!("scheduling thread panicked");
            }
        }
    }
}

/// Start scheduling the channel's current pipelines.
pub(crate) fn spawn(shared: &Arc<Shared>) -> Result<SchedulerHandle> {
    let control = Arc::new(Control::new());
    let thread = match shared.config().scheduling {
        SchedulingMode::Lockstep => spawn_lockstep(shared, &control)?,
        SchedulingMode::Free => spawn_free(shared, &control)?,
    };
    Ok(SchedulerHandle {
        control,
        threads: vec![thread],
    })
}

fn spawn_thread<F>(name: String, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            ON_SCHEDULER.with(|flag| flag.set(true));
            body();
        })
        .map_err(|e| Error::Spawn(e.to_string()))
}

fn spawn_lockstep(shared: &Arc<Shared>, control: &Arc<Control>) -> Result<JoinHandle<()>> {
    let name = format!("gs-{}", shared.name());
    let shared = Arc::clone(shared);
    let control = Arc::clone(control);
    spawn_thread(name, move || lockstep_loop(&shared, &control))
}

/// Closes the channel when a scheduling thread unwinds outside a cell step.
struct FailOnPanic<'a> {
    shared: &'a Shared,
}

impl Drop for FailOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.fail(Error::Spawn(format!(
                "scheduler of channel '{}' panicked",
                self.shared.name()
            )));
        }
    }
}

fn lockstep_loop(shared: &Shared, control: &Control) {
    let _guard = FailOnPanic { shared };
    let config = shared.config();
    let _span = channel_span_if(
        &config.tracing,
        shared.name(),
        SchedulingMode::Lockstep.as_str(),
    )
    .entered();
    let units = shared.units();
    tracing::debug!(pipelines = units.len(), "lockstep scheduler started");

    while control.wait_runnable() {
        let started = Instant::now();
        if let Err(e) = run_tick(shared, &units) {
            if control.should_stop() {
                tracing::debug!(error = %e, "step failed while stopping");
            } else {
                shared.fail(e);
            }
            break;
        }
        if let Some(interval) = config.tick_interval {
            if !control.sleep(interval.saturating_sub(started.elapsed())) {
                break;
            }
        }
    }
    tracing::debug!("lockstep scheduler stopped");
}

enum Message {
    /// A frame and the flush epoch it was sent under.
    Frame(Frame, u64),
    Eos,
}

struct WorkerExit {
    cell: String,
    result: Result<()>,
}

/// Sends the worker's result to the coordinator when dropped, so a
/// panicking worker is reported too.
struct ExitReport {
    cell: String,
    result: Option<Result<()>>,
    tx: kanal::Sender<WorkerExit>,
}

impl Drop for ExitReport {
    fn drop(&mut self) {
        let cell = std::mem::take(&mut self.cell);
        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err(Error::Spawn(format!("worker for cell '{cell}' panicked"))));
        let _ = self.tx.send(WorkerExit { cell, result });
    }
}

struct Worker {
    shared: Arc<Shared>,
    control: Arc<Control>,
    pipeline: Arc<Pipeline>,
    cell: Cell,
    metrics: CellMetrics,
    input: Option<kanal::Receiver<Message>>,
    output: Option<kanal::Sender<Message>>,
}

fn spawn_free(shared: &Arc<Shared>, control: &Arc<Control>) -> Result<JoinHandle<()>> {
    let units = shared.units();
    let (report_tx, report_rx) = kanal::unbounded::<WorkerExit>();
    let mut workers = Vec::new();

    for unit in units.iter() {
        let mut input: Option<kanal::Receiver<Message>> = None;
        let last = unit.cells.len().saturating_sub(1);
        for (index, (cell, metrics)) in unit.cells.iter().zip(&unit.metrics).enumerate() {
            let (output, next_input) = if index < last {
                let (tx, rx) = kanal::bounded(1);
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };
            let worker = Worker {
                shared: Arc::clone(shared),
                control: Arc::clone(control),
                pipeline: Arc::clone(&unit.pipeline),
                cell: cell.clone(),
                metrics: metrics.clone(),
                input: input.take(),
                output,
            };
            input = next_input;

            let report = ExitReport {
                cell: cell.name().to_string(),
                result: None,
                tx: report_tx.clone(),
            };
            let name = format!("gs-{}-{}-{}", shared.name(), unit.pipeline.name(), cell.name());
            match spawn_thread(name, move || worker.run(report)) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    control.request_stop();
                    drop(input);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }
    }
    drop(report_tx);

    let name = format!("gs-{}", shared.name());
    let coordinator_shared = Arc::clone(shared);
    let coordinator_control = Arc::clone(control);
    spawn_thread(name, move || {
        coordinate(&coordinator_shared, &coordinator_control, workers, report_rx)
    })
    // Workers still exit on their own once stopped.
    .inspect_err(|_| control.request_stop())
}

fn coordinate(
    shared: &Shared,
    control: &Control,
    workers: Vec<JoinHandle<()>>,
    reports: kanal::Receiver<WorkerExit>,
) {
    let _span = channel_span_if(
        &shared.config().tracing,
        shared.name(),
        SchedulingMode::Free.as_str(),
    )
    .entered();
    tracing::debug!(workers = workers.len(), "free scheduler started");

    let mut failure: Option<Error> = None;
    for _ in 0..workers.len() {
        let Ok(exit) = reports.recv() else {
            break;
        };
        match exit.result {
            Ok(()) => tracing::trace!(cell = %exit.cell, "worker finished"),
            Err(e) if control.should_stop() => {
                tracing::debug!(cell = %exit.cell, error = %e, "worker failed while stopping");
            }
            Err(e) => {
                tracing::warn!(cell = %exit.cell, error = %e, "worker failed, stopping channel");
                failure = Some(e);
                control.request_stop();
            }
        }
    }

    for worker in workers {
        if worker.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }
    tracing::debug!("free scheduler stopped");

    if let Some(e) = failure {
        shared.fail(e);
    }
}

impl Worker {
    fn run(self, mut report: ExitReport) {
        let _span = cell_span_if(
            &self.shared.config().tracing,
            self.pipeline.name(),
            self.cell.name(),
            self.cell.type_name(),
        )
        .entered();

        let result = match &self.input {
            None => self.run_source(),
            Some(input) => self.run_downstream(input),
        };

        // End of stream lets downstream workers drain and exit. A failed
        // worker reports at once; dropping its sender closes the link.
        if result.is_ok() {
            if let Some(output) = &self.output {
                let _ = output.send_timeout(Message::Eos, self.shared.config().backpressure_timeout);
            }
        }
        report.result = Some(result);
    }

    fn run_source(&self) -> Result<()> {
        let tick_interval = self.shared.config().tick_interval;
        let mut tick = 0;
        while self.control.wait_runnable() {
            tick += 1;
            let started = Instant::now();
            let epoch = self.control.epoch();
            let output = self.step(None, tick)?;
            self.pipeline.record_tick();
            if let Some(frame) = output {
                self.forward(frame, epoch)?;
            }
            if let Some(interval) = tick_interval {
                if !self.control.sleep(interval.saturating_sub(started.elapsed())) {
                    break;
                }
            }
        }
        Ok(())
    }

    fn run_downstream(&self, input: &kanal::Receiver<Message>) -> Result<()> {
        let mut tick = 0;
        while let Ok(Message::Frame(frame, epoch)) = input.recv() {
            if self.control.should_stop() {
                // Draining: undelivered frames are dropped.
                continue;
            }
            if epoch < self.control.epoch() {
                self.pipeline.record_flushed();
                tracing::trace!(sequence = frame.sequence(), "flushed frame dropped");
                continue;
            }
            tick += 1;
            if let Some(output) = self.step(Some(frame), tick)? {
                self.forward(output, epoch)?;
            }
        }
        Ok(())
    }

    fn step(&self, input: Option<Frame>, tick: u64) -> Result<Option<Frame>> {
        let (output, emissions) = step_cell(
            &self.pipeline,
            &self.cell,
            &self.metrics,
            &self.shared.config().tracing,
            input,
            tick,
        )?;
        self.cell.fire(emissions)?;
        Ok(output)
    }

    /// Hand a frame to the next cell, waiting at most the backpressure
    /// timeout for the link to free up.
    fn forward(&self, frame: Frame, epoch: u64) -> Result<()> {
        let Some(output) = &self.output else {
            return Ok(());
        };
        if !output.is_empty() {
            self.metrics.record_stall();
        }
        let timeout = self.shared.config().backpressure_timeout;
        match output.send_timeout(Message::Frame(frame, epoch), timeout) {
            Ok(_) => Ok(()),
            Err(kanal::SendErrorTimeout::Timeout) => Err(Error::Timeout {
                cell: self.cell.name().to_string(),
                waited: timeout,
            }),
            // The next cell is gone, which only happens while stopping.
            Err(_) => Ok(()),
        }
    }
}

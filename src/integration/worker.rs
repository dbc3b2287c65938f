//! Background capture loops and the handoff to a rendering consumer.
//!
//! A [`Session`] runs either a counting loop (capture, detect, track, count)
//! or a preview loop (capture only) on a dedicated thread, never both. Each
//! iteration publishes a [`PublishedFrame`] into a [`FrameSlot`] and moves on;
//! the consumer polls the slot and never holds the loop up. Crossing events
//! are also sent on a bounded channel with `try_send`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::integration::{CountingPipeline, DetectionSource};
use crate::tracker::{CountingLine, Counts, CrossingEvent, Detection, TrackSnapshot};

/// Pending crossing events kept for a slow consumer before new ones are dropped.
const EVENT_CAPACITY: usize = 256;
/// Back-off when the source has no frame ready.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);
/// Back-off after a source or detector failure.
const ERROR_BACKOFF: Duration = Duration::from_millis(20);

/// Frame acquisition (screen, webcam, network stream).
pub trait FrameSource {
    type Error: fmt::Display;

    /// Next frame, or `Ok(None)` if none is ready yet.
    fn next_frame(&mut self) -> std::result::Result<Option<RgbImage>, Self::Error>;
}

/// Everything a renderer needs for one finished frame.
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub frame: Arc<RgbImage>,
    pub frame_index: u64,
    /// False for preview frames, which carry no tracks
    pub counting: bool,
    pub tracks: Vec<TrackSnapshot>,
    /// Detector boxes to draw on the last detection frame
    pub overlay: Vec<Detection>,
    pub counts: Counts,
    pub counts_changed: bool,
}

/// Latest published frame, shared between the loop and its consumer.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    latest: Arc<Mutex<Option<Arc<PublishedFrame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame.
    pub fn publish(&self, frame: PublishedFrame) {
        let frame = Arc::new(frame);
        *self.lock() = Some(frame);
    }

    /// The most recent frame, if any has been published.
    pub fn latest(&self) -> Option<Arc<PublishedFrame>> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<PublishedFrame>>> {
        // The guarded value is a plain replaceable pointer; a panic elsewhere
        // cannot leave it half-written.
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Control {
    SetLine(Option<CountingLine>),
    ResetCounts,
}

struct Worker<T> {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Option<T>>,
}

impl<T: Send + 'static> Worker<T> {
    /// Run `run(parts, stop_flag)` on a new thread.
    ///
    /// `parts` reach the thread through a shared handoff slot, so they come
    /// back to the caller with the error if the thread cannot be spawned.
    fn spawn<P, F>(
        name: &str,
        stack_size: Option<usize>,
        parts: P,
        run: F,
    ) -> std::result::Result<Self, (Error, Option<P>)>
    where
        P: Send + 'static,
        F: FnOnce(P, &AtomicBool) -> T + Send + 'static,
    {
        let handoff = Arc::new(Mutex::new(Some(parts)));
        let inbox = Arc::clone(&handoff);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let mut builder = thread::Builder::new().name(name.to_string());
        if let Some(bytes) = stack_size {
            builder = builder.stack_size(bytes);
        }
        let spawned = builder.spawn(move || {
            let parts = inbox.lock().unwrap_or_else(PoisonError::into_inner).take();
            parts.map(|p| run(p, &flag))
        });

        match spawned {
            Ok(handle) => Ok(Self { stop, handle }),
            Err(err) => {
                let parts = handoff.lock().unwrap_or_else(PoisonError::into_inner).take();
                Err((Error::Io(err), parts))
            }
        }
    }
}

impl<T> Worker<T> {
    /// Ask the loop to finish its current iteration and wait for it.
    fn stop(self) -> Result<T> {
        self.stop.store(true, Ordering::Release);
        match self.handle.join() {
            Ok(Some(parts)) => Ok(parts),
            Ok(None) | Err(_) => Err(Error::WorkerPanicked),
        }
    }
}

enum Activity<S, D: DetectionSource> {
    Idle {
        source: S,
        pipeline: CountingPipeline<D>,
    },
    Previewing {
        worker: Worker<S>,
        pipeline: CountingPipeline<D>,
    },
    Counting {
        worker: Worker<(S, CountingPipeline<D>)>,
        control: Sender<Control>,
    },
    /// A worker panicked and took the source or pipeline with it
    Failed,
}

/// Owns a frame source and a counting pipeline and runs one loop at a time.
pub struct Session<S, D: DetectionSource> {
    activity: Activity<S, D>,
    slot: FrameSlot,
    events_tx: Sender<CrossingEvent>,
    events_rx: Receiver<CrossingEvent>,
    stack_size: Option<usize>,
}

impl<S, D> Session<S, D>
where
    S: FrameSource + Send + 'static,
    D: DetectionSource + Send + 'static,
    D::Error: fmt::Display,
{
    pub fn new(source: S, pipeline: CountingPipeline<D>) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        Self {
            activity: Activity::Idle { source, pipeline },
            slot: FrameSlot::new(),
            events_tx,
            events_rx,
            stack_size: None,
        }
    }

    /// Stack size for the loop threads, for detectors that need a deep stack.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Handle to the latest published frame.
    pub fn frames(&self) -> FrameSlot {
        self.slot.clone()
    }

    /// Receiver of crossing events from the counting loop.
    pub fn events(&self) -> Receiver<CrossingEvent> {
        self.events_rx.clone()
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.activity, Activity::Counting { .. })
    }

    pub fn is_previewing(&self) -> bool {
        matches!(self.activity, Activity::Previewing { .. })
    }

    /// Start the capture-only loop, stopping counting if it runs.
    pub fn start_preview(&mut self) -> Result<()> {
        if self.is_previewing() {
            return Ok(());
        }
        let (source, pipeline) = self.halt()?;
        let slot = self.slot.clone();
        let counts = pipeline.counts();
        let spawned = Worker::spawn("linecount-preview", self.stack_size, source, move |source, stop| {
            preview_loop(source, stop, &slot, counts)
        });
        match spawned {
            Ok(worker) => {
                info!("preview started");
                self.activity = Activity::Previewing { worker, pipeline };
                Ok(())
            }
            Err((err, source)) => {
                if let Some(source) = source {
                    self.activity = Activity::Idle { source, pipeline };
                }
                Err(err)
            }
        }
    }

    /// Start the counting loop, stopping the preview if it runs.
    ///
    /// Fails with [`Error::NoCountingLine`] if no line is set, or with
    /// [`Error::Io`] if the thread cannot be spawned; the session is left
    /// idle in both cases.
    pub fn start_counting(&mut self) -> Result<()> {
        if self.is_counting() {
            return Ok(());
        }
        let (source, pipeline) = self.halt()?;
        if pipeline.line().is_none() {
            self.activity = Activity::Idle { source, pipeline };
            return Err(Error::NoCountingLine);
        }

        let (control, control_rx) = unbounded();
        let slot = self.slot.clone();
        let events = self.events_tx.clone();
        let spawned = Worker::spawn(
            "linecount-counting",
            self.stack_size,
            (source, pipeline),
            move |(source, pipeline), stop| counting_loop(source, pipeline, stop, &slot, &events, &control_rx),
        );
        match spawned {
            Ok(worker) => {
                info!("counting started");
                self.activity = Activity::Counting { worker, control };
                Ok(())
            }
            Err((err, parts)) => {
                if let Some((source, pipeline)) = parts {
                    self.activity = Activity::Idle { source, pipeline };
                }
                Err(err)
            }
        }
    }

    /// Stop whichever loop runs and go idle.
    pub fn stop(&mut self) -> Result<()> {
        let (source, pipeline) = self.halt()?;
        self.activity = Activity::Idle { source, pipeline };
        Ok(())
    }

    /// Replace or clear the counting line, also while counting.
    pub fn set_line(&mut self, line: Option<CountingLine>) -> Result<()> {
        self.apply(Control::SetLine(line))
    }

    /// Zero the counters, also while counting.
    pub fn reset_counts(&mut self) -> Result<()> {
        self.apply(Control::ResetCounts)
    }

    /// Stop any loop and hand back the source and pipeline.
    pub fn into_parts(mut self) -> Result<(S, CountingPipeline<D>)> {
        self.halt()
    }

    fn apply(&mut self, control: Control) -> Result<()> {
        match &mut self.activity {
            Activity::Idle { pipeline, .. } | Activity::Previewing { pipeline, .. } => {
                match control {
                    Control::SetLine(line) => pipeline.set_line(line),
                    Control::ResetCounts => pipeline.reset_counts(),
                }
                Ok(())
            }
            Activity::Counting { control: tx, .. } => {
                // The loop drains this channel at the top of every iteration.
                if tx.send(control).is_err() {
                    debug!("counting loop already exited; control message dropped");
                }
                Ok(())
            }
            Activity::Failed => Err(Error::WorkerPanicked),
        }
    }

    fn halt(&mut self) -> Result<(S, CountingPipeline<D>)> {
        match std::mem::replace(&mut self.activity, Activity::Failed) {
            Activity::Idle { source, pipeline } => Ok((source, pipeline)),
            Activity::Previewing { worker, pipeline } => {
                let source = worker.stop()?;
                info!("preview stopped");
                Ok((source, pipeline))
            }
            Activity::Counting { worker, .. } => {
                let parts = worker.stop()?;
                info!("counting stopped");
                Ok(parts)
            }
            Activity::Failed => Err(Error::WorkerPanicked),
        }
    }
}

impl<S, D: DetectionSource> Drop for Session<S, D> {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.activity, Activity::Failed) {
            Activity::Previewing { worker, .. } => {
                let _ = worker.stop();
            }
            Activity::Counting { worker, .. } => {
                let _ = worker.stop();
            }
            Activity::Idle { .. } | Activity::Failed => {}
        }
    }
}

fn next_frame<S: FrameSource>(source: &mut S) -> Option<RgbImage> {
    match source.next_frame() {
        Ok(Some(frame)) => Some(frame),
        Ok(None) => {
            thread::sleep(IDLE_BACKOFF);
            None
        }
        Err(err) => {
            warn!(%err, "frame source failed");
            thread::sleep(ERROR_BACKOFF);
            None
        }
    }
}

fn preview_loop<S: FrameSource>(mut source: S, stop: &AtomicBool, slot: &FrameSlot, counts: Counts) -> S {
    let mut frame_index = 0;
    while !stop.load(Ordering::Acquire) {
        let Some(frame) = next_frame(&mut source) else {
            continue;
        };
        slot.publish(PublishedFrame {
            frame: Arc::new(frame),
            frame_index,
            counting: false,
            tracks: Vec::new(),
            overlay: Vec::new(),
            counts: counts.clone(),
            counts_changed: false,
        });
        frame_index += 1;
    }
    source
}

fn counting_loop<S, D>(
    mut source: S,
    mut pipeline: CountingPipeline<D>,
    stop: &AtomicBool,
    slot: &FrameSlot,
    events: &Sender<CrossingEvent>,
    control: &Receiver<Control>,
) -> (S, CountingPipeline<D>)
where
    S: FrameSource,
    D: DetectionSource,
    D::Error: fmt::Display,
{
    let mut overlay = Vec::new();
    while !stop.load(Ordering::Acquire) {
        drain_control(&mut pipeline, control);

        let Some(frame) = next_frame(&mut source) else {
            continue;
        };

        match pipeline.process_frame(&frame) {
            Ok(report) => {
                let counts_changed = report.counts_changed();
                for event in report.events {
                    let track_id = event.track_id;
                    if events.try_send(event).is_err() {
                        debug!(track_id, "event queue full; crossing event dropped");
                    }
                }
                if report.detected {
                    overlay = report.overlay;
                }
                slot.publish(PublishedFrame {
                    frame: Arc::new(frame),
                    frame_index: report.frame_index,
                    counting: true,
                    tracks: pipeline.tracks(),
                    overlay: overlay.clone(),
                    counts: pipeline.counts(),
                    counts_changed,
                });
            }
            Err(err) => {
                warn!(%err, "detection failed");
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    // Messages sent just before the stop request still apply.
    drain_control(&mut pipeline, control);
    (source, pipeline)
}

fn drain_control<D: DetectionSource>(pipeline: &mut CountingPipeline<D>, control: &Receiver<Control>) {
    for msg in control.try_iter() {
        match msg {
            Control::SetLine(line) => pipeline.set_line(line),
            Control::ResetCounts => pipeline.reset_counts(),
        }
    }
}

//! Repeated propagation of one base field over a range of distances.
//!
//! A [`BatchPlan`] describes the distances, a [`BatchJob`] adds the method, the fixed parameters and the
//! projections to keep. [`BatchSequencer`] walks the plan one plane at a time; [`run`] and [`run_parallel`]
//! drive it to completion and honour a [`CancelToken`] between planes.

use crate::error::{PropagationError, Result};
use crate::params::PropagationParameters;
use crate::propagator::{Method, Propagator};
use crate::Field;
use ndarray::parallel::prelude::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Plane count used when no other limit is configured.
pub const DEFAULT_MAX_PLANES: usize = 10;

/// Distances of a batch, given either by step or by number of planes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPlan {
    Step { start: f64, end: f64, step: f64 },
    Planes { start: f64, end: f64, count: usize },
}

impl BatchPlan {
    pub fn validate(&self) -> Result<()> {
        match *self {
            BatchPlan::Step { start, end, step } => {
                if !start.is_finite() || !end.is_finite() || !step.is_finite() {
                    return Err(PropagationError::InvalidPlan(format!(
                        "non-finite bounds or step ({}, {}, {})",
                        start, end, step
                    )));
                }
                let span = end - start;
                if step == 0.0 {
                    return Err(PropagationError::InvalidPlan("step is zero".to_string()));
                }
                if span.signum() != step.signum() || span == 0.0 {
                    return Err(PropagationError::InvalidPlan(format!(
                        "step {} does not lead from {} to {}",
                        step, start, end
                    )));
                }
                if step.abs() >= span.abs() {
                    return Err(PropagationError::InvalidPlan(format!(
                        "step {} is not smaller than the range {}",
                        step, span
                    )));
                }
                let ratio = span / step;
                if !ratio.is_finite() || ratio >= usize::MAX as f64 {
                    return Err(PropagationError::InvalidPlan(format!(
                        "{} steps of {} cannot be counted",
                        ratio, step
                    )));
                }
            }
            BatchPlan::Planes { start, end, count } => {
                if !start.is_finite() || !end.is_finite() {
                    return Err(PropagationError::InvalidPlan(format!(
                        "non-finite bounds ({}, {})",
                        start, end
                    )));
                }
                if count == 0 {
                    return Err(PropagationError::InvalidPlan("plane count is zero".to_string()));
                }
                if count > 1 && start == end {
                    return Err(PropagationError::InvalidPlan(format!(
                        "{} planes between identical bounds {}",
                        count, start
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of planes, `end` included when a step lands on it.
    ///
    /// In step mode the ratio `(end − start)/step` is rounded half-up at the fifth decimal and then truncated,
    /// so `0..10` by `3` gives 4 planes and the last plane never passes `end`.
    pub fn plane_count(&self) -> usize {
        match *self {
            BatchPlan::Step { start, end, step } => {
                let ratio = (end - start) / step;
                let ratio = (ratio * 1e5).round() / 1e5;
                (ratio.trunc() as usize).saturating_add(1)
            }
            BatchPlan::Planes { count, .. } => count,
        }
    }

    /// Signed distance between consecutive planes, 0.0 for a single plane.
    pub fn step(&self) -> f64 {
        match *self {
            BatchPlan::Step { step, .. } => step,
            BatchPlan::Planes { start, end, count } => {
                if count > 1 {
                    (end - start) / (count - 1) as f64
                } else {
                    0.0
                }
            }
        }
    }

    pub fn start(&self) -> f64 {
        match *self {
            BatchPlan::Step { start, .. } | BatchPlan::Planes { start, .. } => start,
        }
    }

    pub fn end(&self) -> f64 {
        match *self {
            BatchPlan::Step { end, .. } | BatchPlan::Planes { end, .. } => end,
        }
    }

    /// The same plan expressed by plane count.
    pub fn to_planes(&self) -> BatchPlan {
        BatchPlan::Planes {
            start: self.start(),
            end: self.end(),
            count: self.plane_count(),
        }
    }

    /// The same plan expressed by step.
    pub fn to_step(&self) -> BatchPlan {
        BatchPlan::Step {
            start: self.start(),
            end: self.end(),
            step: self.step(),
        }
    }

    /// Fresh iterator over the plane distances, `start + i·step`.
    pub fn distances(&self) -> Distances {
        Distances {
            start: self.start(),
            step: self.step(),
            next: 0,
            count: self.plane_count(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Distances {
    start: f64,
    step: f64,
    next: usize,
    count: usize,
}

impl Iterator for Distances {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next >= self.count {
            return None;
        }
        let z = self.start + self.next as f64 * self.step;
        self.next += 1;
        Some(z)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Distances {}

/// Real valued projection of a propagated plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Phase,
    Amplitude,
    Intensity,
    Real,
    Imaginary,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Phase,
        Channel::Amplitude,
        Channel::Intensity,
        Channel::Real,
        Channel::Imaginary,
    ];

    /// Projection of `field`. Real and imaginary parts are divided by the largest amplitude of the plane.
    pub fn project(self, field: &Field) -> Array2<f64> {
        match self {
            Channel::Phase => field.phase(),
            Channel::Amplitude => field.modulus(),
            Channel::Intensity => field.modulus_squared(),
            Channel::Real | Channel::Imaginary => {
                let mut data = if self == Channel::Real {
                    field.real()
                } else {
                    field.imaginary()
                };
                let max = field.max_modulus();
                if max > 0.0 {
                    data.mapv_inplace(|v| v / max);
                }
                data
            }
        }
    }
}

/// Which projections a batch keeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputChannels {
    pub phase: bool,
    pub amplitude: bool,
    pub intensity: bool,
    pub real: bool,
    pub imaginary: bool,
}

impl OutputChannels {
    pub fn only(channel: Channel) -> Self {
        let mut channels = OutputChannels::default();
        channels.set(channel, true);
        channels
    }

    pub fn all() -> Self {
        OutputChannels {
            phase: true,
            amplitude: true,
            intensity: true,
            real: true,
            imaginary: true,
        }
    }

    pub fn contains(&self, channel: Channel) -> bool {
        match channel {
            Channel::Phase => self.phase,
            Channel::Amplitude => self.amplitude,
            Channel::Intensity => self.intensity,
            Channel::Real => self.real,
            Channel::Imaginary => self.imaginary,
        }
    }

    pub fn set(&mut self, channel: Channel, enabled: bool) {
        match channel {
            Channel::Phase => self.phase = enabled,
            Channel::Amplitude => self.amplitude = enabled,
            Channel::Intensity => self.intensity = enabled,
            Channel::Real => self.real = enabled,
            Channel::Imaginary => self.imaginary = enabled,
        }
    }

    /// Enabled channels in display order.
    pub fn enabled(&self) -> Vec<Channel> {
        Channel::ALL.iter().copied().filter(|&c| self.contains(c)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled().is_empty()
    }
}

/// One projection of one plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub distance: f64,
    pub pitch: (f64, f64),
    pub data: Array2<f64>,
}

impl Frame {
    /// Slice label, e.g. `"3: z = 1500"`.
    pub fn label(&self) -> String {
        format!("{}: z = {}", self.index, self.distance)
    }
}

/// Frames of one channel, ordered by plane index.
#[derive(Clone, Debug, PartialEq)]
pub struct Stack {
    pub channel: Channel,
    pub frames: Vec<Frame>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchOutput {
    pub method: Method,
    pub stacks: Vec<Stack>,
}

impl BatchOutput {
    fn empty(method: Method, channels: &OutputChannels) -> Self {
        BatchOutput {
            method,
            stacks: channels
                .enabled()
                .into_iter()
                .map(|channel| Stack {
                    channel,
                    frames: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn stack(&self, channel: Channel) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.channel == channel)
    }

    /// Number of planes recorded so far.
    pub fn planes(&self) -> usize {
        self.stacks.first().map_or(0, |s| s.frames.len())
    }

    fn push(&mut self, frames: Vec<Frame>) {
        for (stack, frame) in self.stacks.iter_mut().zip(frames) {
            stack.frames.push(frame);
        }
    }
}

/// Shared flag checked between planes.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything about a batch except the field.
///
/// `params.distance` is replaced by each plane's distance; the output pitch sign follows it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub plan: BatchPlan,
    pub method: Method,
    pub params: PropagationParameters,
    pub channels: OutputChannels,
    #[serde(default = "default_max_planes")]
    pub max_planes: usize,
    #[serde(default)]
    pub confirmed: bool,
}

fn default_max_planes() -> usize {
    DEFAULT_MAX_PLANES
}

impl BatchJob {
    pub fn new(plan: BatchPlan, method: Method, params: PropagationParameters, channels: OutputChannels) -> Self {
        BatchJob {
            plan,
            method,
            params,
            channels,
            max_planes: DEFAULT_MAX_PLANES,
            confirmed: false,
        }
    }

    pub fn with_max_planes(mut self, max_planes: usize) -> Self {
        self.max_planes = max_planes;
        self
    }

    /// Accepts a plane count above `max_planes`.
    pub fn confirm(mut self) -> Self {
        self.confirmed = true;
        self
    }

    /// Validates the job for a field of `shape` and returns the plane count.
    ///
    /// Every plane's parameters are checked here, so a job that passes never fails part way on a bad distance.
    pub fn check(&self, shape: [usize; 2]) -> Result<usize> {
        self.plan.validate()?;
        if self.channels.is_empty() {
            return Err(PropagationError::NoOutputChannels);
        }
        for z in [self.plan.start(), self.plan.end()].iter() {
            self.method
                .output_pitch(shape, &self.params.with_distance(*z))?;
        }
        let planes = self.plan.plane_count();
        if planes > self.max_planes && !self.confirmed {
            return Err(PropagationError::PlaneLimit {
                planes,
                max: self.max_planes,
            });
        }
        for z in self.plan.distances() {
            self.method
                .output_pitch(shape, &self.params.with_distance(z))?;
        }
        Ok(planes)
    }

    fn plane(&self, field: &Field, index: usize, distance: f64) -> Result<Vec<Frame>> {
        let out = self
            .method
            .propagate(field, &self.params.with_distance(distance))?;
        Ok(self
            .channels
            .enabled()
            .into_iter()
            .map(|channel| Frame {
                index,
                distance,
                pitch: out.pitch,
                data: channel.project(&out),
            })
            .collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BatchState {
    Idle,
    Stepping { index: usize, distance: f64 },
    Done,
}

/// Step by step execution of a batch over a borrowed base field.
pub struct BatchSequencer<'a> {
    job: &'a BatchJob,
    field: &'a Field,
    distances: Distances,
    state: BatchState,
    output: BatchOutput,
}

impl<'a> BatchSequencer<'a> {
    /// Checks the job, including the plane limit, and returns an idle sequencer.
    pub fn new(job: &'a BatchJob, field: &'a Field) -> Result<Self> {
        job.check(field.shape())?;
        Ok(BatchSequencer {
            job,
            field,
            distances: job.plan.distances(),
            state: BatchState::Idle,
            output: BatchOutput::empty(job.method, &job.channels),
        })
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Frames recorded so far.
    pub fn output(&self) -> &BatchOutput {
        &self.output
    }

    /// Propagates the next plane and records its frames. Returns the new state, `Done` once the last plane is in.
    pub fn advance(&mut self) -> Result<BatchState> {
        if self.state == BatchState::Done {
            return Ok(self.state);
        }
        let index = self.output.planes();
        self.state = match self.distances.next() {
            Some(distance) => {
                let frames = self.job.plane(self.field, index, distance)?;
                self.output.push(frames);
                tracing::debug!(index, distance, "plane propagated");
                if self.distances.len() == 0 {
                    BatchState::Done
                } else {
                    BatchState::Stepping { index, distance }
                }
            }
            None => BatchState::Done,
        };
        Ok(self.state)
    }

    pub fn into_output(self) -> BatchOutput {
        self.output
    }
}

/// Runs `job` on `field` one plane after the other.
pub fn run(job: &BatchJob, field: &Field, cancel: &CancelToken) -> Result<BatchOutput> {
    let mut sequencer = BatchSequencer::new(job, field)?;
    log_start(job);
    loop {
        if cancel.is_cancelled() {
            let completed = sequencer.output().planes();
            tracing::info!(completed, "batch cancelled");
            return Err(PropagationError::Cancelled { completed });
        }
        if sequencer.advance()? == BatchState::Done {
            break;
        }
    }
    let output = sequencer.into_output();
    tracing::info!(planes = output.planes(), "batch finished");
    Ok(output)
}

/// Runs `job` with the planes spread over the rayon pool. Frames keep plane order.
pub fn run_parallel(job: &BatchJob, field: &Field, cancel: &CancelToken) -> Result<BatchOutput> {
    job.check(field.shape())?;
    log_start(job);

    let completed = AtomicUsize::new(0);
    let distances: Vec<f64> = job.plan.distances().collect();
    let planes = distances
        .into_par_iter()
        .enumerate()
        .map(|(index, distance)| -> Result<Vec<Frame>> {
            if cancel.is_cancelled() {
                return Err(PropagationError::Cancelled {
                    completed: completed.load(Ordering::SeqCst),
                });
            }
            let frames = job.plane(field, index, distance)?;
            completed.fetch_add(1, Ordering::SeqCst);
            Ok(frames)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut output = BatchOutput::empty(job.method, &job.channels);
    for frames in planes {
        output.push(frames);
    }
    tracing::info!(planes = output.planes(), "batch finished");
    Ok(output)
}

fn log_start(job: &BatchJob) {
    tracing::info!(
        planes = job.plan.plane_count(),
        start = job.plan.start(),
        step = job.plan.step(),
        method = %job.method,
        "starting batch"
    );
}

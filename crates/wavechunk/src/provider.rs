//! Orchestration of the analysis/render task graph.
//!
//! [`WaveformProvider`] owns one waveform source, the current analysis, and at
//! most one tracked render task per chunk index. Work runs on an injected
//! [`TaskQueue`]; results come back as events that the owner drains with
//! [`pump`](WaveformProvider::pump) on its own thread, which is where every
//! completion callback is invoked.
//!
//! A reconfiguration moves renders that are still waiting on the outgoing analysis
//! over to the new one (same index, same callback) and cancels everything else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::analysis::{
    AnalysisHandle, AnalysisState, AnalysisSummary, AnalysisTask, Generation,
};
use crate::config::ChunkLayout;
use crate::draw::Bitmap;
use crate::queue::{TaskId, TaskQueue};
use crate::render::{PixelSize, RenderInput, RenderOutcome, RenderRequest, RenderTask};
use crate::source::WaveformSource;

/// Receives the bitmap (or `None` for "no image") and the chunk index.
pub type RenderCallback = Box<dyn FnOnce(Option<Bitmap>, usize)>;

/// Receives the outcome of the analysis started by `configure`.
pub type AnalysisCallback = Box<dyn FnOnce(AnalysisSummary)>;

enum TaskEvent {
    AnalysisFinished {
        generation: Generation,
    },
    RenderFinished {
        task: TaskId,
        generation: Generation,
        index: usize,
        outcome: RenderOutcome,
    },
}

struct TrackedRender {
    task_id: TaskId,
    task: RenderTask,
    callback: RenderCallback,
}

struct CurrentAnalysis {
    task_id: TaskId,
    handle: Arc<AnalysisHandle>,
    on_finish: Option<AnalysisCallback>,
    reported: bool,
}

pub struct WaveformProvider<S: WaveformSource> {
    source: S,
    queue: TaskQueue,
    generation: Generation,
    analysis: Option<CurrentAnalysis>,
    renders: HashMap<usize, TrackedRender>,
    events_tx: Sender<TaskEvent>,
    events_rx: Receiver<TaskEvent>,
}

impl<S: WaveformSource> WaveformProvider<S> {
    /// Create a provider that submits its work to `queue`.
    ///
    /// Passing the same queue to several providers makes them share one worker.
    pub fn new(source: S, queue: TaskQueue) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            source,
            queue,
            generation: Generation::default(),
            analysis: None,
            renders: HashMap::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Start a new analysis for `input` laid out as `layout`.
    pub fn configure(
        &mut self,
        input: S::Input,
        layout: &ChunkLayout,
        on_finish: Option<AnalysisCallback>,
    ) -> Generation {
        let analysis_input = self.source.prepare_analysis(input, layout);
        self.source.invalidate_cache();

        self.generation = self.generation.next();
        let generation = self.generation;
        let handle = Arc::new(AnalysisHandle::new(generation));

        let waiting = self.take_waiting_renders();
        self.cancel_outstanding();

        let task = AnalysisTask::new(handle.clone(), analysis_input);
        let tx = self.events_tx.clone();
        let task_id = self.queue.submit(Vec::new(), move |ctx| {
            task.run(&ctx.cancel);
            let _ = tx.send(TaskEvent::AnalysisFinished { generation });
        });
        tracing::debug!(
            %generation,
            chunks = layout.len(),
            rewired = waiting.len(),
            "analysis submitted"
        );
        self.analysis = Some(CurrentAnalysis {
            task_id,
            handle: handle.clone(),
            on_finish,
            reported: false,
        });

        // Rebuilt by the source so they read the new input, not the old one.
        for (request, callback) in waiting {
            let input = RenderInput::Pending(handle.clone());
            match self.source.create_render_task(request, input, generation) {
                Some(task) => self.submit_render(task, callback, Some(task_id)),
                None => callback(None, request.index),
            }
        }
        generation
    }

    /// Request the bitmap for chunk `index`.
    ///
    /// Any tracked render for `index` is retired first. When there is no data
    /// and no analysis to wait on, `completion(None, index)` runs immediately.
    pub fn request_render<F>(&mut self, index: usize, size: PixelSize, completion: F)
    where
        F: FnOnce(Option<Bitmap>, usize) + 'static,
    {
        self.cancel_render(index);

        let request = RenderRequest { index, size };
        let Some((input, dependency)) = self.render_source(index) else {
            tracing::trace!(index, "no render source");
            completion(None, index);
            return;
        };
        let Some(task) = self
            .source
            .create_render_task(request, input, self.generation)
        else {
            completion(None, index);
            return;
        };
        self.submit_render(task, Box::new(completion), dependency);
    }

    /// Cancel and forget the tracked render for `index`, if any.
    pub fn cancel_render(&mut self, index: usize) {
        if let Some(previous) = self.renders.remove(&index) {
            self.queue.cancel(previous.task_id);
            tracing::trace!(index, task = previous.task_id, "render retired");
        }
    }

    /// Cancel the analysis and every tracked render and drop cached data.
    ///
    /// The generation is left unchanged; later requests find no render source
    /// until the next `configure`.
    pub fn cancel_all(&mut self) {
        self.cancel_outstanding();
        self.source.clear();
    }

    /// Tracked renders plus the current analysis.
    pub fn active_task_count(&self) -> usize {
        self.renders.len() + usize::from(self.analysis.is_some())
    }

    /// No tracked renders and no unreported analysis.
    pub fn is_idle(&self) -> bool {
        self.renders.is_empty() && self.analysis.as_ref().is_none_or(|a| a.reported)
    }

    /// Deliver every completion that has arrived. Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Like [`pump`](Self::pump), but wait up to `timeout` for the first event.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    /// Pump until idle or until `timeout` elapses. Returns whether the provider is idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump_timeout(deadline - now);
        }
    }

    /// Pick the render input for `index`: cached data, a finished analysis, or a
    /// dependency on the running one.
    fn render_source(&self, index: usize) -> Option<(RenderInput, Option<TaskId>)> {
        if let Some(data) = self.source.lookup_cached(index) {
            return Some((RenderInput::Resolved(data), None));
        }
        let analysis = self.analysis.as_ref()?;
        match analysis.handle.state() {
            AnalysisState::Finished(result) => self
                .source
                .lookup_from_finished_analysis(&result, index)
                .map(|data| (RenderInput::Resolved(data), None)),
            AnalysisState::Pending | AnalysisState::Running => Some((
                RenderInput::Pending(analysis.handle.clone()),
                Some(analysis.task_id),
            )),
            AnalysisState::Cancelled | AnalysisState::Failed(_) => None,
        }
    }

    fn submit_render(
        &mut self,
        task: RenderTask,
        callback: RenderCallback,
        dependency: Option<TaskId>,
    ) {
        let index = task.index();
        let generation = task.generation;
        let job = task.clone();
        let tx = self.events_tx.clone();
        let task_id = self
            .queue
            .submit(dependency.into_iter().collect(), move |ctx| {
                let outcome = job.run(&ctx.cancel);
                let _ = tx.send(TaskEvent::RenderFinished {
                    task: ctx.id,
                    generation,
                    index,
                    outcome,
                });
            });
        tracing::trace!(index, task = task_id, %generation, "render submitted");
        self.renders.insert(
            index,
            TrackedRender {
                task_id,
                task,
                callback,
            },
        );
    }

    /// Remove renders waiting on the current analysis, keeping their requests and callbacks.
    fn take_waiting_renders(&mut self) -> Vec<(RenderRequest, RenderCallback)> {
        let Some(current) = self.analysis.as_ref() else {
            return Vec::new();
        };
        let waiting: Vec<usize> = self
            .renders
            .iter()
            .filter(|(_, tracked)| tracked.task.depends_on(&current.handle))
            .map(|(index, _)| *index)
            .collect();

        let mut taken = Vec::with_capacity(waiting.len());
        for index in waiting {
            if let Some(tracked) = self.renders.remove(&index) {
                self.queue.cancel(tracked.task_id);
                taken.push((tracked.task.request, tracked.callback));
            }
        }
        taken.sort_by_key(|(request, _)| request.index);
        taken
    }

    fn cancel_outstanding(&mut self) {
        for (_, tracked) in self.renders.drain() {
            self.queue.cancel(tracked.task_id);
        }
        if let Some(analysis) = self.analysis.take() {
            analysis.handle.mark_cancelled();
            self.queue.cancel(analysis.task_id);
            tracing::debug!(generation = %analysis.handle.generation(), "analysis cancelled");
        }
    }

    fn handle_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::AnalysisFinished { generation } => {
                let Some(analysis) = self
                    .analysis
                    .as_mut()
                    .filter(|a| a.handle.generation() == generation)
                else {
                    tracing::trace!(%generation, "stale analysis event ignored");
                    return;
                };
                analysis.reported = true;
                let on_finish = analysis.on_finish.take();
                let summary = analysis.handle.summary();
                if let AnalysisState::Finished(result) = analysis.handle.state() {
                    self.source.analysis_finished(&result);
                }
                if let Some(on_finish) = on_finish {
                    on_finish(summary);
                }
            }
            TaskEvent::RenderFinished {
                task,
                generation,
                index,
                outcome,
            } => {
                let is_tracked = self
                    .renders
                    .get(&index)
                    .is_some_and(|tracked| tracked.task_id == task);
                if !is_tracked {
                    tracing::debug!(index, task, %generation, "superseded render completion suppressed");
                    return;
                }
                let Some(tracked) = self.renders.remove(&index) else {
                    return;
                };
                match outcome {
                    RenderOutcome::Cancelled => {
                        tracing::trace!(index, task, "render cancelled");
                    }
                    RenderOutcome::Done { bitmap, loaded } => {
                        if let Some(samples) = loaded.as_ref() {
                            if generation == self.generation {
                                self.source.render_finished(index, samples);
                            }
                        }
                        (tracked.callback)(bitmap, index);
                    }
                }
            }
        }
    }
}

impl<S: WaveformSource> Drop for WaveformProvider<S> {
    fn drop(&mut self) {
        self.cancel_outstanding();
    }
}

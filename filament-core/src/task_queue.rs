//! Task Queue
//!
//! Observers never notify synchronously from a write. They queue a microtask
//! instead, so several writes in the same tick collapse into one
//! notification. The queue also carries animation-frame callbacks, which the
//! connect queue and the dirty checker use for work that may wait a frame.
//!
//! # Ordering
//!
//! 1. Microtasks run in FIFO order.
//! 2. Microtasks queued while the queue drains run in the same flush.
//! 3. A flush requested from inside a running task is a no-op; the outer
//!    flush picks the new work up.
//! 4. An animation frame runs the callbacks requested before it started,
//!    then drains the microtask queue.
//!
//! The queue lock is never held while a task runs, so tasks may freely queue
//! more tasks or request frames.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

/// A unit of deferred work.
pub trait Task: Send + Sync {
    /// Run the task.
    fn call(&self);
}

impl<F> Task for F
where
    F: Fn() + Send + Sync,
{
    fn call(&self) {
        self()
    }
}

type FrameCallback = Box<dyn FnOnce(Instant) + Send>;

#[derive(Default)]
struct QueueState {
    micro_tasks: VecDeque<Arc<dyn Task>>,
    frames: Vec<FrameCallback>,
    flushing: bool,
}

/// Shared handle to a microtask and animation-frame queue.
///
/// Cloning the handle shares the queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    state: Arc<Mutex<QueueState>>,
}

/// Resets the `flushing` flag even if a task panics.
struct FlushGuard<'a> {
    state: &'a Mutex<QueueState>,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().flushing = false;
    }
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task to run on the next microtask flush.
    pub fn queue_micro_task(&self, task: Arc<dyn Task>) {
        self.state.lock().micro_tasks.push_back(task);
    }

    /// Run every queued microtask, including those queued while running.
    ///
    /// Returns the number of tasks that ran.
    pub fn flush_micro_task_queue(&self) -> usize {
        {
            let mut state = self.state.lock();
            if state.flushing {
                return 0;
            }
            state.flushing = true;
        }
        let _guard = FlushGuard { state: &self.state };

        let mut ran = 0;
        loop {
            let next = self.state.lock().micro_tasks.pop_front();
            match next {
                Some(task) => {
                    task.call();
                    ran += 1;
                }
                None => break,
            }
        }

        if ran > 0 {
            trace!(tasks = ran, "flushed micro task queue");
        }
        ran
    }

    /// Request a callback on the next animation frame.
    pub fn request_animation_frame<F>(&self, callback: F)
    where
        F: FnOnce(Instant) + Send + 'static,
    {
        self.state.lock().frames.push(Box::new(callback));
    }

    /// Run one animation frame.
    ///
    /// Callbacks requested while the frame runs wait for the next frame.
    /// Returns the number of frame callbacks that ran.
    pub fn run_animation_frame(&self) -> usize {
        let frames = std::mem::take(&mut self.state.lock().frames);
        let count = frames.len();
        let start = Instant::now();
        for callback in frames {
            callback(start);
        }
        self.flush_micro_task_queue();
        count
    }

    /// Number of microtasks waiting to run.
    pub fn pending_micro_tasks(&self) -> usize {
        self.state.lock().micro_tasks.len()
    }

    /// Number of frame callbacks waiting for the next frame.
    pub fn pending_frames(&self) -> usize {
        self.state.lock().frames.len()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TaskQueue")
            .field("micro_tasks", &state.micro_tasks.len())
            .field("frames", &state.frames.len())
            .field("flushing", &state.flushing)
            .finish()
    }
}

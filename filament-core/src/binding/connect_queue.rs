//! Connect Queue
//!
//! Connecting a binding subscribes observers for every property its source
//! expression reads, which adds up when a view creates thousands of
//! bindings at once. The queue spreads that work out:
//!
//! 1. The first `threshold` connects of a flush cycle run immediately,
//!    without re-evaluating (the binding just evaluated at bind time).
//! 2. Later connects are queued, once per binding, and run on the next
//!    animation frame with evaluation, so a change made in between still
//!    reaches the target.
//! 3. A frame connects in batches of 100 and stops once the frame budget is
//!    spent; the rest rolls over to the following frame.
//! 4. When the queue drains, the immediate counter resets.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use super::property::{BindingId, PropertyBinding};
use crate::task_queue::TaskQueue;

/// Bindings connected per budget check.
const BATCH_SIZE: usize = 100;

struct QueueState {
    threshold: usize,
    immediate: usize,
    queue: VecDeque<Arc<PropertyBinding>>,
    queued: HashSet<BindingId>,
    flush_requested: bool,
}

/// Defers binding connects past a threshold to animation frames.
pub struct ConnectQueue {
    this: Weak<ConnectQueue>,
    task_queue: TaskQueue,
    default_threshold: usize,
    frame_budget: Duration,
    state: Mutex<QueueState>,
}

impl ConnectQueue {
    pub fn new(task_queue: TaskQueue, threshold: usize, frame_budget: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            task_queue,
            default_threshold: threshold,
            frame_budget,
            state: Mutex::new(QueueState {
                threshold,
                immediate: 0,
                queue: VecDeque::new(),
                queued: HashSet::new(),
                flush_requested: false,
            }),
        })
    }

    /// Connect `binding` now or on a later animation frame.
    pub fn enqueue(&self, binding: Arc<PropertyBinding>) {
        let (connect_now, request_flush) = {
            let mut state = self.state.lock();
            let connect_now = state.immediate < state.threshold;
            if connect_now {
                state.immediate += 1;
            } else if state.queued.insert(binding.id()) {
                state.queue.push_back(binding.clone());
            }
            let request_flush = !std::mem::replace(&mut state.flush_requested, true);
            (connect_now, request_flush)
        };

        if connect_now {
            if let Err(error) = binding.connect(false) {
                error!(%error, binding = binding.id().raw(), "failed to connect binding");
            }
        }
        if request_flush {
            let this = self.this.clone();
            self.task_queue.request_animation_frame(move |frame_start| {
                if let Some(queue) = this.upgrade() {
                    queue.flush(frame_start);
                }
            });
        }
    }

    fn flush(&self, frame_start: Instant) {
        let mut connected = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.queue.pop_front();
                if let Some(binding) = &next {
                    state.queued.remove(&binding.id());
                }
                next
            };
            let Some(binding) = next else {
                break;
            };

            if let Err(error) = binding.connect(true) {
                error!(%error, binding = binding.id().raw(), "failed to connect queued binding");
            }
            connected += 1;
            if connected % BATCH_SIZE == 0 && frame_start.elapsed() > self.frame_budget {
                break;
            }
        }

        let remaining = {
            let mut state = self.state.lock();
            if state.queue.is_empty() {
                state.flush_requested = false;
                state.immediate = 0;
            }
            state.queue.len()
        };
        debug!(connected, remaining, "flushed connect queue");

        if remaining > 0 {
            let this = self.this.clone();
            self.task_queue.request_animation_frame(move |frame_start| {
                if let Some(queue) = this.upgrade() {
                    queue.flush(frame_start);
                }
            });
        }
    }

    /// Number of connects that run immediately per flush cycle.
    pub fn threshold(&self) -> usize {
        self.state.lock().threshold
    }

    pub fn set_threshold(&self, threshold: usize) {
        trace!(threshold, "connect queue threshold changed");
        self.state.lock().threshold = threshold;
    }

    /// Restore the configured threshold.
    pub fn enable(&self) {
        self.set_threshold(self.default_threshold);
    }

    /// Connect every binding immediately.
    pub fn disable(&self) {
        self.set_threshold(usize::MAX);
    }

    /// Number of bindings waiting for a frame.
    pub fn size(&self) -> usize {
        self.state.lock().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingEngine, BindingMode};
    use crate::config::BindingConfig;
    use crate::dom::ElementRef;
    use crate::expression::Expression;
    use crate::scope::Scope;
    use crate::value::{ObjectRef, Value};

    fn bind_many(engine: &BindingEngine, scope: &Scope, count: usize) -> Vec<(ElementRef, Arc<PropertyBinding>)> {
        let expression =
            engine.create_binding_expression("value", Expression::access_scope("foo"), BindingMode::ToView);
        (0..count)
            .map(|_| {
                let target = ElementRef::new("input");
                let binding = expression.create_binding(&target);
                binding.bind(scope).unwrap();
                (target, binding)
            })
            .collect()
    }

    #[test]
    fn queues_past_the_threshold() {
        let config = BindingConfig {
            connect_queue_threshold: 2,
            ..BindingConfig::default()
        };
        let engine = BindingEngine::new(config);
        let vm = ObjectRef::from_pairs([("foo", "bar")]);
        let scope = Scope::new(vm.clone());

        let bindings = bind_many(&engine, &scope, 3);
        assert_eq!(engine.connect_queue().size(), 1);

        vm.set("foo", "baz".into());
        engine.task_queue().flush_micro_task_queue();
        assert_eq!(bindings[0].0.get_property("value"), Value::from("baz"));
        assert_eq!(bindings[2].0.get_property("value"), Value::from("bar"));

        engine.task_queue().run_animation_frame();
        assert_eq!(engine.connect_queue().size(), 0);
        assert_eq!(bindings[2].0.get_property("value"), Value::from("baz"));

        vm.set("foo", "qux".into());
        engine.task_queue().flush_micro_task_queue();
        assert!(bindings.iter().all(|(target, _)| target.get_property("value") == Value::from("qux")));
    }

    #[test]
    fn counter_resets_when_the_queue_drains() {
        let config = BindingConfig {
            connect_queue_threshold: 1,
            ..BindingConfig::default()
        };
        let engine = BindingEngine::new(config);
        let scope = Scope::new(ObjectRef::from_pairs([("foo", "bar")]));

        bind_many(&engine, &scope, 2);
        assert_eq!(engine.connect_queue().size(), 1);
        engine.task_queue().run_animation_frame();
        assert_eq!(engine.connect_queue().size(), 0);

        bind_many(&engine, &scope, 1);
        assert_eq!(engine.connect_queue().size(), 0);
    }

    #[test]
    fn disable_and_enable() {
        let engine = BindingEngine::new(BindingConfig {
            connect_queue_threshold: 1,
            ..BindingConfig::default()
        });
        let scope = Scope::new(ObjectRef::from_pairs([("foo", "bar")]));

        engine.connect_queue().disable();
        assert_eq!(engine.connect_queue().threshold(), usize::MAX);
        bind_many(&engine, &scope, 5);
        assert_eq!(engine.connect_queue().size(), 0);

        engine.connect_queue().enable();
        assert_eq!(engine.connect_queue().threshold(), 1);
        bind_many(&engine, &scope, 1);
        assert_eq!(engine.connect_queue().size(), 1);
    }

    #[test]
    fn a_binding_is_queued_once() {
        let engine = BindingEngine::new(BindingConfig {
            connect_queue_threshold: 0,
            ..BindingConfig::default()
        });
        let scope = Scope::new(ObjectRef::from_pairs([("foo", "bar")]));
        let (_, binding) = bind_many(&engine, &scope, 1).remove(0);

        engine.connect_queue().enqueue(binding.clone());
        engine.connect_queue().enqueue(binding);
        assert_eq!(engine.connect_queue().size(), 1);
    }
}

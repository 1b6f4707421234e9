//! Path observation for `object.member` where `object` itself can change.
//!
//! The left observer watches the object expression. Every time it reports a
//! new object the right observer (the member on that object) is resolved
//! again and the subscription moves over to it.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

use super::subscription::{callback, Callback, CallbackList, Subscription};
use super::Observer;
use crate::error::Result;
use crate::value::Value;

/// Resolves the member observer for a given object value.
pub type ObserverResolver = Arc<dyn Fn(&Value) -> Option<Observer> + Send + Sync>;

#[derive(Default)]
struct PathState {
    right: Option<Observer>,
    left_subscription: Option<Subscription>,
    right_subscription: Option<Subscription>,
    value: Value,
}

/// Observes a member through a changing object.
pub struct PathObserver {
    this: Weak<PathObserver>,
    left: Observer,
    resolve: ObserverResolver,
    callbacks: CallbackList,
    state: Mutex<PathState>,
}

impl PathObserver {
    pub fn new(left: Observer, resolve: ObserverResolver) -> Arc<Self> {
        let right = resolve(&left.get_value());
        let value = right.as_ref().map(Observer::get_value).unwrap_or_default();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            left,
            resolve,
            callbacks: CallbackList::new(),
            state: Mutex::new(PathState {
                right,
                value,
                ..PathState::default()
            }),
        })
    }

    pub fn get_value(&self) -> Value {
        let right = self.state.lock().right.clone();
        right.map(|r| r.get_value()).unwrap_or_default()
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        let right = self.state.lock().right.clone();
        match right {
            Some(right) => right.set_value(value),
            None => Ok(()),
        }
    }

    pub fn subscribe(&self, callback: Callback) -> Result<Subscription> {
        let id = self.callbacks.add(callback);
        if let Err(error) = self.activate() {
            self.callbacks.remove(id);
            return Err(error);
        }

        let owner = self.this.upgrade();
        Ok(Subscription::new(move || {
            if let Some(observer) = owner {
                observer.callbacks.remove(id);
                if observer.callbacks.is_empty() {
                    observer.deactivate();
                }
            }
        }))
    }

    fn activate(&self) -> Result<()> {
        if self.state.lock().left_subscription.is_some() {
            return Ok(());
        }

        let this = self.this.clone();
        let left_subscription = self.left.subscribe(callback(move |object, _| {
            if let Some(observer) = this.upgrade() {
                observer.left_changed(object);
            }
        }))?;

        let right = self.state.lock().right.clone();
        let right_subscription = match right {
            Some(right) => Some(self.subscribe_right(&right)?),
            None => None,
        };

        let mut state = self.state.lock();
        state.left_subscription = Some(left_subscription);
        state.right_subscription = right_subscription;
        Ok(())
    }

    fn deactivate(&self) {
        let (left, right) = {
            let mut state = self.state.lock();
            (state.left_subscription.take(), state.right_subscription.take())
        };
        for subscription in left.into_iter().chain(right) {
            subscription.dispose();
        }
    }

    fn subscribe_right(&self, right: &Observer) -> Result<Subscription> {
        let this = self.this.clone();
        right.subscribe(callback(move |new, _| {
            if let Some(observer) = this.upgrade() {
                observer.notify(new.clone());
            }
        }))
    }

    fn left_changed(&self, object: &Value) {
        let right = (self.resolve)(object);

        let previous = {
            let mut state = self.state.lock();
            state.right = right.clone();
            state.right_subscription.take()
        };
        if let Some(subscription) = previous {
            subscription.dispose();
        }

        let value = match &right {
            Some(right) => {
                match self.subscribe_right(right) {
                    Ok(subscription) => self.state.lock().right_subscription = Some(subscription),
                    Err(error) => warn!(%error, "cannot observe member of new path object"),
                }
                right.get_value()
            }
            None => Value::Undefined,
        };
        self.notify(value);
    }

    fn notify(&self, new_value: Value) {
        let old_value = std::mem::replace(&mut self.state.lock().value, new_value.clone());
        self.callbacks.notify(&new_value, &old_value);
    }
}

impl Drop for PathObserver {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for subscription in state.left_subscription.take().into_iter().chain(state.right_subscription.take()) {
            subscription.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::change_records::ObjectObserver;
    use crate::task_queue::TaskQueue;
    use crate::value::ObjectRef;

    #[test]
    fn follows_the_object_it_is_attached_to() {
        let queue = TaskQueue::new();
        let first = ObjectRef::from_pairs([("name", "first")]);
        let second = ObjectRef::from_pairs([("name", "second")]);
        let root = ObjectRef::from_pairs([("user", Value::Object(first.clone()))]);
        let root_observer = ObjectObserver::new(queue.clone(), &root);

        // keeps each dispatcher alive for as long as the test runs
        let owners = Arc::new(Mutex::new(Vec::<Arc<ObjectObserver>>::new()));
        let resolve: ObserverResolver = {
            let queue = queue.clone();
            let owners = owners.clone();
            Arc::new(move |object| {
                let object = object.as_object()?;
                let owner = ObjectObserver::new(queue.clone(), object);
                let observer = owner.get_observer("name");
                owners.lock().push(owner);
                Some(observer)
            })
        };

        let path = PathObserver::new(root_observer.get_observer("user"), resolve);
        assert_eq!(path.get_value(), Value::from("first"));

        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = calls.clone();
        let _subscription = path
            .subscribe(callback(move |new, old| c.lock().push((new.clone(), old.clone()))))
            .unwrap();

        first.set("name", "renamed".into());
        queue.flush_micro_task_queue();
        root.set("user", Value::Object(second.clone()));
        queue.flush_micro_task_queue();

        assert_eq!(
            *calls.lock(),
            vec![
                (Value::from("renamed"), Value::from("first")),
                (Value::from("second"), Value::from("renamed")),
            ]
        );
        assert_eq!(path.get_value(), Value::from("second"));

        // the old object is no longer followed
        first.set("name", "ignored".into());
        queue.flush_micro_task_queue();
        assert_eq!(calls.lock().len(), 2);
    }
}

//! Objects
//!
//! An object is an insertion-ordered property map shared by reference. A
//! property is either a plain data slot or an accessor slot whose reads and
//! writes go through a [`PropertyAccessor`]; the setter-based observer uses
//! accessors to intercept writes.
//!
//! Objects also emit change records. Once a listener is registered through
//! [`ObjectRef::observe_changes`], every write to a data slot appends a
//! record, and the pending batch is delivered one microtask after the first
//! record of the batch.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{ListenerId, ObjectId, Value};
use crate::task_queue::TaskQueue;

/// Intercepts reads and writes of one property.
pub trait PropertyAccessor: Send + Sync {
    fn get(&self) -> Value;
    fn set(&self, value: Value);
}

/// What happened to a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

/// One property change, as delivered to change listeners.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub name: String,
    pub kind: ChangeKind,
    pub old_value: Value,
}

type ChangeListener = Arc<dyn Fn(&[ChangeRecord]) + Send + Sync>;

enum Slot {
    Data(Value),
    Accessor(Arc<dyn PropertyAccessor>),
}

#[derive(Default)]
struct ObjectState {
    properties: IndexMap<String, Slot>,
    frozen: bool,
    listeners: Vec<(ListenerId, ChangeListener)>,
    pending: Vec<ChangeRecord>,
    delivery: Option<TaskQueue>,
    delivery_scheduled: bool,
}

struct ObjectCell {
    id: ObjectId,
    state: Mutex<ObjectState>,
}

/// Shared handle to an object.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectCell>);

/// Non-owning handle to an object.
#[derive(Clone)]
pub struct WeakObjectRef(Weak<ObjectCell>);

impl ObjectRef {
    /// Create an empty object.
    pub fn new() -> Self {
        Self(Arc::new(ObjectCell {
            id: ObjectId::new(),
            state: Mutex::new(ObjectState::default()),
        }))
    }

    /// Create an object from `(name, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let object = Self::new();
        {
            let mut state = object.0.state.lock();
            for (key, value) in pairs {
                state.properties.insert(key.into(), Slot::Data(value.into()));
            }
        }
        object
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Arc::downgrade(&self.0))
    }

    /// Read a property, going through its accessor if it has one.
    pub fn get(&self, name: &str) -> Value {
        let accessor = {
            let state = self.0.state.lock();
            match state.properties.get(name) {
                Some(Slot::Data(value)) => return value.clone(),
                Some(Slot::Accessor(accessor)) => accessor.clone(),
                None => return Value::Undefined,
            }
        };
        accessor.get()
    }

    /// Write a property, going through its accessor if it has one.
    ///
    /// Writes to a frozen object are ignored. Writing the value a data slot
    /// already holds produces no change record.
    pub fn set(&self, name: &str, value: Value) {
        let mut state = self.0.state.lock();
        if state.frozen {
            return;
        }
        if let Some(Slot::Accessor(accessor)) = state.properties.get(name) {
            let accessor = accessor.clone();
            drop(state);
            accessor.set(value);
            return;
        }

        let record = match state.properties.get_mut(name) {
            Some(Slot::Data(slot)) if slot.strict_eq(&value) => None,
            Some(slot) => Some(ChangeRecord {
                name: name.to_string(),
                kind: ChangeKind::Update,
                old_value: match std::mem::replace(slot, Slot::Data(value)) {
                    Slot::Data(old_value) => old_value,
                    Slot::Accessor(_) => Value::Undefined,
                },
            }),
            None => {
                state.properties.insert(name.to_string(), Slot::Data(value));
                Some(ChangeRecord {
                    name: name.to_string(),
                    kind: ChangeKind::Add,
                    old_value: Value::Undefined,
                })
            }
        };
        if let (false, Some(record)) = (state.listeners.is_empty(), record) {
            self.push_record(&mut state, record);
        }
    }

    /// Remove a property. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let mut state = self.0.state.lock();
        if state.frozen {
            return false;
        }
        let Some(slot) = state.properties.shift_remove(name) else {
            return false;
        };
        if !state.listeners.is_empty() {
            let old_value = match slot {
                Slot::Data(value) => value,
                Slot::Accessor(accessor) => accessor.get(),
            };
            let record = ChangeRecord {
                name: name.to_string(),
                kind: ChangeKind::Delete,
                old_value,
            };
            self.push_record(&mut state, record);
        }
        true
    }

    /// Whether the object has an own property with this name.
    pub fn has_own(&self, name: &str) -> bool {
        self.0.state.lock().properties.contains_key(name)
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.state.lock().properties.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.state.lock().properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prevent further writes and accessor definitions.
    pub fn freeze(&self) {
        self.0.state.lock().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.0.state.lock().frozen
    }

    /// Replace a property with an accessor.
    ///
    /// Returns `false` (and changes nothing) when the object is frozen.
    pub fn define_accessor(&self, name: &str, accessor: Arc<dyn PropertyAccessor>) -> bool {
        let mut state = self.0.state.lock();
        if state.frozen {
            return false;
        }
        state.properties.insert(name.to_string(), Slot::Accessor(accessor));
        true
    }

    /// Register a change listener.
    ///
    /// Records are batched and delivered on `queue` one microtask after the
    /// first record of each batch.
    pub fn observe_changes<F>(&self, queue: &TaskQueue, listener: F) -> ListenerId
    where
        F: Fn(&[ChangeRecord]) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        let mut state = self.0.state.lock();
        state.listeners.push((id, Arc::new(listener)));
        state.delivery = Some(queue.clone());
        id
    }

    /// Remove a change listener.
    pub fn unobserve_changes(&self, id: ListenerId) {
        let mut state = self.0.state.lock();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        if state.listeners.is_empty() {
            state.pending.clear();
        }
    }

    /// Deliver pending change records now.
    pub fn deliver_change_records(&self) {
        let (records, listeners) = {
            let mut state = self.0.state.lock();
            state.delivery_scheduled = false;
            if state.pending.is_empty() {
                return;
            }
            let records = std::mem::take(&mut state.pending);
            let listeners: Vec<ChangeListener> =
                state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (records, listeners)
        };
        for listener in listeners {
            listener(&records);
        }
    }

    fn push_record(&self, state: &mut ObjectState, record: ChangeRecord) {
        state.pending.push(record);
        if state.delivery_scheduled {
            return;
        }
        if let Some(queue) = state.delivery.clone() {
            state.delivery_scheduled = true;
            let weak = self.downgrade();
            queue.queue_micro_task(Arc::new(move || {
                if let Some(object) = weak.upgrade() {
                    object.deliver_change_records();
                }
            }));
        }
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.0.id.raw())
            .field("keys", &self.keys())
            .finish()
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakObject")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Doubling {
        stored: Mutex<Value>,
    }

    impl PropertyAccessor for Doubling {
        fn get(&self) -> Value {
            self.stored.lock().clone()
        }

        fn set(&self, value: Value) {
            *self.stored.lock() = Value::Number(value.to_number() * 2.0);
        }
    }

    #[test]
    fn properties_keep_insertion_order() {
        let object = ObjectRef::from_pairs([("b", 1), ("a", 2)]);
        object.set("c", 3.into());
        assert_eq!(object.keys(), vec!["b", "a", "c"]);
        assert!(object.remove("a"));
        assert!(!object.has_own("a"));
    }

    #[test]
    fn accessors_intercept_reads_and_writes() {
        let object = ObjectRef::new();
        let installed = object.define_accessor(
            "x",
            Arc::new(Doubling {
                stored: Mutex::new(Value::Undefined),
            }),
        );
        assert!(installed);
        object.set("x", 4.into());
        assert_eq!(object.get("x"), Value::from(8));
    }

    #[test]
    fn frozen_objects_reject_changes() {
        let object = ObjectRef::from_pairs([("x", 1)]);
        object.freeze();
        object.set("x", 2.into());
        assert_eq!(object.get("x"), Value::from(1));
        let installed = object.define_accessor(
            "x",
            Arc::new(Doubling {
                stored: Mutex::new(Value::Undefined),
            }),
        );
        assert!(!installed);
    }

    #[test]
    fn change_records_are_batched_per_microtask() {
        let queue = TaskQueue::new();
        let object = ObjectRef::from_pairs([("x", 1)]);
        let batches = Arc::new(AtomicUsize::new(0));
        let records = Arc::new(Mutex::new(Vec::new()));

        let b = batches.clone();
        let r = records.clone();
        object.observe_changes(&queue, move |changes| {
            b.fetch_add(1, Ordering::SeqCst);
            r.lock().extend(changes.iter().map(|c| (c.name.clone(), c.kind)));
        });

        object.set("x", 2.into());
        object.set("y", 3.into());
        assert_eq!(batches.load(Ordering::SeqCst), 0);

        queue.flush_micro_task_queue();
        assert_eq!(batches.load(Ordering::SeqCst), 1);
        assert_eq!(
            *records.lock(),
            vec![
                ("x".to_string(), ChangeKind::Update),
                ("y".to_string(), ChangeKind::Add)
            ]
        );
    }

    #[test]
    fn only_data_changes_are_recorded() {
        let queue = TaskQueue::new();
        let object = ObjectRef::from_pairs([("x", 1)]);
        object.define_accessor(
            "y",
            Arc::new(Doubling {
                stored: Mutex::new(Value::Undefined),
            }),
        );
        let records = Arc::new(Mutex::new(Vec::new()));
        let r = records.clone();
        object.observe_changes(&queue, move |changes| {
            r.lock().extend(changes.iter().map(|c| (c.name.clone(), c.old_value.clone())));
        });

        object.set("x", 1.into());
        object.set("y", 5.into());
        object.set("x", 2.into());
        queue.flush_micro_task_queue();

        assert_eq!(object.get("y"), Value::from(10));
        assert_eq!(*records.lock(), vec![("x".to_string(), Value::from(1))]);
    }
}

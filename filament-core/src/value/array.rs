//! Arrays
//!
//! Shared, mutable lists. Every mutation is reported synchronously to the
//! array's listeners as a splice (where it happened, what was removed, how
//! much was added). The array observer turns these into batched
//! notifications.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{ListenerId, ObjectId, Value};
use crate::error::{BindingError, Result};

/// One past the largest valid index.
pub const MAX_LENGTH: usize = u32::MAX as usize;

/// Description of one array mutation.
#[derive(Debug, Clone)]
pub struct ArraySplice {
    pub index: usize,
    pub removed: Vec<Value>,
    pub added_count: usize,
}

type ArrayListener = Arc<dyn Fn(&ArraySplice) + Send + Sync>;

#[derive(Default)]
struct ArrayState {
    items: Vec<Value>,
    listeners: SmallVec<[(ListenerId, ArrayListener); 2]>,
}

struct ArrayCell {
    id: ObjectId,
    state: Mutex<ArrayState>,
}

/// Shared handle to an array.
#[derive(Clone)]
pub struct ArrayRef(Arc<ArrayCell>);

/// Non-owning handle to an array.
#[derive(Clone)]
pub struct WeakArrayRef(Weak<ArrayCell>);

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Arc::new(ArrayCell {
            id: ObjectId::new(),
            state: Mutex::new(ArrayState {
                items,
                listeners: SmallVec::new(),
            }),
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakArrayRef {
        WeakArrayRef(Arc::downgrade(&self.0))
    }

    pub fn len(&self) -> usize {
        self.0.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, `undefined` when out of bounds.
    pub fn get(&self, index: usize) -> Value {
        self.0.state.lock().items.get(index).cloned().unwrap_or_default()
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.state.lock().items.clone()
    }

    /// Position of the first strictly equal element.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.0.state.lock().items.iter().position(|item| item.strict_eq(value))
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.index_of(value).is_some()
    }

    /// Write an element, growing the array with `undefined` as needed.
    ///
    /// Fails with [`BindingError::InvalidArrayLength`] when the array would
    /// grow to [`MAX_LENGTH`] or more, or the growth cannot be allocated.
    pub fn set(&self, index: usize, value: Value) -> Result<()> {
        if index >= MAX_LENGTH {
            return Err(BindingError::InvalidArrayLength);
        }
        let splice = {
            let mut state = self.0.state.lock();
            if index >= state.items.len() {
                let added = index + 1 - state.items.len();
                let start = state.items.len();
                state
                    .items
                    .try_reserve(added)
                    .map_err(|_| BindingError::InvalidArrayLength)?;
                state.items.resize(index + 1, Value::Undefined);
                state.items[index] = value;
                ArraySplice {
                    index: start,
                    removed: Vec::new(),
                    added_count: added,
                }
            } else {
                let old = std::mem::replace(&mut state.items[index], value);
                ArraySplice {
                    index,
                    removed: vec![old],
                    added_count: 1,
                }
            }
        };
        self.notify(&splice);
        Ok(())
    }

    pub fn push(&self, value: Value) {
        let splice = {
            let mut state = self.0.state.lock();
            state.items.push(value);
            ArraySplice {
                index: state.items.len() - 1,
                removed: Vec::new(),
                added_count: 1,
            }
        };
        self.notify(&splice);
    }

    /// Remove `delete_count` elements at `index` and insert `items` there.
    ///
    /// Returns the removed elements.
    pub fn splice(&self, index: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let splice = {
            let mut state = self.0.state.lock();
            let start = index.min(state.items.len());
            let end = (start + delete_count).min(state.items.len());
            let added_count = items.len();
            let removed: Vec<Value> = state.items.splice(start..end, items).collect();
            ArraySplice {
                index: start,
                removed,
                added_count,
            }
        };
        let removed = splice.removed.clone();
        self.notify(&splice);
        removed
    }

    /// Replace every element.
    pub fn replace(&self, items: Vec<Value>) {
        let len = self.len();
        self.splice(0, len, items);
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    /// Register a mutation listener.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ArraySplice) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.0.state.lock().listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.0.state.lock().listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    fn notify(&self, splice: &ArraySplice) {
        let listeners: SmallVec<[ArrayListener; 2]> =
            self.0.state.lock().listeners.iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(splice);
        }
    }
}

impl WeakArrayRef {
    pub fn upgrade(&self) -> Option<ArrayRef> {
        self.0.upgrade().map(ArrayRef)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec().iter()).finish()
    }
}

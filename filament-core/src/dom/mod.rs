//! Minimal DOM
//!
//! Element observers need somewhere to read and write: element properties,
//! (namespaced) attributes, inline style text, child options, DOM events and
//! child-list mutations. This module provides exactly that surface as an
//! in-memory element tree. A browser-backed host implements the same
//! handles over real nodes.

mod event;

pub use event::{ElementHandler, EventHandler};

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::value::{ListenerId, ObjectId, Value};

/// Namespace of `xlink:` attributes.
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

type EventListener = Arc<dyn Fn(&str) + Send + Sync>;
type MutationListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ElementState {
    properties: IndexMap<String, Value>,
    attributes: IndexMap<(Option<String>, String), String>,
    css_text: String,
    children: Vec<ElementRef>,
    event_listeners: Vec<(ListenerId, String, EventListener)>,
    child_list_listeners: SmallVec<[(ListenerId, MutationListener); 1]>,
}

struct ElementCell {
    id: ObjectId,
    tag_name: String,
    svg: bool,
    state: Mutex<ElementState>,
}

/// Shared handle to an element.
#[derive(Clone)]
pub struct ElementRef(Arc<ElementCell>);

/// Non-owning handle to an element.
#[derive(Clone)]
pub struct WeakElementRef(Weak<ElementCell>);

impl WeakElementRef {
    pub fn upgrade(&self) -> Option<ElementRef> {
        self.0.upgrade().map(ElementRef)
    }
}

impl ElementRef {
    /// Create an HTML element.
    pub fn new(tag_name: &str) -> Self {
        Self::create(tag_name, false)
    }

    /// Create an SVG element.
    pub fn new_svg(tag_name: &str) -> Self {
        Self::create(tag_name, true)
    }

    /// Create an `<option>` with a native value.
    pub fn option(value: &str) -> Self {
        let option = Self::new("option");
        option.set_property("value", value.into());
        option.set_property("selected", false.into());
        option
    }

    fn create(tag_name: &str, svg: bool) -> Self {
        Self(Arc::new(ElementCell {
            id: ObjectId::new(),
            tag_name: tag_name.to_ascii_lowercase(),
            svg,
            state: Mutex::new(ElementState::default()),
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn tag_name(&self) -> &str {
        &self.0.tag_name
    }

    pub fn is_svg(&self) -> bool {
        self.0.svg
    }

    pub fn ptr_eq(&self, other: &ElementRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakElementRef {
        WeakElementRef(Arc::downgrade(&self.0))
    }

    pub fn is_select(&self) -> bool {
        self.0.tag_name == "select"
    }

    /// Whether a `<select>` allows several selected options.
    pub fn is_multiple(&self) -> bool {
        self.get_property("multiple").is_truthy()
    }

    pub fn get_property(&self, name: &str) -> Value {
        self.0.state.lock().properties.get(name).cloned().unwrap_or_default()
    }

    pub fn set_property(&self, name: &str, value: Value) {
        self.0.state.lock().properties.insert(name.to_string(), value);
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.0.state.lock().properties.contains_key(name)
    }

    /// Attribute value, or `null` when absent.
    pub fn get_attribute(&self, name: &str) -> Value {
        self.get_attribute_ns(None, name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.set_attribute_ns(None, name, value);
    }

    pub fn get_attribute_ns(&self, namespace: Option<&str>, name: &str) -> Value {
        let key = (namespace.map(str::to_string), name.to_string());
        self.0
            .state
            .lock()
            .attributes
            .get(&key)
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null)
    }

    pub fn set_attribute_ns(&self, namespace: Option<&str>, name: &str, value: &str) {
        let key = (namespace.map(str::to_string), name.to_string());
        self.0.state.lock().attributes.insert(key, value.to_string());
    }

    pub fn remove_attribute_ns(&self, namespace: Option<&str>, name: &str) {
        let key = (namespace.map(str::to_string), name.to_string());
        self.0.state.lock().attributes.shift_remove(&key);
    }

    /// Inline style text.
    pub fn css_text(&self) -> String {
        self.0.state.lock().css_text.clone()
    }

    pub fn set_css_text(&self, text: &str) {
        self.0.state.lock().css_text = text.to_string();
    }

    pub fn children(&self) -> Vec<ElementRef> {
        self.0.state.lock().children.clone()
    }

    /// Append a child and notify child-list observers.
    pub fn append_child(&self, child: ElementRef) {
        self.0.state.lock().children.push(child);
        self.notify_child_list();
    }

    /// Remove a child and notify child-list observers.
    pub fn remove_child(&self, child: &ElementRef) -> bool {
        let removed = {
            let mut state = self.0.state.lock();
            let before = state.children.len();
            state.children.retain(|c| !c.ptr_eq(child));
            before != state.children.len()
        };
        if removed {
            self.notify_child_list();
        }
        removed
    }

    /// `<option>` children, in document order.
    pub fn options(&self) -> Vec<ElementRef> {
        self.children()
            .into_iter()
            .filter(|c| c.tag_name() == "option")
            .collect()
    }

    /// The options currently marked selected.
    pub fn selected_options(&self) -> Vec<ElementRef> {
        self.options()
            .into_iter()
            .filter(|o| o.get_property("selected").is_truthy())
            .collect()
    }

    /// Select the option at `index` the way a user would.
    ///
    /// A single select deselects every other option. The caller dispatches
    /// the `change` event.
    pub fn select_option(&self, index: usize, selected: bool) {
        let options = self.options();
        if !self.is_multiple() && selected {
            for option in &options {
                option.set_property("selected", false.into());
            }
        }
        if let Some(option) = options.get(index) {
            option.set_property("selected", selected.into());
        }
    }

    pub fn add_event_listener<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.0
            .state
            .lock()
            .event_listeners
            .push((id, event.to_string(), Arc::new(listener)));
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) {
        self.0.state.lock().event_listeners.retain(|(l, _, _)| *l != id);
    }

    /// Run every listener registered for `event`.
    pub fn dispatch_event(&self, event: &str) {
        let listeners: Vec<EventListener> = self
            .0
            .state
            .lock()
            .event_listeners
            .iter()
            .filter(|(_, name, _)| name == event)
            .map(|(_, _, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Watch for children being added or removed.
    pub fn observe_child_list<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.0.state.lock().child_list_listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn disconnect_child_list(&self, id: ListenerId) {
        self.0.state.lock().child_list_listeners.retain(|(l, _)| *l != id);
    }

    fn notify_child_list(&self) {
        let listeners: SmallVec<[MutationListener; 1]> = self
            .0
            .state
            .lock()
            .child_list_listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} #{}>", self.0.tag_name, self.0.id.raw())
    }
}

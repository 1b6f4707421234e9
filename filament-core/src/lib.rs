//! Filament Core
//!
//! This crate provides the data-binding core of the Filament view framework.
//! It implements:
//!
//! - Binding expressions: evaluation, assignment and a canonical printer
//! - Observation of objects, arrays and DOM element properties
//! - Dependency tracking through composite observers
//! - Property bindings with a frame-budgeted connect queue
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: Dynamic values (objects, arrays, host functions)
//! - `scope`: Binding and override contexts expressions evaluate against
//! - `expression`: Expression trees, value converters and the connect protocol
//! - `observation`: Observers and the observer locator
//! - `binding`: Property bindings, the connect queue and the binding engine
//! - `dom`: The minimal element model bindings target
//! - `task_queue`: Microtask and animation-frame scheduling
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::binding::{BindingEngine, BindingMode};
//! use filament_core::dom::ElementRef;
//! use filament_core::expression::Expression;
//! use filament_core::scope::Scope;
//! use filament_core::value::ObjectRef;
//!
//! let engine = BindingEngine::default();
//! let vm = ObjectRef::from_pairs([("name", "Ada")]);
//!
//! // `value` of an input follows `name`, both ways
//! let input = ElementRef::new("input");
//! let binding = engine
//!     .create_binding_expression("value", Expression::access_scope("name"), BindingMode::TwoWay)
//!     .create_binding(&input);
//! binding.bind(&Scope::new(vm.clone()))?;
//!
//! vm.set("name", "Grace".into());
//! engine.task_queue().flush_micro_task_queue();
//! // input.value is now "Grace"
//! ```

pub mod binding;
pub mod config;
pub mod dom;
pub mod error;
pub mod expression;
pub mod observation;
pub mod scope;
pub mod task_queue;
pub mod value;

pub use binding::{BindingEngine, BindingMode, PropertyBinding};
pub use config::BindingConfig;
pub use error::{BindingError, Result};
pub use expression::Expression;
pub use observation::{Observer, ObserverLocator};
pub use scope::Scope;
pub use task_queue::TaskQueue;
pub use value::Value;

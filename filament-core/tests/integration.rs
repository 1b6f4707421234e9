//! Integration Tests for Bindings
//!
//! These tests verify that the binding engine, the connect queue and the
//! observers work together the way a view uses them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use filament_core::binding::{BindingEngine, BindingMode, PropertyBinding};
use filament_core::config::{BindingConfig, ObservationStrategy};
use filament_core::dom::ElementRef;
use filament_core::expression::Expression;
use filament_core::observation::callback;
use filament_core::scope::Scope;
use filament_core::value::{ArrayRef, ObjectRef, Value};

fn foo_source() -> (ObjectRef, Scope) {
    let vm = ObjectRef::from_pairs([("foo", "bar")]);
    let scope = Scope::new(vm.clone());
    (vm, scope)
}

fn bind_inputs(
    engine: &BindingEngine,
    scope: &Scope,
    mode: BindingMode,
    count: usize,
) -> Vec<(ElementRef, Arc<PropertyBinding>)> {
    let expression = engine.create_binding_expression("value", Expression::access_scope("foo"), mode);
    (0..count)
        .map(|_| {
            let target = ElementRef::new("input");
            let binding = expression.create_binding(&target);
            binding.bind(scope).unwrap();
            assert_eq!(target.get_property("value"), Value::from("bar"));
            (target, binding)
        })
        .collect()
}

fn values(targets: &[(ElementRef, Arc<PropertyBinding>)]) -> Vec<Value> {
    targets.iter().map(|(target, _)| target.get_property("value")).collect()
}

/// Test that two-way bindings connect immediately, past the queue threshold.
#[test]
fn two_way_bindings_connect_immediately() {
    let engine = BindingEngine::default();
    let (vm, scope) = foo_source();
    let targets = bind_inputs(&engine, &scope, BindingMode::TwoWay, 101);
    assert_eq!(engine.connect_queue().size(), 0);

    vm.set("foo", "baz".into());
    engine.task_queue().flush_micro_task_queue();

    assert!(values(&targets).iter().all(|v| *v == Value::from("baz")));
}

/// Test that a binding unbound while its connect is queued never updates.
#[test]
fn bindings_unbound_before_the_queue_flushes_stay_put() {
    let engine = BindingEngine::default();
    let (vm, scope) = foo_source();
    let _others = bind_inputs(&engine, &scope, BindingMode::ToView, 100);
    let (target, binding) = bind_inputs(&engine, &scope, BindingMode::ToView, 1).remove(0);
    assert_eq!(engine.connect_queue().size(), 1);

    vm.set("foo", "baz".into());
    binding.unbind();
    engine.task_queue().flush_micro_task_queue();
    engine.task_queue().run_animation_frame();

    assert_eq!(target.get_property("value"), Value::from("bar"));
    assert_eq!(engine.connect_queue().size(), 0);
}

/// Test that the connect past the threshold waits for an animation frame.
#[test]
fn connects_the_threshold_immediately_and_queues_the_rest() {
    let engine = BindingEngine::default();
    let (vm, scope) = foo_source();
    let targets = bind_inputs(&engine, &scope, BindingMode::ToView, 101);

    vm.set("foo", "baz".into());
    engine.task_queue().flush_micro_task_queue();

    let current = values(&targets);
    assert!(current[..100].iter().all(|v| *v == Value::from("baz")));
    assert_eq!(current[100], Value::from("bar"));

    engine.task_queue().run_animation_frame();
    assert_eq!(engine.connect_queue().size(), 0);
    assert_eq!(targets[100].0.get_property("value"), Value::from("baz"));
}

/// Test that raising the threshold connects more bindings right away.
#[test]
fn a_higher_threshold_connects_more_bindings() {
    let engine = BindingEngine::default();
    engine.connect_queue().set_threshold(150);
    let (vm, scope) = foo_source();
    let targets = bind_inputs(&engine, &scope, BindingMode::ToView, 151);

    vm.set("foo", "baz".into());
    engine.task_queue().flush_micro_task_queue();

    let current = values(&targets);
    assert!(current[..150].iter().all(|v| *v == Value::from("baz")));
    assert_eq!(current[150], Value::from("bar"));

    engine.task_queue().run_animation_frame();
    assert_eq!(engine.connect_queue().size(), 0);
    assert_eq!(targets[150].0.get_property("value"), Value::from("baz"));
}

/// Test that a disabled queue connects every binding immediately.
#[test]
fn a_disabled_queue_connects_everything() {
    let engine = BindingEngine::default();
    engine.connect_queue().disable();
    let (vm, scope) = foo_source();
    let targets = bind_inputs(&engine, &scope, BindingMode::ToView, 200);

    vm.set("foo", "baz".into());
    engine.task_queue().flush_micro_task_queue();

    assert!(values(&targets).iter().all(|v| *v == Value::from("baz")));
    assert_eq!(engine.connect_queue().size(), 0);
}

/// Test that the threshold comes from configuration.
#[test]
fn threshold_is_configurable() {
    let config = BindingConfig::from_json(r#"{ "connect_queue_threshold": 3 }"#).unwrap();
    let engine = BindingEngine::new(config);
    let (_, scope) = foo_source();
    bind_inputs(&engine, &scope, BindingMode::ToView, 5);
    assert_eq!(engine.connect_queue().size(), 2);
}

fn multi_select(models: &[i32]) -> ElementRef {
    let select = ElementRef::new("select");
    select.set_property("multiple", true.into());
    for model in models {
        let option = ElementRef::option(&model.to_string());
        option.set_property("model", Value::from(*model));
        select.append_child(option);
    }
    select
}

fn selected(select: &ElementRef) -> Vec<bool> {
    select
        .options()
        .iter()
        .map(|option| option.get_property("selected").is_truthy())
        .collect()
}

/// Test that a multi-select follows mutations of the bound array.
#[test]
fn multi_select_follows_array_mutations() {
    let engine = BindingEngine::default();
    let chosen = ArrayRef::new(vec![1.into(), 2.into()]);
    let vm = ObjectRef::from_pairs([("chosen", Value::from(chosen.clone()))]);
    let select = multi_select(&[1, 2, 3]);

    let binding = engine
        .create_binding_expression("value", Expression::access_scope("chosen"), BindingMode::TwoWay)
        .create_binding(&select);
    binding.bind(&Scope::new(vm.clone())).unwrap();
    assert_eq!(selected(&select), vec![true, true, false]);

    chosen.replace(vec![3.into()]);
    engine.task_queue().flush_micro_task_queue();
    assert_eq!(selected(&select), vec![false, false, true]);
}

/// Test that picking options writes a fresh array back to the source.
#[test]
fn multi_select_writes_the_selection_back() {
    let engine = BindingEngine::default();
    let vm = ObjectRef::from_pairs([("chosen", Value::from(vec![Value::from(1)]))]);
    let select = multi_select(&[1, 2, 3]);

    let binding = engine
        .create_binding_expression("value", Expression::access_scope("chosen"), BindingMode::TwoWay)
        .create_binding(&select);
    binding.bind(&Scope::new(vm.clone())).unwrap();

    select.select_option(2, true);
    select.dispatch_event("change");

    let chosen = vm.get("chosen");
    let chosen = chosen.as_array().unwrap();
    assert_eq!(chosen.to_vec(), vec![Value::from(1), Value::from(3)]);
}

/// Test that a multi-select rejects values that are not arrays.
#[test]
fn multi_select_rejects_scalars() {
    let engine = BindingEngine::default();
    let vm = ObjectRef::from_pairs([("chosen", 1)]);
    let select = multi_select(&[1, 2]);

    let binding = engine
        .create_binding_expression("value", Expression::access_scope("chosen"), BindingMode::ToView)
        .create_binding(&select);
    let error = binding.bind(&Scope::new(vm)).unwrap_err();
    assert_eq!(error.to_string(), "Only null or Array instances can be bound to a multi-select.");
    assert!(!binding.is_bound());
}

/// Test that a conditional binding only reacts to the branch it shows.
#[test]
fn conditional_binding_ignores_the_hidden_branch() {
    let engine = BindingEngine::default();
    let vm = ObjectRef::from_pairs([
        ("editing", Value::from(false)),
        ("draft", Value::from("draft")),
        ("saved", Value::from("saved")),
    ]);
    let expression = Expression::conditional(
        Expression::access_scope("editing"),
        Expression::access_scope("draft"),
        Expression::access_scope("saved"),
    );
    let target = ElementRef::new("span");
    let binding = engine
        .create_binding_expression("textContent", expression, BindingMode::ToView)
        .create_binding(&target);
    binding.bind(&Scope::new(vm.clone())).unwrap();
    assert_eq!(target.get_property("textContent"), Value::from("saved"));

    let writes = Arc::new(AtomicUsize::new(0));
    let counter = writes.clone();
    let _watch = engine
        .expression_observer(&Scope::new(vm.clone()), &binding.source_expression().clone())
        .unwrap()
        .observer
        .unwrap()
        .subscribe(callback(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    vm.set("draft", "edited".into());
    engine.task_queue().flush_micro_task_queue();
    assert_eq!(writes.load(Ordering::SeqCst), 0);
    assert_eq!(target.get_property("textContent"), Value::from("saved"));

    vm.set("editing", true.into());
    engine.task_queue().flush_micro_task_queue();
    assert_eq!(writes.load(Ordering::SeqCst), 1);
    assert_eq!(target.get_property("textContent"), Value::from("edited"));
}

/// Test that bindings work the same with setter-based observation.
#[test]
fn setter_strategy_updates_bindings() {
    let config = BindingConfig {
        observation_strategy: ObservationStrategy::Setter,
        ..BindingConfig::default()
    };
    let engine = BindingEngine::new(config);
    let (vm, scope) = foo_source();
    let targets = bind_inputs(&engine, &scope, BindingMode::TwoWay, 3);

    vm.set("foo", "baz".into());
    vm.set("foo", "qux".into());
    engine.task_queue().flush_micro_task_queue();
    assert!(values(&targets).iter().all(|v| *v == Value::from("qux")));

    targets[0].0.set_property("value", "typed".into());
    targets[0].0.dispatch_event("input");
    engine.task_queue().flush_micro_task_queue();
    assert_eq!(vm.get("foo"), Value::from("typed"));
    assert!(values(&targets).iter().all(|v| *v == Value::from("typed")));
}

/// Test that a property defined after subscribing is delivered once.
#[test]
fn late_defined_properties_notify_once() {
    let engine = BindingEngine::default();
    let vm = ObjectRef::new();
    let target = ElementRef::new("input");
    let binding = engine
        .create_binding_expression("value", Expression::access_scope("later"), BindingMode::ToView)
        .create_binding(&target);
    binding.bind(&Scope::new(vm.clone())).unwrap();
    assert_eq!(target.get_property("value"), Value::Undefined);

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _subscription = engine
        .property_observer(&Value::Object(vm.clone()), "later")
        .unwrap()
        .subscribe(callback(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    vm.set("later", "now".into());
    engine.task_queue().flush_micro_task_queue();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(target.get_property("value"), Value::from("now"));

    vm.set("later", "again".into());
    engine.task_queue().flush_micro_task_queue();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(target.get_property("value"), Value::from("again"));
}

//! 组件容器端到端测试

use anyhow::Result;
use di_abstractions::{
    any_qualifier, default_qualifier, named, ComponentDefinition, ObserverEntry, Qualifier,
    QualifierMarker, RawType, ScopeMarker, TypeDescriptor,
};
use di_impl::{ContainerConfig, DiContainer};
use infrastructure_common::{init_logging, DependencyError, LoggingConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

fn init_test_logging() {
    INIT.call_once(|| {
        let _ = init_logging(&LoggingConfig::development().with_directive("di_impl=debug"));
    });
}

#[derive(Debug)]
struct Foo(&'static str);

struct Bar;

fn foo(id: &str, label: &'static str) -> di_abstractions::DefinitionBuilder<Foo> {
    ComponentDefinition::builder::<Foo>(id).factory(move |_| Ok(Foo(label)))
}

#[test]
fn test_default_and_named_scenario() -> Result<()> {
    init_test_logging();
    let container = DiContainer::builder()
        .register(foo("a", "A").qualifier(default_qualifier()).build()?)
        .register(foo("b", "B").named("x").build()?)
        .build()?;

    assert_eq!(container.get_qualified::<Foo>(&[default_qualifier()])?.0, "A");
    assert_eq!(container.get_qualified::<Foo>(&[named("x")])?.0, "B");
    assert_eq!(container.get::<Foo>()?.0, "A");

    // 两组限定符的并集同时匹配两个定义
    let err = container
        .get_qualified::<Foo>(&[default_qualifier(), named("x")])
        .unwrap_err();
    assert!(err.is_ambiguous());
    Ok(())
}

#[test]
fn test_equal_priority_ambiguity_names_both() -> Result<()> {
    init_test_logging();
    let bar = |id: &str| {
        ComponentDefinition::builder::<Bar>(id)
            .qualifier(default_qualifier())
            .priority(1)
            .factory(|_| Ok(Bar))
            .build()
    };
    let container = DiContainer::builder()
        .register(bar("C")?)
        .register(bar("D")?)
        .build()?;

    match container.get_qualified::<Bar>(&[default_qualifier()]) {
        Err(DependencyError::AmbiguousResolution { candidates, .. }) => {
            assert_eq!(candidates, vec!["C".to_string(), "D".to_string()]);
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn test_resolved_component_satisfies_query() -> Result<()> {
    init_test_logging();
    let region = QualifierMarker::builder("Region").member("value", None).build();
    let east = Qualifier::new(region.clone()).with("value", "east");
    let west = Qualifier::new(region).with("value", "west");

    let container = DiContainer::builder()
        .register(foo("east", "east").qualifier(east.clone()).build()?)
        .register(foo("west", "west").qualifier(west.clone()).build()?)
        .build()?;

    for (qualifier, label) in [(east, "east"), (west, "west")] {
        let reference = container.resolve(&TypeDescriptor::of::<Foo>(), &[qualifier.clone()])?;
        assert!(reference.definition().has_type(&TypeDescriptor::of::<Foo>()));
        assert!(reference.definition().matches_qualifiers(&[qualifier]));
        assert_eq!(reference.get::<Foo>()?.0, label);
    }
    assert!(container.get::<Foo>().unwrap_err().is_unsatisfied());
    assert_eq!(
        container
            .resolve_all(&TypeDescriptor::of::<Foo>(), &[any_qualifier()])?
            .len(),
        2
    );
    Ok(())
}

#[test]
fn test_scope_identity_round_trip() -> Result<()> {
    init_test_logging();
    let container = DiContainer::builder()
        .register(
            foo("shared", "shared")
                .scope(ScopeMarker::application())
                .build()?,
        )
        .register(
            ComponentDefinition::builder::<Bar>("fresh")
                .factory(|_| Ok(Bar))
                .build()?,
        )
        .build()?;

    assert!(Arc::ptr_eq(&container.get::<Foo>()?, &container.get::<Foo>()?));
    assert!(!Arc::ptr_eq(&container.get::<Bar>()?, &container.get::<Bar>()?));
    Ok(())
}

struct Base;

#[test]
fn test_event_reaches_ancestor_observer_once() -> Result<()> {
    init_test_logging();
    struct Sub;

    let base = RawType::builder_of::<Base>().build();
    let sub = RawType::builder_of::<Sub>()
        .extends(TypeDescriptor::class(base.clone()))
        .build();

    let unqualified = Arc::new(AtomicUsize::new(0));
    let qualified = Arc::new(AtomicUsize::new(0));
    let (u, q) = (unqualified.clone(), qualified.clone());

    let container = DiContainer::builder()
        .declare_type(sub)
        .observer(ObserverEntry::new(
            "on_base",
            TypeDescriptor::class(base.clone()),
            Vec::new(),
            move |_| {
                u.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ))
        .observer(ObserverEntry::new(
            "on_audit_base",
            TypeDescriptor::class(base),
            vec![named("audit")],
            move |_| {
                q.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ))
        .build()?;

    assert_eq!(container.fire_event(Sub, &[])?, 1);
    assert_eq!(unqualified.load(Ordering::SeqCst), 1);
    assert_eq!(qualified.load(Ordering::SeqCst), 0);

    assert_eq!(container.fire_event(Sub, &[named("audit")])?, 2);
    assert_eq!(unqualified.load(Ordering::SeqCst), 2);
    assert_eq!(qualified.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_configured_alternative_replaces_default() -> Result<()> {
    init_test_logging();
    let config = ContainerConfig::default().enable_alternative("mock_foo", 10);
    let container = DiContainer::builder()
        .with_config(config)
        .register(foo("real_foo", "real").build()?)
        .register(foo("mock_foo", "mock").alternative().build()?)
        .register(foo("other_mock", "other").alternative().build()?)
        .build()?;

    assert_eq!(container.get::<Foo>()?.0, "mock");
    let labels: Vec<&'static str> = container
        .resolve_all(&TypeDescriptor::of::<Foo>(), &[])?
        .iter()
        .map(|r| r.get::<Foo>().map(|f| f.0))
        .collect::<Result<_, _>>()?;
    assert_eq!(labels, vec!["mock", "real"]);
    Ok(())
}

#[test]
fn test_lifecycle_events_fire() -> Result<()> {
    init_test_logging();
    let initialized = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    let (i, s) = (initialized.clone(), stopped.clone());

    let container = DiContainer::builder()
        .register(foo("a", "A").build()?)
        .observer(ObserverEntry::typed::<di_abstractions::ContainerInitialized, _>(
            "on_init",
            Vec::new(),
            move |event| {
                i.fetch_add(event.definitions, Ordering::SeqCst);
                Ok(())
            },
        ))
        .observer(ObserverEntry::typed::<di_abstractions::ContainerShutdown, _>(
            "on_shutdown",
            Vec::new(),
            move |_| {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ))
        .build()?;

    assert_eq!(initialized.load(Ordering::SeqCst), 1);
    container.shutdown();
    container.shutdown();
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert!(matches!(
        container.fire_event(Bar, &[]),
        Err(DependencyError::ContainerClosed)
    ));
    Ok(())
}

struct Expensive;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_singleton_constructed_once() -> Result<()> {
    init_test_logging();
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let container = DiContainer::builder()
        .register(
            ComponentDefinition::builder::<Expensive>("expensive")
                .scope(ScopeMarker::singleton())
                .factory(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    Ok(Expensive)
                })
                .build()?,
        )
        .build()?;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let container = container.clone();
        handles.push(tokio::task::spawn_blocking(move || container.get::<Expensive>()));
    }

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await??);
    }
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    Ok(())
}

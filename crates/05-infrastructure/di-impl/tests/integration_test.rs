//! 依赖注入实现的集成测试

use di_abstractions::{
    ComponentDefinition, Reference, ScopeKind, ScopeMarker, StoreKey, TypeDescriptor,
};
use di_impl::{DiContainer, MapScopeStore};
use infrastructure_common::DependencyError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, OnceLock};
use std::time::Duration;

type Log = Arc<Mutex<Vec<&'static str>>>;

struct Dep;

struct Holder {
    _dep: Arc<Dep>,
}

fn logging_definitions(log: &Log) -> (Arc<ComponentDefinition>, Arc<ComponentDefinition>) {
    let dep_log = log.clone();
    let holder_log = log.clone();
    let dep = ComponentDefinition::builder::<Dep>("dep")
        .factory(|_| Ok(Dep))
        .pre_destroy(move |_| {
            dep_log.lock().push("dep");
            Ok(())
        })
        .build()
        .unwrap();
    let holder = ComponentDefinition::builder::<Holder>("holder")
        .depends_on(TypeDescriptor::of::<Dep>(), Vec::new())
        .factory(|ctx| {
            Ok(Holder {
                _dep: ctx.resolve_instance::<Dep>(&[])?,
            })
        })
        .pre_destroy(move |_| {
            holder_log.lock().push("holder");
            Ok(())
        })
        .build()
        .unwrap();
    (dep, holder)
}

#[test]
fn test_release_destroys_dependents_in_reverse_order_once() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let (dep, holder) = logging_definitions(&log);
    let container = DiContainer::builder()
        .register(dep)
        .register(holder)
        .build()
        .unwrap();

    let ctx = container.create_creational_context(None);
    let reference = container
        .resolve_in(&TypeDescriptor::of::<Holder>(), &[], &ctx)
        .unwrap();
    assert!(reference.get::<Holder>().is_ok());
    assert_eq!(ctx.live_count(), 2);

    container.release(&ctx);
    assert_eq!(*log.lock(), vec!["holder", "dep"]);
    assert_eq!(ctx.live_count(), 0);

    // 重复释放不做任何事
    container.release(&ctx);
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn test_remove_single_instance_before_release() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let (dep, holder) = logging_definitions(&log);
    let container = DiContainer::builder()
        .register(dep)
        .register(holder)
        .build()
        .unwrap();

    let ctx = container.create_creational_context(None);
    let instance = container
        .resolve_in(&TypeDescriptor::of::<Holder>(), &[], &ctx)
        .unwrap()
        .instance()
        .unwrap();
    assert!(ctx.remove(&instance).unwrap());
    assert_eq!(*log.lock(), vec!["holder"]);

    container.release(&ctx);
    assert_eq!(*log.lock(), vec!["holder", "dep"]);
}

#[test]
fn test_singleton_survives_release_until_shutdown() {
    struct Pool;
    let destroyed = Arc::new(AtomicUsize::new(0));
    let hook = destroyed.clone();
    let container = DiContainer::builder()
        .register(
            ComponentDefinition::builder::<Pool>("pool")
                .scope(ScopeMarker::singleton())
                .factory(|_| Ok(Pool))
                .pre_destroy(move |_| {
                    hook.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let ctx = container.create_creational_context(None);
    let first = container
        .resolve_in(&TypeDescriptor::of::<Pool>(), &[], &ctx)
        .unwrap()
        .get::<Pool>()
        .unwrap();
    container.release(&ctx);
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    let second = container.get::<Pool>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    container.shutdown();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

struct Left {
    right: OnceLock<Arc<Right>>,
}

struct Right {
    left: OnceLock<Arc<Left>>,
}

#[test]
fn test_injection_cycle_reuses_produced_instance() {
    let container = DiContainer::builder()
        .register(
            ComponentDefinition::builder::<Left>("left")
                .factory(|_| {
                    Ok(Left {
                        right: OnceLock::new(),
                    })
                })
                .inject(|left, ctx| {
                    let _ = left.right.set(ctx.resolve_instance::<Right>(&[])?);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .register(
            ComponentDefinition::builder::<Right>("right")
                .factory(|_| {
                    Ok(Right {
                        left: OnceLock::new(),
                    })
                })
                .inject(|right, ctx| {
                    let _ = right.left.set(ctx.resolve_instance::<Left>(&[])?);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let left = container.get::<Left>().unwrap();
    let right = left.right.get().expect("right injected");
    let back = right.left.get().expect("left injected");
    assert!(Arc::ptr_eq(&left, back));
}

#[derive(Debug)]
struct Chicken;

#[derive(Debug)]
struct Egg;

fn construction_cycle(scope: ScopeMarker) -> DiContainer {
    DiContainer::builder()
        .register(
            ComponentDefinition::builder::<Chicken>("chicken")
                .scope(scope.clone())
                .factory(|ctx| {
                    ctx.resolve_instance::<Egg>(&[])?;
                    Ok(Chicken)
                })
                .build()
                .unwrap(),
        )
        .register(
            ComponentDefinition::builder::<Egg>("egg")
                .scope(scope)
                .factory(|ctx| {
                    ctx.resolve_instance::<Chicken>(&[])?;
                    Ok(Egg)
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn circular_chain(err: &DependencyError) -> Option<&str> {
    match err {
        DependencyError::CircularConstruction { dependency_chain } => Some(dependency_chain),
        _ => None,
    }
}

#[test]
fn test_dependent_construction_cycle_fails() {
    let container = construction_cycle(ScopeMarker::dependent());
    let err = container.get::<Chicken>().unwrap_err();
    assert_eq!(circular_chain(&err), Some("chicken -> egg -> chicken"));
}

#[test]
fn test_singleton_construction_cycle_fails_without_deadlock() {
    let container = construction_cycle(ScopeMarker::singleton());
    let err = container.get::<Chicken>().unwrap_err();
    assert_eq!(circular_chain(&err), Some("chicken -> egg -> chicken"));
    assert_eq!(container.stats().live_singletons, 0);
}

struct Session {
    id: usize,
}

struct Service {
    session: Reference,
}

#[test]
fn test_normal_scope_resolves_through_proxy() {
    let store = Arc::new(MapScopeStore::new());
    let created = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let hook = destroyed.clone();

    let container = DiContainer::builder()
        .scope(ScopeMarker::normal("Request"), store.clone())
        .register(
            ComponentDefinition::builder::<Session>("session")
                .scope(ScopeMarker::normal("Request"))
                .factory(move |_| {
                    Ok(Session {
                        id: counter.fetch_add(1, Ordering::SeqCst),
                    })
                })
                .pre_destroy(move |_| {
                    hook.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .register(
            ComponentDefinition::builder::<Service>("service")
                .scope(ScopeMarker::singleton())
                .factory(|ctx| {
                    Ok(Service {
                        session: ctx.resolve(&TypeDescriptor::of::<Session>(), &[])?,
                    })
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    // 作用域未激活时无法解析
    assert!(matches!(
        container.get::<Service>(),
        Err(DependencyError::ScopeNotActive { .. })
    ));

    let first = store.begin("r1");
    let service = container.get::<Service>().unwrap();
    assert!(service.session.is_proxy());
    let a = service.session.get::<Session>().unwrap();
    let again = service.session.get::<Session>().unwrap();
    assert!(Arc::ptr_eq(&a, &again));

    store.begin("r2");
    let b = service.session.get::<Session>().unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(created.load(Ordering::SeqCst), 2);

    assert_eq!(container.end_scope(&ScopeMarker::normal("Request"), &first).unwrap(), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    store.end();
    assert!(matches!(
        service.session.get::<Session>(),
        Err(DependencyError::ScopeNotActive { .. })
    ));

    store.begin(StoreKey::from("r3"));
    container.shutdown();
    assert!(matches!(
        service.session.get::<Session>(),
        Err(DependencyError::ContainerClosed)
    ));
    // 根容器关闭时结束全部普通作用域
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
}

struct Settings;

struct Greeting(&'static str);

#[test]
fn test_child_container_shares_parent_singletons() {
    let parent = DiContainer::builder()
        .register(
            ComponentDefinition::builder::<Settings>("settings")
                .scope(ScopeMarker::singleton())
                .factory(|_| Ok(Settings))
                .build()
                .unwrap(),
        )
        .register(
            ComponentDefinition::builder::<Greeting>("parent_greeting")
                .factory(|_| Ok(Greeting("parent")))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let child = parent
        .child()
        .register(
            ComponentDefinition::builder::<Greeting>("child_greeting")
                .factory(|_| Ok(Greeting("child")))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let from_parent = parent.get::<Settings>().unwrap();
    let from_child = child.get::<Settings>().unwrap();
    assert!(Arc::ptr_eq(&from_parent, &from_child));
    assert_eq!(child.get::<Greeting>().unwrap().0, "child");
    assert_eq!(parent.get::<Greeting>().unwrap().0, "parent");

    child.shutdown();
    assert!(!parent.is_closed());
    assert_eq!(parent.stats().live_singletons, 1);
}

struct Leaf;

struct Tracked;

#[test]
fn test_top_level_resolutions_do_not_accumulate() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let hook = destroyed.clone();
    let container = DiContainer::builder()
        .register(
            ComponentDefinition::builder::<Leaf>("leaf")
                .factory(|_| Ok(Leaf))
                .build()
                .unwrap(),
        )
        .register(
            ComponentDefinition::builder::<Tracked>("tracked")
                .factory(|_| Ok(Tracked))
                .pre_destroy(move |_| {
                    hook.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    for _ in 0..10_000 {
        drop(container.get::<Leaf>().unwrap());
    }
    assert_eq!(container.stats().retained_contexts, 0);

    // 带销毁器的依赖实例由容器持有到关闭
    for _ in 0..3 {
        drop(container.get::<Tracked>().unwrap());
    }
    assert_eq!(container.stats().retained_contexts, 3);
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    container.shutdown();
    assert_eq!(destroyed.load(Ordering::SeqCst), 3);
    assert_eq!(container.stats().retained_contexts, 0);
}

struct Half;

#[test]
fn test_failed_injection_leaves_nothing_to_destroy() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let hook = destroyed.clone();
    let container = DiContainer::builder()
        .register(
            ComponentDefinition::builder::<Half>("half")
                .factory(|_| Ok(Half))
                .inject(|_, _| Err(DependencyError::creation_failed("half", "注入失败")))
                .pre_destroy(move |_| {
                    hook.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let ctx = container.create_creational_context(None);
    assert!(container
        .resolve_in(&TypeDescriptor::of::<Half>(), &[], &ctx)
        .is_err());
    assert_eq!(ctx.live_count(), 0);
    assert!(container.get::<Half>().is_err());
    assert_eq!(container.stats().retained_contexts, 0);

    container.release(&ctx);
    container.shutdown();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);
}

struct Owner;

#[test]
fn test_failed_singleton_releases_its_dependents() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let (dep, _) = logging_definitions(&log);
    let owner_log = log.clone();
    let container = DiContainer::builder()
        .register(dep)
        .register(
            ComponentDefinition::builder::<Owner>("owner")
                .scope(ScopeMarker::singleton())
                .factory(|ctx| {
                    ctx.resolve_instance::<Dep>(&[])?;
                    Ok(Owner)
                })
                .inject(|_, _| Err(DependencyError::creation_failed("owner", "注入失败")))
                .pre_destroy(move |_| {
                    owner_log.lock().push("owner");
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    assert!(container.get::<Owner>().is_err());
    assert_eq!(container.stats().live_singletons, 0);
    assert_eq!(*log.lock(), vec!["dep"]);

    container.shutdown();
    assert_eq!(*log.lock(), vec!["dep"]);
}

struct Ping {
    pong: OnceLock<Arc<Pong>>,
}

struct Pong {
    ping: OnceLock<Arc<Ping>>,
}

#[test]
fn test_cross_thread_injection_cycle_between_singletons() {
    let barrier = Arc::new(Barrier::new(2));
    let (ping_barrier, pong_barrier) = (barrier.clone(), barrier);
    let container = DiContainer::builder()
        .register(
            ComponentDefinition::builder::<Ping>("ping")
                .scope(ScopeMarker::singleton())
                .factory(|_| {
                    Ok(Ping {
                        pong: OnceLock::new(),
                    })
                })
                .inject(move |ping, ctx| {
                    ping_barrier.wait();
                    let _ = ping.pong.set(ctx.resolve_instance::<Pong>(&[])?);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .register(
            ComponentDefinition::builder::<Pong>("pong")
                .scope(ScopeMarker::singleton())
                .factory(|_| {
                    Ok(Pong {
                        ping: OnceLock::new(),
                    })
                })
                .inject(move |pong, ctx| {
                    pong_barrier.wait();
                    let _ = pong.ping.set(ctx.resolve_instance::<Ping>(&[])?);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let ping_side = {
        let (container, tx) = (container.clone(), tx.clone());
        std::thread::spawn(move || tx.send(container.get::<Ping>().is_ok()))
    };
    let pong_side = {
        let container = container.clone();
        std::thread::spawn(move || tx.send(container.get::<Pong>().is_ok()))
    };

    for _ in 0..2 {
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    }
    ping_side.join().unwrap().unwrap();
    pong_side.join().unwrap().unwrap();

    let ping = container.get::<Ping>().unwrap();
    let pong = container.get::<Pong>().unwrap();
    assert!(Arc::ptr_eq(ping.pong.get().unwrap(), &pong));
    assert!(Arc::ptr_eq(pong.ping.get().unwrap(), &ping));
    assert_eq!(container.stats().live_singletons, 2);
}

struct Conversation;

#[test]
fn test_unregistered_scope_marker_fails_fast() {
    let container = DiContainer::builder().build().unwrap();
    container
        .register_definition(
            ComponentDefinition::builder::<Conversation>("conversation")
                .scope(ScopeMarker::new("Conversation", ScopeKind::Dependent))
                .factory(|_| Ok(Conversation))
                .build()
                .unwrap(),
        )
        .unwrap();

    assert!(matches!(
        container.get::<Conversation>(),
        Err(DependencyError::ScopeNotActive { .. })
    ));
}

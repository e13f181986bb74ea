//! Concurrency and memoization contracts of the reference registry.

use crate::registry::{
    LoadError, LoadFuture, Loader, ModuleHandle, ReferenceRegistry, RegistryError, StaticModule,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Loader serving one module with a single export, counting invocations and
/// recording the ids it receives.
fn counting_loader(
    loads: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    fail_first: bool,
) -> Loader<String> {
    Arc::new(move |module: &str| -> LoadFuture<String> {
        let loads = loads.clone();
        let received = received.clone();
        let module = module.to_string();
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let count = loads.fetch_add(1, Ordering::SeqCst);
            received.lock().unwrap().push(module.clone());
            if fail_first && count == 0 {
                return Err(LoadError::new("transient failure"));
            }
            let module: ModuleHandle<String> =
                Arc::new(StaticModule::new().with_export("act", format!("{}::act", module)));
            Ok(module)
        })
    })
}

fn registry_with(loader: Loader<String>) -> ReferenceRegistry<String> {
    let registry = ReferenceRegistry::new();
    assert!(registry.set_loader(loader));
    registry
}

#[tokio::test]
async fn resolve_selects_the_named_export() {
    let loads = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_loader(loads, received, false));

    let value = registry.resolve("app/actions.js#act").await.unwrap();
    assert_eq!(value, "app/actions.js::act");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolves_share_one_in_flight_load() {
    let loads = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_loader(loads.clone(), received, false));

    let (a, b, c) = tokio::join!(
        registry.resolve("app/actions.js#act"),
        registry.resolve("app/actions.js#act"),
        registry.resolve("app/actions.js#act"),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn memoized_resolution_does_not_reload() {
    let loads = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_loader(loads.clone(), received, false));

    registry.resolve("app/actions.js#act").await.unwrap();
    registry.resolve("app/actions.js#act").await.unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_load_is_evicted_and_retried() {
    let loads = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_loader(loads.clone(), received, true));

    let first = registry.resolve("app/actions.js#act").await;
    assert!(matches!(first, Err(RegistryError::Load { .. })));

    let second = registry.resolve("app/actions.js#act").await;
    assert_eq!(second.unwrap(), "app/actions.js::act");
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_export_is_reference_not_found() {
    let loads = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_loader(loads, received, false));

    let result = registry.resolve("app/actions.js#absent").await;
    match result {
        Err(RegistryError::ReferenceNotFound { name, .. }) => assert_eq!(name, "absent"),
        other => panic!("expected ReferenceNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn cache_bust_suffix_is_stripped_but_forces_a_fresh_load() {
    let loads = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_loader(loads.clone(), received.clone(), false));

    registry.resolve("app/actions.js?t=100#act").await.unwrap();
    registry.resolve("app/actions.js?t=200#act").await.unwrap();

    // Distinct volatile ids each load once, but the loader never sees the
    // suffix.
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(
        received.lock().unwrap().as_slice(),
        &["app/actions.js".to_string(), "app/actions.js".to_string()]
    );
}

#[tokio::test]
async fn resolving_without_loader_errors() {
    let registry: ReferenceRegistry<String> = ReferenceRegistry::new();
    let result = registry.resolve("app/actions.js#act").await;
    assert!(matches!(result, Err(RegistryError::LoaderNotSet)));
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let loads = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_loader(loads, received, false));

    let result = registry.resolve("no-separator").await;
    assert!(matches!(result, Err(RegistryError::MalformedId(_))));
}

#[tokio::test]
async fn loader_initialization_is_first_wins() {
    let loads = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_loader(loads, received, false));

    let second: Loader<String> = Arc::new(|_| -> LoadFuture<String> {
        Box::pin(async { Err(LoadError::new("second loader must never run")) })
    });
    assert!(!registry.set_loader(second));

    let value = registry.resolve("app/actions.js#act").await.unwrap();
    assert_eq!(value, "app/actions.js::act");
}

//! Reference registry runtime: producer-side marking and consumer-side
//! memoized resolution.
//!
//! The two sides are independent and connected only by the reference id
//! (`<module>#<name>`). Marking attaches metadata without changing the value's
//! shape. Resolution memoizes per id, shares one in-flight load across
//! concurrent callers, and never caches a rejected load, so callers may retry.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

// ═══════════════════════════════════════════════════════════════════════════════
// PRODUCER SIDE
// ═══════════════════════════════════════════════════════════════════════════════

/// Metadata identifying a value as resolvable-by-id rather than
/// inlineable-by-value. Never executed, only carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDescriptor {
    pub id: String,
    pub name: String,
}

/// A value with an attached [`ReferenceDescriptor`]. Dereferences to the
/// original value, so callers keep using it unchanged; a serializer checks
/// [`MarkedReference::descriptor`] to emit a pointer instead of inlining.
#[derive(Debug, Clone)]
pub struct MarkedReference<V> {
    descriptor: ReferenceDescriptor,
    value: V,
}

impl<V> MarkedReference<V> {
    pub fn descriptor(&self) -> &ReferenceDescriptor {
        &self.descriptor
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_inner(self) -> V {
        self.value
    }
}

impl<V> Deref for MarkedReference<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

/// Marks `value` as a boundary reference.
pub fn register<V>(value: V, id: impl Into<String>, name: impl Into<String>) -> MarkedReference<V> {
    MarkedReference {
        descriptor: ReferenceDescriptor {
            id: id.into(),
            name: name.into(),
        },
        value,
    }
}

/// Stable production reference id that does not leak the module path:
/// `<sha256 prefix>#<name>`.
pub fn hashed_reference_id(module_id: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}#{}", &digest[..16], name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSUMER SIDE
// ═══════════════════════════════════════════════════════════════════════════════

/// The export surface of a loaded module: a small, enumerable capability
/// (`get(name)`), not a dynamic property proxy.
pub trait ModuleExports<V>: Send + Sync {
    fn get(&self, name: &str) -> Option<V>;
}

/// A fixed name→value module, the common loader building block.
pub struct StaticModule<V> {
    exports: HashMap<String, V>,
}

impl<V> StaticModule<V> {
    pub fn new() -> Self {
        Self {
            exports: HashMap::new(),
        }
    }

    pub fn with_export(mut self, name: impl Into<String>, value: V) -> Self {
        self.exports.insert(name.into(), value);
        self
    }
}

impl<V> Default for StaticModule<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> ModuleExports<V> for StaticModule<V> {
    fn get(&self, name: &str) -> Option<V> {
        self.exports.get(name).cloned()
    }
}

pub type ModuleHandle<V> = Arc<dyn ModuleExports<V>>;
pub type LoadFuture<V> = Pin<Box<dyn Future<Output = Result<ModuleHandle<V>, LoadError>> + Send>>;
/// Injected module loader. Receives the module part of the reference id with
/// any volatile cache-bust suffix already stripped.
pub type Loader<V> = Arc<dyn Fn(&str) -> LoadFuture<V> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "module load failed: {}", self.message)
    }
}

impl std::error::Error for LoadError {}

#[derive(Debug, Clone)]
pub enum RegistryError {
    LoaderNotSet,
    MalformedId(String),
    Load { id: String, message: String },
    ReferenceNotFound { id: String, name: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::LoaderNotSet => write!(f, "reference loader has not been initialized"),
            RegistryError::MalformedId(id) => {
                write!(f, "reference id \"{}\" is not of the form <module>#<name>", id)
            }
            RegistryError::Load { id, message } => {
                write!(f, "loading module for reference \"{}\" failed: {}", id, message)
            }
            RegistryError::ReferenceNotFound { id, name } => {
                write!(
                    f,
                    "reference \"{}\" is not exported by the module loaded for \"{}\"",
                    name, id
                )
            }
        }
    }
}

impl std::error::Error for RegistryError {}

lazy_static! {
    static ref CACHE_BUST_RE: Regex = Regex::new(r"\?t=\d+").unwrap();
}

fn strip_cache_bust(id: &str) -> String {
    CACHE_BUST_RE.replace(id, "").into_owned()
}

/// Consumer-side registry. Construct one per process (or per test); the loader
/// is injected once and the first initialization wins.
pub struct ReferenceRegistry<V> {
    loader: OnceLock<Loader<V>>,
    modules: Mutex<HashMap<String, Arc<OnceCell<ModuleHandle<V>>>>>,
}

impl<V> Default for ReferenceRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ReferenceRegistry<V> {
    pub fn new() -> Self {
        Self {
            loader: OnceLock::new(),
            modules: Mutex::new(HashMap::new()),
        }
    }

    /// One-time loader injection. Returns `false` (and keeps the first loader)
    /// when already initialized.
    pub fn set_loader(&self, loader: Loader<V>) -> bool {
        self.loader.set(loader).is_ok()
    }
}

impl<V: Clone + Send + Sync + 'static> ReferenceRegistry<V> {
    /// Resolves a reference id to the named export of its module.
    ///
    /// Memoized per id; concurrent calls for the same unresolved id share one
    /// in-flight load. A rejected load is not cached, so a later call retries.
    pub async fn resolve(&self, id: &str) -> Result<V, RegistryError> {
        let loader = self
            .loader
            .get()
            .ok_or(RegistryError::LoaderNotSet)?
            .clone();

        let stripped = strip_cache_bust(id);
        let (module_part, name) = stripped
            .rsplit_once('#')
            .ok_or_else(|| RegistryError::MalformedId(id.to_string()))?;
        trace!(id, module = module_part, name, "resolving reference");

        // Memoize on the caller's id: a fresh cache-bust suffix is a distinct
        // entry and forces a fresh load.
        let cell = {
            let mut modules = self.modules.lock().expect("registry mutex poisoned");
            modules
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let module = cell
            .get_or_try_init(|| {
                debug!(module = module_part, "loading module across boundary");
                loader(module_part)
            })
            .await
            .map_err(|e| RegistryError::Load {
                id: id.to_string(),
                message: e.message,
            })?;

        module
            .get(name)
            .ok_or_else(|| RegistryError::ReferenceNotFound {
                id: stripped.clone(),
                name: name.to_string(),
            })
    }
}

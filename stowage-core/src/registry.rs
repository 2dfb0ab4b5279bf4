//! Lazily constructed shared instances, keyed by type or name
//!
//! [`SingletonRegistry`] constructs at most one instance per [`RegistryKey`],
//! no matter how many threads ask for it at once. Construction happens while
//! holding a single registry-wide mutex; a failed or panicking factory leaves
//! the key absent so a later call can try again.
//!
//! ```
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use stowage_core::{RegistryKey, SingletonRegistry};
//!
//! let registry = SingletonRegistry::new();
//! let first: Arc<String> = registry
//!     .get_instance(RegistryKey::named("greeting"), |s: &str| Ok::<_, Infallible>(s.to_string()), "hello")
//!     .unwrap();
//! let second: Arc<String> = registry
//!     .get_instance(RegistryKey::named("greeting"), |s: &str| Ok::<_, Infallible>(s.to_string()), "ignored")
//!     .unwrap();
//!
//! assert!(Arc::ptr_eq(&first, &second));
//! assert_eq!(second.as_str(), "hello");
//! ```

use parking_lot::{Mutex, RwLock};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

type Entry = Arc<dyn Any + Send + Sync>;

/// Identity an instance is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryKey {
    /// Keyed by the instance's type
    Type { id: TypeId, name: &'static str },
    /// Keyed by an explicit name, e.g. one entry per configuration
    Named(String),
}

impl RegistryKey {
    pub fn of<T: 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => write!(f, "type {name}"),
            Self::Named(name) => write!(f, "'{name}'"),
        }
    }
}

/// How `get_instance` checks for an existing entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockStrategy {
    /// Every call takes the construction lock before checking.
    #[default]
    Coarse,
    /// Check under the read lock first and skip the construction lock when
    /// the entry is already published; re-check after taking it.
    DoubleChecked,
}

/// Errors from [`SingletonRegistry::get_instance`]
#[derive(Debug, Error)]
pub enum RegistryError<E> {
    #[error("failed to construct instance for {key}")]
    Construction {
        key: RegistryKey,
        #[source]
        source: E,
    },

    #[error("entry for {key} does not hold a {expected}")]
    TypeMismatch {
        key: RegistryKey,
        expected: &'static str,
    },
}

impl<E> RegistryError<E> {
    /// The factory error, if construction is what failed
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Construction { source, .. } => Some(source),
            Self::TypeMismatch { .. } => None,
        }
    }
}

/// Registry holding at most one instance per key for its whole lifetime
pub struct SingletonRegistry {
    entries: RwLock<HashMap<RegistryKey, Entry>>,
    construction: Mutex<()>,
    strategy: LockStrategy,
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::with_strategy(LockStrategy::Coarse)
    }

    pub fn with_strategy(strategy: LockStrategy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            construction: Mutex::new(()),
            strategy,
        }
    }

    /// Return the instance stored under `key`, constructing it with
    /// `factory(args)` if there is none yet.
    ///
    /// `factory` and `args` are only used by the call that actually
    /// constructs; every later call gets the stored instance back unchanged.
    /// A factory error is returned to this caller only and nothing is stored.
    pub fn get_instance<T, A, E, F>(
        &self,
        key: RegistryKey,
        factory: F,
        args: A,
    ) -> Result<Arc<T>, RegistryError<E>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(A) -> Result<T, E>,
    {
        if self.strategy == LockStrategy::DoubleChecked {
            if let Some(entry) = self.lookup(&key) {
                trace!(key = %key, "Singleton hit without construction lock");
                return downcast(key, entry);
            }
        }

        let _guard = self.construction.lock();

        if let Some(entry) = self.lookup(&key) {
            trace!(key = %key, "Singleton hit");
            return downcast(key, entry);
        }

        debug!(key = %key, "Constructing singleton");
        let instance = match factory(args) {
            Ok(instance) => Arc::new(instance),
            Err(source) => {
                debug!(key = %key, "Singleton construction failed");
                return Err(RegistryError::Construction { key, source });
            }
        };

        let entry: Entry = instance.clone();
        self.entries.write().insert(key, entry);
        Ok(instance)
    }

    /// [`get_instance`](Self::get_instance) keyed by `T` itself
    pub fn get_or_init<T, A, E, F>(&self, factory: F, args: A) -> Result<Arc<T>, RegistryError<E>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(A) -> Result<T, E>,
    {
        self.get_instance(RegistryKey::of::<T>(), factory, args)
    }

    pub fn contains(&self, key: &RegistryKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn lookup(&self, key: &RegistryKey) -> Option<Entry> {
        self.entries.read().get(key).cloned()
    }
}

impl fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("SingletonRegistry")
            .field("strategy", &self.strategy)
            .field("keys", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn downcast<T, E>(key: RegistryKey, entry: Entry) -> Result<Arc<T>, RegistryError<E>>
where
    T: Send + Sync + 'static,
{
    entry.downcast::<T>().map_err(|_| RegistryError::TypeMismatch {
        key,
        expected: type_name::<T>(),
    })
}

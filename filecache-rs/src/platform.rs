//! Provides a tiny DI like container which carries all central components of the daemon.
//!
//! The platform is more or less a map which keeps all central components (the
//! [Config](crate::config::Config), the [FileCache](crate::lru::cache::FileCache), the
//! [ServingRoot](crate::files::ServingRoot) and the [Server](crate::server::Server)) as **Arc<T>**
//! around. Each component is created exactly once during startup and every connection handler
//! obtains the very same instance from here. Also this keeps the central **is_running** flag which
//! is toggled to *false* once [Platform::terminate](Platform::terminate) is invoked.
//!
//! Note that once the shutdown is initiated, the internal map is cleared so that the components
//! are dropped. Code which might run after [Platform::terminate](Platform::terminate) should
//! therefore use [Platform::find](Platform::find) rather than [Platform::require](Platform::require).
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use filecache::platform::Platform;
//! struct ServingRoot {
//!     path: String,
//! }
//!
//! struct UnknownService;
//!
//! let platform = Platform::new();
//! platform.register::<ServingRoot>(Arc::new(ServingRoot { path: "/srv/files".to_owned() }));
//!
//! assert_eq!(platform.require::<ServingRoot>().path, "/srv/files");
//! assert_eq!(platform.find::<UnknownService>().is_none(), true);
//! assert_eq!(platform.is_running(), true);
//!
//! // Once terminated, all services are released and the platform is no longer running...
//! platform.terminate();
//! assert_eq!(platform.find::<ServingRoot>().is_none(), true);
//! assert_eq!(platform.is_running(), false);
//! ```
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use fnv::FnvHashMap;

/// Provides a container to keep all central services in a single place.
pub struct Platform {
    services: Mutex<FnvHashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    is_running: AtomicBool,
}

impl Platform {
    /// Creates a new and running platform without any services.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(FnvHashMap::default()),
            is_running: AtomicBool::new(true),
        })
    }

    /// Registers a service, replacing any previously registered instance of the same type.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self
            .services
            .lock()
            .unwrap()
            .insert(TypeId::of::<T>(), service);
    }

    /// Tries to resolve a previously registered service.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.services
            .lock()
            .unwrap()
            .get(&TypeId::of::<T>())
            .and_then(|service| service.clone().downcast::<T>().ok())
    }

    /// Resolves a previously registered service.
    ///
    /// # Panics
    /// Panics if the requested service isn't available or if the platform is already shutting
    /// down.
    ///
    /// ```should_panic
    /// # use filecache::platform::Platform;
    /// struct UnknownService;
    ///
    /// let platform = Platform::new();
    /// platform.require::<UnknownService>();
    /// ```
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if !self.is_running() {
            panic!(
                "A required component ({}) has been requested but the system is already shutting down!",
                std::any::type_name::<T>()
            );
        }

        self.find::<T>().unwrap_or_else(|| {
            panic!(
                "A required component ({}) was not available in the platform registry!",
                std::any::type_name::<T>()
            )
        })
    }

    /// Determines if the platform is still running or if [Platform::terminate](Platform::terminate)
    /// has already been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This releases all services and toggles [is_running()](Platform::is_running) to **false**.
    /// The listener notices this and stops accepting connections.
    pub fn terminate(&self) {
        self.services.lock().unwrap().clear();
        self.is_running.store(false, Ordering::Release);
    }
}

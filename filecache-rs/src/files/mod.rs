//! Maps requested file names onto files below the serving root and loads them from disk.
//!
//! Every requested name is treated as untrusted input. The [ServingRoot](ServingRoot) guards the
//! file system in two stages:
//! * [check](ServingRoot::check) is a purely lexical test which runs before anything else
//!   (including the cache lookup). It rejects absolute names and any `..` segment.
//! * [resolve](ServingRoot::resolve) canonicalizes the joined path and ensures that it is still
//!   located below the root. This catches symbolic links pointing outside of the root. It is only
//!   invoked on a cache miss, right before the file is [loaded](load).
//!
//! Only content which passed both stages ever enters the cache, therefore a cache hit can be
//! served without touching the file system at all.
use std::sync::Arc;

use crate::platform::Platform;

mod guard;
mod loader;

pub use guard::PathError;
pub use guard::ServingRoot;
pub use loader::load;
pub use loader::LoadError;

/// Registers the given serving root in the platform.
///
/// Note that this is called by the [Builder](crate::builder::Builder) if a root was given via
/// [Builder::serve](crate::builder::Builder::serve).
pub fn install(platform: &Arc<Platform>, root: ServingRoot) -> Arc<ServingRoot> {
    log::info!("Serving files from {}...", root.path().display());

    let root = Arc::new(root);
    platform.register::<ServingRoot>(root.clone());

    root
}

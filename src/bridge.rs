// ABOUTME: Serialisation gate letting foreign (non-async) OS threads submit work to the
// ABOUTME: tokio runtime and block on the result, per spec.md §4.6

use std::future::Future;

use tokio::runtime::{Handle, Runtime};

/// Marshals calls from arbitrary foreign threads onto the tokio runtime.
///
/// The source achieves this with a bespoke Unix-domain-socket gate; here
/// we use tokio's own multi-threaded scheduler, which already satisfies
/// every requirement in spec.md §4.6: `Handle::block_on` may be called
/// concurrently from any number of threads, per-thread ordering is
/// automatic (a thread cannot issue a second `join` before the first
/// call returns), and the calling thread blocks until the future
/// completes.
pub struct Bridge {
    handle: Handle,
    /// Kept alive only when `Bridge` owns its runtime (see `Bridge::new`);
    /// `None` when attached to an ambient runtime via `Bridge::from_handle`.
    _owned_runtime: Option<Runtime>,
}

impl Bridge {
    /// Create a bridge backed by its own dedicated multi-threaded runtime.
    /// Use this for a peer constructed from a plain (non-async) host
    /// thread that has no runtime of its own.
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            handle,
            _owned_runtime: Some(runtime),
        })
    }

    /// Attach to an already-running runtime (e.g. the one hosting an
    /// `#[tokio::main]` caller) instead of spinning up a new one.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            _owned_runtime: None,
        }
    }

    /// Run `f` to completion on the bridged runtime and block the calling
    /// thread for the result. This is the `join(fn, args) -> result`
    /// primitive from spec.md §4.6; every public synchronous entry point
    /// in `sync_api` is a thin wrapper around a call to this method.
    pub fn join<F, T>(&self, f: F) -> T
    where
        F: Future<Output = T>,
    {
        self.handle.block_on(f)
    }
}

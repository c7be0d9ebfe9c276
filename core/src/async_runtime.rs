// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::future::Future;

use lazy_static::lazy_static;
use tokio::task::JoinHandle;

use crate::config;

lazy_static! {
    static ref RUNTIME: tokio::runtime::Runtime = {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .max_blocking_threads(config::TOKIO_MAX_BLOCKING_THREADS)
            .build()
            .expect("tokio runtime builds")
    };
}

/// Execute async code synchronously on the process-wide runtime.
///
/// Entry point for the command line tools. Must not be called from async code.
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.block_on(future)
}

/// Runs the provided function on an executor dedicated to blocking operations.
///
/// Uses the runtime of the calling task if there is one, so that tests running on their own
/// runtime don't touch the global one. Database transactions go through here.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    handle().spawn_blocking(f)
}

/// Get a handle to the current runtime, or the global one outside of async contexts.
pub fn handle() -> tokio::runtime::Handle {
    tokio::runtime::Handle::try_current().unwrap_or_else(|_| RUNTIME.handle().clone())
}

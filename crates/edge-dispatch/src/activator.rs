//! Activation backends
//!
//! - [`DylibActivator`] treats the artifact as a shared library built with
//!   `edge_dispatch_sdk::export_module!` and loads it with `libloading`.
//! - [`FnActivator`] builds the handler in-process from a closure, for
//!   embedding the dispatcher and for tests.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use edge_dispatch_sdk::{
    BoxFuture as SdkBoxFuture, Handler, HandlerResult, ModuleEntryFn, Request,
    MODULE_ABI_SYMBOL, MODULE_ABI_VERSION, MODULE_ENTRY_SYMBOL,
};
use futures::future::{BoxFuture, FutureExt};
use libloading::{Library, Symbol};
use tempfile::TempPath;

use crate::artifact::ModuleArtifact;
use crate::loader::{panic_message, ActivationError, ActivationResult, Activator};

/// Activator backed by an async closure
pub struct FnActivator<F> {
    activate: F,
}

impl<F, Fut> FnActivator<F>
where
    F: Fn(ModuleArtifact) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActivationResult> + Send + 'static,
{
    pub fn new(activate: F) -> Self {
        Self { activate }
    }
}

impl<F, Fut> Activator for FnActivator<F>
where
    F: Fn(ModuleArtifact) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActivationResult> + Send + 'static,
{
    fn activate(&self, artifact: ModuleArtifact) -> BoxFuture<'static, ActivationResult> {
        (self.activate)(artifact).boxed()
    }
}

/// Loads the artifact as a dynamic library (.so/.dylib/.dll).
///
/// The bytes are staged to a private temporary file, opened, checked for the
/// expected ABI version and asked for their handler through the entry symbol.
pub struct DylibActivator {
    /// Where artifacts are staged (system temp dir when `None`)
    staging_dir: Option<PathBuf>,
}

impl DylibActivator {
    pub fn new() -> Self {
        Self { staging_dir: None }
    }

    /// Stage artifacts under `dir` instead of the system temp dir
    pub fn staging_in(dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: Some(dir.into()),
        }
    }
}

impl Default for DylibActivator {
    fn default() -> Self {
        Self::new()
    }
}

impl Activator for DylibActivator {
    fn activate(&self, artifact: ModuleArtifact) -> BoxFuture<'static, ActivationResult> {
        let staging_dir = self.staging_dir.clone();

        async move {
            let module = artifact.name().to_string();

            // dlopen and file I/O block
            let loading = tokio::task::spawn_blocking(move || {
                load_library(&artifact, staging_dir.as_deref())
            });
            match loading.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    Err(ActivationError::Panicked(panic_message(e.into_panic())))
                }
                Err(e) => Err(ActivationError::Instantiate {
                    module,
                    reason: format!("activation task failed: {}", e),
                }),
            }
        }
        .boxed()
    }
}

/// A handler living inside a loaded library.
///
/// Fields drop in declaration order: the handler goes before the library
/// that holds its code, and the library before its backing file.
struct LoadedModule {
    handler: Box<dyn Handler>,
    _library: Library,
    _file: TempPath,
}

impl Handler for LoadedModule {
    fn call(&self, req: Request) -> SdkBoxFuture<'static, HandlerResult> {
        self.handler.call(req)
    }
}

fn load_library(artifact: &ModuleArtifact, staging_dir: Option<&Path>) -> ActivationResult {
    let module = artifact.name();
    let instantiate = |reason: String| ActivationError::Instantiate {
        module: module.to_string(),
        reason,
    };
    let missing = |symbol: &[u8]| ActivationError::MissingCapability {
        module: module.to_string(),
        symbol: String::from_utf8_lossy(symbol).into_owned(),
    };

    if artifact.is_empty() {
        return Err(instantiate("artifact is empty".to_string()));
    }

    let file = stage(artifact, staging_dir)
        .map_err(|e| instantiate(format!("failed to stage artifact: {}", e)))?;

    // Safety: loading runs the library's initializers; the artifact is trusted deployment input
    let library = unsafe { Library::new(&*file) }.map_err(|e| instantiate(e.to_string()))?;

    let entry = {
        // Safety: the symbol type matches what export_module! emits
        let version: Symbol<*const u32> =
            unsafe { library.get(MODULE_ABI_SYMBOL) }.map_err(|_| missing(MODULE_ABI_SYMBOL))?;
        let found = unsafe { **version };
        if found != MODULE_ABI_VERSION {
            return Err(ActivationError::AbiMismatch {
                module: module.to_string(),
                found,
                expected: MODULE_ABI_VERSION,
            });
        }

        let entry: Symbol<ModuleEntryFn> =
            unsafe { library.get(MODULE_ENTRY_SYMBOL) }.map_err(|_| missing(MODULE_ENTRY_SYMBOL))?;
        // Plain fn pointer; valid while `library` stays loaded
        *entry
    };

    let handler = entry();
    tracing::debug!(module = %module, path = ?&*file, "Resolved module entry point");

    Ok(Arc::new(LoadedModule {
        handler,
        _library: library,
        _file: file,
    }))
}

fn stage(artifact: &ModuleArtifact, staging_dir: Option<&Path>) -> std::io::Result<TempPath> {
    let mut builder = tempfile::Builder::new();
    builder
        .prefix("edge-module-")
        .suffix(std::env::consts::DLL_SUFFIX);

    let mut file = match staging_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(artifact.bytes())?;
    file.flush()?;

    Ok(file.into_temp_path())
}

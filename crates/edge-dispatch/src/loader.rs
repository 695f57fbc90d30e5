//! Module loader - single-flight activation of the handler module
//!
//! The loader owns the process-wide initialization state. The first caller
//! of [`ModuleLoader::ensure_ready`] starts activation; everyone who arrives
//! while it runs awaits the same in-flight activation; everyone after it
//! finishes gets the cached outcome. A failed activation is terminal.
//!
//! # State machine
//!
//! ```text
//! NotStarted ──first caller──▶ InProgress ──ok──▶ Ready(handler)
//!                                   │
//!                                   └──err/panic──▶ Failed(error)
//! ```
//!
//! The in-flight activation is a shared future kept inside the state, so a
//! caller that is cancelled while waiting neither aborts nor restarts it.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use edge_dispatch_sdk::Handler;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;

use crate::artifact::ModuleArtifact;

/// The activated handler, shared by every request
pub type HandlerCapability = Arc<dyn Handler>;

/// Outcome of one activation
pub type ActivationResult = Result<HandlerCapability, ActivationError>;

/// Why a module could not be activated.
///
/// Cloned and handed to every current and future caller of `ensure_ready`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    #[error("module {module} could not be instantiated: {reason}")]
    Instantiate { module: String, reason: String },

    #[error("module {module} does not export `{symbol}`")]
    MissingCapability { module: String, symbol: String },

    #[error("module {module} targets ABI version {found}, expected {expected}")]
    AbiMismatch { module: String, found: u32, expected: u32 },

    #[error("module activation panicked: {0}")]
    Panicked(String),
}

/// Produces a handler capability from a module artifact.
///
/// Called at most once per [`ModuleLoader`].
pub trait Activator: Send + Sync + 'static {
    fn activate(&self, artifact: ModuleArtifact) -> BoxFuture<'static, ActivationResult>;
}

type Activation = Shared<BoxFuture<'static, ActivationResult>>;

enum State {
    NotStarted,
    InProgress(Activation),
    Ready(HandlerCapability),
    Failed(ActivationError),
}

/// Observable phase of the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    NotStarted,
    InProgress,
    Ready,
    Failed,
}

/// Single-flight gate around module activation
pub struct ModuleLoader {
    artifact: ModuleArtifact,
    activator: Arc<dyn Activator>,
    state: Mutex<State>,
}

impl ModuleLoader {
    pub fn new(artifact: ModuleArtifact, activator: impl Activator) -> Self {
        Self {
            artifact,
            activator: Arc::new(activator),
            state: Mutex::new(State::NotStarted),
        }
    }

    /// Return the handler, activating the module first if nobody has yet.
    ///
    /// Does not suspend once the module is ready or has failed.
    pub async fn ensure_ready(&self) -> ActivationResult {
        let activation = {
            let mut state = self.state.lock();
            match &*state {
                State::Ready(handler) => return Ok(Arc::clone(handler)),
                State::Failed(err) => return Err(err.clone()),
                State::InProgress(activation) => activation.clone(),
                State::NotStarted => {
                    let activation = self.start_activation();
                    *state = State::InProgress(activation.clone());
                    activation
                }
            }
        };

        let outcome = activation.await;
        self.commit(&outcome);
        outcome
    }

    /// Current phase, for health reporting
    pub fn state(&self) -> LoaderState {
        match &*self.state.lock() {
            State::NotStarted => LoaderState::NotStarted,
            State::InProgress(_) => LoaderState::InProgress,
            State::Ready(_) => LoaderState::Ready,
            State::Failed(_) => LoaderState::Failed,
        }
    }

    pub fn artifact(&self) -> &ModuleArtifact {
        &self.artifact
    }

    fn start_activation(&self) -> Activation {
        let activator = Arc::clone(&self.activator);
        let artifact = self.artifact.clone();

        async move {
            let module = artifact.name().to_string();
            tracing::info!(module = %module, size = artifact.len(), "Activating module");
            let started = Instant::now();

            let outcome = AssertUnwindSafe(async move { activator.activate(artifact).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ActivationError::Panicked(panic_message(panic))));

            match &outcome {
                Ok(_) => tracing::info!(
                    module = %module,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Module activated"
                ),
                Err(e) => tracing::error!(module = %module, error = %e, "Module activation failed"),
            }

            outcome
        }
        .boxed()
        .shared()
    }

    /// First waiter to observe completion moves the gate to its final state
    fn commit(&self, outcome: &ActivationResult) {
        let mut state = self.state.lock();
        if let State::InProgress(_) = &*state {
            *state = match outcome {
                Ok(handler) => State::Ready(Arc::clone(handler)),
                Err(err) => State::Failed(err.clone()),
            };
        }
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("artifact", &self.artifact)
            .field("state", &self.state())
            .finish()
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

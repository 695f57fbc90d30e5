//! Edge Dispatch - forwards inbound requests to a lazily activated handler module
//!
//! - [`loader`]: single-flight activation gate around the module
//! - [`activator`]: how an artifact becomes a handler (shared library or in-process)
//! - [`dispatcher`]: request events, their resolution, and forwarding
//! - [`gateway`]: HTTP hosting runtime feeding the dispatcher
//! - [`config`]: environment configuration

pub mod activator;
pub mod artifact;
pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod loader;

pub use activator::{DylibActivator, FnActivator};
pub use artifact::ModuleArtifact;
pub use config::{AppConfig, ConfigError};
pub use dispatcher::{
    DispatchError, Dispatcher, EventState, PendingResponse, RequestEvent, Resolution,
};
pub use loader::{
    ActivationError, ActivationResult, Activator, HandlerCapability, LoaderState, ModuleLoader,
};

//! Edge Dispatch SDK - the contract between the dispatcher and a handler module
//!
//! A module is compiled against this crate, implements [`Handler`] and exposes
//! it with [`export_module!`]. The dispatcher loads the module once and then
//! forwards every inbound request to that single handler.

pub mod request;
pub mod response;
pub mod error;
pub mod handler;

pub mod prelude {
    //! Common imports for handler modules
    pub use crate::request::Request;
    pub use crate::response::Response;
    pub use crate::error::HandlerError;
    pub use crate::handler::{BoxFuture, Handler, HandlerResult};
    pub use crate::export_module;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value as JsonValue};
}

// Re-export key types at crate root
pub use request::Request;
pub use response::Response;
pub use error::HandlerError;
pub use handler::{
    BoxFuture, Handler, HandlerResult, ModuleEntryFn, MODULE_ABI_SYMBOL, MODULE_ABI_VERSION,
    MODULE_ENTRY_SYMBOL,
};

//! The handler capability and the module export ABI
//!
//! A module exposes exactly one [`Handler`]. The dispatcher looks the handler
//! up once, when the module is activated, and calls it for every request.
//!
//! # Example
//!
//! ```ignore
//! use edge_dispatch_sdk::prelude::*;
//!
//! async fn hello(req: Request) -> HandlerResult {
//!     Ok(Response::ok(json!({"path": req.path})))
//! }
//!
//! export_module!(hello);
//! ```

use std::future::Future;
use std::pin::Pin;

use crate::{HandlerError, Request, Response};

/// Type alias for boxed future returned by handlers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produces for one request
pub type HandlerResult = Result<Response, HandlerError>;

/// A callable `Request -> Response` capability.
///
/// Implementations must be stateless from the caller's point of view: the
/// same instance serves every concurrent request.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(req))
    }
}

/// Bumped whenever the shape of [`Handler`], [`Request`] or [`Response`] changes
pub const MODULE_ABI_VERSION: u32 = 1;

/// Symbol holding the module's `u32` ABI version
pub const MODULE_ABI_SYMBOL: &[u8] = b"EDGE_MODULE_ABI_VERSION";

/// Symbol of the module's [`ModuleEntryFn`]
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"edge_module_entry";

/// Signature of the entry point every module exports
pub type ModuleEntryFn = fn() -> Box<dyn Handler>;

/// Export a handler as the module's entry point.
///
/// Generates the ABI version static and the `edge_module_entry` function the
/// dispatcher resolves at activation time. Use it once per module crate.
#[macro_export]
macro_rules! export_module {
    ($handler:expr) => {
        #[no_mangle]
        pub static EDGE_MODULE_ABI_VERSION: u32 = $crate::MODULE_ABI_VERSION;

        #[no_mangle]
        pub fn edge_module_entry() -> ::std::boxed::Box<dyn $crate::Handler> {
            ::std::boxed::Box::new($handler)
        }
    };
}

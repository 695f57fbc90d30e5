//! Request dispatcher - forwards request events to the activated handler
//!
//! Each inbound request becomes a [`RequestEvent`] paired with a
//! [`PendingResponse`] the event source awaits. [`Dispatcher::dispatch`]
//! drives the event through
//!
//! ```text
//! Received → AwaitingModule → Dispatched → Resolved | Failed
//! ```
//!
//! and always resolves it exactly once. Activation failures and handler
//! failures (returned errors and panics alike) become error resolutions.
//! Dropping an event before it resolves, e.g. when the host times a
//! request out, resolves its pending response as [`DispatchError::Cancelled`]
//! and touches nothing else. The event source can follow the lifecycle via
//! [`PendingResponse::state`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use edge_dispatch_sdk::{HandlerError, Request, Response};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{oneshot, watch};

use crate::loader::{panic_message, ActivationError, ModuleLoader};

/// How a request event resolves
pub type Resolution = Result<Response, DispatchError>;

/// Why a request event resolved without a handler response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("module unavailable: {0}")]
    Activation(#[from] ActivationError),

    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("request was cancelled before it resolved")]
    Cancelled,
}

impl DispatchError {
    /// Render the error resolution returned to the client
    pub fn into_response(self) -> Response {
        match self {
            DispatchError::Activation(e) => Response::service_unavailable(e.to_string()),
            DispatchError::Handler(e) => e.into_response(),
            DispatchError::Cancelled => Response::gateway_timeout("request cancelled"),
        }
    }
}

/// Lifecycle of one request event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Received,
    AwaitingModule,
    Dispatched,
    Resolved,
    Failed,
}

impl EventState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EventState::Resolved | EventState::Failed)
    }
}

/// An inbound request plus the means to answer it
#[derive(Debug)]
pub struct RequestEvent {
    request: Request,
    responder: Responder,
}

impl RequestEvent {
    /// Create an event and the future its source awaits for the answer
    pub fn new(request: Request) -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(EventState::Received);
        let event = Self {
            request,
            responder: Responder {
                tx,
                state: state_tx,
            },
        };
        (event, PendingResponse { rx, state: state_rx })
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn state(&self) -> EventState {
        *self.responder.state.borrow()
    }
}

#[derive(Debug)]
struct Responder {
    tx: oneshot::Sender<Resolution>,
    state: watch::Sender<EventState>,
}

impl Responder {
    fn advance(&self, state: EventState) {
        self.state.send_replace(state);
    }

    /// Supply the resolution; consumes the responder so it happens once
    fn resolve(self, resolution: Resolution) -> EventState {
        let state = if resolution.is_ok() {
            EventState::Resolved
        } else {
            EventState::Failed
        };
        // Terminal before the source can observe the resolution
        self.advance(state);
        // The source may have stopped listening; the event is terminal either way
        let _ = self.tx.send(resolution);
        state
    }
}

/// The eventual resolution of a [`RequestEvent`]
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Resolution>,
    state: watch::Receiver<EventState>,
}

impl PendingResponse {
    /// Where the event currently is in its lifecycle.
    ///
    /// An event dropped before resolving reports [`EventState::Failed`].
    pub fn state(&self) -> EventState {
        let state = *self.state.borrow();
        if !state.is_terminal() && self.state.has_changed().is_err() {
            return EventState::Failed;
        }
        state
    }
}

impl Future for PendingResponse {
    type Output = Resolution;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::Cancelled)))
    }
}

/// Bridges request events to the module's handler
#[derive(Debug, Clone)]
pub struct Dispatcher {
    loader: Arc<ModuleLoader>,
}

impl Dispatcher {
    pub fn new(loader: Arc<ModuleLoader>) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    /// Resolve one event, returning the terminal state it reached
    pub async fn dispatch(&self, event: RequestEvent) -> EventState {
        let RequestEvent { request, responder } = event;

        responder.advance(EventState::AwaitingModule);
        let handler = match self.loader.ensure_ready().await {
            Ok(handler) => handler,
            Err(e) => return responder.resolve(Err(e.into())),
        };

        responder.advance(EventState::Dispatched);
        let outcome = AssertUnwindSafe(async move { handler.call(request).await })
            .catch_unwind()
            .await;

        let resolution = match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(DispatchError::Handler(e)),
            Err(panic) => {
                let message = panic_message(panic);
                Err(DispatchError::Handler(HandlerError::Panicked(message)))
            }
        };
        responder.resolve(resolution)
    }

    /// Dispatch a single request and wait for its resolution
    pub async fn handle(&self, request: Request) -> Resolution {
        let (event, pending) = RequestEvent::new(request);
        self.dispatch(event).await;
        pending.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::FnActivator;
    use crate::artifact::ModuleArtifact;
    use crate::loader::{ActivationResult, HandlerCapability, LoaderState};
    use futures::future::{join_all, BoxFuture};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    type TestActivation = BoxFuture<'static, ActivationResult>;

    /// Test module whose handler echoes the path and fails on demand:
    /// `/fail` returns an error, `/panic` panics before producing a future,
    /// `/hold` waits for `hold` before answering.
    struct Harness {
        activations: Arc<AtomicUsize>,
        early_calls: Arc<AtomicUsize>,
        gate: Arc<Notify>,
        hold: Arc<Notify>,
        dispatcher: Dispatcher,
    }

    fn harness(activation_fails: bool) -> Harness {
        let activations = Arc::new(AtomicUsize::new(0));
        let early_calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let hold = Arc::new(Notify::new());
        let activated = Arc::new(AtomicBool::new(false));

        let activator = {
            let activations = activations.clone();
            let early_calls = early_calls.clone();
            let gate = gate.clone();
            let hold = hold.clone();
            FnActivator::new(move |artifact: ModuleArtifact| -> TestActivation {
                activations.fetch_add(1, Ordering::SeqCst);
                let gate = gate.clone();
                let hold = hold.clone();
                let activated = activated.clone();
                let early_calls = early_calls.clone();
                async move {
                    gate.notified().await;
                    if activation_fails {
                        return Err(ActivationError::Instantiate {
                            module: artifact.name().to_string(),
                            reason: "bad magic".to_string(),
                        });
                    }

                    let handler_activated = activated.clone();
                    let handler: HandlerCapability = Arc::new(move |req: Request| {
                        if !handler_activated.load(Ordering::SeqCst) {
                            early_calls.fetch_add(1, Ordering::SeqCst);
                        }
                        if req.path == "/panic" {
                            panic!("handler exploded");
                        }
                        let hold = hold.clone();
                        async move {
                            if req.path == "/hold" {
                                hold.notified().await;
                            }
                            tokio::task::yield_now().await;
                            match req.path.as_str() {
                                "/fail" => Err(HandlerError::Internal("backend down".to_string())),
                                path => Ok(Response::text(200, format!("{} {}", req.method, path))),
                            }
                        }
                    });
                    activated.store(true, Ordering::SeqCst);
                    Ok(handler)
                }
                .boxed()
            })
        };

        let loader = ModuleLoader::new(ModuleArtifact::new("test", &b"module"[..]), activator);
        Harness {
            activations,
            early_calls,
            gate,
            hold,
            dispatcher: Dispatcher::new(Arc::new(loader)),
        }
    }

    #[tokio::test]
    async fn test_single_get_request() {
        let h = harness(false);
        h.gate.notify_one();

        let response = h.dispatcher.handle(Request::new("GET", "/index")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_deref(), Some("GET /index"));
        assert_eq!(h.activations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_before_activation() {
        let h = harness(false);

        let requests = join_all(
            (0..5).map(|i| h.dispatcher.handle(Request::new("GET", format!("/item/{i}")))),
        );
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(h.dispatcher.loader().state(), LoaderState::InProgress);
            h.gate.notify_one();
        };
        let (resolutions, ()) = tokio::join!(requests, release);

        assert_eq!(h.activations.load(Ordering::SeqCst), 1);
        assert_eq!(h.early_calls.load(Ordering::SeqCst), 0);
        for (i, resolution) in resolutions.into_iter().enumerate() {
            let response = resolution.unwrap();
            assert_eq!(response.body, Some(format!("GET /item/{i}")));
        }
    }

    #[tokio::test]
    async fn test_invalid_artifact_fails_every_request() {
        let h = harness(true);

        // All three are suspended on the activation when it fails
        let requests = join_all((0..3).map(|_| h.dispatcher.handle(Request::default())));
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(h.dispatcher.loader().state(), LoaderState::InProgress);
            h.gate.notify_one();
        };
        let (pending, ()) = tokio::join!(requests, release);
        let later = h.dispatcher.handle(Request::default()).await;

        let expected = DispatchError::Activation(ActivationError::Instantiate {
            module: "test".to_string(),
            reason: "bad magic".to_string(),
        });
        assert_eq!(pending.len(), 3);
        for resolution in pending.into_iter().chain(std::iter::once(later)) {
            let err = resolution.unwrap_err();
            assert_eq!(err, expected);
            assert_eq!(err.into_response().status, 503);
        }
        assert_eq!(h.dispatcher.loader().state(), LoaderState::Failed);
        assert_eq!(h.activations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_is_isolated() {
        let h = harness(false);
        h.gate.notify_one();

        let (failed, ok) = tokio::join!(
            h.dispatcher.handle(Request::new("POST", "/fail")),
            h.dispatcher.handle(Request::new("GET", "/healthy")),
        );

        assert_eq!(
            failed.unwrap_err(),
            DispatchError::Handler(HandlerError::Internal("backend down".to_string()))
        );
        assert_eq!(ok.unwrap().body.as_deref(), Some("GET /healthy"));
        assert_eq!(h.dispatcher.loader().state(), LoaderState::Ready);
    }

    #[tokio::test]
    async fn test_handler_panic_is_a_handler_failure() {
        let h = harness(false);
        h.gate.notify_one();

        let err = h.dispatcher.handle(Request::new("GET", "/panic")).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::Handler(HandlerError::Panicked("handler exploded".to_string()))
        );
        assert_eq!(err.into_response().status, 500);

        // The module keeps serving
        let response = h.dispatcher.handle(Request::new("GET", "/after")).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_dispatch_reports_terminal_state() {
        let h = harness(false);
        h.gate.notify_one();

        let (event, pending) = RequestEvent::new(Request::new("GET", "/ok"));
        assert_eq!(event.state(), EventState::Received);
        let state = h.dispatcher.dispatch(event).await;
        assert_eq!(state, EventState::Resolved);
        assert!(state.is_terminal());
        assert!(pending.await.is_ok());

        let (event, pending) = RequestEvent::new(Request::new("GET", "/fail"));
        assert_eq!(h.dispatcher.dispatch(event).await, EventState::Failed);
        assert!(pending.await.is_err());
    }

    #[tokio::test]
    async fn test_event_state_follows_dispatch() {
        let h = harness(false);
        let (event, pending) = RequestEvent::new(Request::new("GET", "/hold"));
        assert_eq!(pending.state(), EventState::Received);

        let dispatch = h.dispatcher.dispatch(event);
        let observe = async {
            tokio::task::yield_now().await;
            assert_eq!(pending.state(), EventState::AwaitingModule);
            h.gate.notify_one();
            while pending.state() != EventState::Dispatched {
                tokio::task::yield_now().await;
            }
            h.hold.notify_one();
        };
        let (state, ()) = tokio::join!(dispatch, observe);

        assert_eq!(state, EventState::Resolved);
        assert_eq!(pending.state(), EventState::Resolved);
        assert_eq!(pending.await.unwrap().body.as_deref(), Some("GET /hold"));
    }

    #[tokio::test]
    async fn test_cancelled_event_is_local() {
        let h = harness(false);

        // Host gives up while the module is still activating
        let (event, pending) = RequestEvent::new(Request::new("GET", "/slow"));
        let dispatch = h.dispatcher.dispatch(event);
        let timed_out = tokio::time::timeout(Duration::from_millis(20), dispatch).await;
        assert!(timed_out.is_err());
        assert_eq!(pending.state(), EventState::Failed);
        assert_eq!(pending.await.unwrap_err(), DispatchError::Cancelled);
        assert_eq!(h.dispatcher.loader().state(), LoaderState::InProgress);

        h.gate.notify_one();
        let response = h.dispatcher.handle(Request::new("GET", "/next")).await.unwrap();
        assert_eq!(response.body.as_deref(), Some("GET /next"));
        assert_eq!(h.activations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsent_event_resolves_cancelled() {
        let (event, pending) = RequestEvent::new(Request::default());
        assert_eq!(event.request().path, "/");
        drop(event);

        let resolution = futures::executor::block_on(pending);
        assert_eq!(resolution.unwrap_err(), DispatchError::Cancelled);
        assert_eq!(DispatchError::Cancelled.into_response().status, 504);
    }
}

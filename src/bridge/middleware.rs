//! Composable HTTP middleware for the Bridge's client surface (§4.4, §9).
//!
//! The bridge's own HTTP stack is hand-rolled `hyper`, not `tower` — so
//! middleware here is a small service-wraps-service chain applied directly
//! around the route dispatcher rather than a second framework layered on
//! top. Each middleware gets the request and a `Next` handle to call the
//! rest of the chain; auth is the motivating example (§9): "reject with
//! 401 before the Bridge sees the request; on success, attach claims to a
//! request-scoped value map".

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hyper::{Body, Request, Response};

/// Claims or other per-request state a middleware attaches for downstream
/// middleware/handlers to read. Request-scoped, not shared across requests.
pub type RequestContext = HashMap<String, String>;

pub type HandlerResult = Pin<Box<dyn Future<Output = Response<Body>> + Send>>;

/// The remaining chain, invoked by a middleware once it decides to let the
/// request proceed.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    handler: &'a (dyn Fn(Request<Body>, RequestContext) -> HandlerResult + Send + Sync),
}

impl<'a> Next<'a> {
    pub fn run(self, req: Request<Body>, ctx: RequestContext) -> HandlerResult {
        match self.middlewares.split_first() {
            Some((first, rest)) => {
                let next = Next { middlewares: rest, handler: self.handler };
                first.handle(req, ctx, next)
            }
            None => (self.handler)(req, ctx),
        }
    }
}

/// A single middleware layer. Implementations call `next.run(...)` to
/// continue the chain, or return their own response to short-circuit it.
pub trait Middleware: Send + Sync {
    fn handle(&self, req: Request<Body>, ctx: RequestContext, next: Next<'_>) -> HandlerResult;
}

/// Applies a registered chain of middlewares outer-first around a terminal
/// handler, matching the order middlewares were pushed.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn run(
        &self,
        req: Request<Body>,
        handler: &(dyn Fn(Request<Body>, RequestContext) -> HandlerResult + Send + Sync),
    ) -> HandlerResult {
        let next = Next { middlewares: &self.middlewares, handler };
        next.run(req, RequestContext::new())
    }
}

/// Basic structured-logging middleware, matching the teacher's existing
/// tracing-based logging style; always lets the request continue.
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn handle(&self, req: Request<Body>, ctx: RequestContext, next: Next<'_>) -> HandlerResult {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        tracing::debug!(%method, %path, "bridge request");
        next.run(req, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;

    fn ok_handler(_req: Request<Body>, _ctx: RequestContext) -> HandlerResult {
        Box::pin(async { Response::new(Body::from("ok")) })
    }

    #[tokio::test]
    async fn empty_chain_calls_handler_directly() {
        let chain = MiddlewareChain::new();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = chain.run(req, &ok_handler).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    struct RejectAll;
    impl Middleware for RejectAll {
        fn handle(&self, _req: Request<Body>, _ctx: RequestContext, _next: Next<'_>) -> HandlerResult {
            Box::pin(async { Response::builder().status(StatusCode::UNAUTHORIZED).body(Body::empty()).unwrap() })
        }
    }

    #[tokio::test]
    async fn middleware_can_short_circuit_the_chain() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(RejectAll));
        let req = Request::builder().uri("/sse").body(Body::empty()).unwrap();
        let resp = chain.run(req, &ok_handler).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logging_middleware_passes_through_to_handler() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(LoggingMiddleware));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = chain.run(req, &ok_handler).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

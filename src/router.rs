//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. You register a path, you
//! get a handler. Binding and validation come in as ordinary handlers built
//! by [`middleware::validate`](crate::middleware::validate).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::{Instrument, debug, info_span};

use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Registrations return `self` so they chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers a handler for a method and path. Path parameters use
    /// `{name}` syntax and are read back with [`Request::param`]:
    ///
    /// ```rust,no_run
    /// # use bindery::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn purge(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .get("/users/{id}", get_user)
    ///     .on(Method::from_bytes(b"PURGE").unwrap(), "/cache/{*key}", purge);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or clashes with one already
    /// registered for `method`. Routes are fixed at startup, so this is a
    /// programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Routes one request and runs its handler. Unknown routes get `404`.
    ///
    /// The server calls this for every request; tests can call it directly
    /// with an in-memory body.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> Response
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let span = info_span!("request", %method, %path);

        async move {
            let started = Instant::now();
            let response = match self.lookup(&method, &path) {
                Some((handler, params)) => handler.call(Request::new(req, params)).await,
                None => Response::status(StatusCode::NOT_FOUND),
            };
            debug!(
                status = response.status_code().as_u16(),
                latency_us = started.elapsed().as_micros() as u64,
                "request finished"
            );
            response
        }
        .instrument(span)
        .await
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

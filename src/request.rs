//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, Uri, header};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::error::Error;
use crate::form::{FormValues, UploadedFile};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Request body: an unread stream until something buffers it under a cap.
pub(crate) enum Body {
    Streaming(UnsyncBoxBody<Bytes, BoxError>),
    Buffered(Bytes),
}

/// An incoming HTTP request, as handed to handlers by the router.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
    pub(crate) params: HashMap<String, String>,
    pub(crate) form: FormValues,
    pub(crate) files: Vec<UploadedFile>,
}

impl Request {
    pub(crate) fn new<B>(req: http::Request<B>, params: HashMap<String, String>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: Body::Streaming(body.map_err(Into::into).boxed_unsync()),
            params,
            form: FormValues::new(),
            files: Vec::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query_string(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parsed `Content-Type`, if present and well formed.
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// The buffered body. Empty until [`read_body`](Request::read_body) (or the
    /// binding middleware) has run.
    pub fn body(&self) -> &[u8] {
        match &self.body {
            Body::Buffered(bytes) => bytes,
            Body::Streaming(_) => &[],
        }
    }

    /// Form values collected by the preprocessor: URL-encoded or multipart
    /// body fields first, then query-string values.
    pub fn form(&self) -> &FormValues { &self.form }

    /// File parts of a multipart body.
    pub fn files(&self) -> &[UploadedFile] { &self.files }

    /// Buffers the body, failing with [`Error::BodyTooLarge`] as soon as the
    /// stream yields more than `limit` bytes.
    ///
    /// Once buffered the body is kept; later calls re-check the cap against
    /// the stored bytes.
    pub fn read_body(&mut self, limit: usize) -> BoxFuture<'_, Result<Bytes, Error>> {
        async move {
            let stream = match std::mem::replace(&mut self.body, Body::Buffered(Bytes::new())) {
                Body::Buffered(bytes) => {
                    self.body = Body::Buffered(bytes.clone());
                    if bytes.len() > limit {
                        return Err(Error::BodyTooLarge { limit });
                    }
                    return Ok(bytes);
                }
                Body::Streaming(stream) => stream,
            };

            let collected = collect_limited(stream, limit).await.map_err(|e: BoxError| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    Error::BodyTooLarge { limit }
                } else {
                    Error::Body(e)
                }
            })?;

            let bytes = collected.to_bytes();
            self.body = Body::Buffered(bytes.clone());
            Ok(bytes)
        }
        .boxed()
    }
}

fn collect_limited(
    stream: UnsyncBoxBody<Bytes, BoxError>,
    limit: usize,
) -> impl std::future::Future<Output = Result<http_body_util::Collected<Bytes>, BoxError>> + Send {
    Limited::new(stream, limit).collect()
}

//! Binding and validation in front of a handler.
//!
//! ```text
//! router ─► validate(handler, options) ─► bind ─┬─ Err ─────────► 500
//!                                               ├─ JSON mode ───► 200 {"Fields": …}
//!                                               └─ forward mode ► handler(req, input, errors)
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::bind::bind;
use crate::config::Options;
use crate::error::Error;
use crate::handler::{Handler, ValidationHandler};
use crate::request::Request;
use crate::response::Response;
use crate::shape::{DispatchMode, InputShape, ShapeDescriptor};
use crate::validate::ValidationErrors;

/// Wraps `handler` so every request is bound into a fresh `S` and validated
/// before anything else happens.
///
/// The shape is inspected here, once. With the default
/// [`DispatchMode::ShortCircuitJson`] the handler is never called and the
/// client gets `200 {"Fields": {...}}`, an empty object meaning valid input.
/// With [`DispatchMode::ForwardWithErrors`] the handler receives the request,
/// its bound instance and the error map.
///
/// A request that cannot be bound at all (body over the cap, broken
/// multipart, body that is not JSON) gets `500`. The body carries the error
/// message unless [`Options::display_errors`] is off.
///
/// ```rust,no_run
/// use bindery::{middleware, InputShape, Options, Request, Router, Section, ValidationErrors};
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Default, Deserialize, Validate)]
/// struct Login {
///     #[validate(email)]
///     email: String,
/// }
///
/// #[derive(Default, Validate)]
/// struct LoginInput {
///     #[validate(nested)]
///     body: Login,
/// }
///
/// impl InputShape for LoginInput {
///     fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
/// }
///
/// async fn login(_: Request, _: LoginInput, _: ValidationErrors) -> &'static str { "unreachable" }
///
/// let app = Router::new().post("/login", middleware::validate(login, Options::new().name("login")));
/// ```
pub fn validate<S, H>(handler: H, options: Options) -> impl Handler
where
    S: InputShape,
    H: ValidationHandler<S>,
{
    let route = Arc::new(Route {
        shape: ShapeDescriptor::of::<S>(),
        options,
        handler,
        _input: PhantomData,
    });
    debug!(name = %route.options.name, shape = ?route.shape, "validation route registered");

    move |req: Request| {
        let route = Arc::clone(&route);
        async move { route.serve(req).await }
    }
}

/// One registration. Holds the shape descriptor but never an instance.
struct Route<S, H> {
    shape: ShapeDescriptor,
    options: Options,
    handler: H,
    _input: PhantomData<fn() -> S>,
}

#[derive(Serialize)]
struct FieldsReply<'a> {
    #[serde(rename = "Fields")]
    fields: &'a ValidationErrors,
}

impl<S, H> Route<S, H>
where
    S: InputShape,
    H: ValidationHandler<S>,
{
    async fn serve(&self, mut req: Request) -> Response {
        let bound = match bind::<S>(&mut req, self.shape, self.options.limits).await {
            Ok(bound) => bound,
            Err(e) => return self.fatal(e),
        };
        debug!(
            name = %self.options.name,
            errors = bound.errors.len(),
            partial = bound.is_partial(),
            "request bound"
        );

        match self.shape.mode {
            DispatchMode::ShortCircuitJson => reply_fields(&bound.errors),
            DispatchMode::ForwardWithErrors => {
                self.handler.call(req, bound.instance, bound.errors).await
            }
        }
    }

    fn fatal(&self, err: Error) -> Response {
        warn!(name = %self.options.name, error = %err, "request could not be bound");
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        if self.options.display_errors {
            Response::error(status, err)
        } else {
            Response::error(status, status.canonical_reason().unwrap_or("Internal Server Error"))
        }
    }
}

fn reply_fields(errors: &ValidationErrors) -> Response {
    match serde_json::to_vec(&FieldsReply { fields: errors }) {
        Ok(body) => Response::json(body),
        Err(e) => {
            error!(error = %e, "serializing validation errors");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

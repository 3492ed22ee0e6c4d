//! # bindery
//!
//! Request binding and validation for a small hyper-based HTTP framework.
//!
//! A handler declares what it expects as an *input shape*: a struct with up
//! to four sections (JSON body, form, query string, route parameters). For
//! every request the middleware:
//!
//! - buffers the body under a byte cap and parses form or multipart data,
//! - builds a fresh instance of the shape and fills each declared section,
//! - runs the shape's `validator` rules,
//! - answers `200 {"Fields": {...}}` itself, or forwards the instance and
//!   the error map to the handler.
//!
//! Unconvertible field values never abort a request. They are left at their
//! zero value and the rules decide whether that is acceptable.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bindery::{
//!     DispatchMode, InputShape, Options, Request, Response, Router, Section, Server,
//!     ValidationErrors, middleware,
//! };
//! use serde::Deserialize;
//! use validator::Validate;
//!
//! #[derive(Default, Deserialize, Validate)]
//! struct NewUser {
//!     #[validate(length(min = 1, message = "non zero value required"))]
//!     name: String,
//!     age: u32,
//! }
//!
//! #[derive(Default, Deserialize, Validate)]
//! struct UserId {
//!     id: String,
//! }
//!
//! // Answers {"Fields": {...}} on its own.
//! #[derive(Default, Validate)]
//! struct CheckUser {
//!     #[validate(nested)]
//!     body: NewUser,
//! }
//!
//! impl InputShape for CheckUser {
//!     fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
//! }
//!
//! // Hands the bound input to the handler.
//! #[derive(Default, Validate)]
//! struct UpdateUser {
//!     #[validate(nested)]
//!     body: NewUser,
//!     parameter: UserId,
//! }
//!
//! impl InputShape for UpdateUser {
//!     const MODE: DispatchMode = DispatchMode::ForwardWithErrors;
//!
//!     fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
//!     fn parameter(&mut self) -> Option<&mut dyn Section> { Some(&mut self.parameter) }
//! }
//!
//! async fn check(_: Request, _: CheckUser, _: ValidationErrors) -> Response {
//!     unreachable!("JSON mode answers before the handler")
//! }
//!
//! async fn update(_: Request, input: UpdateUser, errors: ValidationErrors) -> Response {
//!     if !errors.is_empty() {
//!         return Response::error(http::StatusCode::UNPROCESSABLE_ENTITY, "invalid user");
//!     }
//!     Response::text(format!("updated {}", input.parameter.id))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bindery::Error> {
//!     let app = Router::new()
//!         .post("/users/check", middleware::validate(check, Options::new()))
//!         .put("/users/{id}", middleware::validate(update, Options::new().name("update_user")));
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod bind;
mod config;
mod decode;
mod error;
mod form;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod shape;
mod validate;

pub mod middleware;

pub use bind::{Bound, Outcome, bind, preprocess};
pub use config::{Limits, Options};
pub use error::Error;
pub use form::{FormValues, UploadedFile};
pub use handler::{Handler, ValidationHandler};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use shape::{DispatchMode, InputShape, Section, SectionKind, ShapeDescriptor};
pub use validate::{ValidationErrors, validate};

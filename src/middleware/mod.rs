//! Middleware layer.
//!
//! Middleware wraps a handler into another [`Handler`](crate::Handler), so
//! the router stores it like any other route. The only built-in today is
//! [`validate`]: bind the request into an input shape, run the shape's rules,
//! then either answer with the error map or hand everything to the handler.

mod validate;

pub use validate::validate;

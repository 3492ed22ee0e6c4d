//! Per-route binding configuration.
//!
//! Both types deserialize with every field optional, so they can sit inside
//! an application's own config file:
//!
//! ```rust
//! use bindery::Options;
//!
//! let opts: Options = serde_json::from_str(r#"{"limits":{"max_body_bytes":4096}}"#).unwrap();
//! assert_eq!(opts.limits.max_body_bytes, 4096);
//! assert_eq!(opts.limits.max_file_part_bytes, 1024 * 1024);
//! assert!(opts.display_errors);
//! ```

use std::borrow::Cow;

use serde::Deserialize;

const MIB: usize = 1024 * 1024;

/// Byte caps applied by the request preprocessor.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Limits {
    /// Total request body size. Reading past it aborts the request.
    pub max_body_bytes: usize,
    /// Size of a single multipart part.
    pub max_file_part_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_body_bytes: MIB, max_file_part_bytes: MIB }
    }
}

/// Options fixed when a handler is registered behind
/// [`middleware::validate`](crate::middleware::validate).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Options {
    pub limits: Limits,
    /// When `false`, fatal binding errors answer with a bare
    /// `500 Internal Server Error` and the message only goes to the log.
    pub display_errors: bool,
    /// Label attached to this route's log events.
    pub name: Cow<'static, str>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            display_errors: true,
            name: Cow::Borrowed("handler"),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.limits.max_body_bytes = bytes;
        self
    }

    pub fn max_file_part_bytes(mut self, bytes: usize) -> Self {
        self.limits.max_file_part_bytes = bytes;
        self
    }

    pub fn display_errors(mut self, display: bool) -> Self {
        self.display_errors = display;
        self
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }
}

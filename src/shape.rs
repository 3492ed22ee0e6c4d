//! Input shapes: what a handler expects from a request.
//!
//! A shape is a plain struct with up to four sections: a JSON body, a form,
//! the query string and the route parameters. It says which sections it has
//! by overriding the matching accessor. The middleware calls those accessors
//! once at registration and caches the answer in a [`ShapeDescriptor`].
//!
//! ```rust
//! use bindery::{DispatchMode, InputShape, Section};
//! use serde::Deserialize;
//! use validator::Validate;
//!
//! #[derive(Default, Deserialize, Validate)]
//! struct NewUser {
//!     #[validate(length(min = 1))]
//!     name: String,
//! }
//!
//! #[derive(Default, Deserialize, Validate)]
//! struct Paging {
//!     #[serde(rename = "p")]
//!     page: String,
//! }
//!
//! #[derive(Default, Validate)]
//! struct CreateUser {
//!     #[validate(nested)]
//!     body: NewUser,
//!     #[validate(nested)]
//!     query: Paging,
//! }
//!
//! impl InputShape for CreateUser {
//!     fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
//!     fn query(&mut self) -> Option<&mut dyn Section> { Some(&mut self.query) }
//! }
//!
//! let shape = bindery::ShapeDescriptor::of::<CreateUser>();
//! assert!(shape.has_body && shape.has_query);
//! assert!(!shape.has_form && !shape.has_parameter);
//! assert_eq!(shape.mode, DispatchMode::ShortCircuitJson);
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use validator::Validate;

use crate::decode::{self, DecodeError, Source};

/// What the middleware does once the shape is bound and validated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DispatchMode {
    /// Answer `200 {"Fields": …}` itself; the handler is never called.
    #[default]
    ShortCircuitJson,
    /// Call the handler with the bound instance and the error map.
    ForwardWithErrors,
}

/// The four request data sources a shape can bind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SectionKind {
    Body,
    Form,
    Query,
    Parameter,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Body => "body",
            Self::Form => "form",
            Self::Query => "query",
            Self::Parameter => "parameter",
        })
    }
}

/// A bindable section. Implemented for every `DeserializeOwned` type.
///
/// Lookup keys are the serde field names, so `#[serde(rename = "age")]` makes
/// a field read the `age` key.
pub trait Section: Send {
    #[doc(hidden)]
    fn decode_from(&mut self, source: Source<'_>, skipped: &mut Vec<String>) -> Result<(), DecodeError>;
}

impl<T: DeserializeOwned + Send> Section for T {
    fn decode_from(&mut self, source: Source<'_>, skipped: &mut Vec<String>) -> Result<(), DecodeError> {
        *self = decode::from_source(source, skipped)?;
        Ok(())
    }
}

/// A handler's declared input.
///
/// `Body` and `Form` are alternative sources: when a shape declares both, the
/// body wins and the form section stays zero-valued.
pub trait InputShape: Default + Validate + Send + 'static {
    /// Set to [`DispatchMode::ForwardWithErrors`] to receive validation
    /// results in the handler instead of an automatic JSON answer.
    const MODE: DispatchMode = DispatchMode::ShortCircuitJson;

    fn body(&mut self) -> Option<&mut dyn Section> { None }
    fn form(&mut self) -> Option<&mut dyn Section> { None }
    fn query(&mut self) -> Option<&mut dyn Section> { None }
    fn parameter(&mut self) -> Option<&mut dyn Section> { None }
}

/// Capability flags of one shape, computed once per registration and read
/// concurrently by every request to that route.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShapeDescriptor {
    pub has_body: bool,
    pub has_form: bool,
    pub has_query: bool,
    pub has_parameter: bool,
    pub mode: DispatchMode,
}

impl ShapeDescriptor {
    /// Asks a throwaway default instance of `S` which sections it has.
    pub fn of<S: InputShape>() -> Self {
        let mut scratch = S::default();
        Self {
            has_body: scratch.body().is_some(),
            has_form: scratch.form().is_some(),
            has_query: scratch.query().is_some(),
            has_parameter: scratch.parameter().is_some(),
            mode: S::MODE,
        }
    }

    /// Forward mode, the "no JSON" marker.
    pub fn no_json(&self) -> bool {
        self.mode == DispatchMode::ForwardWithErrors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Default, Deserialize)]
    struct Params {
        id: String,
    }

    #[derive(Default, Validate)]
    struct Bare {
        _name: String,
    }

    impl InputShape for Bare {}

    #[derive(Default, Validate)]
    struct Everything {
        body: Params,
        form: Params,
        query: Params,
        parameter: Params,
    }

    impl InputShape for Everything {
        const MODE: DispatchMode = DispatchMode::ForwardWithErrors;

        fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
        fn form(&mut self) -> Option<&mut dyn Section> { Some(&mut self.form) }
        fn query(&mut self) -> Option<&mut dyn Section> { Some(&mut self.query) }
        fn parameter(&mut self) -> Option<&mut dyn Section> { Some(&mut self.parameter) }
    }

    #[test]
    fn missing_sections_are_false_not_errors() {
        let shape = ShapeDescriptor::of::<Bare>();
        assert!(!shape.has_body && !shape.has_form && !shape.has_query && !shape.has_parameter);
        assert_eq!(shape.mode, DispatchMode::ShortCircuitJson);
        assert!(!shape.no_json());
    }

    #[test]
    fn all_sections_and_forward_marker() {
        let shape = ShapeDescriptor::of::<Everything>();
        assert!(shape.has_body && shape.has_form && shape.has_query && shape.has_parameter);
        assert!(shape.no_json());
    }

    #[test]
    fn section_decode_replaces_value() {
        let mut section = Params { id: "stale".into() };
        let values = crate::FormValues::from_iter([("id", "7")]);
        let mut skipped = Vec::new();
        section.decode_from(Source::Values(&values), &mut skipped).unwrap();
        assert_eq!(section.id, "7");
        assert!(skipped.is_empty());
    }
}

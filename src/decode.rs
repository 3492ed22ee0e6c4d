//! Lenient decoding of request data into shape sections.
//!
//! This is a serde [`Deserializer`](de::Deserializer) that walks the fields a
//! section *declares* and looks each one up in the source. Keys the section
//! does not declare are never visited. Per field:
//!
//! - absent → serde's own missing-field handling, so `Option`, `#[serde(default)]`
//!   and `#[serde(default = "...")]` behave as usual. A field without a serde
//!   default gets its zero value (`""`, `0`, `false`, empty collection,
//!   zero-valued nested struct, first declared enum variant);
//! - present but unconvertible (`age=abc` into a `u32`, a JSON string where a
//!   number was declared) → zero value, and the field path is recorded as
//!   skipped;
//! - present but undecodable (an unknown enum variant, a custom `Deserialize`
//!   impl rejecting its input) → the value is dropped, the field is decoded as
//!   if it were absent and its path is recorded as skipped.
//!
//! The last two rules need serde to tell us which field failed, and the
//! derived impls only report that by returning an error. So a section may
//! take several passes: each failed pass marks one field (absent without a
//! default, or undecodable) and starts over. Every pass marks a new field, so
//! this terminates. What still fails after that, a `#[serde(flatten)]` section
//! for instance, is reported to the binder, which discards the section.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;
use serde::de::{self, DeserializeOwned, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};
use tracing::debug;

use crate::form::FormValues;

/// Error raised while decoding a section. Never escapes the binders.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Raised by derived impls once the source ran out of keys.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A [`MissingField`](Self::MissingField) qualified with its path.
    #[error("missing field `{0}`")]
    Missing(String),
    #[error("field `{path}`: {reason}")]
    Field { path: String, reason: String },
    #[error("{0}")]
    Custom(String),
}

impl DecodeError {
    /// Pins an error raised inside the value of `path` to that field.
    fn at(self, path: &str) -> Self {
        match self {
            Self::Custom(reason) => Self::Field { path: path.to_owned(), reason },
            Self::MissingField(name) => {
                Self::Field { path: path.to_owned(), reason: format!("missing field `{name}`") }
            }
            pinned => pinned,
        }
    }

    /// Qualifies a missing field of the struct found at `prefix`.
    fn under(self, prefix: &str) -> Self {
        match self {
            Self::MissingField(name) => Self::Missing(join(prefix, name)),
            other => other,
        }
    }
}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        Self::MissingField(field)
    }
}

fn join(prefix: &str, field: &str) -> String {
    if prefix.is_empty() { field.to_owned() } else { format!("{prefix}.{field}") }
}

/// Where a section's field values come from.
#[doc(hidden)]
#[derive(Clone, Copy)]
pub enum Source<'a> {
    /// Form, query or route parameter values.
    Values(&'a FormValues),
    /// The members of a JSON object.
    Object(&'a Map<String, Value>),
}

impl<'a> Source<'a> {
    fn lookup(self, key: &str) -> Leaf<'a> {
        match self {
            Self::Values(values) => match values.get_all(key) {
                [] => Leaf::Missing,
                found => Leaf::Text(found),
            },
            Self::Object(map) => map.get(key).map_or(Leaf::Missing, Leaf::Json),
        }
    }
}

#[derive(Clone, Copy)]
enum Leaf<'a> {
    Missing,
    Text(&'a [String]),
    Json(&'a Value),
}

/// Fields marked by earlier passes.
#[derive(Default)]
struct Marks {
    /// Absent, no serde default: fed to the derived impl as a zero value.
    zeroed: HashSet<String>,
    /// Undecodable: treated as absent. Kept in discovery order.
    dropped: Vec<String>,
}

#[derive(Clone, Copy)]
struct Walk<'a> {
    marks: &'a Marks,
    log: &'a RefCell<Vec<String>>,
}

/// Decodes `T` from `source`. Paths of fields that were present but could
/// not be used are appended to `skipped`.
pub(crate) fn from_source<T: DeserializeOwned>(
    source: Source<'_>,
    skipped: &mut Vec<String>,
) -> Result<T, DecodeError> {
    let mut marks = Marks::default();
    loop {
        let log = RefCell::new(Vec::new());
        let result = T::deserialize(SectionDeserializer { source, walk: Walk { marks: &marks, log: &log } });
        match result {
            Ok(value) => {
                skipped.extend(marks.dropped);
                skipped.extend(log.into_inner());
                return Ok(value);
            }
            Err(DecodeError::Missing(path)) if !marks.zeroed.contains(&path) => {
                marks.zeroed.insert(path);
            }
            Err(DecodeError::Field { path, reason }) if !marks.dropped.contains(&path) => {
                debug!(field = %path, %reason, "undecodable value, decoding field as absent");
                marks.dropped.push(path);
            }
            Err(e) => return Err(e),
        }
    }
}

// ── Section (top level) ───────────────────────────────────────────────────────

struct SectionDeserializer<'a> {
    source: Source<'a>,
    walk: Walk<'a>,
}

impl<'a> de::Deserializer<'a> for SectionDeserializer<'a> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'a>>(self, _visitor: V) -> Result<V::Value, DecodeError> {
        Err(de::Error::custom("a section must be a struct with named fields"))
    }

    fn deserialize_struct<V: Visitor<'a>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor
            .visit_map(Fields::new(fields, Some(self.source), String::new(), self.walk))
            .map_err(|e| e.under(""))
    }

    fn deserialize_newtype_struct<V: Visitor<'a>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        <W: Visitor<'a>>
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct seq tuple tuple_struct map enum
        identifier ignored_any
    }
}

/// Feeds the declared fields the source has, plus the ones an earlier pass
/// marked for zero-filling.
struct Fields<'a> {
    fields: std::slice::Iter<'static, &'static str>,
    pending: Option<(String, Leaf<'a>)>,
    source: Option<Source<'a>>,
    prefix: String,
    walk: Walk<'a>,
}

impl<'a> Fields<'a> {
    fn new(fields: &'static [&'static str], source: Option<Source<'a>>, prefix: String, walk: Walk<'a>) -> Self {
        Self { fields: fields.iter(), pending: None, source, prefix, walk }
    }
}

impl<'a> MapAccess<'a> for Fields<'a> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'a>>(&mut self, seed: K) -> Result<Option<K::Value>, DecodeError> {
        for &field in self.fields.by_ref() {
            let path = join(&self.prefix, field);
            let leaf = match self.source {
                Some(source) if !self.walk.marks.dropped.contains(&path) => source.lookup(field),
                _ => Leaf::Missing,
            };
            if matches!(leaf, Leaf::Missing) && !self.walk.marks.zeroed.contains(&path) {
                continue;
            }
            self.pending = Some((path, leaf));
            let key: de::value::StrDeserializer<'_, DecodeError> = field.into_deserializer();
            return seed.deserialize(key).map(Some);
        }
        Ok(None)
    }

    fn next_value_seed<V: DeserializeSeed<'a>>(&mut self, seed: V) -> Result<V::Value, DecodeError> {
        let (path, leaf) = self
            .pending
            .take()
            .ok_or_else(|| de::Error::custom("value requested before key"))?;
        seed.deserialize(FieldDeserializer { leaf, path: path.clone(), walk: self.walk })
            .map_err(|e| e.at(&path))
    }
}

// ── Field values ──────────────────────────────────────────────────────────────

struct FieldDeserializer<'a> {
    leaf: Leaf<'a>,
    path: String,
    walk: Walk<'a>,
}

impl<'a> FieldDeserializer<'a> {
    fn skip(&self) {
        debug!(field = %self.path, "unconvertible value, left zero-valued");
        self.walk.log.borrow_mut().push(self.path.clone());
    }

    /// Converts a scalar, falling back to the zero value. Empty text and JSON
    /// `null` read as absent.
    fn scalar<T: Default>(
        &self,
        text: impl FnOnce(&str) -> Option<T>,
        json: impl FnOnce(&'a Value) -> Option<T>,
    ) -> T {
        let parsed = match self.leaf {
            Leaf::Missing | Leaf::Json(Value::Null) => return T::default(),
            Leaf::Text(values) => match values.first().map(|s| s.trim()) {
                None | Some("") => return T::default(),
                Some(s) => text(s),
            },
            Leaf::Json(value) => json(value),
        };
        parsed.unwrap_or_else(|| {
            self.skip();
            T::default()
        })
    }

    fn items(&self) -> Items<'a> {
        let leaves = match self.leaf {
            Leaf::Missing | Leaf::Json(Value::Null) => Vec::new(),
            Leaf::Text(values) => values.iter().map(|v| Leaf::Text(std::slice::from_ref(v))).collect(),
            Leaf::Json(Value::Array(items)) => items.iter().map(Leaf::Json).collect(),
            Leaf::Json(_) => {
                self.skip();
                Vec::new()
            }
        };
        Items { leaves: leaves.into_iter(), path: self.path.clone(), walk: self.walk }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "on" | "yes" => Some(true),
        "0" | "f" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

macro_rules! deserialize_number {
    ($($method:ident => $visit:ident($ty:ty),)*) => {$(
        fn $method<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
            let n: $ty = self.scalar(|s| s.parse().ok(), |v| <$ty>::deserialize(v).ok());
            visitor.$visit(n)
        }
    )*};
}

impl<'a> de::Deserializer<'a> for FieldDeserializer<'a> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.leaf {
            Leaf::Missing => visitor.visit_unit(),
            Leaf::Text(values) => visitor.visit_str(values.first().map_or("", String::as_str)),
            Leaf::Json(value) => de::Deserializer::deserialize_any(value, visitor).map_err(de::Error::custom),
        }
    }

    fn deserialize_bool<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let b = self.scalar(parse_bool, Value::as_bool);
        visitor.visit_bool(b)
    }

    deserialize_number! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
    }

    fn deserialize_str<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.leaf {
            Leaf::Missing | Leaf::Json(Value::Null) => visitor.visit_str(""),
            Leaf::Text(values) => visitor.visit_str(values.first().map_or("", String::as_str)),
            Leaf::Json(Value::String(s)) => visitor.visit_str(s),
            Leaf::Json(_) => {
                self.skip();
                visitor.visit_str("")
            }
        }
    }

    fn deserialize_string<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_identifier<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.leaf {
            Leaf::Missing | Leaf::Json(Value::Null) => visitor.visit_none(),
            Leaf::Text(values) if values.first().is_none_or(|s| s.is_empty()) => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'a>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'a>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_seq(self.items())
    }

    fn deserialize_tuple<V: Visitor<'a>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'a>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    /// Maps only come from JSON. One bad entry drops the whole map.
    fn deserialize_map<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.leaf {
            Leaf::Json(value) if value.is_object() => {
                de::Deserializer::deserialize_map(value, visitor).map_err(de::Error::custom)
            }
            Leaf::Missing | Leaf::Json(Value::Null) => {
                visitor.visit_map(de::value::MapDeserializer::<_, DecodeError>::new(std::iter::empty::<((), ())>()))
            }
            _ => Err(de::Error::custom("expected an object")),
        }
    }

    fn deserialize_struct<V: Visitor<'a>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        // Text sources are flat; a nested struct only binds from JSON.
        let source = match self.leaf {
            Leaf::Json(Value::Object(map)) => Some(Source::Object(map)),
            Leaf::Missing | Leaf::Json(Value::Null) => None,
            _ => {
                self.skip();
                None
            }
        };
        visitor
            .visit_map(Fields::new(fields, source, self.path.clone(), self.walk))
            .map_err(|e| e.under(&self.path))
    }

    fn deserialize_enum<V: Visitor<'a>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        match self.leaf {
            Leaf::Text([first, ..]) if !first.trim().is_empty() => {
                let variant: de::value::StrDeserializer<'_, DecodeError> = first.trim().into_deserializer();
                visitor.visit_enum(variant)
            }
            Leaf::Json(value) if !value.is_null() => {
                de::Deserializer::deserialize_enum(value, name, variants, visitor).map_err(de::Error::custom)
            }
            // Zero-filled: the first declared variant.
            _ => match variants.first() {
                Some(&first) => {
                    let variant: de::value::StrDeserializer<'_, DecodeError> = first.into_deserializer();
                    visitor.visit_enum(variant)
                }
                None => Err(de::Error::custom(format_args!("enum `{name}` has no variants"))),
            },
        }
    }

    fn deserialize_ignored_any<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        <W: Visitor<'a>>
        i128 u128 char bytes byte_buf
    }
}

// ── Collections ───────────────────────────────────────────────────────────────

struct Items<'a> {
    leaves: std::vec::IntoIter<Leaf<'a>>,
    path: String,
    walk: Walk<'a>,
}

impl<'a> SeqAccess<'a> for Items<'a> {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'a>>(&mut self, seed: T) -> Result<Option<T::Value>, DecodeError> {
        self.leaves
            .next()
            .map(|leaf| seed.deserialize(FieldDeserializer { leaf, path: self.path.clone(), walk: self.walk }))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.leaves.len())
    }
}

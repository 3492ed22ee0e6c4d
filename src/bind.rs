//! The binding pipeline.
//!
//! ```text
//! request ─► preprocess ─► S::default() ─► body | form ─► query ─► parameter ─► validate
//!             (size cap,     (fresh per      (each binder writes only its own section)
//!              form parse)    request)
//! ```
//!
//! Errors fall in three buckets:
//!
//! - **fatal**: body over the cap, broken multipart, JSON that is not JSON
//!   at all (empty, truncated, bad syntax). [`bind`] returns `Err` and nothing
//!   after that point runs.
//! - **tolerated**: a field whose value cannot be converted or decoded, a
//!   section that cannot be decoded as a whole. A bad field is dropped on its
//!   own (zero value, or its serde default), binding continues and the
//!   [`Outcome`] records what was dropped. URL-encoded data is decoded lossily
//!   and never fails. The rules then run on whatever did parse, which usually
//!   yields a more useful message than the decoder would.
//! - **data**: rule failures, returned in [`Bound::errors`].

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::Method;
use serde_json::Value;
use tracing::debug;

use crate::config::Limits;
use crate::decode::Source;
use crate::error::Error;
use crate::form::{FormValues, UploadedFile};
use crate::request::Request;
use crate::shape::{InputShape, Section, SectionKind, ShapeDescriptor};
use crate::validate::{ValidationErrors, validate};

/// How one section bound.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Ok,
    /// These fields were present but unusable. Each was decoded as if absent;
    /// nested fields are dotted (`address.zip`).
    PartialOk { skipped: Vec<String> },
    /// The section could not be decoded at all and is zero-valued.
    Discarded { reason: String },
}

/// A bound and validated request instance.
#[derive(Debug)]
pub struct Bound<S> {
    pub instance: S,
    pub errors: ValidationErrors,
    /// One entry per section that was bound, in binding order.
    pub outcomes: Vec<(SectionKind, Outcome)>,
}

impl<S> Bound<S> {
    pub fn outcome(&self, kind: SectionKind) -> Option<&Outcome> {
        self.outcomes.iter().find(|(k, _)| *k == kind).map(|(_, o)| o)
    }

    /// Whether any binder dropped input.
    pub fn is_partial(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| *o != Outcome::Ok)
    }
}

/// Runs the whole pipeline for one request.
///
/// `req` keeps its buffered body and parsed form afterwards, so a forward-mode
/// handler can still read them.
///
/// Keys are matched exactly against the serde field names, JSON keys
/// included: `{"name": "ann"}` does not bind a field declared as `Name`.
/// Use `#[serde(rename = "...")]` or `#[serde(rename_all = "...")]` to
/// accept another spelling.
pub async fn bind<S: InputShape>(
    req: &mut Request,
    shape: ShapeDescriptor,
    limits: Limits,
) -> Result<Bound<S>, Error> {
    preprocess(req, limits).await?;

    let mut instance = new_instance::<S>();
    let outcomes = bind_sections(&mut instance, shape, req)?;
    let errors = validate(&instance);

    Ok(Bound { instance, errors, outcomes })
}

/// Per-request instance. Never the registration's memory: the registration
/// holds no instance at all.
fn new_instance<S: InputShape>() -> S {
    S::default()
}

// ── Preprocessing ─────────────────────────────────────────────────────────────

/// Buffers the body under `limits.max_body_bytes` and fills
/// [`Request::form`] (and [`Request::files`] for multipart).
///
/// Multipart failures are fatal. URL-encoded bodies and query strings are
/// decoded lossily (see [`FormValues::parse`]) and cannot fail.
pub async fn preprocess(req: &mut Request, limits: Limits) -> Result<(), Error> {
    let body = req.read_body(limits.max_body_bytes).await?;

    let content_type = req.content_type();
    let method_has_body = [Method::POST, Method::PUT, Method::PATCH].contains(req.method());

    let mut form = match content_type {
        Some(ct) if ct.type_() == mime::MULTIPART && ct.subtype() == mime::FORM_DATA => {
            let boundary = multer::parse_boundary(ct.as_ref())?;
            let (values, files) = read_multipart(body, boundary, limits).await?;
            req.files = files;
            values
        }
        Some(ct) if method_has_body && ct.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() => {
            FormValues::parse(&String::from_utf8_lossy(&body))
        }
        _ => FormValues::new(),
    };

    form.extend(FormValues::parse(req.query_string().unwrap_or_default()));
    req.form = form;
    Ok(())
}

fn read_multipart(
    body: Bytes,
    boundary: String,
    limits: Limits,
) -> BoxFuture<'static, Result<(FormValues, Vec<UploadedFile>), Error>> {
    async move {
        let constraints = multer::Constraints::new().size_limit(
            multer::SizeLimit::new()
                .whole_stream(limits.max_body_bytes as u64)
                .per_field(limits.max_file_part_bytes as u64),
        );
        let stream = futures_util::stream::once(async move { Ok::<_, std::io::Error>(body) });
        let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

        let mut values = FormValues::new();
        let mut files = Vec::new();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let content_type = field.content_type().map(ToString::to_string);
                    let data = field.bytes().await?;
                    files.push(UploadedFile { name, file_name: Some(file_name), content_type, data });
                }
                None => {
                    let text = field.text().await?;
                    if let Some(name) = name {
                        values.append(name, text);
                    }
                }
            }
        }
        Ok((values, files))
    }
    .boxed()
}

// ── Section binders ───────────────────────────────────────────────────────────

fn bind_sections<S: InputShape>(
    instance: &mut S,
    shape: ShapeDescriptor,
    req: &Request,
) -> Result<Vec<(SectionKind, Outcome)>, Error> {
    let mut outcomes = Vec::with_capacity(3);

    if shape.has_body {
        if let Some(body) = instance.body() {
            outcomes.push((SectionKind::Body, bind_body(body, req.body())?));
        }
    } else if shape.has_form {
        if let Some(form) = instance.form() {
            let outcome = bind_section(SectionKind::Form, form, Source::Values(req.form()));
            outcomes.push((SectionKind::Form, outcome));
        }
    }

    if shape.has_query {
        if let Some(query) = instance.query() {
            let values = FormValues::parse(req.query_string().unwrap_or_default());
            let outcome = bind_section(SectionKind::Query, query, Source::Values(&values));
            outcomes.push((SectionKind::Query, outcome));
        }
    }

    if shape.has_parameter {
        if let Some(parameter) = instance.parameter() {
            let values: FormValues = req.params().iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let outcome = bind_section(SectionKind::Parameter, parameter, Source::Values(&values));
            outcomes.push((SectionKind::Parameter, outcome));
        }
    }

    Ok(outcomes)
}

/// Decodes the body as JSON. Only a body that is not JSON at all is fatal.
fn bind_body(section: &mut dyn Section, body: &[u8]) -> Result<Outcome, Error> {
    let value: Value = serde_json::from_slice(body)?;
    Ok(match &value {
        Value::Object(map) => bind_section(SectionKind::Body, section, Source::Object(map)),
        Value::Null => Outcome::Ok,
        _ => {
            debug!("JSON body is not an object, body section left zero-valued");
            Outcome::Discarded { reason: "expected a JSON object".to_owned() }
        }
    })
}

fn bind_section(kind: SectionKind, section: &mut dyn Section, source: Source<'_>) -> Outcome {
    let mut skipped = Vec::new();
    match section.decode_from(source, &mut skipped) {
        Ok(()) if skipped.is_empty() => Outcome::Ok,
        Ok(()) => {
            debug!(section = %kind, ?skipped, "tolerated unconvertible fields");
            Outcome::PartialOk { skipped }
        }
        Err(e) => {
            debug!(section = %kind, error = %e, "section discarded");
            Outcome::Discarded { reason: e.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use validator::Validate;

    use super::*;
    use crate::request::tests::request;

    #[derive(Debug, Default, Deserialize, Validate)]
    struct Person {
        #[validate(length(min = 1, message = "non zero value required"))]
        name: String,
        age: u32,
    }

    #[derive(Debug, Default, Deserialize, Validate)]
    struct Lookup {
        #[serde(rename = "age")]
        years: String,
        sort: String,
    }

    #[derive(Debug, Default, Deserialize, Validate)]
    struct Ids {
        id: String,
        other: String,
    }

    #[derive(Debug, Default, Validate)]
    struct Full {
        #[validate(nested)]
        body: Person,
        form: Lookup,
        query: Lookup,
        parameter: Ids,
    }

    impl InputShape for Full {
        fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
        fn form(&mut self) -> Option<&mut dyn Section> { Some(&mut self.form) }
        fn query(&mut self) -> Option<&mut dyn Section> { Some(&mut self.query) }
        fn parameter(&mut self) -> Option<&mut dyn Section> { Some(&mut self.parameter) }
    }

    #[derive(Debug, Default, Validate)]
    struct FormOnly {
        #[validate(nested)]
        form: Person,
    }

    impl InputShape for FormOnly {
        fn form(&mut self) -> Option<&mut dyn Section> { Some(&mut self.form) }
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(rename_all = "lowercase")]
    enum Role {
        #[default]
        User,
        Admin,
    }

    fn first_page() -> u32 {
        1
    }

    #[derive(Debug, Default, Deserialize, Validate)]
    struct Member {
        #[validate(length(min = 1))]
        name: String,
        role: Role,
        #[serde(default = "first_page")]
        page: u32,
    }

    #[derive(Debug, Default, Validate)]
    struct MemberForm {
        #[validate(nested)]
        form: Member,
    }

    impl InputShape for MemberForm {
        fn form(&mut self) -> Option<&mut dyn Section> { Some(&mut self.form) }
    }

    async fn bind_member(body: &str) -> Bound<MemberForm> {
        let mut req = request("POST", "/", Some("application/x-www-form-urlencoded"), body);
        bind::<MemberForm>(&mut req, ShapeDescriptor::of::<MemberForm>(), Limits::default())
            .await
            .unwrap()
    }

    async fn bind_full(mut req: Request) -> Result<Bound<Full>, Error> {
        bind::<Full>(&mut req, ShapeDescriptor::of::<Full>(), Limits::default()).await
    }

    #[tokio::test]
    async fn binds_body_query_and_params_in_one_pass() {
        let mut req = request("POST", "/people/7?age=30&sort=asc", Some("application/json"), r#"{"name":"ann","age":41}"#);
        req.params.insert("id".into(), "7".into());

        let bound = bind_full(req).await.unwrap();
        assert_eq!(bound.instance.body.name, "ann");
        assert_eq!(bound.instance.body.age, 41);
        assert_eq!(bound.instance.query.years, "30");
        assert_eq!(bound.instance.query.sort, "asc");
        assert_eq!(bound.instance.parameter.id, "7");
        assert_eq!(bound.instance.parameter.other, "");
        assert!(bound.errors.is_empty());
        assert!(!bound.is_partial());
    }

    #[tokio::test]
    async fn body_wins_over_form() {
        let req = request("POST", "/?sort=asc", Some("application/json"), r#"{"name":"ann"}"#);
        let bound = bind_full(req).await.unwrap();
        assert_eq!(bound.outcome(SectionKind::Body), Some(&Outcome::Ok));
        assert_eq!(bound.outcome(SectionKind::Form), None);
        assert_eq!(bound.instance.form.sort, "");
        assert_eq!(bound.instance.query.sort, "asc");
    }

    #[tokio::test]
    async fn empty_object_reports_required_field() {
        let req = request("POST", "/", Some("application/json"), "{}");
        let bound = bind_full(req).await.unwrap();
        assert_eq!(bound.errors.get("name"), Some("non zero value required"));
    }

    #[tokio::test]
    async fn json_type_mismatch_is_tolerated() {
        let req = request("POST", "/", Some("application/json"), r#"{"name":"ann","age":"old"}"#);
        let bound = bind_full(req).await.unwrap();
        assert_eq!(bound.instance.body.name, "ann");
        assert_eq!(bound.instance.body.age, 0);
        assert_eq!(
            bound.outcome(SectionKind::Body),
            Some(&Outcome::PartialOk { skipped: vec!["age".into()] })
        );
        assert!(bound.errors.is_empty());
    }

    #[tokio::test]
    async fn non_object_json_discards_the_body_section() {
        let req = request("POST", "/", Some("application/json"), "[1,2]");
        let bound = bind_full(req).await.unwrap();
        assert!(matches!(bound.outcome(SectionKind::Body), Some(Outcome::Discarded { .. })));
        assert!(bound.errors.contains("name"));
    }

    #[tokio::test]
    async fn structural_json_errors_are_fatal() {
        for body in ["", "{", r#"{"name": }"#] {
            let req = request("POST", "/", Some("application/json"), body);
            assert!(matches!(bind_full(req).await, Err(Error::Json(_))), "body {body:?}");
        }
    }

    #[tokio::test]
    async fn oversized_body_never_reaches_validation() {
        let mut req = request("POST", "/", Some("application/json"), r#"{"name":"a very long name"}"#);
        let limits = Limits { max_body_bytes: 8, ..Limits::default() };
        let result = bind::<Full>(&mut req, ShapeDescriptor::of::<Full>(), limits).await;
        assert!(matches!(result, Err(Error::BodyTooLarge { limit: 8 })));
    }

    #[tokio::test]
    async fn urlencoded_form_binds_with_query_fallback() {
        let mut req = request(
            "POST",
            "/?age=12&name=from-query",
            Some("application/x-www-form-urlencoded"),
            "name=ann&extra=ignored",
        );
        let bound = bind::<FormOnly>(&mut req, ShapeDescriptor::of::<FormOnly>(), Limits::default())
            .await
            .unwrap();
        assert_eq!(bound.instance.form.name, "ann");
        assert_eq!(bound.instance.form.age, 12);
        assert_eq!(req.form().get_all("name"), ["ann", "from-query"]);
    }

    #[tokio::test]
    async fn bad_form_field_does_not_abort_the_rest() {
        let mut req = request("POST", "/", Some("application/x-www-form-urlencoded"), "name=ann&age=x");
        let bound = bind::<FormOnly>(&mut req, ShapeDescriptor::of::<FormOnly>(), Limits::default())
            .await
            .unwrap();
        assert_eq!(bound.instance.form.name, "ann");
        assert_eq!(bound.instance.form.age, 0);
        assert_eq!(
            bound.outcome(SectionKind::Form),
            Some(&Outcome::PartialOk { skipped: vec!["age".into()] })
        );
    }

    #[tokio::test]
    async fn unknown_enum_value_leaves_the_other_fields_bound() {
        let bound = bind_member("name=ann&role=root&page=3").await;
        let member = &bound.instance.form;
        assert_eq!(member.name, "ann");
        assert_eq!(member.role, Role::User);
        assert_eq!(member.page, 3);
        assert_eq!(
            bound.outcome(SectionKind::Form),
            Some(&Outcome::PartialOk { skipped: vec!["role".into()] })
        );
        assert!(bound.errors.is_empty());
    }

    #[tokio::test]
    async fn absent_fields_take_their_serde_default() {
        let bound = bind_member("name=ann").await;
        assert_eq!(bound.instance.form.role, Role::User);
        assert_eq!(bound.instance.form.page, 1);
        assert_eq!(bound.outcome(SectionKind::Form), Some(&Outcome::Ok));

        let bound = bind_member("name=ann&role=admin&page=7").await;
        assert_eq!(bound.instance.form.role, Role::Admin);
        assert_eq!(bound.instance.form.page, 7);
    }

    #[tokio::test]
    async fn form_body_on_get_is_not_parsed() {
        let mut req = request("GET", "/?name=q", Some("application/x-www-form-urlencoded"), "name=body");
        bind::<FormOnly>(&mut req, ShapeDescriptor::of::<FormOnly>(), Limits::default())
            .await
            .unwrap();
        assert_eq!(req.form().get_all("name"), ["q"]);
    }

    #[tokio::test]
    async fn multipart_text_and_file_parts() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"name\"\r\n\r\n\
            ann\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\n\
            Content-Type: image/png\r\n\r\n\
            PNGDATA\r\n\
            --XYZ--\r\n";
        let mut req = request("POST", "/", Some("multipart/form-data; boundary=XYZ"), body);
        let bound = bind::<FormOnly>(&mut req, ShapeDescriptor::of::<FormOnly>(), Limits::default())
            .await
            .unwrap();

        assert_eq!(bound.instance.form.name, "ann");
        assert_eq!(req.files().len(), 1);
        let file = &req.files()[0];
        assert_eq!(file.name.as_deref(), Some("avatar"));
        assert_eq!(file.file_name.as_deref(), Some("a.png"));
        assert_eq!(file.content_type.as_deref(), Some("image/png"));
        assert_eq!(&file.data[..], b"PNGDATA");
    }

    #[tokio::test]
    async fn multipart_part_over_limit_is_fatal() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"doc\"; filename=\"big.txt\"\r\n\r\n\
            0123456789abcdef\r\n\
            --XYZ--\r\n";
        let mut req = request("POST", "/", Some("multipart/form-data; boundary=XYZ"), body);
        let limits = Limits { max_file_part_bytes: 4, ..Limits::default() };
        let result = bind::<FormOnly>(&mut req, ShapeDescriptor::of::<FormOnly>(), limits).await;
        assert!(matches!(result, Err(Error::Multipart(_))));
    }

    #[tokio::test]
    async fn multipart_without_boundary_is_fatal() {
        let mut req = request("POST", "/", Some("multipart/form-data"), "whatever");
        let result = bind::<FormOnly>(&mut req, ShapeDescriptor::of::<FormOnly>(), Limits::default()).await;
        assert!(matches!(result, Err(Error::Multipart(_))));
    }

    #[tokio::test]
    async fn identical_requests_yield_identical_errors() {
        let run = || async {
            let req = request("POST", "/?age=x", Some("application/json"), r#"{"age":3}"#);
            bind_full(req).await.unwrap().errors
        };
        let first = run().await;
        let second = run().await;
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}

use std::sync::Arc;

use bindery::{
    DispatchMode, InputShape, Options, Request, Response, Router, Section, ValidationErrors,
    middleware,
};
use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde::Deserialize;
use serde_json::{Value, json};
use validator::Validate;

// ── Shapes ────────────────────────────────────────────────────────────────────

#[allow(non_snake_case)]
#[derive(Debug, Default, Deserialize, Validate)]
struct Named {
    #[validate(length(min = 1, message = "non zero value required"))]
    Name: String,
}

#[derive(Debug, Default, Validate)]
struct CreateInput {
    #[validate(nested)]
    body: Named,
}

impl InputShape for CreateInput {
    fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
}

#[allow(non_snake_case)]
#[derive(Debug, Default, Deserialize, Validate)]
struct AgeQuery {
    #[serde(rename = "age")]
    Age: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
struct ItemParams {
    id: String,
    missing: String,
}

#[derive(Debug, Default, Validate)]
struct EchoInput {
    #[validate(nested)]
    body: Named,
    query: AgeQuery,
    parameter: ItemParams,
}

impl InputShape for EchoInput {
    const MODE: DispatchMode = DispatchMode::ForwardWithErrors;

    fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
    fn query(&mut self) -> Option<&mut dyn Section> { Some(&mut self.query) }
    fn parameter(&mut self) -> Option<&mut dyn Section> { Some(&mut self.parameter) }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn unreachable_handler(_: Request, _: CreateInput, _: ValidationErrors) -> Response {
    Response::status(StatusCode::IM_A_TEAPOT)
}

async fn echo(_: Request, input: EchoInput, errors: ValidationErrors) -> Response {
    let body = json!({
        "name": input.body.Name,
        "age": input.query.Age,
        "id": input.parameter.id,
        "missing": input.parameter.missing,
        "errors": errors,
    });
    Response::json(body.to_string())
}

fn app(options: Options) -> Router {
    Router::new()
        .post("/users", middleware::validate(unreachable_handler, options.clone()))
        .put("/items/{id}", middleware::validate(echo, options))
}

fn json_request(method: &str, uri: &str, body: &str) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_owned())))
        .unwrap()
}

fn json_body(res: &Response) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_body_yields_empty_fields() {
    let res = app(Options::new()).dispatch(json_request("POST", "/users", r#"{"Name":"ann"}"#)).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json_body(&res), json!({ "Fields": {} }));
}

#[tokio::test]
async fn empty_object_reports_name() {
    let res = app(Options::new()).dispatch(json_request("POST", "/users", "{}")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json_body(&res), json!({ "Fields": { "Name": "non zero value required" } }));
}

#[tokio::test]
async fn query_reads_the_renamed_key() {
    let res = app(Options::new())
        .dispatch(json_request("PUT", "/items/9?Age=wrong&age=30", r#"{"Name":"ann"}"#))
        .await;
    assert_eq!(json_body(&res)["age"], "30");
}

#[tokio::test]
async fn params_are_copied_verbatim_and_absent_ones_are_empty() {
    let res = app(Options::new())
        .dispatch(json_request("PUT", "/items/007", r#"{"Name":"ann"}"#))
        .await;
    let body = json_body(&res);
    assert_eq!(body["id"], "007");
    assert_eq!(body["missing"], "");
    assert_eq!(body["errors"], json!({}));
}

#[tokio::test]
async fn identical_requests_give_identical_errors() {
    let app = app(Options::new());
    let first = app.dispatch(json_request("PUT", "/items/1?age=x", "{}")).await;
    let second = app.dispatch(json_request("PUT", "/items/1?age=x", "{}")).await;
    assert_eq!(json_body(&first)["errors"], json!({ "Name": "non zero value required" }));
    assert_eq!(first.body(), second.body());
}

#[tokio::test]
async fn concurrent_requests_see_only_their_own_values() {
    let app = Arc::new(app(Options::new()));

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let app = Arc::clone(&app);
            tokio::spawn(async move {
                let uri = format!("/items/{i}?age={}", i * 2);
                let body = format!(r#"{{"Name":"user-{i}"}}"#);
                let res = app.dispatch(json_request("PUT", &uri, &body)).await;
                (i, json_body(&res))
            })
        })
        .collect();

    for task in tasks {
        let (i, body) = task.await.unwrap();
        assert_eq!(body["name"], format!("user-{i}"));
        assert_eq!(body["age"], (i * 2).to_string());
        assert_eq!(body["id"], i.to_string());
    }
}

#[tokio::test]
async fn oversized_body_is_fatal() {
    let res = app(Options::new().max_body_bytes(16))
        .dispatch(json_request("POST", "/users", r#"{"Name":"a rather long name"}"#))
        .await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body(), b"http: request body too large (limit is 16 bytes)\n");
}

#[tokio::test]
async fn fatal_message_hidden_when_display_errors_is_off() {
    let res = app(Options::new().display_errors(false))
        .dispatch(json_request("POST", "/users", "not json"))
        .await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body(), b"Internal Server Error\n");
}

#[tokio::test]
async fn mismatched_json_type_is_left_to_the_rules() {
    let res = app(Options::new()).dispatch(json_request("POST", "/users", r#"{"Name":42}"#)).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json_body(&res), json!({ "Fields": { "Name": "non zero value required" } }));
}

#[tokio::test]
async fn unrouted_request_is_not_found() {
    let res = app(Options::new()).dispatch(json_request("GET", "/users", "")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

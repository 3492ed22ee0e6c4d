//! Two validated routes: one answering with the error map, one forwarding.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -X POST http://localhost:3000/users/check \
//!        -H 'content-type: application/json' -d '{}'
//!   curl -X PUT 'http://localhost:3000/users/42?notify=yes' \
//!        -H 'content-type: application/json' -d '{"name":"alice","age":30}'
//!   curl -X POST http://localhost:3000/signup -d 'name=bob&email=bob@example.com'

use bindery::{
    DispatchMode, InputShape, Options, Request, Response, Router, Section, Server,
    ValidationErrors, middleware,
};
use http::StatusCode;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
struct User {
    #[validate(length(min = 1, message = "non zero value required"))]
    name: String,
    #[validate(range(max = 150))]
    age: u32,
}

#[derive(Debug, Default, Deserialize, Validate)]
struct UserId {
    id: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
struct Notify {
    notify: bool,
}

// POST /users/check answers {"Fields": {...}} without reaching a handler.
#[derive(Debug, Default, Validate)]
struct CheckUser {
    #[validate(nested)]
    body: User,
}

impl InputShape for CheckUser {
    fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
}

#[derive(Debug, Default, Validate)]
struct UpdateUser {
    #[validate(nested)]
    body: User,
    query: Notify,
    parameter: UserId,
}

impl InputShape for UpdateUser {
    const MODE: DispatchMode = DispatchMode::ForwardWithErrors;

    fn body(&mut self) -> Option<&mut dyn Section> { Some(&mut self.body) }
    fn query(&mut self) -> Option<&mut dyn Section> { Some(&mut self.query) }
    fn parameter(&mut self) -> Option<&mut dyn Section> { Some(&mut self.parameter) }
}

#[derive(Debug, Default, Deserialize, Validate)]
struct Signup {
    #[validate(length(min = 1))]
    name: String,
    #[validate(email)]
    email: String,
}

#[derive(Debug, Default, Validate)]
struct SignupForm {
    #[validate(nested)]
    form: Signup,
}

impl InputShape for SignupForm {
    const MODE: DispatchMode = DispatchMode::ForwardWithErrors;

    fn form(&mut self) -> Option<&mut dyn Section> { Some(&mut self.form) }
}

#[tokio::main]
async fn main() -> Result<(), bindery::Error> {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .post("/users/check", middleware::validate(check_user, Options::new().name("check_user")))
        .put("/users/{id}", middleware::validate(update_user, Options::new().name("update_user")))
        .post(
            "/signup",
            middleware::validate(signup, Options::new().name("signup").display_errors(false)),
        );

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

async fn check_user(_req: Request, _input: CheckUser, _errors: ValidationErrors) -> Response {
    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
}

// PUT /users/{id}
async fn update_user(_req: Request, input: UpdateUser, errors: ValidationErrors) -> Response {
    if !errors.is_empty() {
        let body = format!("{} invalid field(s)", errors.len());
        return Response::error(StatusCode::UNPROCESSABLE_ENTITY, body);
    }
    let UpdateUser { body, query, parameter } = input;
    Response::text(format!(
        "user {} is now {} ({}), notify={}",
        parameter.id, body.name, body.age, query.notify
    ))
}

// POST /signup, urlencoded or multipart
async fn signup(req: Request, input: SignupForm, errors: ValidationErrors) -> Response {
    if let Some((field, message)) = errors.iter().next() {
        return Response::error(StatusCode::BAD_REQUEST, format!("{field}: {message}"));
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .text(format!("welcome {}, {} file(s) received", input.form.name, req.files().len()))
}

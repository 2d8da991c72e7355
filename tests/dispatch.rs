use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Deserialize;
use tern::middleware::{Logger, Recover, with};
use tern::{App, Handler, TIMEOUT_STATUS, from_fn};
use tokio_util::sync::CancellationToken;

type Log = Arc<Mutex<Vec<String>>>;

struct Reply {
    status: StatusCode,
    headers: http::HeaderMap,
    body: String,
}

fn request(method: Method, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

async fn dispatch(app: &App, req: Request<Full<Bytes>>) -> Reply {
    let res = app.handle(req).await;
    let status = res.status();
    let headers = res.headers().clone();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    Reply { status, headers, body: String::from_utf8(body.to_vec()).unwrap() }
}

async fn get(app: &App, uri: &str) -> Reply {
    dispatch(app, request(Method::GET, uri, "")).await
}

/// Middleware that logs `<label>-before` and `<label>-after` around `next`.
fn around(log: &Log, label: &'static str) -> impl Handler {
    let log = Arc::clone(log);
    from_fn(move |ctx, next| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(format!("{label}-before"));
            next.run(ctx).await;
            log.lock().unwrap().push(format!("{label}-after"));
        })
    })
}

/// Route handler that logs `label` and answers `200 label`.
fn endpoint(log: &Log, label: &'static str) -> impl Handler {
    let log = Arc::clone(log);
    from_fn(move |ctx, _next| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(label.to_owned());
            ctx.send(StatusCode::OK, label);
        })
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ── Chain order and short-circuiting ─────────────────────────────────────────

#[tokio::test]
async fn middleware_wraps_the_route_handler_in_registration_order() {
    let log = Log::default();
    let app = App::new()
        .use_middleware(around(&log, "m1"))
        .use_middleware(around(&log, "m2"))
        .get("/", endpoint(&log, "h"));

    let reply = get(&app, "/").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "h");
    assert_eq!(entries(&log), ["m1-before", "m2-before", "h", "m2-after", "m1-after"]);
}

#[tokio::test]
async fn middleware_that_skips_next_short_circuits() {
    let log = Log::default();
    let app = App::new()
        .use_middleware(around(&log, "outer"))
        .use_middleware(from_fn(|ctx, next| Box::pin(async move {
            if ctx.header("authorization").is_none() {
                ctx.unauthorized("login required");
                return;
            }
            next.run(ctx).await;
        })))
        .get("/private", endpoint(&log, "h"));

    let reply = get(&app, "/private").await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, r#"{"error":"login required"}"#);
    assert_eq!(entries(&log), ["outer-before", "outer-after"]);
}

#[tokio::test]
async fn stopping_the_chain_keeps_what_was_written() {
    let log = Log::default();
    let app = App::new()
        .use_middleware(from_fn(|ctx, next| Box::pin(async move {
            ctx.forbidden("blocked");
            ctx.stop();
            next.run(ctx).await;
        })))
        .use_middleware(around(&log, "never"))
        .get("/", endpoint(&log, "h"));

    let reply = get(&app, "/").await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn handler_that_writes_nothing_yields_empty_ok() {
    let app = App::new().get("/quiet", from_fn(|_ctx, _next| Box::pin(async move {})));

    let reply = get(&app, "/quiet").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.is_empty());
}

// ── Not found ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unmatched_request_gets_the_default_404_without_middleware() {
    let log = Log::default();
    let app = App::new()
        .use_middleware(around(&log, "global"))
        .get("/users/:id", endpoint(&log, "user"));

    for (method, uri) in [
        (Method::GET, "/users"),
        (Method::GET, "/users/1/extra"),
        (Method::POST, "/users/1"),
    ] {
        let reply = dispatch(&app, request(method, uri, "")).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body, "404 page not found\n");
        assert_eq!(reply.headers[CONTENT_TYPE], "text/plain; charset=utf-8");
    }
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn custom_not_found_handler_runs_alone() {
    let log = Log::default();
    let app = App::new()
        .use_middleware(around(&log, "global"))
        .not_found(from_fn(|ctx, next| Box::pin(async move {
            let path = ctx.path().to_owned();
            ctx.not_found(&format!("nothing at {path}"));
            next.run(ctx).await;
        })));

    let reply = get(&app, "/missing").await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body, r#"{"error":"nothing at /missing"}"#);
    assert!(entries(&log).is_empty());
}

// ── Cancellation scope ───────────────────────────────────────────────────────

#[tokio::test]
async fn expired_scope_answers_504_before_any_unit_runs() {
    let log = Log::default();
    let app = App::new()
        .timeout(Duration::ZERO)
        .use_middleware(around(&log, "m"))
        .get("/", endpoint(&log, "h"));

    let reply = get(&app, "/").await;

    assert_eq!(reply.status, TIMEOUT_STATUS);
    assert!(reply.body.is_empty());
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn unbounded_timeout_dispatches_normally() {
    let log = Log::default();
    let app = App::new()
        .timeout(Duration::MAX)
        .use_middleware(from_fn(|ctx, next| Box::pin(async move {
            ctx.set_timeout(Duration::MAX);
            next.run(ctx).await;
        })))
        .get("/", endpoint(&log, "h"));

    let reply = get(&app, "/").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(entries(&log), ["h"]);
}

#[tokio::test]
async fn cancelled_transport_token_answers_504() {
    let log = Log::default();
    let app = App::new().get("/", endpoint(&log, "h"));

    let token = CancellationToken::new();
    token.cancel();
    let mut req = request(Method::GET, "/", "");
    req.extensions_mut().insert(token);

    let reply = dispatch(&app, req).await;

    assert_eq!(reply.status, StatusCode::GATEWAY_TIMEOUT);
    assert!(entries(&log).is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_passing_mid_chain_stops_at_the_next_step() {
    let log = Log::default();
    let app = App::new()
        .timeout(Duration::from_secs(1))
        .use_middleware(around(&log, "outer"))
        .use_middleware(from_fn(|ctx, next| Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            next.run(ctx).await;
        })))
        .get("/", endpoint(&log, "h"));

    let reply = get(&app, "/").await;

    assert_eq!(reply.status, TIMEOUT_STATUS);
    assert_eq!(entries(&log), ["outer-before", "outer-after"]);
}

#[tokio::test(start_paused = true)]
async fn handler_can_race_its_work_against_the_scope() {
    let app = App::new()
        .timeout(Duration::from_millis(50))
        .get("/slow", from_fn(|ctx, _next| Box::pin(async move {
            let finished = tokio::select! {
                () = tokio::time::sleep(Duration::from_secs(10)) => true,
                () = ctx.cancelled() => false,
            };
            if finished {
                ctx.send(StatusCode::OK, "done");
            } else {
                ctx.status(StatusCode::SERVICE_UNAVAILABLE);
            }
        })));

    let reply = get(&app, "/slow").await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
}

// ── Recover ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn recover_turns_a_panic_into_500() {
    let app = App::new()
        .silent(true)
        .use_middleware(Logger)
        .use_middleware(Recover::new())
        .get("/boom", from_fn(|_ctx, _next| Box::pin(async move {
            panic!("kaboom");
        })));

    let reply = get(&app, "/boom").await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.headers[CONTENT_TYPE], "application/json");
    assert_eq!(reply.body, r#"{"error":"An unexpected error occurred"}"#);
}

#[tokio::test]
async fn recover_leaves_a_committed_response_alone() {
    let app = App::new()
        .silent(true)
        .use_middleware(Recover::new())
        .get("/half", from_fn(|ctx, _next| Box::pin(async move {
            ctx.send(StatusCode::ACCEPTED, "partial");
            panic!("after commit");
        })));

    let reply = get(&app, "/half").await;

    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.body, "partial");
}

#[tokio::test]
async fn recover_hands_the_panic_to_a_custom_handler() {
    let app = App::new()
        .silent(true)
        .use_middleware(Recover::with_handler(|ctx, panic| {
            ctx.send(StatusCode::SERVICE_UNAVAILABLE, format!("recovered: {}", panic.message()));
        }))
        .get("/boom", from_fn(|_ctx, _next| Box::pin(async move {
            panic!("{}", String::from("owned message"));
        })));

    let reply = get(&app, "/boom").await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.body, "recovered: owned message");
}

// ── Groups and per-route middleware ──────────────────────────────────────────

#[tokio::test]
async fn group_middleware_only_runs_under_its_prefix() {
    let log = Log::default();
    let app = App::new()
        .get("/health", endpoint(&log, "health"))
        .group("/api", |api| {
            api.use_middleware(from_fn(|ctx, next| Box::pin(async move {
                ctx.response_mut()
                    .set_header(http::header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
                next.run(ctx).await;
            })))
            .get("/users/:id", endpoint(&log, "user"))
            .post("/users", endpoint(&log, "create"))
        });

    let user = get(&app, "/api/users/7").await;
    assert_eq!(user.body, "user");
    assert_eq!(user.headers[http::header::CACHE_CONTROL], "no-store");

    let created = dispatch(&app, request(Method::POST, "/api/users", "")).await;
    assert_eq!(created.body, "create");

    let health = get(&app, "/health").await;
    assert_eq!(health.body, "health");
    assert!(health.headers.get(http::header::CACHE_CONTROL).is_none());
}

#[tokio::test]
async fn per_route_layers_run_after_global_middleware() {
    let log = Log::default();
    let app = App::new()
        .use_middleware(around(&log, "global"))
        .get("/a", with(endpoint(&log, "a")).layer(around(&log, "route")))
        .get("/b", endpoint(&log, "b"));

    get(&app, "/a").await;
    assert_eq!(
        entries(&log),
        ["global-before", "route-before", "a", "route-after", "global-after"],
    );

    log.lock().unwrap().clear();
    get(&app, "/b").await;
    assert_eq!(entries(&log), ["global-before", "b", "global-after"]);
}

#[tokio::test]
async fn stack_used_as_middleware_continues_the_enclosing_chain() {
    let log = Log::default();
    let stack = with(from_fn(|ctx, next| Box::pin(async move { next.run(ctx).await })))
        .layer(around(&log, "first"))
        .layer(around(&log, "second"));
    let app = App::new().use_middleware(stack).get("/", endpoint(&log, "h"));

    get(&app, "/").await;

    assert_eq!(
        entries(&log),
        ["first-before", "second-before", "h", "second-after", "first-after"],
    );
}

// ── Binding through dispatch ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, PartialEq)]
struct NewUser {
    name: String,
    admin: bool,
}

#[tokio::test]
async fn params_query_and_body_reach_the_handler() {
    let app = App::new()
        .get("/orgs/:org/repos/:repo", from_fn(|ctx, _next| Box::pin(async move {
            let org = ctx.param("org").unwrap_or_default().to_owned();
            let repo = ctx.param("repo").unwrap_or_default().to_owned();
            let sort = ctx.query("sort").unwrap_or_default();
            ctx.send(StatusCode::OK, format!("{org}/{repo} sorted by {sort}"));
        })))
        .post("/users", from_fn(|ctx, _next| Box::pin(async move {
            match ctx.bind_json::<NewUser>().await {
                Ok(user) => {
                    let _ = ctx.created(&serde_json::json!({ "name": user.name, "admin": user.admin }));
                }
                Err(e) => ctx.bad_request(&e.to_string()),
            }
        })));

    let repo = get(&app, "/orgs/rust-lang/repos/cargo/?sort=recently+updated").await;
    assert_eq!(repo.body, "rust-lang/cargo sorted by recently updated");

    let created = dispatch(
        &app,
        request(Method::POST, "/users", r#"{"name":"alice","admin":true}"#),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body, r#"{"admin":true,"name":"alice"}"#);

    let rejected = dispatch(&app, request(Method::POST, "/users", "not json")).await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_binder_reports_every_failure() {
    let app = App::new().get("/search", from_fn(|ctx, _next| Box::pin(async move {
        let mut q = ctx.query_binder();
        let term = q.required::<String>("q");
        let limit = q.optional::<u32>("limit").unwrap_or(10);
        let wait = q.optional::<Duration>("wait").unwrap_or_default();
        match q.finish() {
            Ok(()) => ctx.send(
                StatusCode::OK,
                format!("{} {limit} {}", term.unwrap_or_default(), wait.as_millis()),
            ),
            Err(e) => ctx.bad_request(&e.to_string()),
        }
    })));

    let ok = get(&app, "/search?q=tern&limit=3&wait=1.5s").await;
    assert_eq!(ok.body, "tern 3 1500");

    let bad = get(&app, "/search?limit=lots").await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    let message: serde_json::Value = serde_json::from_str(&bad.body).unwrap();
    let text = message["error"].as_str().unwrap();
    assert!(text.contains("required query parameter q missing"));
    assert!(text.contains("parameter limit: cannot convert 'lots' to uint"));
}

#[tokio::test]
async fn store_carries_values_between_units() {
    let app = App::new()
        .use_middleware(from_fn(|ctx, next| Box::pin(async move {
            ctx.set("user_id", 42_u64);
            next.run(ctx).await;
        })))
        .get("/me", from_fn(|ctx, _next| Box::pin(async move {
            let id = ctx.get::<u64>("user_id").copied();
            let wrong = ctx.try_get::<String>("user_id").is_err();
            ctx.send(StatusCode::OK, format!("{id:?} {wrong}"));
        })));

    assert_eq!(get(&app, "/me").await.body, "Some(42) true");
}

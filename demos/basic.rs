//! Minimal tern example: JSON endpoints, an authenticated group and
//! query binding.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl 'http://localhost:3000/search?q=rust&limit=5&tags=a,b'
//!   curl -H 'x-api-key: secret' http://localhost:3000/admin/stats
//!   curl http://localhost:3000/boom

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tern::middleware::{Logger, Recover};
use tern::{App, BoxFuture, Context, Next, Server, from_fn};

#[derive(Serialize)]
struct User {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), tern::Error> {
    tracing_subscriber::fmt::init();

    let app = App::new()
        .use_middleware(Logger)
        .use_middleware(Recover::new())
        .get("/users/:id", get_user)
        .post("/users", create_user)
        .get("/search", search)
        .get("/boom", from_fn(|_ctx, _next| Box::pin(async move {
            panic!("handler exploded");
        })))
        .group("/admin", |admin| {
            admin
                .use_middleware(require_key)
                .get("/stats", from_fn(|ctx, _next| Box::pin(async move {
                    let caller = ctx.get::<String>("caller").cloned().unwrap_or_default();
                    let _ = ctx.ok(&serde_json::json!({ "caller": caller, "requests": 1 }));
                })))
        })
        .not_found(from_fn(|ctx, _next| Box::pin(async move {
            let path = ctx.path().to_owned();
            ctx.not_found(&format!("no route for {path}"));
        })));

    Server::bind("0.0.0.0:3000").serve(app).await
}

// GET /users/:id
fn get_user<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a> {
    Box::pin(async move {
        let user = User {
            id: ctx.param("id").unwrap_or_default().to_owned(),
            name: "alice".to_owned(),
        };
        if let Err(e) = ctx.ok(&user) {
            ctx.internal_server_error(&e.to_string());
        }
    })
}

// POST /users
fn create_user<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a> {
    Box::pin(async move {
        let new_user: NewUser = match ctx.bind_json().await {
            Ok(u) => u,
            Err(e) => return ctx.bad_request(&e.to_string()),
        };
        let user = User { id: "99".to_owned(), name: new_user.name };
        let _ = ctx.created(&user);
    })
}

// GET /search?q=...&limit=...&tags=a,b
fn search<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a> {
    Box::pin(async move {
        let mut q = ctx.query_binder();
        let term = q.required::<String>("q");
        let limit = q.optional::<u32>("limit").unwrap_or(10);
        let tags = q.optional::<Vec<String>>("tags").unwrap_or_default();
        if let Err(e) = q.finish() {
            return ctx.bad_request(&e.to_string());
        }

        let _ = ctx.ok(&serde_json::json!({ "q": term, "limit": limit, "tags": tags }));
    })
}

// Runs ahead of every /admin route.
fn require_key<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
    Box::pin(async move {
        match ctx.header("x-api-key") {
            Some("secret") => {
                ctx.set("caller", "admin".to_owned());
                next.run(ctx).await;
            }
            _ => ctx.error(StatusCode::UNAUTHORIZED, "missing or invalid api key"),
        }
    })
}

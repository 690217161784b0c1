//! Request-scope context middleware
//!
//! Establishes the [`OperationContext`] for the lifetime of one HTTP request,
//! before any handler runs. The authentication layer (external to this crate)
//! inserts a [`CurrentActor`] into request extensions; this middleware
//! combines it with transport metadata and wraps the remaining stack in
//! [`scope`](super::scope).

use axum::{extract::Request, middleware::Next, response::Response};

use super::{OperationContext, scope};

/// Authenticated identity injected into request extensions by the auth layer.
#[derive(Debug, Clone)]
pub struct CurrentActor {
    pub id: String,
    pub tenant_id: Option<String>,
    pub cross_tenant_admin: bool,
}

const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Context propagation middleware.
///
/// Requests without a [`CurrentActor`] extension run without any ambient
/// context — downstream consumers treat the absence as "no actor available"
/// rather than as an error.
pub async fn propagate_context(req: Request, next: Next) -> Response {
    let Some(actor) = req.extensions().get::<CurrentActor>().cloned() else {
        return next.run(req).await;
    };

    // Block-scoped so the `&req` capture ends before `req` is moved into
    // `next.run`; otherwise the future fails axum's `Send` bound.
    let (request_id, ip_address, user_agent) = {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let request_id =
            header(REQUEST_ID_HEADER).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        // First hop of the forwarded chain is the client address
        let ip_address = header(FORWARDED_FOR_HEADER)
            .map(|raw| raw.split(',').next().unwrap_or("").trim().to_string())
            .filter(|ip| !ip.is_empty());
        let user_agent = header(http::header::USER_AGENT.as_str());
        (request_id, ip_address, user_agent)
    };

    let mut ctx = OperationContext::for_actor(actor.id)
        .with_request_id(request_id)
        .with_cross_tenant_admin(actor.cross_tenant_admin);
    ctx.tenant_id = actor.tenant_id;
    ctx.ip_address = ip_address;
    ctx.user_agent = user_agent;

    scope(ctx, next.run(req)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use axum::{Extension, Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    fn actor() -> CurrentActor {
        CurrentActor {
            id: "user:42".to_string(),
            tenant_id: Some("tenant:7".to_string()),
            cross_tenant_admin: false,
        }
    }

    async fn describe_context() -> String {
        match context::current() {
            Some(ctx) => format!(
                "{}|{}|{}|{}",
                ctx.actor_id,
                ctx.tenant_id.as_deref().unwrap_or("-"),
                ctx.ip_address.as_deref().unwrap_or("-"),
                ctx.request_id,
            ),
            None => "none".to_string(),
        }
    }

    async fn body_string(app: Router, req: Request) -> String {
        let resp = app.oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn establishes_scope_from_actor_and_headers() {
        let app = Router::new()
            .route("/", get(describe_context))
            .layer(middleware::from_fn(propagate_context))
            .layer(Extension(actor()));

        let req = Request::builder()
            .uri("/")
            .header("x-request-id", "req-1")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        let body = body_string(app, req).await;
        assert_eq!(body, "user:42|tenant:7|203.0.113.9|req-1");
    }

    #[tokio::test]
    async fn generates_request_id_when_absent() {
        let app = Router::new()
            .route("/", get(describe_context))
            .layer(middleware::from_fn(propagate_context))
            .layer(Extension(actor()));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let body = body_string(app, req).await;
        let request_id = body.rsplit('|').next().unwrap();
        assert!(!request_id.is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_request_runs_without_context() {
        let app = Router::new()
            .route("/", get(describe_context))
            .layer(middleware::from_fn(propagate_context));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(body_string(app, req).await, "none");
    }
}

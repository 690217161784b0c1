//! Task-local context scope
//!
//! `tokio::task_local!` is the propagation channel: a value scoped over a
//! future is visible to all of its `.await` descendants and to nothing else,
//! surviving suspension and resumption on any worker thread. Nested scopes
//! shadow the outer value and restore it on exit.
//!
//! `tokio::spawn` does NOT inherit the scope — detached work must capture a
//! snapshot with [`current`] before spawning and re-establish it if needed.

use std::future::Future;
use std::sync::Arc;

use super::OperationContext;

tokio::task_local! {
    static CURRENT: Arc<OperationContext>;
}

/// Run `fut` with `ctx` as the ambient context.
///
/// Every synchronous and asynchronous descendant of `fut` observes `ctx`
/// through [`current`] for the duration of the call.
pub async fn scope<F>(ctx: OperationContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(Arc::new(ctx), fut).await
}

/// Synchronous variant of [`scope`] for non-async units of work.
pub fn sync_scope<T>(ctx: OperationContext, f: impl FnOnce() -> T) -> T {
    CURRENT.sync_scope(Arc::new(ctx), f)
}

/// The ambient context of the current unit of work, if any.
///
/// Returns `None` outside any scope (process startup, unauthenticated
/// requests). Absence means "no actor available" — each consumer decides the
/// no-context behavior explicitly; this function never fails.
pub fn current() -> Option<Arc<OperationContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

/// Tenant of the ambient context, if a context with a tenant is in scope.
pub fn current_tenant() -> Option<String> {
    CURRENT.try_with(|c| c.tenant_id.clone()).ok().flatten()
}

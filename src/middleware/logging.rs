use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::controller::{ControllerContext, HttpResponse};
use crate::router::{Middleware, Next};

/// Logs one line per request once the rest of the chain has answered.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLogger;

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(&self, ctx: &mut ControllerContext, next: Next<'_>) -> HttpResponse {
        let started = Instant::now();
        let method = ctx.req.method().to_string();
        let path = ctx.req.path().to_string();

        let response = next.run(ctx).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if response.status >= 500 {
            warn!(%method, %path, status = response.status, elapsed_ms, "request failed");
        } else {
            info!(%method, %path, status = response.status, elapsed_ms, "request");
        }
        response
    }
}

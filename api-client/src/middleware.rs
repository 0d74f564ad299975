use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use tracing::{debug, trace};

/// Logs every request going to the WeDeploy API and the status it got back
pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        debug!(%method, %url, "request");

        let res = next.run(req, extensions).await;
        match res {
            Ok(ref res) => {
                debug!(%method, %url, status = %res.status(), "response");
                trace!(headers = ?res.headers(), "response headers");
            }
            Err(ref e) => {
                debug!(%method, %url, error = %e, "request failed");
            }
        }
        res
    }
}

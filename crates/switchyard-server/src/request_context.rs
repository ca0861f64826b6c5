use axum::{extract::Request, middleware::Next, response::Response};
use switchyard_core::RequestContext;

/// Middleware that attaches a `RequestContext` to every request
///
/// Assigns the request id and captures the query string so the relay can
/// forward it upstream
pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
    let query = request
        .uri()
        .query()
        .map(|raw| {
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    let context = RequestContext::new(query);
    tracing::debug!(request_id = %context.request_id, path = %request.uri().path(), "request received");

    request.extensions_mut().insert(context);
    next.run(request).await
}

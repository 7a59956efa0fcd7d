//! Timed REST calls reported as request events.
use reqwest::{RequestBuilder, StatusCode};
use stampede::UserContext;
use stampede_core::RequestEvent;
use std::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// Any 4xx or 5xx is a failure.
pub fn status_ok(status: StatusCode, _body: &[u8]) -> Result<(), String> {
    if status.is_client_error() || status.is_server_error() {
        Err(format!("HTTP {status}"))
    } else {
        Ok(())
    }
}

/// Send `req`, run `check` on the response and report it as
/// `request_type`/`name`. Returns whether the request succeeded.
pub async fn send<F>(
    ctx: &UserContext,
    request_type: &str,
    name: &str,
    req: RequestBuilder,
    check: F,
) -> bool
where
    F: FnOnce(StatusCode, &[u8]) -> Result<(), String>,
{
    let start = Instant::now();
    let res = match req.send().await {
        Ok(res) => res,
        Err(err) => {
            ctx.fire(RequestEvent::failure(request_type, name, start.elapsed(), err.to_string()));
            return false;
        }
    };

    let status = res.status();
    let event = match res.bytes().await {
        Ok(body) => {
            let elapsed = start.elapsed();
            match check(status, &body) {
                Ok(()) => RequestEvent::success(request_type, name, elapsed, body.len()),
                Err(err) => {
                    RequestEvent::failure(request_type, name, elapsed, err).with_length(body.len())
                }
            }
        }
        Err(err) => RequestEvent::failure(request_type, name, start.elapsed(), err.to_string()),
    };

    let ok = event.is_success();
    if let Some(err) = &event.error {
        trace!("{name} failed: {err}");
    }
    ctx.fire(event);
    ok
}

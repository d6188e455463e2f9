use std::time::Instant;

use salvo::prelude::*;
use tracing::{debug, warn};

use crate::web::metrics::Metrics;

#[handler]
pub async fn log_requests(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
    ctrl: &mut FlowCtrl,
) {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    Metrics::http_request();

    ctrl.call_next(req, depot, res).await;

    let status = res.status_code.unwrap_or(StatusCode::OK);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        warn!(%method, %path, status = status.as_u16(), elapsed_ms, "request failed");
    } else {
        debug!(%method, %path, status = status.as_u16(), elapsed_ms, "request handled");
    }
}

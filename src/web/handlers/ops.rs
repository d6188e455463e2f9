use salvo::prelude::*;
use serde_json::json;

use crate::web::app_state;
use crate::web::metrics::Metrics;

#[handler]
pub async fn health_check(res: &mut Response) {
    res.render(Json(json!({ "status": "ok" })));
}

#[handler]
pub async fn get_status(depot: &mut Depot, res: &mut Response) {
    let Ok(state) = app_state(depot) else {
        res.status_code(StatusCode::SERVICE_UNAVAILABLE);
        res.render(Json(json!({ "status": "starting" })));
        return;
    };
    let dialect = state.db.dialect();
    let rate_providers = state.rates.configured();

    res.render(Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "process_uptime_seconds": Metrics::uptime_seconds(),
        "database": dialect.name(),
        "rate_providers": rate_providers,
        "requests_served": Metrics::http_requests(),
    })));
}

#[cfg(test)]
mod tests {
    use salvo::prelude::StatusCode;
    use salvo::test::{ResponseExt, TestClient};

    use crate::web::handlers::test_support::{BASE, test_app};

    #[tokio::test]
    async fn ops_endpoints_are_public() {
        let app = test_app().await;

        let (status, body) = app.call("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = app.call("GET", "/status", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "sqlite");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

        let mut res = TestClient::get(format!("{BASE}/metrics"))
            .send(&app.service)
            .await;
        let text = res.take_string().await.unwrap();
        assert!(text.contains("finance_http_requests_total"));
    }
}

use waymark_shared::{LocationsPage, SaveLocationRequest, error_message};

use crate::auth;

/// How many history rows the boot-time fetch asks for.
pub const HISTORY_FETCH_LIMIT: usize = 20;

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// POST one fix to the backend. The caller decides how loudly to fail.
pub async fn save_location(req: &SaveLocationRequest) -> Result<(), String> {
    let token = auth::require_token().ok_or("missing auth token")?;

    let resp = gloo_net::http::Request::post("/api/location")
        .header("Authorization", &bearer(&token))
        .json(req)
        .map_err(|e| format!("encode error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        let body = resp.text().await.unwrap_or_default();
        return Err(error_message(&body).unwrap_or_else(|| format!("HTTP {}", resp.status())));
    }
    Ok(())
}

/// Fetch the most recent stored locations, newest first.
pub async fn fetch_locations(limit: usize) -> Result<LocationsPage, String> {
    let token = auth::require_token().ok_or("missing auth token")?;
    let url = format!("/api/locations?limit={limit}");

    let resp = gloo_net::http::Request::get(&url)
        .header("Authorization", &bearer(&token))
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        let body = resp.text().await.unwrap_or_default();
        return Err(error_message(&body).unwrap_or_else(|| format!("HTTP {}", resp.status())));
    }

    resp.json::<LocationsPage>()
        .await
        .map_err(|e| format!("parse error: {e}"))
}

/// Connectivity probe against /api/health. Any 2xx counts as reachable;
/// a body is accepted but not required.
pub async fn health_ok() -> bool {
    let Ok(resp) = gloo_net::http::Request::get("/api/health").send().await else {
        return false;
    };
    if !resp.ok() {
        return false;
    }
    // Tolerate both empty and JSON bodies from older server builds.
    let _ = resp.json::<serde_json::Value>().await;
    true
}

use crate::models::context::ContextPointer;
use media_fetch_client::{CacheStats, GuardStats};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;

#[derive(Serialize)]
pub struct CacheStatsResponse {
    pub cache_stats: CacheStats,
    pub in_flight: GuardStats,
    pub cache_enabled: bool,
}

/// Get current cache statistics
#[get("/cache-stats")]
pub fn cache_stats(context: &State<ContextPointer>) -> Json<CacheStatsResponse> {
    let client = context.media_client();
    Json(CacheStatsResponse {
        cache_stats: client.cache_stats(),
        in_flight: client.guard_stats(),
        cache_enabled: client.config().cache.enabled,
    })
}

/// Clear the cache (useful for debugging/admin)
#[post("/cache/clear")]
pub fn clear_cache(context: &State<ContextPointer>) -> Status {
    context.media_client().clear_cache();
    Status::NoContent
}

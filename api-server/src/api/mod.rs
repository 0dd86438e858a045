pub mod cache_stats;
pub mod cors;
pub mod download;
pub mod error;
pub mod progress;
pub mod video_info;

use crate::models::context::ContextPointer;
use rocket::{Build, Rocket, Route};
use serde::Deserialize;

/// Request body shared by the media routes
#[derive(Deserialize, Debug)]
pub struct VideoUrl {
    pub url: String,
}

pub fn routes() -> Vec<Route> {
    routes![
        video_info::video_info,
        download::download,
        progress::progress,
        cache_stats::cache_stats,
        cache_stats::clear_cache,
        cors::preflight,
    ]
}

pub fn build(context: ContextPointer) -> Rocket<Build> {
    rocket::build()
        .manage(context)
        .attach(cors::Cors)
        .mount("/", routes())
}

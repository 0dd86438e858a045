use super::VideoUrl;
use crate::models::context::ContextPointer;
use media_fetch_client::progress::ProgressState;
use rocket::serde::json::Json;
use rocket::State;

/// Progress of an active download, 404 when none is running
#[post("/progress", data = "<video>")]
pub fn progress(video: Json<VideoUrl>, context: &State<ContextPointer>) -> Option<Json<ProgressState>> {
    context.media_client().progress(&video.url).map(Json)
}

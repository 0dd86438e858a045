use super::error::ApiError;
use super::VideoUrl;
use crate::models::context::ContextPointer;
use media_fetch_client::utils::precise_duration;
use media_fetch_client::VideoInfo;
use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct VideoInfoResponse {
    pub title: String,
    pub duration: String,
    pub thumbnail: String,
    pub format: String,
    pub valid: bool,
}

impl From<VideoInfo> for VideoInfoResponse {
    fn from(info: VideoInfo) -> Self {
        let valid = info.valid();
        let metadata = info.metadata();
        Self {
            title: metadata.title().clone(),
            duration: precise_duration(metadata.duration_seconds().unwrap_or_default()),
            thumbnail: metadata.thumbnail_url().clone().unwrap_or_default(),
            format: metadata.format().clone(),
            valid,
        }
    }
}

#[post("/video-info", data = "<video>")]
pub async fn video_info(
    video: Json<VideoUrl>,
    context: &State<ContextPointer>,
) -> Result<Json<VideoInfoResponse>, ApiError> {
    let info = context.media_client().get_metadata(&video.url).await?;
    Ok(Json(info.into()))
}

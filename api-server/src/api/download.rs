use super::error::ApiError;
use super::VideoUrl;
use crate::models::context::ContextPointer;
use media_fetch_client::MediaDownload;
use rocket::http::ContentType;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::{Request, State};
use tokio_util::io::StreamReader;

/// Streams a download as an attachment
pub struct DownloadResponse(MediaDownload);

impl<'r> Responder<'r, 'static> for DownloadResponse {
    fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'static> {
        let download = self.0;
        let content_type =
            ContentType::parse_flexible(download.content_type()).unwrap_or(ContentType::Binary);
        let disposition = content_disposition(download.filename());

        Response::build()
            .header(content_type)
            .raw_header("Content-Disposition", disposition)
            .streamed_body(StreamReader::new(download.into_body()))
            .ok()
    }
}

/// `attachment` with an ASCII `filename` and, for other names, a UTF-8 `filename*`
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    if fallback == filename {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    }
}

#[post("/download", data = "<video>")]
pub async fn download(
    video: Json<VideoUrl>,
    context: &State<ContextPointer>,
) -> Result<DownloadResponse, ApiError> {
    let download = context.media_client().fetch_media(&video.url).await?;
    Ok(DownloadResponse(download))
}

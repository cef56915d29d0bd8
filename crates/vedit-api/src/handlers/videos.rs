//! Video API handlers.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};
use validator::Validate;

use vedit_media::fs_utils::remove_if_exists;
use vedit_models::timestamp::deserialize_seconds;
use vedit_models::{JobId, UploadedFile, VideoId, VideoRecord};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Multipart field carrying the upload.
const UPLOAD_FIELD: &str = "video";

/// Trim request.
#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrimRequest {
    /// Seconds, or `HH:MM:SS(.mmm)` / `MM:SS`
    #[serde(alias = "start_time", deserialize_with = "deserialize_seconds")]
    #[schemars(with = "f64")]
    #[validate(range(min = 0.0))]
    pub start_time: f64,
    #[serde(alias = "end_time", deserialize_with = "deserialize_seconds")]
    #[schemars(with = "f64")]
    #[validate(range(min = 0.0))]
    pub end_time: f64,
}

/// Subtitle overlay request.
#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[serde(alias = "start_time", deserialize_with = "deserialize_seconds")]
    #[schemars(with = "f64")]
    #[validate(range(min = 0.0))]
    pub start_time: f64,
    #[serde(alias = "end_time", deserialize_with = "deserialize_seconds")]
    #[schemars(with = "f64")]
    #[validate(range(min = 0.0))]
    pub end_time: f64,
}

/// Render acknowledgment.
#[derive(Debug, Serialize, JsonSchema)]
pub struct RenderResponse {
    pub message: String,
    pub job_id: JobId,
    pub video_id: VideoId,
}

/// Upload a video (multipart field `video`).
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<VideoRecord>)> {
    let mut uploaded: Option<UploadedFile> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("upload.mp4").to_string();
        let path = state.layout().upload_path(&name);
        let size = match store_field(&mut field, &path).await {
            Ok(size) => size,
            Err(e) => {
                remove_if_exists(&path).await.ok();
                return Err(e);
            }
        };
        if size == 0 {
            remove_if_exists(&path).await.ok();
            return Err(ApiError::bad_request("Uploaded video file is empty."));
        }

        uploaded = Some(UploadedFile {
            name,
            size,
            path: path.to_string_lossy().into_owned(),
        });
        break;
    }

    let file = uploaded.ok_or_else(|| ApiError::bad_request("Please upload a video file."))?;
    let stored = file.path.clone();

    match state.videos.upload(file).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(e) => {
            remove_if_exists(&stored).await.ok();
            Err(e.into())
        }
    }
}

/// Stream one multipart field to disk, returning the byte count.
async fn store_field(field: &mut Field<'_>, path: &FsPath) -> ApiResult<u64> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    }
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        size += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(size)
}

/// Get a video record.
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<VideoRecord>> {
    let record = state.videos.get(&VideoId::from_string(video_id)).await?;
    Ok(Json(record))
}

/// Trim the working artifact.
pub async fn trim_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    payload: Result<Json<TrimRequest>, JsonRejection>,
) -> ApiResult<Json<VideoRecord>> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    request.validate()?;

    let record = state
        .videos
        .trim(
            &VideoId::from_string(video_id),
            request.start_time,
            request.end_time,
        )
        .await?;
    Ok(Json(record))
}

/// Burn a subtitle into the working artifact.
pub async fn add_subtitles(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    payload: Result<Json<SubtitleRequest>, JsonRejection>,
) -> ApiResult<Json<VideoRecord>> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    request.validate()?;

    let record = state
        .videos
        .add_subtitles(
            &VideoId::from_string(video_id),
            &request.text,
            request.start_time,
            request.end_time,
        )
        .await?;
    Ok(Json(record))
}

/// Queue the final render.
pub async fn render_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<(StatusCode, Json<RenderResponse>)> {
    let accepted = state.videos.render(&VideoId::from_string(video_id)).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RenderResponse {
            message: "Render job submitted successfully.".to_string(),
            job_id: accepted.job_id,
            video_id: accepted.video_id,
        }),
    ))
}

/// Download the rendered video as an attachment.
pub async fn download_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    request: Request<Body>,
) -> ApiResult<Response> {
    let id = VideoId::from_string(video_id);
    let path = state.videos.download(&id).await?;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        warn!(video_id = %id, path = %path.display(), "Rendered file missing on disk");
        return Err(ApiError::not_found("Video file not found for download."));
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("video.mp4")
        .to_string();

    let response = ServeFile::new(&path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    let mut response = response.map(Body::new).into_response();

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);

    info!(video_id = %id, file = %file_name, "Serving rendered video");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_request_accepts_numbers_and_timestamps() {
        let req: TrimRequest =
            serde_json::from_str(r#"{"startTime": 5, "endTime": "00:00:15"}"#).unwrap();
        assert_eq!(req.start_time, 5.0);
        assert_eq!(req.end_time, 15.0);

        let req: TrimRequest =
            serde_json::from_str(r#"{"start_time": "01:30", "end_time": 120.5}"#).unwrap();
        assert_eq!(req.start_time, 90.0);
        assert_eq!(req.end_time, 120.5);
    }

    #[test]
    fn test_trim_request_requires_both_times() {
        assert!(serde_json::from_str::<TrimRequest>(r#"{"startTime": 5}"#).is_err());
        assert!(serde_json::from_str::<TrimRequest>(r#"{"startTime": -1, "endTime": 2}"#).is_err());
    }

    #[test]
    fn test_subtitle_request_rejects_empty_text() {
        let req: SubtitleRequest =
            serde_json::from_str(r#"{"text": "", "startTime": 1, "endTime": 2}"#).unwrap();
        assert!(req.validate().is_err());

        let req: SubtitleRequest =
            serde_json::from_str(r#"{"text": "Hello", "startTime": 1, "endTime": 2}"#).unwrap();
        assert!(req.validate().is_ok());
    }
}

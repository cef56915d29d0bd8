//! Coordinator and HTTP surface against in-memory backends and a scripted
//! transcoder.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vedit_api::{create_router, ApiConfig, AppState, Backends, PipelineError};
use vedit_media::{ArtifactLayout, MediaExecutor, MediaResult};
use vedit_models::{EditOperation, JobId, UploadedFile, VideoId, VideoRecord, VideoStatus};
use vedit_queue::{JobBroker, JobKind, MemoryJobQueue, QueueConfig, RenderJob};
use vedit_store::{MemoryVideoLock, MemoryVideoRepository, StoreConfig, VideoPatch, VideoRepository};
use vedit_worker::WorkerConfig;

/// Writes `<op> <- <input>` to the output so tests can trace lineage.
#[derive(Default)]
struct ScriptedMedia {
    calls: Mutex<Vec<(String, PathBuf, PathBuf)>>,
    delay: Duration,
}

impl ScriptedMedia {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaExecutor for ScriptedMedia {
    async fn execute(&self, input: &Path, op: &EditOperation, output: &Path) -> MediaResult<()> {
        self.calls.lock().unwrap().push((
            op.as_str().to_string(),
            input.to_path_buf(),
            output.to_path_buf(),
        ));
        tokio::time::sleep(self.delay).await;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, format!("{} <- {}", op.as_str(), input.display())).await?;
        Ok(())
    }

    async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
        Ok(60.0)
    }
}

struct Harness {
    dir: TempDir,
    state: AppState,
    media: Arc<ScriptedMedia>,
    queue: Arc<MemoryJobQueue>,
    videos: Arc<MemoryVideoRepository>,
}

impl Harness {
    fn new() -> Self {
        Self::with_media(ScriptedMedia::default(), Duration::from_millis(200))
    }

    fn with_media(media: ScriptedMedia, lock_wait: Duration) -> Self {
        let dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("uploads"), dir.path().join("rendered"));
        std::fs::create_dir_all(layout.uploads_dir()).unwrap();
        std::fs::create_dir_all(layout.rendered_dir()).unwrap();

        let media = Arc::new(media);
        let queue = Arc::new(MemoryJobQueue::new(QueueConfig::default()));
        let videos = Arc::new(MemoryVideoRepository::new());

        let backends = Backends {
            videos: videos.clone(),
            locks: Arc::new(MemoryVideoLock::new()),
            media: media.clone(),
            queue: queue.clone(),
            layout,
            store_config: StoreConfig {
                lock_wait,
                ..StoreConfig::default()
            },
        };

        Self {
            state: AppState::with_backends(ApiConfig::default(), backends),
            dir,
            media,
            queue,
            videos,
        }
    }

    fn router(&self) -> Router {
        create_router(self.state.clone(), None)
    }

    async fn upload(&self) -> VideoRecord {
        let path = self.state.layout().upload_path("clip.mp4");
        tokio::fs::write(&path, vec![0u8; 1_000_000]).await.unwrap();
        self.state
            .videos
            .upload(UploadedFile {
                name: "clip.mp4".to_string(),
                size: 1_000_000,
                path: path.to_string_lossy().into_owned(),
            })
            .await
            .unwrap()
    }

    async fn stored(&self, id: &VideoId) -> VideoRecord {
        self.videos.get(id).await.unwrap().unwrap()
    }

    /// Run the embedded workers until both queues are empty.
    async fn run_workers(&self) {
        let workers = self.state.workers(WorkerConfig::default()).unwrap();
        workers.render().drain(Duration::from_millis(50)).await.unwrap();
        workers.notify().drain(Duration::from_millis(50)).await.unwrap();
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

fn json_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// Coordinator
// ============================================================================

#[tokio::test]
async fn upload_creates_uploaded_record() {
    let h = Harness::new();
    let record = h.upload().await;

    assert_eq!(record.status, VideoStatus::Uploaded);
    assert_eq!(record.name, "clip.mp4");
    assert_eq!(record.size, 1_000_000);
    assert_eq!(record.duration, Some(60.0));
    assert!(Path::new(&record.original_path).exists());
    assert!(record.edited_path.is_none());
    assert!(record.final_path.is_none());
    assert_eq!(h.stored(&record.id).await, record);
}

#[tokio::test]
async fn trim_sets_edited_path_and_keeps_original() {
    let h = Harness::new();
    let record = h.upload().await;

    let trimmed = h.state.videos.trim(&record.id, 5.0, 15.0).await.unwrap();

    let edited = trimmed.edited_path.clone().expect("edited path");
    assert!(Path::new(&edited)
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("trimmed_"));
    assert_eq!(trimmed.original_path, record.original_path);
    assert_eq!(trimmed.status, VideoStatus::Uploaded);
    assert!(trimmed.version > record.version);

    let calls = h.media.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "trim");
    assert_eq!(calls[0].1, PathBuf::from(&record.original_path));
}

#[tokio::test]
async fn subtitles_apply_to_trimmed_artifact() {
    let h = Harness::new();
    let record = h.upload().await;

    let trimmed = h.state.videos.trim(&record.id, 5.0, 15.0).await.unwrap();
    let subtitled = h
        .state
        .videos
        .add_subtitles(&record.id, "Hello", 1.0, 3.0)
        .await
        .unwrap();

    let calls = h.media.calls();
    assert_eq!(calls[1].0, "overlay_text");
    assert_eq!(calls[1].1, PathBuf::from(trimmed.edited_path.unwrap()));
    assert_ne!(subtitled.edited_path, None);
    assert_eq!(subtitled.original_path, record.original_path);
}

#[tokio::test]
async fn invalid_edits_are_rejected_before_transcoding() {
    let h = Harness::new();
    let record = h.upload().await;

    let err = h.state.videos.trim(&record.id, 10.0, 10.0).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let err = h
        .state
        .videos
        .add_subtitles(&record.id, "   ", 1.0, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    assert!(h.media.calls().is_empty());
    assert_eq!(h.stored(&record.id).await, record);
}

#[tokio::test]
async fn download_distinguishes_not_found_from_not_ready() {
    let h = Harness::new();
    let record = h.upload().await;

    let err = h.state.videos.download(&record.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotReady(_)));

    let err = h
        .state
        .videos
        .download(&VideoId::from_string("no-such-video"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn render_marks_processing_and_blocks_edits() {
    let h = Harness::new();
    let record = h.upload().await;

    let accepted = h.state.videos.render(&record.id).await.unwrap();

    let stored = h.stored(&record.id).await;
    assert_eq!(stored.status, VideoStatus::Processing);
    assert_eq!(stored.render_job_id, Some(accepted.job_id.clone()));
    assert_eq!(stored.status_before_render, Some(VideoStatus::Uploaded));
    assert_eq!(h.queue.len(JobKind::Render).await.unwrap(), 1);

    let err = h.state.videos.render(&record.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Conflict(_)));

    let err = h.state.videos.trim(&record.id, 1.0, 2.0).await.unwrap_err();
    assert!(matches!(err, PipelineError::Conflict(_)));

    let err = h.state.videos.download(&record.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotReady(_)));
    assert_eq!(h.queue.len(JobKind::Render).await.unwrap(), 1);
}

#[tokio::test]
async fn rejected_enqueue_reverts_the_record() {
    let h = Harness::new();
    let record = h.upload().await;

    // An outstanding render job holds the video's dedup key
    h.queue
        .enqueue(RenderJob::new(record.id.clone()).into())
        .await
        .unwrap();

    let err = h.state.videos.render(&record.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Conflict(_)));

    let stored = h.stored(&record.id).await;
    assert_eq!(stored.status, VideoStatus::Uploaded);
    assert_eq!(stored.render_job_id, None);
    assert_eq!(stored.status_before_render, None);
}

#[tokio::test]
async fn orphaned_render_claim_is_released() {
    let h = Harness::new();
    let record = h.upload().await;

    // Marked processing, but the process died before the job was queued
    h.videos
        .update(
            &record.id,
            &VideoPatch::new()
                .status(VideoStatus::Processing)
                .render_job_id(Some(JobId::new()))
                .status_before_render(Some(VideoStatus::Uploaded)),
        )
        .await
        .unwrap();

    let trimmed = h.state.videos.trim(&record.id, 1.0, 2.0).await.unwrap();
    assert_eq!(trimmed.status, VideoStatus::Uploaded);
    assert_eq!(trimmed.render_job_id, None);
    assert_eq!(trimmed.status_before_render, None);
    assert!(trimmed.edited_path.is_some());

    let accepted = h.state.videos.render(&record.id).await.unwrap();
    assert_eq!(h.stored(&record.id).await.render_job_id, Some(accepted.job_id));
    assert_eq!(h.queue.len(JobKind::Render).await.unwrap(), 1);
}

#[tokio::test]
async fn dead_lettered_render_without_cleanup_does_not_block_the_video() {
    let h = Harness::new();
    let record = h.upload().await;
    let first = h.state.videos.render(&record.id).await.unwrap();

    // Dead-lettered, and the record restore never ran
    let delivery = h
        .queue
        .consume(JobKind::Render, "crashed", 10, 1)
        .await
        .unwrap()
        .remove(0);
    h.queue.dead_letter(&delivery, "ffmpeg exploded").await.unwrap();
    assert_eq!(h.stored(&record.id).await.status, VideoStatus::Processing);

    let second = h.state.videos.render(&record.id).await.unwrap();
    assert_ne!(second.job_id, first.job_id);

    let stored = h.stored(&record.id).await;
    assert_eq!(stored.status, VideoStatus::Processing);
    assert_eq!(stored.render_job_id, Some(second.job_id));
    assert_eq!(stored.status_before_render, Some(VideoStatus::Uploaded));
}

#[tokio::test]
async fn concurrent_edits_are_serialized() {
    let h = Harness::with_media(
        ScriptedMedia::slow(Duration::from_millis(60)),
        Duration::from_secs(2),
    );
    let record = h.upload().await;

    let (trimmed, subtitled) = tokio::join!(
        h.state.videos.trim(&record.id, 5.0, 15.0),
        h.state.videos.add_subtitles(&record.id, "Hello", 1.0, 3.0),
    );
    trimmed.unwrap();
    subtitled.unwrap();

    // Whichever edit ran second worked on the first one's output
    let calls = h.media.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, PathBuf::from(&record.original_path));
    assert_eq!(calls[1].1, calls[0].2);

    let stored = h.stored(&record.id).await;
    assert_eq!(stored.edited_path, Some(calls[1].2.to_string_lossy().into_owned()));
    assert_eq!(stored.version, record.version + 2);
    let content = tokio::fs::read_to_string(&calls[1].2).await.unwrap();
    assert!(content.ends_with(&calls[0].2.display().to_string()));
}

#[tokio::test]
async fn edit_waiting_past_lock_wait_conflicts_without_writing() {
    let h = Harness::with_media(
        ScriptedMedia::slow(Duration::from_millis(400)),
        Duration::from_millis(100),
    );
    let record = h.upload().await;

    let (trimmed, subtitled) = tokio::join!(
        h.state.videos.trim(&record.id, 5.0, 15.0),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.state.videos.add_subtitles(&record.id, "Hello", 1.0, 3.0).await
        },
    );

    let trimmed = trimmed.unwrap();
    assert!(matches!(subtitled.unwrap_err(), PipelineError::Conflict(_)));
    assert_eq!(h.media.calls().len(), 1);
    assert_eq!(h.stored(&record.id).await, trimmed);
}

#[tokio::test]
async fn render_completes_through_embedded_workers() {
    let h = Harness::new();
    let record = h.upload().await;
    let trimmed = h.state.videos.trim(&record.id, 5.0, 15.0).await.unwrap();

    h.state.videos.render(&record.id).await.unwrap();
    h.run_workers().await;

    let stored = h.stored(&record.id).await;
    assert_eq!(stored.status, VideoStatus::Rendered);
    let final_path = h.state.videos.download(&record.id).await.unwrap();
    assert_eq!(Some(final_path.to_string_lossy().into_owned()), stored.final_path);
    assert!(final_path.starts_with(h.dir.path().join("rendered")));

    let render_call = h.media.calls().pop().unwrap();
    assert_eq!(render_call.0, "final_render");
    assert_eq!(render_call.1, PathBuf::from(trimmed.edited_path.unwrap()));

    assert_eq!(h.queue.len(JobKind::Render).await.unwrap(), 0);
    assert_eq!(h.queue.len(JobKind::Notify).await.unwrap(), 0);
    assert_eq!(h.queue.dlq_len(JobKind::Render).await.unwrap(), 0);

    // A rendered video can be edited and rendered again
    h.state.videos.add_subtitles(&record.id, "Again", 0.0, 1.0).await.unwrap();
    h.state.videos.render(&record.id).await.unwrap();
}

// ============================================================================
// HTTP
// ============================================================================

#[tokio::test]
async fn http_upload_returns_created_record() {
    let h = Harness::new();
    let boundary = "vedit-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"clip.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&[7u8; 4096]);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/video/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, _, body) = send(h.router(), request).await;
    assert_eq!(status, StatusCode::CREATED);

    let record: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(record["status"], "uploaded");
    assert_eq!(record["name"], "clip.mp4");
    assert_eq!(record["size"], 4096);
    assert!(record["edited_path"].is_null());
    assert!(Path::new(record["original_path"].as_str().unwrap()).exists());
}

#[tokio::test]
async fn http_upload_without_file_is_bad_request() {
    let h = Harness::new();
    let boundary = "vedit-test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/video/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, _, body) = send(h.router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "bad_request");
}

#[tokio::test]
async fn http_trim_validates_times() {
    let h = Harness::new();
    let record = h.upload().await;
    let uri = format!("/api/video/{}/trim", record.id);

    let (status, _, body) = send(h.router(), json_post(&uri, r#"{"startTime":10,"endTime":10}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "validation_error");

    let (status, _, _) = send(h.router(), json_post(&uri, r#"{"startTime":10}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(
        h.router(),
        json_post(&uri, r#"{"startTime":"00:00:05","endTime":15}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updated: Value = serde_json::from_slice(&body).unwrap();
    assert!(updated["edited_path"].as_str().unwrap().contains("trimmed_"));
}

#[tokio::test]
async fn http_render_and_download_flow() {
    let h = Harness::new();
    let record = h.upload().await;

    let (status, _, body) = send(h.router(), get(&format!("/api/video/{}/download", record.id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "not_ready");

    let (status, _, body) = send(h.router(), get("/api/video/unknown-id/download")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "not_found");

    let render_uri = format!("/api/video/{}/render", record.id);
    let (status, _, body) = send(h.router(), json_post(&render_uri, "")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let accepted: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(accepted["video_id"], record.id.as_str());
    assert!(accepted["job_id"].as_str().is_some());

    let (status, _, _) = send(h.router(), json_post(&render_uri, "")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    h.run_workers().await;

    let (status, _, body) = send(h.router(), get(&format!("/api/video/{}", record.id))).await;
    assert_eq!(status, StatusCode::OK);
    let stored: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stored["status"], "rendered");

    let (status, headers, body) =
        send(h.router(), get(&format!("/api/video/{}/download", record.id))).await;
    assert_eq!(status, StatusCode::OK);
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("final_"));
    assert!(String::from_utf8(body).unwrap().starts_with("final_render <- "));
}

#[tokio::test]
async fn http_operator_routes() {
    let h = Harness::new();

    let (status, headers, _) = send(h.router(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));

    let (status, _, body) = send(h.router(), get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    let ready: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(ready["status"], "ready");

    let (status, _, body) = send(h.router(), get("/api/admin/dead-letters/render")).await;
    assert_eq!(status, StatusCode::OK);
    let dlq: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(dlq["kind"], "render");
    assert_eq!(dlq["entries"].as_array().unwrap().len(), 0);

    let (status, _, _) = send(h.router(), get("/api/admin/dead-letters/bogus")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(h.router(), get("/api-docs/schema.json")).await;
    assert_eq!(status, StatusCode::OK);
    let schema: Value = serde_json::from_slice(&body).unwrap();
    assert!(schema["schemas"]["VideoRecord"].is_object());
}

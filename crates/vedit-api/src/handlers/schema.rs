//! JSON schemas of the public request and response models.

use axum::Json;
use schemars::schema_for;
use serde_json::{json, Value};

use vedit_models::{VideoRecord, VideoStatus};

use super::videos::{RenderResponse, SubtitleRequest, TrimRequest};

pub async fn api_schema() -> Json<Value> {
    Json(json!({
        "title": "vedit API",
        "version": env!("CARGO_PKG_VERSION"),
        "schemas": {
            "VideoRecord": schema_for!(VideoRecord),
            "VideoStatus": schema_for!(VideoStatus),
            "TrimRequest": schema_for!(TrimRequest),
            "SubtitleRequest": schema_for!(SubtitleRequest),
            "RenderResponse": schema_for!(RenderResponse),
        }
    }))
}

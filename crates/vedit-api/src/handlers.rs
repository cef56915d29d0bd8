//! Route handlers, grouped by audience.

pub mod admin;
pub mod health;
pub mod schema;
pub mod videos;

pub use admin::list_dead_letters;
pub use health::{health, ready};
pub use schema::api_schema;
pub use videos::{
    add_subtitles, download_video, get_video, render_video, trim_video, upload_video,
};

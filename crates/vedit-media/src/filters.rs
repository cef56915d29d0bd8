//! FFmpeg `drawtext` filter construction for subtitle overlays.

use vedit_models::TimeWindow;

/// Characters that must be backslash-escaped inside a drawtext value.
const DRAWTEXT_SPECIAL: [char; 7] = ['\\', ':', '\'', '"', '%', '[', ']'];

/// Escape text for use as a drawtext `text='...'` value.
///
/// Every occurrence of `\ : ' " % [ ]` gets a backslash prefix. Doing this
/// in a single pass is equivalent to escaping the backslash first, so
/// escapes introduced for the other characters are never doubled.
pub fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if DRAWTEXT_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Styling for burned-in subtitle text.
#[derive(Debug, Clone)]
pub struct DrawTextOptions {
    /// Font file; ffmpeg falls back to fontconfig when unset
    pub font_file: Option<String>,
    pub font_size: u32,
    pub font_color: String,
    /// Horizontal position expression
    pub x: String,
    /// Vertical position expression
    pub y: String,
    pub shadow_color: String,
    pub shadow_x: i32,
    pub shadow_y: i32,
}

impl Default for DrawTextOptions {
    fn default() -> Self {
        Self {
            font_file: None,
            font_size: 30,
            font_color: "white".to_string(),
            // centred horizontally, 10px above the bottom edge
            x: "(w-tw)/2".to_string(),
            y: "h-th-10".to_string(),
            shadow_color: "black".to_string(),
            shadow_x: 2,
            shadow_y: 2,
        }
    }
}

impl DrawTextOptions {
    /// Use a specific font file.
    pub fn with_font_file(mut self, font_file: Option<String>) -> Self {
        self.font_file = font_file;
        self
    }
}

/// Build a `drawtext` filter showing `text` while `t` is inside `window`.
pub fn build_drawtext_filter(text: &str, window: &TimeWindow, options: &DrawTextOptions) -> String {
    let mut filter = String::from("drawtext=");

    if let Some(font_file) = &options.font_file {
        filter.push_str(&format!("fontfile='{}':", escape_drawtext(font_file)));
    }

    filter.push_str(&format!(
        "text='{}':fontsize={}:fontcolor={}:x={}:y={}:shadowcolor={}:shadowx={}:shadowy={}",
        escape_drawtext(text),
        options.font_size,
        options.font_color,
        options.x,
        options.y,
        options.shadow_color,
        options.shadow_x,
        options.shadow_y,
    ));

    filter.push_str(&format!(
        ":enable='between(t,{},{})'",
        window.start, window.end
    ));

    filter
}

use std::path::Path;

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TranscribeRequest {
    /// Absolute path to the recorded audio file (webm, ogg, mp3, m4a, wav, flac).
    pub audio_path: String,
    /// MIME type of the recording. Inferred from the file extension when omitted.
    pub mime_type: Option<String>,
    /// ISO-639-1 language of the speech (default "nl").
    pub language: Option<String>,
    /// Vocabulary hint, e.g. anatomical terms expected in the recording.
    pub prompt: Option<String>,
    /// Sampling temperature: 0.0 to 1.0 (default 0.0).
    pub temperature: Option<f64>,
}

/// File extension → MIME type for recordings passed by path.
const EXTENSION_MIMES: &[(&str, &str)] = &[
    ("webm", "audio/webm"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/ogg"),
    ("mp3", "audio/mpeg"),
    ("mpga", "audio/mpeg"),
    ("mpeg", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("mp4", "audio/mp4"),
    ("wav", "audio/wav"),
    ("flac", "audio/flac"),
];

impl TranscribeRequest {
    /// Declared type, else inferred from the extension, else empty (the
    /// client then uploads with its default extension).
    pub fn mime_type(&self) -> String {
        if let Some(mime) = self.mime_type.as_deref().filter(|m| !m.trim().is_empty()) {
            return mime.trim().to_string();
        }
        mime_for_path(Path::new(&self.audio_path))
            .unwrap_or_default()
            .to_string()
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_MIMES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

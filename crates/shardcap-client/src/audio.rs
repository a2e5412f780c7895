use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use error_stack::ResultExt as _;

use crate::error::{ClientError, Result};

/// Best-effort audio MIME detection from magic bytes.
///
/// Compressed sources are forwarded to the endpoint as-is, so the MIME type
/// comes from the bytes, not the file extension. Unknown content falls back
/// to `audio/wav`.
pub fn detect_audio_mime(data: &[u8]) -> &'static str {
    if data.starts_with(b"fLaC") {
        "audio/flac"
    } else if data.starts_with(b"ID3") || data.starts_with(&[0xff, 0xfb]) {
        "audio/mpeg"
    } else if data.starts_with(b"OggS") {
        "audio/ogg"
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WAVE") {
        "audio/wav"
    } else if data.get(4..8) == Some(b"ftyp") {
        "audio/mp4"
    } else {
        "audio/wav"
    }
}

/// Encode raw audio bytes as a `data:` URL for the chat-completions payload.
pub fn to_data_url(data: &[u8], mime: &str) -> String {
    let b64 = BASE64_STANDARD.encode(data);
    format!("data:{mime};base64,{b64}")
}

/// Read an audio file and sniff its MIME type.
pub fn load_audio_bytes(path: &Path) -> Result<(Vec<u8>, &'static str)> {
    let data = std::fs::read(path)
        .change_context_lazy(|| ClientError::Audio(path.to_owned()))?;
    let mime = detect_audio_mime(&data);
    Ok((data, mime))
}

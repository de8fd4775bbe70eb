use std::path::Path;

/// Classification of a file by sniffed content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Unsupported,
}

/// Image containers this tool handles. Sony ARW is TIFF-framed and sniffs
/// as `image/tiff`; Canon CR2 has its own signature.
const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/heif",
    "image/heic",
    "image/x-canon-cr2",
];

const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
];

/// Classify a file by its magic bytes, never by extension. Unreadable or
/// unrecognized files are Unsupported; callers skip them silently.
pub fn classify(path: &Path) -> MediaKind {
    let detected = match infer::get_from_path(path) {
        Ok(Some(detected)) => detected,
        _ => return MediaKind::Unsupported,
    };

    let mime = detected.mime_type();
    if IMAGE_MIME_TYPES.contains(&mime) {
        MediaKind::Image
    } else if VIDEO_MIME_TYPES.contains(&mime) {
        MediaKind::Video
    } else {
        MediaKind::Unsupported
    }
}

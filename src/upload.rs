use std::path::{Path, PathBuf};

use axum::{
    body::Bytes,
    extract::multipart::{Field, MultipartError},
    http::StatusCode,
};
use chrono::Utc;
use rand::Rng;
use thiserror::Error;

use crate::error::AppError;

/// Media types accepted for profile photos.
pub const PROFILE_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Multipart field that carries the profile photo.
pub const PROFILE_PHOTO_FIELD: &str = "photo";

const PROFILE_FILE_PREFIX: &str = "profile";

/// Why the upload gate refused a file part.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("unsupported media type: {declared}")]
    UnsupportedMediaType { declared: String },
    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
}

/// UploadPolicy
///
/// Allow-list plus size cap for one kind of upload. Both checks are plain
/// synchronous predicates so they can run before any bytes hit the disk.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    allowed: &'static [&'static str],
    max_bytes: usize,
    prefix: &'static str,
}

impl UploadPolicy {
    pub fn profile_photo(max_bytes: usize) -> Self {
        Self {
            allowed: PROFILE_MEDIA_TYPES,
            max_bytes,
            prefix: PROFILE_FILE_PREFIX,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Accepts the declared type iff its essence (parameters stripped, case
    /// ignored) is on the allow-list. A part without a type is rejected.
    pub fn check_media_type(&self, declared: Option<&str>) -> Result<(), UploadRejection> {
        let declared = declared.unwrap_or_default();
        let essence = declared.split(';').next().unwrap_or_default().trim();

        if self
            .allowed
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(essence))
        {
            Ok(())
        } else {
            Err(UploadRejection::UnsupportedMediaType {
                declared: if declared.is_empty() {
                    "none".to_string()
                } else {
                    declared.to_string()
                },
            })
        }
    }

    pub fn check_size(&self, size: usize) -> Result<(), UploadRejection> {
        if size <= self.max_bytes {
            Ok(())
        } else {
            Err(UploadRejection::PayloadTooLarge {
                limit: self.max_bytes,
            })
        }
    }

    /// `profile-<unix-millis>-<random><original extension>`
    pub fn storage_filename(&self, original: &str) -> String {
        let nonce = rand::thread_rng().gen_range(0..1_000_000_000u32);
        self.storage_filename_at(original, Utc::now().timestamp_millis(), nonce)
    }

    pub fn storage_filename_at(&self, original: &str, millis: i64, nonce: u32) -> String {
        format!(
            "{}-{}-{}{}",
            self.prefix,
            millis,
            nonce,
            original_extension(original)
        )
    }
}

/// Extension of the client-supplied filename including the dot, or an empty
/// string. Only ASCII alphanumeric extensions survive.
pub fn original_extension(original: &str) -> String {
    Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

/// UploadDescriptor
///
/// Everything known about an accepted file part. Built once by the gate and
/// handed to storage unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    pub original_filename: String,
    pub content_type: String,
    pub size: usize,
    pub stored_filename: String,
    pub directory: PathBuf,
}

impl UploadDescriptor {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.stored_filename)
    }
}

/// receive
///
/// Runs one multipart file part through the gate. The media type is checked
/// before the body is read, then the body is streamed chunk by chunk and
/// abandoned as soon as it crosses the size limit.
pub async fn receive(
    policy: &UploadPolicy,
    mut field: Field<'_>,
    directory: &Path,
) -> Result<(UploadDescriptor, Bytes), AppError> {
    policy.check_media_type(field.content_type())?;

    let original_filename = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().unwrap_or_default().to_string();

    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, policy.max_bytes()))?
    {
        policy.check_size(buf.len() + chunk.len())?;
        buf.extend_from_slice(&chunk);
    }

    let descriptor = UploadDescriptor {
        stored_filename: policy.storage_filename(&original_filename),
        original_filename,
        content_type,
        size: buf.len(),
        directory: directory.to_path_buf(),
    };

    Ok((descriptor, Bytes::from(buf)))
}

/// Maps multipart parsing failures; a body over the route's limit is reported
/// the same way as a file over the policy's limit.
pub fn multipart_error(e: MultipartError, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit }
    } else {
        AppError::Validation(e.body_text())
    }
}

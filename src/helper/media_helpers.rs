use actix_multipart::Multipart;
use actix_web::web::BytesMut;
use chrono::Utc;
use futures_util::StreamExt;
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Bucket that featured images are uploaded into.
pub const FEATURED_IMAGES_BUCKET: &str = "featured-images";

const NAME_SUFFIX_LEN: usize = 10;
const NAME_SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Unsupported file type: '{0}'. Please upload a JPEG, PNG, GIF, WebP or AVIF image.")]
    UnsupportedType(String),
    #[error("File is too large. Maximum size is {0}MB.")]
    TooLarge(usize),
    #[error("No file was uploaded.")]
    MissingFile,
    #[error("Invalid object name '{0}'.")]
    InvalidName(String),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid public URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Binary object storage. Returns the public URL of the stored object.
pub trait ObjectStorage: Send + Sync {
    fn upload(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<String, StorageError>;
}

/// Maps an accepted image MIME type to the extension stored objects get.
/// Anything not listed here is refused.
pub fn image_extension_for(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

/// `<unix-millis>-<10 lowercase alphanumerics>.<ext>`
pub fn generated_object_name(extension: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..NAME_SUFFIX_LEN)
        .map(|_| NAME_SUFFIX_CHARSET[rng.gen_range(0..NAME_SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("{}-{}.{}", Utc::now().timestamp_millis(), suffix, extension)
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// An image read from an upload form, not yet stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn extension(&self) -> Result<&'static str, StorageError> {
        image_extension_for(&self.content_type)
            .ok_or_else(|| StorageError::UnsupportedType(self.content_type.clone()))
    }
}

/// Stores objects under `<root>/<bucket>/<name>` and serves them from
/// `<public_base>/<bucket>/<name>`.
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base: Url,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Result<Self, StorageError> {
        let mut base = public_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(LocalObjectStorage { root: root.into(), public_base: Url::parse(&base)? })
    }
}

impl ObjectStorage for LocalObjectStorage {
    fn upload(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        for segment in [bucket, name] {
            if !is_safe_segment(segment) {
                return Err(StorageError::InvalidName(segment.to_string()));
            }
        }

        let dir = self.root.join(bucket);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(name), bytes)?;

        let url = self.public_base.join(&format!("{}/{}", bucket, name))?;
        log::info!("Stored {} bytes at {}", bytes.len(), url);
        Ok(url.to_string())
    }
}

/// Reads the `file` field of a multipart form, enforcing the image MIME map
/// and the size limit while streaming.
pub async fn read_image_upload(mut payload: Multipart, max_size_mb: usize) -> Result<ImageUpload, StorageError> {
    let max_bytes = max_size_mb * 1024 * 1024;
    let mut upload = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| StorageError::Upload(e.to_string()))?;
        let field_name = field.content_disposition().get_name().unwrap_or_default().to_string();
        if field_name != "file" {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .ok_or(StorageError::MissingFile)?;
        if image_extension_for(&content_type).is_none() {
            return Err(StorageError::UnsupportedType(content_type));
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| StorageError::Upload(e.to_string()))?;
            if data.len() + chunk.len() > max_bytes {
                return Err(StorageError::TooLarge(max_size_mb));
            }
            data.extend_from_slice(&chunk);
        }
        upload = Some(ImageUpload { content_type, bytes: data.to_vec() });
    }

    match upload {
        Some(upload) if !upload.bytes.is_empty() => Ok(upload),
        _ => Err(StorageError::MissingFile),
    }
}

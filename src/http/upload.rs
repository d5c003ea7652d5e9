//! Multipart upload collection.
//!
//! # Responsibilities
//! - Walk the parts of a `multipart/form-data` body (parsing is axum's/multer's job)
//! - Stream file parts into uniquely named temporary files
//! - Keep plain fields as strings
//! - Enforce per-part size limits
//!
//! # Design Decisions
//! - Completed temporary files belong to the caller; only a part that fails
//!   midway has its partial file removed
//! - Every failure is rewrapped as an [`HttpError`] with an `HTTP_FILE-*` or
//!   `HTTP_MSG-*` code

use std::collections::HashMap;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError},
        FromRequest, Multipart,
    },
    http::{HeaderMap, Request, StatusCode},
};
use bytes::Bytes;
use serde::Serialize;
use tokio::{fs::File, io::AsyncWriteExt};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::{error_code, HttpError};

/// MIME type recorded for file parts that do not declare one.
pub const DEFAULT_FILE_MIME: &str = "application/octet-stream";

/// Limits and placement of temporary files. `None` limits are unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub max_file_size: Option<u64>,
    pub max_field_size: Option<u64>,
    pub max_field_name_size: Option<u64>,
    pub prefix: String,
    pub temp_dir: PathBuf,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

impl From<&UploadConfig> for UploadOptions {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_file_size: config.max_file_size.map(u64::from),
            max_field_size: config.max_field_size.map(u64::from),
            max_field_name_size: config.max_field_name_size.map(u64::from),
            prefix: config.prefix.clone(),
            temp_dir: config.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }
}

impl UploadOptions {
    fn temp_path(&self) -> PathBuf {
        self.temp_dir.join(format!("{}-{}", self.prefix, Uuid::new_v4()))
    }
}

/// A file part written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub original_filename: Option<String>,
    pub mime_type: String,
    pub size: u64,
}

/// Everything collected from one multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Uploads {
    pub files: HashMap<String, Vec<UploadedFile>>,
    pub fields: HashMap<String, String>,
}

impl Uploads {
    /// Paths of every stored file, for callers that clean up.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.values().flatten().map(|f| &f.path)
    }
}

/// Collect a streamed multipart body.
pub async fn collect_uploads(mut multipart: Multipart, options: &UploadOptions) -> Result<Uploads, HttpError> {
    let mut uploads = Uploads::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        check_limit("FIELD_NAME", name.len() as u64, options.max_field_name_size)?;

        if field.file_name().is_some() {
            let file = store_file(field, options).await?;
            tracing::debug!(field = %name, path = ?file.path, size = file.size, "Stored upload");
            uploads.files.entry(name).or_default().push(file);
        } else {
            let value = read_field(field, options).await?;
            uploads.fields.insert(name, value);
        }
    }

    Ok(uploads)
}

/// Collect a multipart body that has already been read into memory.
pub async fn collect_uploads_from_bytes(
    headers: &HeaderMap,
    body: Bytes,
    options: &UploadOptions,
) -> Result<Uploads, HttpError> {
    let mut request = Request::new(Body::from(body));
    *request.headers_mut() = headers.clone();

    let multipart = multipart_from_request(request).await?;
    collect_uploads(multipart, options).await
}

/// Extract a streaming [`Multipart`] from a request whose boundary parses.
pub async fn multipart_from_request(request: Request<Body>) -> Result<Multipart, HttpError> {
    Multipart::from_request(request, &()).await.map_err(|rejection| {
        HttpError::new(StatusCode::BAD_REQUEST, "Cannot upload files.", rejection.body_text())
            .with_code(error_code("FILE", "EBOUNDARY"))
    })
}

async fn store_file(mut field: Field<'_>, options: &UploadOptions) -> Result<UploadedFile, HttpError> {
    let original_filename = field.file_name().map(str::to_string);
    let mime_type = field.content_type().unwrap_or(DEFAULT_FILE_MIME).to_string();
    let path = options.temp_path();

    let mut file = File::create(&path).await.map_err(write_error)?;
    let mut size = 0u64;

    let written: Result<(), HttpError> = async {
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            size += chunk.len() as u64;
            check_limit("FILE", size, options.max_file_size)?;
            file.write_all(&chunk).await.map_err(write_error)?;
        }
        file.flush().await.map_err(write_error)
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(rm) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = ?path, error = %rm, "Failed to remove partial upload");
        }
        return Err(e);
    }

    Ok(UploadedFile {
        path,
        original_filename,
        mime_type,
        size,
    })
}

async fn read_field(mut field: Field<'_>, options: &UploadOptions) -> Result<String, HttpError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        check_limit("FIELD", (buf.len() + chunk.len()) as u64, options.max_field_size)?;
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn check_limit(what: &str, size: u64, limit: Option<u64>) -> Result<(), HttpError> {
    match limit {
        Some(limit) if size > limit => Err(HttpError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Upload limit exceeded.",
            format!("{} size exceeds the limit of {limit} bytes", what.to_ascii_lowercase().replace('_', " ")),
        )
        .with_code(error_code("FILE", &format!("LIMIT_{what}_SIZE")))),
        _ => Ok(()),
    }
}

fn write_error(err: std::io::Error) -> HttpError {
    tracing::error!(error = %err, "Error writing upload");
    HttpError::io(StatusCode::INTERNAL_SERVER_ERROR, "Error writing file.", "FILE", err)
}

fn multipart_error(err: MultipartError) -> HttpError {
    // axum reports failures to read the underlying body as 500s; everything else is a
    // malformed multipart stream.
    let (body, code) = if err.status() == StatusCode::INTERNAL_SERVER_ERROR {
        ("Incoming message error.", error_code("MSG", "ESTREAM"))
    } else {
        ("Cannot upload files.", error_code("FILE", "EMULTIPART"))
    };
    tracing::error!(error = %err, "Multipart stream failed");
    HttpError::upload(body, code, err.body_text()).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    const BOUNDARY: &str = "XBOUNDARY";

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=XBOUNDARY"),
        );
        headers
    }

    fn body(parts: &[(&str, Option<(&str, &str)>, &str)]) -> Bytes {
        let mut out = String::new();
        for (name, file, content) in parts {
            out.push_str(&format!("--{BOUNDARY}\r\n"));
            match file {
                Some((filename, mime)) => {
                    out.push_str(&format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                    ));
                    out.push_str(&format!("Content-Type: {mime}\r\n"));
                }
                None => {
                    out.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n"));
                }
            }
            out.push_str(&format!("\r\n{content}\r\n"));
        }
        out.push_str(&format!("--{BOUNDARY}--\r\n"));
        Bytes::from(out)
    }

    fn options(dir: &tempfile::TempDir) -> UploadOptions {
        UploadOptions {
            temp_dir: dir.path().to_path_buf(),
            ..UploadOptions::default()
        }
    }

    #[tokio::test]
    async fn test_collects_fields_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let body = body(&[
            ("title", None, "hello"),
            ("doc", Some(("a.txt", "text/plain")), "file contents"),
            ("doc", Some(("b.bin", "application/x-thing")), "more"),
        ]);

        let uploads = collect_uploads_from_bytes(&headers(), body, &options(&dir)).await.unwrap();

        assert_eq!(uploads.fields["title"], "hello");
        let docs = &uploads.files["doc"];
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].original_filename.as_deref(), Some("a.txt"));
        assert_eq!(docs[0].mime_type, "text/plain");
        assert_eq!(docs[0].size, 13);
        assert!(docs[0].path.starts_with(dir.path()));
        assert!(docs[0]
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("file-"));
        assert_eq!(std::fs::read_to_string(&docs[0].path).unwrap(), "file contents");
        assert_ne!(docs[0].path, docs[1].path);
        assert_eq!(uploads.paths().count(), 2);
    }

    #[tokio::test]
    async fn test_file_limit_rejects_and_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(&dir);
        options.max_file_size = Some(4);
        let body = body(&[("doc", Some(("a.txt", "text/plain")), "far too long")]);

        let err = collect_uploads_from_bytes(&headers(), body, &options).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.code(), Some("HTTP_FILE-LIMIT_FILE_SIZE"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_field_limits() {
        let dir = tempfile::tempdir().unwrap();

        let mut limited = options(&dir);
        limited.max_field_size = Some(3);
        let err = collect_uploads_from_bytes(&headers(), body(&[("title", None, "hello")]), &limited)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("HTTP_FILE-LIMIT_FIELD_SIZE"));

        let mut limited = options(&dir);
        limited.max_field_name_size = Some(2);
        let err = collect_uploads_from_bytes(&headers(), body(&[("title", None, "x")]), &limited)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("HTTP_FILE-LIMIT_FIELD_NAME_SIZE"));
    }

    #[tokio::test]
    async fn test_missing_boundary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let err = collect_uploads_from_bytes(&headers, Bytes::from_static(b"x"), &options(&dir))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), Some("HTTP_FILE-EBOUNDARY"));
    }

    #[test]
    fn test_options_from_config() {
        let config = UploadConfig {
            max_file_size: Some(crate::config::ByteSize(10)),
            temp_dir: Some(PathBuf::from("/tmp/uploads")),
            ..UploadConfig::default()
        };
        let options = UploadOptions::from(&config);
        assert_eq!(options.max_file_size, Some(10));
        assert_eq!(options.max_field_size, None);
        assert_eq!(options.temp_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(options.prefix, "file");
    }
}

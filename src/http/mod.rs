//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (resolve protocol/hostname via security::proxy)
//!     → handler
//!         → upload.rs (multipart → temp files + fields)
//!         → file.rs (stream file, report transfer outcome)
//!     → response.rs (JSON body, status, extra headers)
//!     → Send to client
//! ```

pub mod content;
pub mod file;
pub mod request;
pub mod response;
pub mod server;
pub mod upload;

pub use file::{stream_file, FileTransfer, Settlement, StreamOptions};
pub use request::{origin_middleware, SharedConfig};
pub use response::{JsonResponder, JsonResponse, ResponsePipeline};
pub use server::{build_router, HttpServer};
pub use upload::{collect_uploads, collect_uploads_from_bytes, UploadOptions, UploadedFile, Uploads};

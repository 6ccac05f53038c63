pub mod routes;
pub mod upload;

pub use routes::create_router;
pub use upload::{UploadLimits, UploadState};

// Media upload to X
//
// Images go up in a single request; video goes through the chunked
// INIT/APPEND/FINALIZE protocol followed by processing-status polling.

pub mod chunked;
pub mod media;
pub mod media_uploader;
pub mod remote;
pub mod x_client;

#[cfg(test)]
pub(crate) mod test_support;

pub use media::{MediaAsset, MediaId, MediaType};
pub use media_uploader::MediaUploader;
pub use remote::{MediaService, PostReference, PostService, ProcessingInfo, ProcessingState};
pub use x_client::{ApiEndpoints, Credentials, XClient};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image in wrong format: {url}")]
    UnsupportedExtension { url: String },

    #[error("invalid media URL \"{url}\"")]
    InvalidUrl { url: String },

    #[error("media at {url} is {bytes} bytes, over the {limit} byte limit")]
    TooLarge { url: String, bytes: u64, limit: u64 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("object storage error: {0}")]
    Storage(#[from] std::io::Error),
}

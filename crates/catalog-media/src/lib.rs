pub mod client;
pub mod error;
pub mod probe;
pub mod store;

pub use client::{FetchedMedia, HttpMediaFetcher, MediaFetch};
pub use error::MediaError;
pub use probe::{fingerprint, object_key, probe_width};
pub use store::{LocalObjectStore, ObjectStore};

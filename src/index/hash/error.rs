use thiserror::Error;

use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Entry serialization error: {0}")]
    Serde(#[from] bincode::Error),

    #[error("Page is not a hash index page of the expected kind")]
    WrongPageType,

    #[error("Depth {0} does not fit on a page")]
    DepthTooLarge(u32),

    #[error("Bucket entries exceed the page size")]
    BucketOverflow,
}

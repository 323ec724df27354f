pub mod header;
pub mod mime;
pub mod block;
pub mod chain;
pub mod ops;
pub mod extract;
pub mod flac;
pub mod session;

pub use header::{PayloadHeader, HeaderError, HEADER_SIZE, HEADER_VERSION};
pub use block::{MetadataBlock, ApplicationBlock, BlockKind, APPLICATION_ID, is_payload_block};
pub use chain::{MetadataChain, MemoryChain};
pub use ops::{search, delete_matching, select_smallest, build_insertable};
pub use extract::extract;

//! On-disk building blocks shared by the indices and the store.
//!
//! - [`CollectionMetadata`]: the per-collection JSON document
//! - [`MetadataLock`]: advisory cross-process lock guarding metadata mutations
//! - [`write_atomic`]: temp-file-then-rename writes
//! - point record naming and decoding

mod atomic;
mod lock;
mod metadata;
mod record;

pub use atomic::{write_atomic, write_json_atomic};
pub use lock::{METADATA_LOCK_FILE, MetadataLock};
pub use metadata::{CollectionMetadata, HnswMetadata, METADATA_FILE, QuantizationRange};
pub use record::{
    is_point_file, point_file_name, read_record, scan_point_files, write_record,
};

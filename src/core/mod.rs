pub mod comparator;
pub mod engine;
pub mod fingerprint;
pub mod glob;
pub mod order;
pub mod rules;
pub mod transfer;

pub use comparator::{CompareConfig, FileComparator, FileRelation, SyncPlan};
pub use engine::{SyncConfig, SyncEngine, SyncReport};
pub use fingerprint::{fingerprint_file, fingerprint_reader, normalize_etag, HashedFile, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use glob::{GlobFilter, Pattern};
pub use order::OrderRule;
pub use rules::{CacheControlRule, CacheControlRules};
pub use transfer::{TransferConfig, TransferManager, UploadKind, UploadSummary};

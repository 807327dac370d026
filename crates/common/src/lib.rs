/**
 * Human-typable bucket identifiers.
 */
pub mod bucket_key;
/**
 * Cryptographic building blocks.
 *  - OPAQUE cipher suite shared by server and clients
 *  - Request signing and constant-time verification
 *  - Content checksums
 */
pub mod crypto;
/**
 * Transfer planning for chunked uploads.
 */
pub mod transfer;
/**
 * Helper for reading build version information
 *  set at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::bucket_key::{BucketKey, BucketKeyError};
    pub use crate::crypto::pake::{ServerSetup, XferSuite};
    pub use crate::crypto::signature::{RequestSigner, SignatureError};
    pub use crate::transfer::plan::{PlanShape, PlannerConfig};
    pub use crate::version::build_info;
}

//! Foundation types for the credential ledger.
//!
//! Every other crate in the workspace depends on `cred-types`.
//!
//! # Key Types
//!
//! - [`Digest`] -- 32-byte BLAKE3 content hash (block ids, Merkle nodes)
//! - [`CredentialHash`] -- hex hash of a raw credential identifier
//! - [`time`] -- second-resolution wall clock and the clock-skew window

pub mod credential;
pub mod digest;
pub mod error;
pub mod time;

pub use credential::CredentialHash;
pub use digest::{Digest, DIGEST_LEN};
pub use error::TypeError;

//! Core ledger engine for authority-signed credentials.
//!
//! Institutions append blocks of credential hashes to a hash-linked chain.
//! Each block is signed by an authority from the [`AuthorityRegistry`] and
//! commits to its credentials through a Merkle root, so a holder can later
//! prove a credential was recorded with nothing more than the identifier,
//! an inclusion proof and the block's root.
//!
//! # Layout
//!
//! - [`block`] -- block construction, signing and self-validation
//! - [`chain`] -- persisted chain with serialized appends and full validation
//! - [`authority`] -- the allow-list of signing authorities
//! - [`error`] -- error types and their [`ErrorClass`]
//!
//! ```no_run
//! use cred_chain::{AuthorityRegistry, Chain};
//! use cred_crypto::{KeyPairSigner, Signer};
//! use cred_store::InMemoryKvStore;
//!
//! let signer = KeyPairSigner::generate();
//! let registry = AuthorityRegistry::with_authorities([("registrar", signer.public_key())]);
//! let chain = Chain::initialize_in(InMemoryKvStore::new(), registry, &signer)?;
//! chain.append(&["CERT-001", "CERT-002"], &signer)?;
//! chain.validate()?;
//! # Ok::<(), cred_chain::ChainError>(())
//! ```

pub mod authority;
pub mod block;
pub mod chain;
pub mod error;

pub use authority::{Authority, AuthorityRegistry};
pub use block::{verify_credential, Block};
pub use chain::{Chain, ChainIter, ChainStats, TIP_KEY};
pub use error::{AuthorityError, BlockError, ChainError, ErrorClass};

//! Index and artifact data model for the bundle updater.
//!
//! This crate is pure: no I/O, no async, no network. It owns the on-disk
//! JSON shape, the upgrade-eligibility predicate, and detached-signature
//! verification. Everything that touches a filesystem or a socket lives in
//! `bundle-core`.

pub mod artifact;
pub mod hash;
pub mod index;
pub mod platform;
pub mod signature;
pub mod version;

pub use artifact::{Artifact, ArtifactError, UnpackCodec};
pub use hash::{InvalidHash, Sha256Hex};
pub use index::{Index, IndexError, UpgradeOutcome};
pub use platform::Platform;
pub use signature::{SignatureError, TrustStore};

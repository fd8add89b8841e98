//! Token domain: redacted secrets, structural JWT claims, and advisory metadata.

pub mod claims;
pub mod metadata;
pub mod secret;

pub use claims::*;
pub use metadata::*;
pub use secret::*;

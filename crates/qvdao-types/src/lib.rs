//! Shared primitives for the QVDAO ledger.
//!
//! Member identities live in [`address`]; stake, weight and clock units
//! live in [`units`]. Enabling the `serde` feature lets both travel through
//! TOML configuration and JSON reports.

pub mod address;
pub mod error;
pub mod units;

#[cfg(feature = "serde")]
mod serialization;

pub use address::Address;
pub use error::TypesError;
pub use units::{Amount, ProposalId, Timestamp, Weight, SECONDS_PER_DAY};

/// Everything a ledger or tool usually needs in one import.
pub mod prelude {
    pub use crate::{Address, Amount, ProposalId, Timestamp, TypesError, Weight};
}

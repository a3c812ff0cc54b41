//! Shared marker trait implemented by every error type in the workspace.
//!
//! Crates define their own `thiserror`-derived error enum and implement
//! this trait on it so callers can hold a `Box<dyn RlncError>` across
//! crate boundaries without losing `std::error::Error` + `Send + Sync`.

use std::error::Error;
use std::fmt::Debug;

pub trait RlncError: Error + Debug + Send + Sync + 'static {
    /// Stable, machine-readable identifier for the error variant.
    /// Defaults to 0 ("unspecified") so implementors only override it
    /// where callers actually branch on the code.
    fn code(&self) -> i32 {
        0
    }
}

//! Domain entities for the device message bridge.
//!
//! The bridge never owns device records: they live in an external store and
//! the bridge only reads them and overwrites the online flag.  The types in
//! this module describe that record and the identifier it is keyed by.

/// Device record and identifier parsing.
pub mod device;

//! Core data model types: addresses, parsed messages, and stored records.

pub mod address;
pub mod message;
pub mod record;

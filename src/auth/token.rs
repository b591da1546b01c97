//! Token secrets, persisted records, and token endpoint responses.

pub mod record;
pub mod response;
pub mod secret;

//! Client for the USPS Electronic Product Fulfillment (EPF) web service,
//! which distributes the national ZIP+4 container files.
//!
//! Every call is a form POST whose `obj` field holds a JSON object of
//! arguments plus the session's current `logonkey`/`tokenkey`. Responses are
//! JSON with a `response` status field; anything but `success` is an error.

mod client;
mod types;

pub use client::{BASE_URL, EpfClient, Session};
pub use types::{EpfFile, FileStatus, Version};

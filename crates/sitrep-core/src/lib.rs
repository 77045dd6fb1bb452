//! Shared foundation of the sitrep pipeline.
//!
//! This crate holds everything the discovery workflows, the CVE connector,
//! and the graph adapter have in common: the configuration model, the error
//! taxonomy, CPE/CVSS domain types, wire DTOs, network math, the external
//! tool runner, and the blob store used to pass large scan outputs by
//! reference.

pub mod blob;
pub mod config;
pub mod cpe;
pub mod dto;
pub mod error;
pub mod net;
pub mod obs;
pub mod process;
pub mod vuln;

pub use config::Config;
pub use cpe::CpeIdentifier;
pub use error::{Error, Result};
pub use vuln::{CvssV2, CvssV3, CvssV4, Vulnerability};

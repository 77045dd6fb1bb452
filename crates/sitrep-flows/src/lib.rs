//! Scanning and enrichment workflows over the in-process workflow runtime.
//!
//! Parent/child EASM enumeration, basic and topology Nmap scans, SLP
//! enrichment, the scheduled CVE sweep, criticality computation, and
//! retention maintenance. Workflows publish through the REST collaborator
//! ([`isim::IsimClient`]); only the CVE sweep and the cleaner hold a direct
//! graph-store connection.

pub mod criticality;
pub mod cve_update;
pub mod easm;
pub mod isim;
pub mod maintenance;
pub mod nmap;
pub mod runtime;
pub mod slp;

pub use isim::IsimClient;
pub use runtime::{execute_activity, ActivityOptions, RetryPolicy, Scheduler, ShutdownHandle, ShutdownSignal};

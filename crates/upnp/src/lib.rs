//! UPnP/DLNA discovery and ContentDirectory browsing
//!
//! The engine runs in four steps, each usable on its own:
//! - [`discover`]: SSDP M-SEARCH for MediaServer devices
//! - [`resolve`] / [`resolve_all`]: fetch device descriptions, keep servers
//!   that expose a ContentDirectory service
//! - [`ContentDirectoryBrowser`]: SOAP `Browse` plus DIDL-Lite parsing
//! - [`walk`]: bounded-concurrency traversal of the container tree
//!
//! [`UpnpSession`] ties them together for one discovery-to-catalog cycle.

pub mod browser;
pub mod description;
pub mod didl;
pub mod error;
pub mod session;
pub mod soap;
pub mod ssdp;
pub mod walker;

pub use browser::{BrowseResult, ContentDirectoryBrowser};
pub use description::{parse_device_description, resolve, resolve_all, resolve_url, DeviceDescription};
pub use didl::parse_didl;
pub use error::BrowseError;
pub use session::UpnpSession;
pub use ssdp::{discover, discover_at, parse_ssdp_response, DiscoveryCollector};
pub use walker::{walk, WalkOptions};

//! Documents served by an emulated HDHomeRun tuner.
//!
//! This crate turns station snapshots from the upstream catalog into the
//! exact shapes DVR clients expect when they discover a tuner, read its
//! lineup and pull guide data.
//!
//! # Documents
//!
//! - [`render_device_xml`] and [`DiscoverDocument`]: device discovery
//! - [`LineupStatus`]: channel scan status
//! - [`render_m3u`], [`lineup_entries`], [`render_lineup_xml`]: channel lineup
//! - [`render_xmltv`]: program guide
//!
//! # Example
//!
//! ```rust
//! use locast_dvr_lineup::{lineup_entries, render_m3u, Station};
//!
//! let mut station = Station::new("1234", "CBS 2");
//! station.call_sign = Some("2.1 CBS".to_string());
//! station.channel = Some("2.1".to_string());
//! station.city = Some("Chicago".to_string());
//!
//! let m3u = render_m3u(&[station.clone()], "http://127.0.0.1:6077", false);
//! assert!(m3u.starts_with("#EXTM3U\n"));
//!
//! let entries = lineup_entries(&[station], "http://127.0.0.1:6077");
//! assert_eq!(entries[0].guide_number, "2.1");
//! ```

pub mod device;
pub mod error;
pub mod filters;
pub mod lineup;
pub mod types;
pub mod xmltv;

pub use device::{render_device_xml, DiscoverDocument, LineupStatus};
pub use error::LineupError;
pub use lineup::{lineup_entries, render_lineup_xml, render_m3u, LineupEntry};
pub use types::{DeviceIdentity, Listing, Station, StationId, NETWORK_CALL_SIGNS};
pub use xmltv::render_xmltv;

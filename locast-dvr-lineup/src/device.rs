//! Device discovery documents: UPnP `device.xml`, `discover.json` and the
//! channel scan status.

use serde::Serialize;
use xmltree::{Element, XMLNode};

use crate::error::LineupError;
use crate::lineup::{text_element, write_document};
use crate::types::DeviceIdentity;

/// Manufacturer reported to DVR clients.
pub const MANUFACTURER: &str = "locast2dvr";

/// Fixed device auth token. Clients only check that it is present.
pub const DEVICE_AUTH: &str = "locast2dvr";

const DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:MediaServer:1";

/// Render the UPnP root device description.
pub fn render_device_xml(identity: &DeviceIdentity) -> Result<String, LineupError> {
    let mut root = Element::new("root");
    root.attributes.insert(
        "xmlns".to_string(),
        "urn:schemas-upnp-org:device-1-0".to_string(),
    );
    root.children.push(text_element("URLBase", &identity.base_url()));

    let mut spec = Element::new("specVersion");
    spec.children.push(text_element("major", "1"));
    spec.children.push(text_element("minor", "0"));
    root.children.push(XMLNode::Element(spec));

    let mut device = Element::new("device");
    device.children.push(text_element("deviceType", DEVICE_TYPE));
    device.children.push(text_element("friendlyName", &identity.friendly_name));
    device.children.push(text_element("manufacturer", MANUFACTURER));
    device.children.push(text_element("modelName", &identity.model));
    device.children.push(text_element("modelNumber", &identity.firmware_version));
    device.children.push(text_element("serialNumber", &identity.unique_id));
    device.children.push(text_element("UDN", &format!("uuid:{}", identity.unique_id)));
    root.children.push(XMLNode::Element(device));

    write_document(&root)
}

/// Body of `discover.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiscoverDocument {
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_number: String,
    pub firmware_name: String,
    pub tuner_count: u32,
    pub firmware_version: String,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    pub device_auth: String,
    #[serde(rename = "BaseURL")]
    pub base_url: String,
    #[serde(rename = "LineupURL")]
    pub lineup_url: String,
}

impl From<&DeviceIdentity> for DiscoverDocument {
    fn from(identity: &DeviceIdentity) -> Self {
        let base_url = identity.base_url();
        Self {
            friendly_name: identity.friendly_name.clone(),
            manufacturer: MANUFACTURER.to_string(),
            model_number: identity.model.clone(),
            firmware_name: identity.firmware_name.clone(),
            tuner_count: identity.tuner_count,
            firmware_version: identity.firmware_version.clone(),
            device_id: identity.unique_id.clone(),
            device_auth: DEVICE_AUTH.to_string(),
            lineup_url: format!("{}/lineup.json", base_url),
            base_url,
        }
    }
}

/// Body of `lineup_status.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LineupStatus {
    Scanning {
        #[serde(rename = "ScanInProgress")]
        scan_in_progress: bool,
        #[serde(rename = "Progress")]
        progress: u32,
        #[serde(rename = "Found")]
        found: usize,
    },
    Idle {
        #[serde(rename = "ScanInProgress")]
        scan_in_progress: bool,
        #[serde(rename = "ScanPossible")]
        scan_possible: bool,
        #[serde(rename = "Source")]
        source: String,
        #[serde(rename = "SourceList")]
        source_list: Vec<String>,
    },
}

impl LineupStatus {
    /// Progress reported while a rescan runs. The rescan is a single
    /// upstream fetch, so there is nothing finer grained to report.
    pub const SCAN_PROGRESS: u32 = 50;

    pub fn scanning(found: usize) -> Self {
        LineupStatus::Scanning {
            scan_in_progress: true,
            progress: Self::SCAN_PROGRESS,
            found,
        }
    }

    pub fn idle() -> Self {
        LineupStatus::Idle {
            scan_in_progress: false,
            scan_possible: true,
            source: "Antenna".to_string(),
            source_list: vec!["Antenna".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            unique_id: "LOCAST2DVR_0".into(),
            model: "HDHR3-US".into(),
            firmware_name: "hdhomerun3_atsc".into(),
            firmware_version: "1.2.3456".into(),
            tuner_count: 3,
            friendly_name: "Chicago".into(),
            bind_host: "5.4.3.2".into(),
            bind_port: 6077,
        }
    }

    #[test]
    fn test_discover_document() {
        let doc = DiscoverDocument::from(&identity());
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({
                "FriendlyName": "Chicago",
                "Manufacturer": "locast2dvr",
                "ModelNumber": "HDHR3-US",
                "FirmwareName": "hdhomerun3_atsc",
                "TunerCount": 3,
                "FirmwareVersion": "1.2.3456",
                "DeviceID": "LOCAST2DVR_0",
                "DeviceAuth": "locast2dvr",
                "BaseURL": "http://5.4.3.2:6077",
                "LineupURL": "http://5.4.3.2:6077/lineup.json"
            })
        );
    }

    #[test]
    fn test_lineup_status_shapes() {
        assert_eq!(
            serde_json::to_value(LineupStatus::idle()).unwrap(),
            json!({
                "ScanInProgress": false,
                "ScanPossible": true,
                "Source": "Antenna",
                "SourceList": ["Antenna"]
            })
        );
        assert_eq!(
            serde_json::to_value(LineupStatus::scanning(5)).unwrap(),
            json!({"ScanInProgress": true, "Progress": 50, "Found": 5})
        );
    }

    #[test]
    fn test_device_xml() {
        let xml = render_device_xml(&identity()).unwrap();
        let root = Element::parse(xml.as_bytes()).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(
            root.get_child("URLBase").unwrap().get_text().unwrap(),
            "http://5.4.3.2:6077"
        );
        let device = root.get_child("device").unwrap();
        assert_eq!(device.get_child("friendlyName").unwrap().get_text().unwrap(), "Chicago");
        assert_eq!(device.get_child("modelName").unwrap().get_text().unwrap(), "HDHR3-US");
        assert_eq!(
            device.get_child("UDN").unwrap().get_text().unwrap(),
            "uuid:LOCAST2DVR_0"
        );
    }
}

//! Channel lineup documents: M3U playlist, `lineup.json` and `lineup.xml`.

use serde::Serialize;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::LineupError;
use crate::filters::name_only;
use crate::types::{Station, NETWORK_CALL_SIGNS};

/// One row of the lineup consumed by DVR clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineupEntry {
    pub guide_number: String,
    pub guide_name: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Build lineup rows for all stations. `base_url` has no trailing slash.
pub fn lineup_entries(stations: &[Station], base_url: &str) -> Vec<LineupEntry> {
    stations
        .iter()
        .map(|station| LineupEntry {
            guide_number: station.guide_number().to_string(),
            guide_name: station.name.clone(),
            url: format!("{}/watch/{}", base_url, station.id),
        })
        .collect()
}

/// Render `lineup.xml`.
pub fn render_lineup_xml(entries: &[LineupEntry]) -> Result<String, LineupError> {
    let mut root = Element::new("Lineup");
    for entry in entries {
        let mut program = Element::new("Program");
        program.children.push(text_element("GuideNumber", &entry.guide_number));
        program.children.push(text_element("GuideName", &entry.guide_name));
        program.children.push(text_element("URL", &entry.url));
        root.children.push(XMLNode::Element(program));
    }
    write_document(&root)
}

/// Render the M3U playlist.
///
/// With `multiplex` set the station city is appended to the display name
/// so identically named stations from different markets stay apart.
pub fn render_m3u(stations: &[Station], base_url: &str, multiplex: bool) -> String {
    let mut out = String::from("#EXTM3U\n");
    for station in stations {
        let call_sign = name_only(station.display_call_sign());
        let city = station.city.as_deref().unwrap_or_default();
        let groups = group_title(city, call_sign);
        let tvg_name = if multiplex {
            format!("{} ({})", call_sign, city)
        } else {
            call_sign.to_string()
        };

        out.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"channel.{id}\" tvg-name=\"{tvg_name}\" tvg-logo=\"{logo}\" tvg-chno=\"{chno}\" group-title=\"{groups}\", {tvg_name}\n",
            id = station.id,
            tvg_name = tvg_name,
            logo = station.logo(),
            chno = station.guide_number(),
            groups = groups,
        ));
        out.push_str(&format!("{}/watch/{}.m3u\n\n", base_url, station.id));
    }
    out
}

fn group_title(city: &str, call_sign: &str) -> String {
    let network = if NETWORK_CALL_SIGNS.contains(&call_sign) {
        "Network"
    } else {
        ""
    };
    [city, network]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(";")
}

pub(crate) fn text_element(name: &str, text: &str) -> XMLNode {
    let mut element = Element::new(name);
    element.children.push(XMLNode::Text(text.to_string()));
    XMLNode::Element(element)
}

pub(crate) fn write_document(root: &Element) -> Result<String, LineupError> {
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    let mut buf = Vec::new();
    root.write_with_config(&mut buf, config)?;
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations() -> Vec<Station> {
        let mut cbs = Station::new("1234", "CBS 2");
        cbs.call_sign = Some("2.1 CBS".into());
        cbs.channel = Some("2.1".into());
        cbs.city = Some("Chicago".into());
        cbs.logo_url = Some("http://logo/cbs.png".into());

        let mut indie = Station::new(4321, "WCIU");
        indie.call_sign = Some("WCIUDT".into());
        indie.channel = Some("26.1".into());
        indie.city = Some("Chicago".into());
        indie.logo_226_url = Some("http://logo/wciu226.png".into());

        vec![cbs, indie]
    }

    #[test]
    fn test_render_m3u() {
        let m3u = render_m3u(&stations(), "http://127.0.0.1:6077", false);
        let expected = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"channel.1234\" tvg-name=\"CBS\" tvg-logo=\"http://logo/cbs.png\" tvg-chno=\"2.1\" group-title=\"Chicago;Network\", CBS\n\
            http://127.0.0.1:6077/watch/1234.m3u\n\n\
            #EXTINF:-1 tvg-id=\"channel.4321\" tvg-name=\"WCIUDT\" tvg-logo=\"http://logo/wciu226.png\" tvg-chno=\"26.1\" group-title=\"Chicago\", WCIUDT\n\
            http://127.0.0.1:6077/watch/4321.m3u\n\n";
        assert_eq!(m3u, expected);
    }

    #[test]
    fn test_render_m3u_multiplexed_uses_remapped_values() {
        let mut stations = stations();
        stations[0].call_sign_remapped = Some("102.1 CBS".into());
        stations[0].channel_remapped = Some("102.1".into());

        let m3u = render_m3u(&stations[..1], "http://h:1", true);
        assert!(m3u.contains("tvg-name=\"CBS (Chicago)\""));
        assert!(m3u.contains("tvg-chno=\"102.1\""));
        assert!(m3u.contains(", CBS (Chicago)\n"));
    }

    #[test]
    fn test_group_title() {
        assert_eq!(group_title("Chicago", "NBC"), "Chicago;Network");
        assert_eq!(group_title("", "NBC"), "Network");
        assert_eq!(group_title("Chicago", "WGN"), "Chicago");
        assert_eq!(group_title("", "WGN"), "");
    }

    #[test]
    fn test_lineup_entries_prefer_remapped_channel() {
        let mut stations = stations();
        stations[1].channel_remapped = Some("126.1".into());
        let entries = lineup_entries(&stations, "http://host:6077");
        assert_eq!(entries[0].guide_number, "2.1");
        assert_eq!(entries[0].guide_name, "CBS 2");
        assert_eq!(entries[0].url, "http://host:6077/watch/1234");
        assert_eq!(entries[1].guide_number, "126.1");

        let json = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "GuideNumber": "2.1",
                "GuideName": "CBS 2",
                "URL": "http://host:6077/watch/1234"
            })
        );
    }

    #[test]
    fn test_render_lineup_xml() {
        let mut stations = stations();
        stations[0].channel_remapped = Some("102.1".into());
        let entries = lineup_entries(&stations, "http://host:6077");
        let xml = render_lineup_xml(&entries).unwrap();
        let root = Element::parse(xml.as_bytes()).unwrap();
        assert_eq!(root.name, "Lineup");
        let programs: Vec<_> = root
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .collect();
        assert_eq!(programs.len(), 2);
        let remapped = programs[0].get_child("GuideNumber").unwrap();
        assert_eq!(remapped.get_text().unwrap(), "102.1");
        let number = programs[1].get_child("GuideNumber").unwrap();
        assert_eq!(number.get_text().unwrap(), "26.1");
        let url = programs[0].get_child("URL").unwrap();
        assert_eq!(url.get_text().unwrap(), "http://host:6077/watch/1234");
    }
}

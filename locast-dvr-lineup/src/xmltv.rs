//! XMLTV guide rendering.
//!
//! One `<channel>` per station followed by one `<programme>` per listing.
//! Start and stop times are always written in UTC; the station time zone
//! is only used for the original air date, which clients show verbatim.

use chrono::Utc;
use chrono_tz::Tz;
use xmltree::{Element, XMLNode};

use crate::error::LineupError;
use crate::filters::{
    aspect, format_date, format_time, format_time_local_iso, name_only, quality, utc_from_millis,
};
use crate::lineup::{text_element, write_document};
use crate::types::{Listing, Station};

/// Generator name written to the `<tv>` root.
pub const GENERATOR_NAME: &str = "locast-dvr";

/// Render the full guide for `stations`. `base_url` identifies this device.
pub fn render_xmltv(stations: &[Station], base_url: &str) -> Result<String, LineupError> {
    let mut tv = Element::new("tv");
    tv.attributes
        .insert("generator-info-name".to_string(), GENERATOR_NAME.to_string());
    tv.attributes
        .insert("generator-info-url".to_string(), base_url.to_string());

    for station in stations {
        tv.children.push(XMLNode::Element(channel_element(station)));
    }
    for station in stations {
        let tz = station_time_zone(station);
        for listing in &station.listings {
            if let Some(programme) = programme_element(station, listing, tz.as_ref()) {
                tv.children.push(XMLNode::Element(programme));
            }
        }
    }

    write_document(&tv)
}

fn station_time_zone(station: &Station) -> Option<Tz> {
    station.timezone.as_deref().and_then(|name| name.parse::<Tz>().ok())
}

fn channel_id(station: &Station) -> String {
    format!("channel.{}", station.id)
}

fn lang_element(name: &str, text: &str) -> XMLNode {
    let mut element = Element::new(name);
    element.attributes.insert("lang".to_string(), "en".to_string());
    element.children.push(XMLNode::Text(text.to_string()));
    XMLNode::Element(element)
}

fn channel_element(station: &Station) -> Element {
    let mut channel = Element::new("channel");
    channel.attributes.insert("id".to_string(), channel_id(station));

    let call_sign = name_only(station.display_call_sign());
    channel.children.push(text_element("display-name", call_sign));
    let number = station.guide_number();
    if !number.is_empty() {
        channel.children.push(text_element("display-name", number));
    }
    if !station.name.is_empty() && station.name != call_sign {
        channel.children.push(text_element("display-name", &station.name));
    }

    let logo = station.logo();
    if !logo.is_empty() {
        let mut icon = Element::new("icon");
        icon.attributes.insert("src".to_string(), logo.to_string());
        channel.children.push(XMLNode::Element(icon));
    }
    channel
}

fn xmltv_time(epoch_ms: i64) -> String {
    format!("{} +0000", format_time(epoch_ms))
}

/// Seconds since the epoch as milliseconds, if that is a representable date.
fn seconds_to_millis(seconds: i64) -> Option<i64> {
    seconds
        .checked_mul(1000)
        .filter(|ms| utc_from_millis(*ms).is_some())
}

/// `None` when the listing's start or stop time is not a valid date.
fn programme_element(station: &Station, listing: &Listing, tz: Option<&Tz>) -> Option<Element> {
    utc_from_millis(listing.start_time)?;
    let stop = seconds_to_millis(listing.duration)
        .and_then(|duration| listing.start_time.checked_add(duration))
        .filter(|ms| utc_from_millis(*ms).is_some())?;

    let mut programme = Element::new("programme");
    programme
        .attributes
        .insert("start".to_string(), xmltv_time(listing.start_time));
    programme.attributes.insert("stop".to_string(), xmltv_time(stop));
    programme.attributes.insert("channel".to_string(), channel_id(station));

    programme
        .children
        .push(lang_element("title", listing.title.as_deref().unwrap_or_default()));
    if let Some(sub_title) = &listing.episode_title {
        programme.children.push(lang_element("sub-title", sub_title));
    }
    if let Some(desc) = &listing.description {
        programme.children.push(lang_element("desc", desc));
    }

    let mut length = Element::new("length");
    length.attributes.insert("units".to_string(), "seconds".to_string());
    length.children.push(XMLNode::Text(listing.duration.to_string()));
    programme.children.push(XMLNode::Element(length));

    if let Some(genres) = &listing.genres {
        for genre in genres.split(',').map(str::trim).filter(|g| !g.is_empty()) {
            programme.children.push(lang_element("category", genre));
        }
    }

    if let Some(image) = &listing.preferred_image {
        let mut icon = Element::new("icon");
        icon.attributes.insert("src".to_string(), image.clone());
        if let Some(width) = listing.preferred_image_width {
            icon.attributes.insert("width".to_string(), width.to_string());
        }
        if let Some(height) = listing.preferred_image_height {
            icon.attributes.insert("height".to_string(), height.to_string());
        }
        programme.children.push(XMLNode::Element(icon));
    }

    match (listing.season_number, listing.episode_number) {
        (Some(season), Some(episode)) => {
            let ns = format!(
                "{}.{}.",
                season.saturating_sub(1),
                episode.saturating_sub(1)
            );
            programme.children.push(episode_num("xmltv_ns", &ns));
            let onscreen = format!("S{:02}E{:02}", season, episode);
            programme.children.push(episode_num("onscreen", &onscreen));
        }
        _ => {
            if let Some(epoch_ms) = listing.airdate.and_then(seconds_to_millis) {
                let local = match tz {
                    Some(tz) => format_time_local_iso(epoch_ms, tz),
                    None => format_time_local_iso(epoch_ms, &Utc),
                };
                programme.children.push(episode_num("original-air-date", &local));
            }
        }
    }

    if let Some(release) = listing.release_date.filter(|ms| utc_from_millis(*ms).is_some()) {
        programme.children.push(text_element("date", &format_date(release)));
    }

    if let Some(props) = &listing.video_properties {
        let mut video = Element::new("video");
        video.children.push(text_element("aspect", aspect(props)));
        video.children.push(text_element("quality", quality(props)));
        programme.children.push(XMLNode::Element(video));
    }

    Some(programme)
}

fn episode_num(system: &str, value: &str) -> XMLNode {
    let mut element = Element::new("episode-num");
    element.attributes.insert("system".to_string(), system.to_string());
    element.children.push(XMLNode::Text(value.to_string()));
    XMLNode::Element(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations() -> Vec<Station> {
        serde_json::from_value(serde_json::json!([
            {
                "name": "NAME1",
                "callSign": "CALLSIGN1",
                "city": "Chicago",
                "timezone": "America/Chicago",
                "id": "1234",
                "channel": "1.1",
                "listings": [{
                    "startTime": 1610582400000i64,
                    "duration": 1800,
                    "title": "ProgramTitle",
                    "description": "Program Description",
                    "releaseDate": 1161561600000i64,
                    "genres": "News",
                    "preferredImage": "http://programimage",
                    "preferredImageHeight": 360,
                    "preferredImageWidth": 240,
                    "videoProperties": "CC, HD 720p, HDTV, Stereo"
                }]
            },
            {
                "name": "2.1 NAME2",
                "city": "Chicago",
                "timezone": "America/Chicago",
                "id": 4321,
                "channel": "2.1",
                "listings": [{
                    "startTime": 1610582400000i64,
                    "duration": 1800,
                    "title": "Horror & Action",
                    "genres": "horror, action",
                    "episodeNumber": 10,
                    "seasonNumber": 2,
                    "videoProperties": "CC, Stereo"
                }, {
                    "startTime": 1610584200000i64,
                    "duration": 3600,
                    "title": "Rerun",
                    "airdate": 1610582400
                }]
            }
        ]))
        .unwrap()
    }

    fn elements<'a>(root: &'a Element, name: &str) -> Vec<&'a Element> {
        root.children
            .iter()
            .filter_map(|n| n.as_element())
            .filter(|e| e.name == name)
            .collect()
    }

    #[test]
    fn test_render_xmltv_structure() {
        let xml = render_xmltv(&stations(), "http://127.0.0.1:6077").unwrap();
        let tv = Element::parse(xml.as_bytes()).unwrap();
        assert_eq!(tv.name, "tv");
        assert_eq!(elements(&tv, "channel").len(), 2);
        assert_eq!(elements(&tv, "programme").len(), 3);

        let channel = elements(&tv, "channel")[1];
        assert_eq!(channel.attributes.get("id").map(String::as_str), Some("channel.4321"));
        let names: Vec<String> = elements(channel, "display-name")
            .iter()
            .map(|e| e.get_text().unwrap().into_owned())
            .collect();
        assert_eq!(names, vec!["NAME2", "2.1", "2.1 NAME2"]);
    }

    #[test]
    fn test_programme_times_and_video() {
        let xml = render_xmltv(&stations(), "http://127.0.0.1:6077").unwrap();
        let tv = Element::parse(xml.as_bytes()).unwrap();
        let first = elements(&tv, "programme")[0];
        assert_eq!(
            first.attributes.get("start").map(String::as_str),
            Some("20210114000000 +0000")
        );
        assert_eq!(
            first.attributes.get("stop").map(String::as_str),
            Some("20210114003000 +0000")
        );
        assert_eq!(first.get_child("date").unwrap().get_text().unwrap(), "20061023");
        let video = first.get_child("video").unwrap();
        assert_eq!(video.get_child("aspect").unwrap().get_text().unwrap(), "16:9");
        assert_eq!(video.get_child("quality").unwrap().get_text().unwrap(), "HDTV");
    }

    #[test]
    fn test_episode_numbers() {
        let xml = render_xmltv(&stations(), "http://127.0.0.1:6077").unwrap();
        let tv = Element::parse(xml.as_bytes()).unwrap();
        let programmes = elements(&tv, "programme");

        let numbered: Vec<String> = elements(programmes[1], "episode-num")
            .iter()
            .map(|e| e.get_text().unwrap().into_owned())
            .collect();
        assert_eq!(numbered, vec!["1.9.", "S02E10"]);
        let categories = elements(programmes[1], "category");
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[1].get_text().unwrap(), "action");

        let aired = elements(programmes[2], "episode-num");
        assert_eq!(aired.len(), 1);
        assert_eq!(
            aired[0].attributes.get("system").map(String::as_str),
            Some("original-air-date")
        );
        assert_eq!(aired[0].get_text().unwrap(), "2021-01-13 18:00:00");
    }

    #[test]
    fn test_out_of_range_times_do_not_break_the_guide() {
        let mut stations = stations();
        stations[0].listings[0].duration = i64::MAX / 100;
        stations[1].listings[1].airdate = Some(i64::MAX / 100);
        stations[1].listings[0].release_date = Some(i64::MAX);

        let xml = render_xmltv(&stations, "http://127.0.0.1:6077").unwrap();
        let tv = Element::parse(xml.as_bytes()).unwrap();
        let programmes = elements(&tv, "programme");
        assert_eq!(programmes.len(), 2);

        let titles: Vec<String> = programmes
            .iter()
            .map(|p| p.get_child("title").unwrap().get_text().unwrap().into_owned())
            .collect();
        assert_eq!(titles, vec!["Horror & Action", "Rerun"]);
        assert!(programmes[0].get_child("date").is_none());
        assert!(elements(programmes[1], "episode-num").is_empty());
        assert!(!xml.contains("1970"));
    }

    #[test]
    fn test_text_is_escaped() {
        let xml = render_xmltv(&stations(), "http://h").unwrap();
        assert!(xml.contains("Horror &amp; Action"));
    }
}

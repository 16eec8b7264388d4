//! Tags artifact: an XML list of event records.
//!
//! Positions in the file are seconds from the recording's first sample;
//! in memory tags carry absolute timestamps.

use crate::core::tag::Tag;
use crate::error::{RecordingError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use xmltree::{Element, EmitterConfig, XMLNode};

const FORMAT_VERSION: &str = "1.0";
const ALL_CHANNELS: &str = "-1";

fn attribute<'a>(element: &'a Element, name: &str, origin: &Path) -> Result<&'a str> {
    element
        .attributes
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| RecordingError::malformed(origin, format!("tag without `{name}`")))
}

fn number(element: &Element, name: &str, origin: &Path) -> Result<f64> {
    let raw = attribute(element, name, origin)?;
    raw.trim().parse().map_err(|_| {
        RecordingError::malformed(origin, format!("tag `{name}` is not a number: {raw:?}"))
    })
}

fn parse_tag(element: &Element, first_sample_timestamp: f64, origin: &Path) -> Result<Tag> {
    let position = number(element, "position", origin)?;
    let length = number(element, "length", origin).unwrap_or(0.0);
    let name = attribute(element, "name", origin)?;
    let start = first_sample_timestamp + position;

    let mut tag = Tag::new(name, start, start + length.max(0.0));
    tag.channels = element
        .attributes
        .get("channelNumber")
        .filter(|c| c.as_str() != ALL_CHANNELS)
        .cloned();

    for node in &element.children {
        if let XMLNode::Element(desc) = node {
            let value = desc
                .get_text()
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            tag.description.insert(desc.name.clone(), value);
        }
    }
    Ok(tag)
}

/// Parse a tags document. Records come back in file order.
pub fn read<R: Read>(reader: R, first_sample_timestamp: f64, origin: &Path) -> Result<Vec<Tag>> {
    let root = Element::parse(reader).map_err(|e| RecordingError::malformed(origin, e))?;
    if root.name != "tagFile" {
        return Err(RecordingError::malformed(
            origin,
            format!("expected <tagFile> root, found <{}>", root.name),
        ));
    }

    let Some(tags) = root
        .get_child("tagData")
        .and_then(|data| data.get_child("tags"))
    else {
        return Ok(Vec::new());
    };

    tags.children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(e) if e.name == "tag" => Some(e),
            _ => None,
        })
        .map(|e| parse_tag(e, first_sample_timestamp, origin))
        .collect()
}

/// Parse a tags artifact from disk.
pub fn read_file(path: &Path, first_sample_timestamp: f64) -> Result<Vec<Tag>> {
    let file = File::open(path)?;
    read(BufReader::new(file), first_sample_timestamp, path)
}

/// Whether `name` can be written as an unprefixed XML element name.
fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Reject tags whose description keys cannot be stored as elements.
pub fn validate(tags: &[Tag]) -> Result<()> {
    for tag in tags {
        if let Some(key) = tag.description.keys().find(|k| !is_element_name(k)) {
            return Err(RecordingError::InvalidArgument(format!(
                "tag {:?} at {}: description key {key:?} is not a valid element name",
                tag.name, tag.start_timestamp
            )));
        }
    }
    Ok(())
}

fn tag_element(tag: &Tag, first_sample_timestamp: f64) -> Element {
    let mut element = Element::new("tag");
    let attributes = &mut element.attributes;
    attributes.insert(
        "position".to_string(),
        (tag.start_timestamp - first_sample_timestamp).to_string(),
    );
    attributes.insert("length".to_string(), tag.duration().to_string());
    attributes.insert("name".to_string(), tag.name.clone());
    attributes.insert(
        "channelNumber".to_string(),
        tag.channels.clone().unwrap_or_else(|| ALL_CHANNELS.to_string()),
    );

    for (key, value) in &tag.description {
        let mut desc = Element::new(key);
        desc.children.push(XMLNode::Text(value.clone()));
        element.children.push(XMLNode::Element(desc));
    }
    element
}

/// Build the document for a tag list.
pub fn to_element(tags: &[Tag], first_sample_timestamp: f64) -> Element {
    let mut list = Element::new("tags");
    list.children.extend(
        tags.iter()
            .map(|t| XMLNode::Element(tag_element(t, first_sample_timestamp))),
    );

    let mut data = Element::new("tagData");
    data.children.push(XMLNode::Element(list));

    let mut root = Element::new("tagFile");
    root.attributes
        .insert("formatVersion".to_string(), FORMAT_VERSION.to_string());
    root.children.push(XMLNode::Element(data));
    root
}

/// Write a tags document.
pub fn write<W: Write>(
    writer: W,
    tags: &[Tag],
    first_sample_timestamp: f64,
    origin: &Path,
) -> Result<()> {
    validate(tags)?;
    let config = EmitterConfig::new().perform_indent(true);
    to_element(tags, first_sample_timestamp)
        .write_with_config(writer, config)
        .map_err(|e| RecordingError::malformed(origin, e))
}

/// Write a tags artifact to disk.
pub fn write_file(path: &Path, tags: &[Tag], first_sample_timestamp: f64) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer, tags, first_sample_timestamp, path)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<tagFile formatVersion="1.0">
  <paging blocks_per_page="5" page_size="20.0"/>
  <tagData>
    <tags>
      <tag channelNumber="-1" length="0.5" name="target" position="1.5">
        <letter>A</letter>
        <index>3</index>
      </tag>
      <tag channelNumber="2" length="0" name="blink" position="0.25"/>
    </tags>
  </tagData>
</tagFile>"#;

    #[test]
    fn test_read_positions_are_offsets() {
        let tags = read(DOCUMENT.as_bytes(), 10.0, Path::new("t.tag")).unwrap();
        assert_eq!(tags.len(), 2);

        assert_eq!(tags[0].name, "target");
        assert_eq!(tags[0].start_timestamp, 11.5);
        assert_eq!(tags[0].end_timestamp, 12.0);
        assert_eq!(tags[0].channels, None);
        assert_eq!(tags[0].description.get("letter").map(String::as_str), Some("A"));

        assert_eq!(tags[1].channels.as_deref(), Some("2"));
        assert!(tags[1].description.is_empty());
    }

    #[test]
    fn test_missing_attribute_is_malformed() {
        let doc = r#"<tagFile><tagData><tags><tag length="1"/></tags></tagData></tagFile>"#;
        let err = read(doc.as_bytes(), 0.0, Path::new("t.tag")).unwrap_err();
        assert!(matches!(err, RecordingError::MalformedPersistedData { .. }));
    }

    #[test]
    fn test_empty_document() {
        let tags = read("<tagFile/>".as_bytes(), 0.0, Path::new("t.tag")).unwrap();
        assert!(tags.is_empty());
    }

    #[test]
    fn test_description_keys_must_be_element_names() {
        let ok = vec![Tag::instant("a", 1.0)
            .with_desc("stimulus_type", "tone")
            .with_desc("trial.no", "3")];
        assert!(validate(&ok).is_ok());

        for key in ["stimulus type", "1st", "", "rs:kind", "a>b"] {
            let tags = vec![Tag::instant("a", 1.0).with_desc(key, "x")];
            assert!(matches!(validate(&tags), Err(RecordingError::InvalidArgument(_))));

            let mut bytes = Vec::new();
            assert!(write(&mut bytes, &tags, 0.0, Path::new("t.tag")).is_err());
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn test_write_then_read() {
        let tags = vec![
            Tag::new("a", 4.0, 4.5).with_desc("kind", "cue"),
            Tag::instant("b", 5.25).with_channels("0 1"),
        ];
        let mut bytes = Vec::new();
        write(&mut bytes, &tags, 2.0, Path::new("t.tag")).unwrap();
        let back = read(bytes.as_slice(), 2.0, Path::new("t.tag")).unwrap();
        assert_eq!(back, tags);
    }
}

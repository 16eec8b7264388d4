//! Parameters artifact: an XML document in the `rs` raw-signal namespace.
//!
//! Only a closed vocabulary of keys is recognised. Each key maps to one
//! element; simple keys hold a text value, list keys hold one child element
//! per item. Unknown elements are ignored on read.

use crate::error::{RecordingError, Result};
use crate::storage::params::{ParamMap, ParamValue};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use xmltree::{Element, EmitterConfig, Namespace, XMLNode};

/// Namespace URI of the raw-signal vocabulary.
pub const RS_NAMESPACE: &str = "http://signalml.org/rawsignal";

const RS_PREFIX: &str = "rs";
const ROOT: &str = "rawSignal";

/// Recognised parameter keys.
pub mod keys {
    pub const EXPORT_FILE_NAME: &str = "export_file_name";
    pub const EXPORT_DATE: &str = "export_date";
    pub const SOURCE_FILE_NAME: &str = "source_file_name";
    pub const SOURCE_FILE_FORMAT: &str = "source_file_format";
    pub const SAMPLING_FREQUENCY: &str = "sampling_frequency";
    pub const NUMBER_OF_CHANNELS: &str = "number_of_channels";
    pub const NUMBER_OF_SAMPLES: &str = "number_of_samples";
    pub const SAMPLE_TYPE: &str = "sample_type";
    pub const BYTE_ORDER: &str = "byte_order";
    pub const PAGE_SIZE: &str = "page_size";
    pub const BLOCKS_PER_PAGE: &str = "blocks_per_page";
    pub const CHANNELS_NAMES: &str = "channels_names";
    pub const CHANNELS_NUMBERS: &str = "channels_numbers";
    pub const CHANNELS_GAINS: &str = "channels_gains";
    pub const CHANNELS_OFFSETS: &str = "channels_offsets";
    pub const FIRST_SAMPLE_TIMESTAMP: &str = "first_sample_timestamp";
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Simple,
    List(&'static str),
}

/// Key, element name, shape. Written in this order.
const VOCABULARY: &[(&str, &str, Shape)] = &[
    (keys::EXPORT_FILE_NAME, "exportFileName", Shape::Simple),
    (keys::EXPORT_DATE, "exportDate", Shape::Simple),
    (keys::SOURCE_FILE_NAME, "sourceFileName", Shape::Simple),
    (keys::SOURCE_FILE_FORMAT, "sourceFileFormat", Shape::Simple),
    (keys::SAMPLING_FREQUENCY, "samplingFrequency", Shape::Simple),
    (keys::NUMBER_OF_CHANNELS, "channelCount", Shape::Simple),
    (keys::NUMBER_OF_SAMPLES, "sampleCount", Shape::Simple),
    (keys::SAMPLE_TYPE, "sampleType", Shape::Simple),
    (keys::BYTE_ORDER, "byteOrder", Shape::Simple),
    (keys::PAGE_SIZE, "pageSize", Shape::Simple),
    (keys::BLOCKS_PER_PAGE, "blocksPerPage", Shape::Simple),
    (keys::CHANNELS_NAMES, "channelLabels", Shape::List("label")),
    (keys::CHANNELS_NUMBERS, "channelNumbers", Shape::List("number")),
    (keys::CHANNELS_GAINS, "calibrationGain", Shape::List("calibrationParam")),
    (keys::CHANNELS_OFFSETS, "calibrationOffset", Shape::List("calibrationParam")),
    (keys::FIRST_SAMPLE_TIMESTAMP, "firstSampleTimestamp", Shape::Simple),
];

/// Whether `key` belongs to the persisted vocabulary.
pub fn is_known_key(key: &str) -> bool {
    VOCABULARY.iter().any(|(k, _, _)| *k == key)
}

fn element_text(element: &Element) -> String {
    element
        .get_text()
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

/// Parse a parameters document.
pub fn read<R: Read>(reader: R, origin: &Path) -> Result<ParamMap> {
    let root = Element::parse(reader).map_err(|e| RecordingError::malformed(origin, e))?;
    if root.name != ROOT {
        return Err(RecordingError::malformed(
            origin,
            format!("expected <{ROOT}> root, found <{}>", root.name),
        ));
    }

    let mut params = ParamMap::new();
    for (key, tag, shape) in VOCABULARY {
        let Some(element) = root.get_child(*tag) else {
            continue;
        };
        let value = match shape {
            Shape::Simple => ParamValue::Simple(element_text(element)),
            Shape::List(item) => ParamValue::List(
                child_elements(element)
                    .filter(|e| e.name == *item)
                    .map(element_text)
                    .collect(),
            ),
        };
        params.insert((*key).to_string(), value);
    }
    Ok(params)
}

/// Parse a parameters artifact from disk.
pub fn read_file(path: &Path) -> Result<ParamMap> {
    let file = File::open(path)?;
    read(BufReader::new(file), path)
}

fn rs_element(name: &str) -> Element {
    let mut element = Element::new(name);
    element.prefix = Some(RS_PREFIX.to_string());
    element.namespace = Some(RS_NAMESPACE.to_string());
    element
}

fn text_element(name: &str, text: &str) -> Element {
    let mut element = rs_element(name);
    element.children.push(XMLNode::Text(text.to_string()));
    element
}

/// Build the document for a parameter mapping. Keys outside the vocabulary
/// are left out.
pub fn to_element(params: &ParamMap) -> Element {
    let mut root = rs_element(ROOT);
    let mut namespaces = Namespace::empty();
    namespaces.put(RS_PREFIX, RS_NAMESPACE);
    root.namespaces = Some(namespaces);

    for (key, tag, shape) in VOCABULARY {
        let Some(value) = params.get(*key) else {
            continue;
        };
        let element = match (shape, value) {
            (Shape::Simple, ParamValue::Simple(text)) => text_element(tag, text),
            (Shape::Simple, ParamValue::List(items)) => text_element(tag, &items.join(",")),
            (Shape::List(item), ParamValue::List(items)) => {
                let mut list = rs_element(tag);
                for text in items {
                    list.children.push(XMLNode::Element(text_element(item, text)));
                }
                list
            }
            (Shape::List(item), ParamValue::Simple(text)) => {
                let mut list = rs_element(tag);
                list.children.push(XMLNode::Element(text_element(item, text)));
                list
            }
        };
        root.children.push(XMLNode::Element(element));
    }
    root
}

/// Write a parameters document.
pub fn write<W: Write>(writer: W, params: &ParamMap, origin: &Path) -> Result<()> {
    let config = EmitterConfig::new().perform_indent(true);
    to_element(params)
        .write_with_config(writer, config)
        .map_err(|e| RecordingError::malformed(origin, e))
}

/// Write a parameters artifact to disk.
pub fn write_file(path: &Path, params: &ParamMap) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer, params, path)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rs:rawSignal xmlns:rs="http://signalml.org/rawsignal">
  <rs:exportFileName>session.obci.raw</rs:exportFileName>
  <rs:samplingFrequency>256.0</rs:samplingFrequency>
  <rs:channelCount>2</rs:channelCount>
  <rs:sampleCount>1024</rs:sampleCount>
  <rs:sampleType>FLOAT</rs:sampleType>
  <rs:channelLabels>
    <rs:label>Fp1</rs:label>
    <rs:label>Fp2</rs:label>
  </rs:channelLabels>
  <rs:calibrationGain>
    <rs:calibrationParam>0.5</rs:calibrationParam>
    <rs:calibrationParam>1.0</rs:calibrationParam>
  </rs:calibrationGain>
  <rs:amplifierSerial>XYZ</rs:amplifierSerial>
  <rs:firstSampleTimestamp>1700000000.25</rs:firstSampleTimestamp>
</rs:rawSignal>"#;

    #[test]
    fn test_read_known_keys() {
        let params = read(DOCUMENT.as_bytes(), Path::new("test.xml")).unwrap();
        assert_eq!(
            params.get(keys::SAMPLING_FREQUENCY),
            Some(&ParamValue::simple("256.0"))
        );
        assert_eq!(
            params.get(keys::CHANNELS_NAMES),
            Some(&ParamValue::list(["Fp1", "Fp2"]))
        );
        assert_eq!(
            params.get(keys::FIRST_SAMPLE_TIMESTAMP),
            Some(&ParamValue::simple("1700000000.25"))
        );
        assert!(!params.contains_key("amplifier_serial"));
        assert_eq!(params.len(), 8);
    }

    #[test]
    fn test_wrong_root_is_malformed() {
        let err = read("<tagFile/>".as_bytes(), Path::new("bad.xml")).unwrap_err();
        assert!(matches!(err, RecordingError::MalformedPersistedData { .. }));

        let err = read("<rs:rawSignal".as_bytes(), Path::new("bad.xml")).unwrap_err();
        assert!(err.to_string().contains("bad.xml"));
    }

    #[test]
    fn test_write_then_read() {
        let mut params = ParamMap::new();
        params.insert(keys::SAMPLING_FREQUENCY.into(), ParamValue::simple("100"));
        params.insert(keys::CHANNELS_NAMES.into(), ParamValue::list(["a", "b", "c"]));
        params.insert(keys::CHANNELS_OFFSETS.into(), ParamValue::list([0, 0, 1]));
        params.insert("operator".into(), ParamValue::simple("ignored"));

        let mut bytes = Vec::new();
        write(&mut bytes, &params, Path::new("out.xml")).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("rs:samplingFrequency"));
        assert!(!text.contains("operator"));

        let back = read(bytes.as_slice(), Path::new("out.xml")).unwrap();
        params.remove("operator");
        assert_eq!(back, params);
    }

    #[test]
    fn test_vocabulary_lookup() {
        assert!(is_known_key(keys::BYTE_ORDER));
        assert!(!is_known_key("operator"));
    }
}

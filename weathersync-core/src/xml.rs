//! Flat view over small attribute-centric XML documents.
//!
//! The XML feeds we consume carry all data in attributes, so a list of
//! elements in document order is all the adapters need.

use quick_xml::{Reader, events::Event};
use std::collections::HashMap;

use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attrs: HashMap<String, String>,
}

impl XmlElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Attribute value, or a parse error naming the element and key.
    pub fn required(&self, key: &str) -> Result<&str, ProviderError> {
        self.attr(key).ok_or_else(|| {
            ProviderError::Parse(format!("<{}> is missing attribute '{key}'", self.name))
        })
    }

    /// Attribute parsed as a number, tolerating a trailing unit
    /// (`"22 km/h"`).
    pub fn number(&self, key: &str) -> Result<f64, ProviderError> {
        let raw = self.required(key)?;
        raw.split_whitespace()
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| ProviderError::Parse(format!("'{key}' is not a number: {raw}")))
    }
}

/// Every start and empty element of `body`, in document order.
pub(crate) fn elements(body: &str) -> Result<Vec<XmlElement>, ProviderError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let mut attrs = HashMap::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                    attrs.insert(key, attr.unescape_value()?.into_owned());
                }
                out.push(XmlElement { name, attrs });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if out.is_empty() {
        return Err(ProviderError::Parse("document has no elements".into()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_nested_and_empty_elements() {
        let doc = r#"<?xml version="1.0"?>
            <root a="1">
              <item id="x" name="Caf&#233; &amp; Bar"/>
              <item id="y"><inner v="22 km/h"/></item>
            </root>"#;

        let els = elements(doc).unwrap();
        let names: Vec<_> = els.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["root", "item", "item", "inner"]);
        assert_eq!(els[1].attr("name"), Some("Café & Bar"));
        assert_eq!(els[3].number("v").unwrap(), 22.0);
        assert!(els[2].required("name").is_err());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(elements("not xml at all").is_err());
        assert!(elements("<a><b></a>").is_err());
    }
}

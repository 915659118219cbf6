//! Text tree representation of tables and descriptors.
//!
//! An [`Element`] has a name, string attributes, optional text and child
//! elements. Trees are exchanged as JSON and rendered as XML for reading.
//! Integer attributes are written in hexadecimal (`0x0123`) when they are
//! identifiers and in decimal otherwise; both forms are accepted on input.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::text::EncodedText;

/// One node of a text tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check the element name.
    pub fn expect_name(&self, expected: &str) -> Result<(), TreeError> {
        if self.name == expected {
            Ok(())
        } else {
            Err(TreeError::UnexpectedElement {
                expected: expected.to_string(),
                found: self.name.clone(),
            })
        }
    }

    // --- building ---

    pub fn set_attr(&mut self, name: &str, value: impl ToString) -> &mut Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Decimal integer attribute.
    pub fn set_int(&mut self, name: &str, value: impl Into<u64>) -> &mut Self {
        self.set_attr(name, value.into())
    }

    /// Hexadecimal integer attribute with `digits` digits.
    pub fn set_hex(&mut self, name: &str, value: impl Into<u64>, digits: usize) -> &mut Self {
        self.set_attr(name, format!("0x{:0width$X}", value.into(), width = digits))
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.set_attr(name, value)
    }

    /// Optional decimal integer; nothing is written when absent.
    pub fn set_opt_int<T: Into<u64>>(&mut self, name: &str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.set_int(name, v);
        }
        self
    }

    /// Optional hexadecimal integer; nothing is written when absent.
    pub fn set_opt_hex<T: Into<u64>>(&mut self, name: &str, value: Option<T>, digits: usize) -> &mut Self {
        if let Some(v) = value {
            self.set_hex(name, v, digits);
        }
        self
    }

    /// Text field: `name="..."` when lossless, `name_hex="..."` otherwise.
    pub fn set_text_attr(&mut self, name: &str, text: &EncodedText) -> &mut Self {
        if text.is_plain() {
            self.set_attr(name, text.to_string_lossy())
        } else {
            self.set_attr(&format!("{}_hex", name), hex::encode_upper(text.as_bytes()))
        }
    }

    /// Binary content as hexadecimal text. Empty data leaves no text.
    pub fn set_hex_text(&mut self, data: &[u8]) -> &mut Self {
        self.text = if data.is_empty() {
            None
        } else {
            Some(hex::encode_upper(data))
        };
        self
    }

    /// Append a child and return it.
    pub fn add_child(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append a new empty child with a name and return it.
    pub fn add_element(&mut self, name: &str) -> &mut Element {
        self.add_child(Element::new(name))
    }

    // --- reading ---

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn missing(&self, attribute: &str) -> TreeError {
        TreeError::MissingAttribute {
            element: self.name.clone(),
            attribute: attribute.to_string(),
        }
    }

    fn invalid(&self, attribute: &str, value: &str) -> TreeError {
        TreeError::InvalidAttribute {
            element: self.name.clone(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    /// Optional integer attribute, range-checked against `T`.
    pub fn get_opt_int<T: TryFrom<u64>>(&self, name: &str) -> Result<Option<T>, TreeError> {
        let Some(value) = self.attr(name) else {
            return Ok(None);
        };
        parse_u64(value)
            .and_then(|v| T::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| self.invalid(name, value))
    }

    /// Required integer attribute.
    pub fn get_int<T: TryFrom<u64>>(&self, name: &str) -> Result<T, TreeError> {
        self.get_opt_int(name)?.ok_or_else(|| self.missing(name))
    }

    /// Integer attribute with a default value.
    pub fn get_int_or<T: TryFrom<u64>>(&self, name: &str, default: T) -> Result<T, TreeError> {
        Ok(self.get_opt_int(name)?.unwrap_or(default))
    }

    pub fn get_opt_bool(&self, name: &str) -> Result<Option<bool>, TreeError> {
        match self.attr(name) {
            None => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(true)),
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(false)),
            Some(v) => Err(self.invalid(name, v)),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, TreeError> {
        self.get_opt_bool(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn get_bool_or(&self, name: &str, default: bool) -> Result<bool, TreeError> {
        Ok(self.get_opt_bool(name)?.unwrap_or(default))
    }

    /// Text field written by [`Element::set_text_attr`]. Absent means empty.
    pub fn get_text_attr(&self, name: &str) -> Result<EncodedText, TreeError> {
        let hex_name = format!("{}_hex", name);
        if let Some(value) = self.attr(&hex_name) {
            return hex::decode(value.trim())
                .map(EncodedText::new)
                .map_err(|_| self.invalid(&hex_name, value));
        }
        Ok(self.attr(name).map(EncodedText::from).unwrap_or_default())
    }

    /// Hexadecimal text content; whitespace is ignored.
    pub fn hex_text(&self) -> Result<Vec<u8>, TreeError> {
        let Some(text) = &self.text else {
            return Ok(Vec::new());
        };
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(compact).map_err(|_| TreeError::InvalidHex {
            element: self.name.clone(),
        })
    }

    // --- interchange ---

    pub fn to_json(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render as indented XML.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write_xml(&mut out, 0);
        out
    }

    fn write_xml(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{}<{}", indent, self.name);
        for (name, value) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", name, escape_xml(value));
        }

        match (&self.text, self.children.is_empty()) {
            (None, true) => out.push_str("/>\n"),
            (Some(text), true) => {
                let _ = writeln!(out, ">{}</{}>", escape_xml(text), self.name);
            }
            (text, false) => {
                out.push_str(">\n");
                if let Some(text) = text {
                    let _ = writeln!(out, "{}  {}", indent, escape_xml(text));
                }
                for child in &self.children {
                    child.write_xml(out, depth + 1);
                }
                let _ = writeln!(out, "{}</{}>", indent, self.name);
            }
        }
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

use crate::error::{MapperError, Result};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use std::borrow::Cow;

/// Common labels that are not WHATWG labels.
const LABEL_ALIASES: &[(&str, &str)] = &[
    ("cp932", "windows-31j"),
    ("utf-8-sig", "utf-8"),
    ("utf_8_sig", "utf-8"),
    ("utf8-sig", "utf-8"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding {
    encoding: &'static Encoding,
}

impl TextEncoding {
    pub fn for_label(label: &str) -> Result<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        let aliased = LABEL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, target)| *target);

        [
            aliased.map(str::to_string),
            Some(normalized.clone()),
            Some(normalized.replace('_', "-")),
        ]
        .into_iter()
        .flatten()
        .find_map(|candidate| Encoding::for_label(candidate.as_bytes()))
        .map(|encoding| Self { encoding })
        .ok_or_else(|| MapperError::UnsupportedEncoding(label.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Strict decode. A byte order mark takes precedence over the label and is removed.
    /// Returns `None` on malformed input.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        let (encoding, bom_length) = Encoding::for_bom(bytes).unwrap_or((self.encoding, 0));
        encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_length..])
    }

    /// Strict encode. UTF-16 output carries a byte order mark; other encodings do not.
    /// Returns `None` when a character has no representation in the target encoding.
    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        if self.encoding == UTF_16LE {
            let mut bytes = vec![0xFF, 0xFE];
            bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
            return Some(bytes);
        }
        if self.encoding == UTF_16BE {
            let mut bytes = vec![0xFE, 0xFF];
            bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
            return Some(bytes);
        }

        let (bytes, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            None
        } else {
            Some(bytes.into_owned())
        }
    }
}

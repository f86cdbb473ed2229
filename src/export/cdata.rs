//! CDATA wrapping
//!
//! Free text is embedded as CDATA. A literal `]]>` inside the text would
//! close the section early, so the text is split right after `]]` and the
//! remainder continues in a new section:
//!
//! ```text
//! a]]>b  =>  <![CDATA[a]]]]><![CDATA[>b]]>
//! ```
//!
//! Concatenating the section contents always yields the original text.

use std::borrow::Cow;

const CDATA_END: &str = "]]>";

/// Decode bytes as UTF-8, falling back to Windows-1252 for legacy content
pub fn coerce_utf8(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let bytes = err.into_bytes();
            let (decoded, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(&bytes);
            decoded.into_owned()
        }
    }
}

/// Borrow the bytes as UTF-8 when possible, otherwise decode them
pub fn to_utf8(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}

/// Split text into CDATA section contents, none of which contains `]]>`
pub fn cdata_sections(text: &str) -> Vec<Cow<'_, str>> {
    let mut parts = text.split(CDATA_END);
    let first = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    if rest.is_empty() {
        return vec![Cow::Borrowed(first)];
    }

    let mut sections = Vec::with_capacity(rest.len() + 1);
    sections.push(Cow::Owned(format!("{}]]", first)));
    let last = rest.len() - 1;
    for (i, part) in rest.into_iter().enumerate() {
        if i == last {
            sections.push(Cow::Owned(format!(">{}", part)));
        } else {
            sections.push(Cow::Owned(format!(">{}]]", part)));
        }
    }
    sections
}

/// Wrap text in one or more CDATA sections
pub fn wrap_cdata(text: impl AsRef<[u8]>) -> String {
    let text = to_utf8(text.as_ref());
    cdata_sections(&text)
        .iter()
        .map(|section| format!("<![CDATA[{}]]>", section))
        .collect()
}

/// First character that XML 1.0 does not allow in a document
pub fn find_invalid_char(text: &str) -> Option<char> {
    text.chars().find(|c| !is_xml_char(*c))
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

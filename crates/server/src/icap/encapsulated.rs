//! The ICAP `Encapsulated` header (RFC 3507 section 4.4.1).
//!
//! Lists the byte offsets of the sections carried in the message body,
//! e.g. `req-hdr=0, null-body=170`. The last entry is always a body marker.

use std::str::FromStr;

use crate::error::IcapError;

/// One encapsulated section name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    ReqHdr,
    ResHdr,
    ReqBody,
    ResBody,
    OptBody,
    NullBody,
}

impl Section {
    fn is_body(self) -> bool {
        matches!(self, Section::ReqBody | Section::ResBody | Section::OptBody | Section::NullBody)
    }
}

impl FromStr for Section {
    type Err = IcapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "req-hdr" => Ok(Section::ReqHdr),
            "res-hdr" => Ok(Section::ResHdr),
            "req-body" => Ok(Section::ReqBody),
            "res-body" => Ok(Section::ResBody),
            "opt-body" => Ok(Section::OptBody),
            "null-body" => Ok(Section::NullBody),
            other => Err(IcapError::BadEncapsulated(format!("unknown section {other}"))),
        }
    }
}

/// Parsed `Encapsulated` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encapsulated {
    sections: Vec<(Section, usize)>,
}

impl Encapsulated {
    /// Length of the encapsulated HTTP request head, if one is carried.
    pub fn req_hdr_len(&self) -> Option<usize> {
        let pos = self.sections.iter().position(|(s, _)| *s == Section::ReqHdr)?;
        let start = self.sections[pos].1;
        let end = self.sections[pos + 1].1;
        Some(end - start)
    }

    /// The trailing body marker.
    pub fn body(&self) -> Section {
        self.sections.last().map_or(Section::NullBody, |(s, _)| *s)
    }

    /// Whether the message carries a body after its headers.
    pub fn has_body(&self) -> bool {
        self.body() != Section::NullBody
    }

    /// Whether a response header section precedes the body.
    pub fn has_res_hdr(&self) -> bool {
        self.sections.iter().any(|(s, _)| *s == Section::ResHdr)
    }
}

impl FromStr for Encapsulated {
    type Err = IcapError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut sections = Vec::new();

        for entry in value.split(',') {
            let (name, offset) = entry
                .trim()
                .split_once('=')
                .ok_or_else(|| IcapError::BadEncapsulated(value.to_string()))?;
            let section: Section = name.trim().parse()?;
            let offset: usize = offset
                .trim()
                .parse()
                .map_err(|_| IcapError::BadEncapsulated(value.to_string()))?;

            // Sections are read back to back from the start of the body.
            if sections.is_empty() && offset != 0 {
                return Err(IcapError::BadEncapsulated(format!("{value}: first offset must be 0")));
            }
            if let Some((prev, prev_offset)) = sections.last()
                && (offset < *prev_offset || Section::is_body(*prev))
            {
                return Err(IcapError::BadEncapsulated(value.to_string()));
            }
            sections.push((section, offset));
        }

        match sections.last() {
            Some((last, _)) if last.is_body() => Ok(Self { sections }),
            _ => Err(IcapError::BadEncapsulated(format!("{value}: missing body marker"))),
        }
    }
}

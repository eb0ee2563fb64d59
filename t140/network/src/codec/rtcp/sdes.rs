//! RTCP Source Description (SDES) packets
//!
//! ```text
//! chunk := SSRC/CSRC (32) | item* | END (0) | zero padding to 32 bits
//! item  := type (8) | length (8) | text (length octets)
//! ```

use super::{RtcpPacketType, finish_rtcp_packet, write_rtcp_header};
use crate::error::{NetworkError, Result};
use crate::utils::{pad_to_word, padding_len, read_u32_be};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SdesItemType {
    End = 0,
    Cname = 1,
    Name = 2,
    Email = 3,
    Phone = 4,
    Loc = 5,
    Tool = 6,
    Note = 7,
    Priv = 8,
}

impl SdesItemType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::End),
            1 => Some(Self::Cname),
            2 => Some(Self::Name),
            3 => Some(Self::Email),
            4 => Some(Self::Phone),
            5 => Some(Self::Loc),
            6 => Some(Self::Tool),
            7 => Some(Self::Note),
            8 => Some(Self::Priv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::End => "END",
            Self::Cname => "CNAME",
            Self::Name => "NAME",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Loc => "LOC",
            Self::Tool => "TOOL",
            Self::Note => "NOTE",
            Self::Priv => "PRIV",
        }
    }
}

/// One SDES item. PRIV items keep their prefix-length byte and prefix
/// inside `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesItem {
    pub item_type: SdesItemType,
    pub value: Vec<u8>,
}

impl SdesItem {
    pub fn new(item_type: SdesItemType, text: &str) -> Self {
        Self {
            item_type,
            value: text.as_bytes().to_vec(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesChunk {
    pub ssrc: u32,
    pub items: Vec<SdesItem>,
}

/// RTCP SDES packet
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDescription {
    pub chunks: Vec<SdesChunk>,
}

impl SourceDescription {
    /// Single-chunk SDES for `ssrc`.
    pub fn for_source(ssrc: u32, items: Vec<SdesItem>) -> Self {
        Self {
            chunks: vec![SdesChunk { ssrc, items }],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let chunks = &self.chunks[..self.chunks.len().min(31)];
        let mut bytes = Vec::new();
        write_rtcp_header(&mut bytes, RtcpPacketType::SDES, chunks.len(), 0);

        for chunk in chunks {
            bytes.extend_from_slice(&chunk.ssrc.to_be_bytes());
            for item in chunk.items.iter().filter(|i| i.item_type != SdesItemType::End) {
                let len = item.value.len().min(255);
                bytes.push(item.item_type as u8);
                bytes.push(len as u8);
                bytes.extend_from_slice(&item.value[..len]);
            }
            // END item, then pad the chunk to a word boundary
            bytes.push(0);
            pad_to_word(&mut bytes);
        }

        finish_rtcp_packet(&mut bytes);
        bytes
    }

    pub(crate) fn from_body(count: u8, body: &[u8]) -> Result<Self> {
        let mut chunks = Vec::with_capacity(count as usize);
        let mut offset = 0;

        for _ in 0..count {
            let ssrc = read_u32_be(body, offset)
                .ok_or_else(|| NetworkError::Rtcp("SDES chunk truncated".to_string()))?;
            offset += 4;

            let mut items = Vec::new();
            loop {
                let item_type = *body
                    .get(offset)
                    .ok_or_else(|| NetworkError::Rtcp("SDES chunk missing END".to_string()))?;
                if item_type == SdesItemType::End as u8 {
                    offset += 1;
                    break;
                }
                let len = *body
                    .get(offset + 1)
                    .ok_or_else(|| NetworkError::Rtcp("SDES item truncated".to_string()))?
                    as usize;
                let value = body
                    .get(offset + 2..offset + 2 + len)
                    .ok_or_else(|| NetworkError::Rtcp("SDES item text truncated".to_string()))?;
                // Unknown item types are skipped by length.
                if let Some(item_type) = SdesItemType::from_u8(item_type) {
                    items.push(SdesItem {
                        item_type,
                        value: value.to_vec(),
                    });
                }
                offset += 2 + len;
            }
            offset += padding_len(offset);
            chunks.push(SdesChunk { ssrc, items });
        }

        Ok(Self { chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rtcp::packet_body;

    #[test]
    fn test_cname_only_layout() {
        let sdes = SourceDescription::for_source(
            0x01020304,
            vec![SdesItem::new(SdesItemType::Cname, "ab")],
        );
        let bytes = sdes.to_bytes();

        // header + ssrc + (1,2,'a','b') + END + 3 pad
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], 202);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 3);
        assert_eq!(&bytes[8..12], &[1, 2, b'a', b'b']);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_chunk_ending_on_word_boundary_gets_end_word() {
        let sdes =
            SourceDescription::for_source(7, vec![SdesItem::new(SdesItemType::Name, "ab")]);
        let bytes = sdes.to_bytes();
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(*bytes.last().unwrap(), 0);
    }

    #[test]
    fn test_parse_multiple_items_and_chunks() {
        let sdes = SourceDescription {
            chunks: vec![
                SdesChunk {
                    ssrc: 1,
                    items: vec![
                        SdesItem::new(SdesItemType::Cname, "user@host"),
                        SdesItem::new(SdesItemType::Email, "user@example.com"),
                        SdesItem::new(SdesItemType::Tool, "t140"),
                    ],
                },
                SdesChunk {
                    ssrc: 2,
                    items: vec![SdesItem::new(SdesItemType::Note, "away")],
                },
            ],
        };
        let bytes = sdes.to_bytes();
        let (header, body) = packet_body(&bytes).unwrap();
        assert_eq!(SourceDescription::from_body(header.count, body).unwrap(), sdes);
    }

    #[test]
    fn test_unknown_item_is_skipped() {
        // ssrc, item 42 len 1 'x', CNAME len 1 'y', END, pad
        let body = [0, 0, 0, 5, 42, 1, b'x', 1, 1, b'y', 0, 0];
        let parsed = SourceDescription::from_body(1, &body).unwrap();
        assert_eq!(parsed.chunks[0].items.len(), 1);
        assert_eq!(parsed.chunks[0].items[0].text(), "y");
    }

    #[test]
    fn test_truncated_item_is_error() {
        let body = [0, 0, 0, 5, 1, 9, b'x', 0];
        assert!(SourceDescription::from_body(1, &body).is_err());
    }
}

//! RED framing for text (RFC 2198 as profiled by RFC 4103 Section 4)
//!
//! ```text
//! redundant block header (F=1):
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |1|   block PT  |  timestamp offset         |   block length    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! primary header (F=0):
//! +-+-+-+-+-+-+-+-+
//! |0|   block PT  |
//! +-+-+-+-+-+-+-+-+
//! ```
//!
//! Headers are ordered oldest generation first and the data blocks follow
//! in the same order, primary last. Decoded generations are indexed the
//! other way round: 0 is the primary, 1 the most recent redundant copy.

pub const BLOCK_HEADER_SIZE: usize = 4;
pub const MAX_BLOCK_LENGTH: usize = 0x3FF;
pub const MAX_TIMESTAMP_OFFSET: u32 = 0x3FFF;

const FOLLOW_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedBlockHeader {
    pub payload_type: u8,
    pub timestamp_offset: u16,
    pub block_length: u16,
}

impl RedBlockHeader {
    /// Header for a slot with no data (warm-up or offset overflow).
    pub fn empty(payload_type: u8) -> Self {
        Self {
            payload_type,
            timestamp_offset: 0,
            block_length: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let offset = self.timestamp_offset & MAX_TIMESTAMP_OFFSET as u16;
        let length = self.block_length & MAX_BLOCK_LENGTH as u16;
        [
            FOLLOW_BIT | (self.payload_type & 0x7F),
            (offset >> 6) as u8,
            (((offset & 0x3F) << 2) | (length >> 8)) as u8,
            (length & 0xFF) as u8,
        ]
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let bytes = data.get(..BLOCK_HEADER_SIZE)?;
        Some(Self {
            payload_type: bytes[0] & 0x7F,
            timestamp_offset: ((bytes[1] as u16) << 6) | ((bytes[2] as u16) >> 2),
            block_length: (((bytes[2] & 0x03) as u16) << 8) | bytes[3] as u16,
        })
    }

    fn is_placeholder(&self) -> bool {
        self.timestamp_offset == 0 && self.block_length == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Timestamp distance back from the primary (0 for the primary)
    pub timestamp_offset: u16,
    /// `None` when the block is a placeholder or could not be located.
    pub data: Option<Vec<u8>>,
}

/// A decoded RED payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedPayload {
    /// Index 0 is the primary; index i is the copy of packet `seq - i`.
    pub generations: Vec<Generation>,
    /// Malformations found while parsing, for the caller to log.
    pub warnings: Vec<String>,
}

impl RedPayload {
    pub fn primary(&self) -> Option<&[u8]> {
        self.generations.first().and_then(|g| g.data.as_deref())
    }

    /// Number of redundant generations that survived validation.
    pub fn redundancy(&self) -> usize {
        self.generations.len().saturating_sub(1)
    }

    /// Parses `payload` expecting every block to carry `t140_pt`.
    ///
    /// A payload-type mismatch drops all redundant generations but still
    /// locates the primary. A block running past the end of the payload is
    /// absent, as is everything after it.
    pub fn parse(payload: &[u8], t140_pt: u8) -> Self {
        let mut warnings = Vec::new();
        let mut headers = Vec::new();
        let mut pos = 0;

        while pos < payload.len() && payload[pos] & FOLLOW_BIT != 0 {
            match RedBlockHeader::from_bytes(&payload[pos..]) {
                Some(header) => headers.push(header),
                None => {
                    warnings.push(format!("RED block header truncated at byte {}", pos));
                    return Self::without_primary(warnings);
                }
            }
            pos += BLOCK_HEADER_SIZE;
        }

        let Some(&primary_header) = payload.get(pos) else {
            warnings.push("RED payload has no primary header".to_string());
            return Self::without_primary(warnings);
        };
        pos += 1;

        let primary_pt = primary_header & 0x7F;
        let mut keep_redundancy = true;
        if primary_pt != t140_pt {
            warnings.push(format!(
                "primary payload type {} does not match T.140 type {}",
                primary_pt, t140_pt
            ));
            keep_redundancy = false;
        }
        if let Some(bad) = headers.iter().find(|h| h.payload_type != t140_pt) {
            warnings.push(format!(
                "redundant block payload type {} does not match T.140 type {}",
                bad.payload_type, t140_pt
            ));
            keep_redundancy = false;
        }

        // Wire position j carries generation headers.len() - j.
        let mut redundant = Vec::with_capacity(headers.len());
        for (j, header) in headers.iter().enumerate() {
            let end = pos + header.block_length as usize;
            let data = if end > payload.len() {
                warnings.push(format!(
                    "redundant block {} claims {} bytes past the payload end",
                    headers.len() - j,
                    end - payload.len()
                ));
                None
            } else if header.is_placeholder() {
                None
            } else {
                Some(payload[pos..end].to_vec())
            };
            redundant.push(Generation {
                timestamp_offset: header.timestamp_offset,
                data,
            });
            pos = end;
        }

        let primary = Generation {
            timestamp_offset: 0,
            data: payload.get(pos..).map(<[u8]>::to_vec),
        };
        if primary.data.is_none() {
            warnings.push("primary block lies beyond the payload end".to_string());
        }

        let mut generations = vec![primary];
        if keep_redundancy {
            generations.extend(redundant.into_iter().rev());
        }
        Self {
            generations,
            warnings,
        }
    }

    fn without_primary(warnings: Vec<String>) -> Self {
        Self {
            generations: vec![Generation {
                timestamp_offset: 0,
                data: None,
            }],
            warnings,
        }
    }
}

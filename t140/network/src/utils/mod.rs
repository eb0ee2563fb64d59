//! Byte-level helpers shared by the codecs

pub mod packet_utils;

pub use packet_utils::{
    concat, pad_to_word, padding_len, read_u16_be, read_u32_be, trim_zeros, write_u16_be,
    write_u32_be,
};

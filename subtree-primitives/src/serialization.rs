//! Bitcoin-style binary (de)serialization helpers shared by subtrees and
//! blocks.
//!
//! Small free functions over `Read`/`Write` rather than a full derive-based
//! framework, since the wire formats here (§3, §4.1, §4.4) are fixed and
//! simple enough not to need one.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Errors produced while reading a subtree, block, or header from bytes.
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum SerializationError {
    /// io error reading or writing a binary format: {0}
    Io(#[from] io::Error),
    /// invalid varint encoding
    Varint,
    /// unexpected data: {0}
    Parse(&'static str),
}

/// Reads a Bitcoin `CompactSize` (varint) value.
pub fn read_compact_size<R: Read>(mut reader: R) -> Result<u64, SerializationError> {
    let first = reader.read_u8()?;
    let value = match first {
        0..=0xfc => first as u64,
        0xfd => reader.read_u16::<LittleEndian>()? as u64,
        0xfe => reader.read_u32::<LittleEndian>()? as u64,
        0xff => reader.read_u64::<LittleEndian>()?,
    };
    Ok(value)
}

/// Writes a Bitcoin `CompactSize` (varint) value.
pub fn write_compact_size<W: Write>(mut writer: W, value: u64) -> Result<(), SerializationError> {
    if value < 0xfd {
        writer.write_u8(value as u8)?;
    } else if value <= 0xffff {
        writer.write_u8(0xfd)?;
        writer.write_u16::<LittleEndian>(value as u16)?;
    } else if value <= 0xffff_ffff {
        writer.write_u8(0xfe)?;
        writer.write_u32::<LittleEndian>(value as u32)?;
    } else {
        writer.write_u8(0xff)?;
        writer.write_u64::<LittleEndian>(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_size_round_trips() {
        for value in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x1_0000, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_compact_size(&mut buf, value).unwrap();
            let parsed = read_compact_size(&buf[..]).unwrap();
            assert_eq!(parsed, value, "round trip failed for {value}");
        }
    }
}

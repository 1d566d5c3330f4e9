//! On-disk header for the v4 SSTable format.

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Magic bytes identifying a v4 SSTable file.
pub const SSTABLE_MAGIC: [u8; 4] = *b"SST4";

/// Fixed + variable-length header written at the front of every SSTable file.
///
/// The body that follows is a single deflate-compressed block (see
/// `writer`/`reader`), so the header alone is enough to decide whether a
/// table can possibly contain a key (`min_key..=max_key`) without touching
/// the compressed payload at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub level: u32,
    pub file_id: u64,
    pub entry_count: u32,
    pub max_seq: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
}

impl Header {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&SSTABLE_MAGIC)?;
        w.write_u32::<LittleEndian>(self.level)?;
        w.write_u64::<LittleEndian>(self.file_id)?;
        w.write_u32::<LittleEndian>(self.entry_count)?;
        w.write_u64::<LittleEndian>(self.max_seq)?;
        w.write_u32::<LittleEndian>(self.min_key.len() as u32)?;
        w.write_all(&self.min_key)?;
        w.write_u32::<LittleEndian>(self.max_key.len() as u32)?;
        w.write_all(&self.max_key)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).context("reading SSTable magic")?;
        if magic != SSTABLE_MAGIC {
            bail!("bad SSTable magic: {:?}", magic);
        }
        let level = r.read_u32::<LittleEndian>()?;
        let file_id = r.read_u64::<LittleEndian>()?;
        let entry_count = r.read_u32::<LittleEndian>()?;
        let max_seq = r.read_u64::<LittleEndian>()?;

        const MAX_KEY_BYTES: u32 = 64 * 1024;
        let min_key_len = r.read_u32::<LittleEndian>()?;
        if min_key_len > MAX_KEY_BYTES {
            bail!("min_key_len too large: {}", min_key_len);
        }
        let mut min_key = vec![0u8; min_key_len as usize];
        r.read_exact(&mut min_key)?;

        let max_key_len = r.read_u32::<LittleEndian>()?;
        if max_key_len > MAX_KEY_BYTES {
            bail!("max_key_len too large: {}", max_key_len);
        }
        let mut max_key = vec![0u8; max_key_len as usize];
        r.read_exact(&mut max_key)?;

        Ok(Header {
            level,
            file_id,
            entry_count,
            max_seq,
            min_key,
            max_key,
        })
    }
}

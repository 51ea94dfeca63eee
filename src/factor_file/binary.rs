//! Little-endian container for factor matrices.
//!
//! | field          | type          |
//! |----------------|---------------|
//! | magic          | `b"SVDF"`     |
//! | version        | u32           |
//! | channel count  | u64, `u64::MAX` when unknown |
//! | entry count    | u64           |
//!
//! followed by one record per entry: u16 key length, key bytes (UTF-8),
//! u64 rows, u64 cols and `rows * cols` f64 values in row-major order.

use std::io::{BufRead, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{CodecResult, FactorCodec, FactorStore, StoredMatrix};

const MAGIC: &[u8; 4] = b"SVDF";
const VERSION: u32 = 1;
const UNKNOWN_CHANNEL_COUNT: u64 = u64::MAX;
// upper bound for the initial allocation, a corrupt header must not reserve gigabytes
const MAX_PREALLOCATED_VALUES: usize = 1 << 20;

pub struct BinaryCodec;

fn to_count(value: u64, what: &str) -> CodecResult<usize> {
    usize::try_from(value).map_err(|_| format!("{} {} does not fit into memory", what, value))
}

fn read_entry<R: Read>(source: &mut R) -> CodecResult<(String, StoredMatrix)> {
    let key_length = source
        .read_u16::<LittleEndian>()
        .map_err(|e| e.to_string())?;
    let mut key = vec![0; key_length as usize];
    source.read_exact(&mut key).map_err(|e| e.to_string())?;
    let key = String::from_utf8(key).map_err(|e| e.to_string())?;
    let rows = to_count(
        source.read_u64::<LittleEndian>().map_err(|e| e.to_string())?,
        "row count",
    )?;
    let cols = to_count(
        source.read_u64::<LittleEndian>().map_err(|e| e.to_string())?,
        "column count",
    )?;
    let length = rows
        .checked_mul(cols)
        .ok_or_else(|| format!("matrix '{}' of {}x{} is too large", key, rows, cols))?;
    let mut data = Vec::with_capacity(length.min(MAX_PREALLOCATED_VALUES));
    for _ in 0..length {
        data.push(
            source
                .read_f64::<LittleEndian>()
                .map_err(|e| format!("matrix '{}' is truncated: {}", key, e))?,
        );
    }
    Ok((key, StoredMatrix::new(rows, cols, data)))
}

impl FactorCodec for BinaryCodec {
    fn decode<R: BufRead>(&self, mut source: R) -> CodecResult<FactorStore> {
        let mut magic = [0; 4];
        source
            .read_exact(&mut magic)
            .map_err(|e| format!("missing header: {}", e))?;
        if &magic != MAGIC {
            return Err("not a factor container".to_owned());
        }
        let version = source
            .read_u32::<LittleEndian>()
            .map_err(|e| e.to_string())?;
        if version != VERSION {
            return Err(format!("unsupported container version {}", version));
        }
        let mut store = FactorStore::new();
        let channel_count = source
            .read_u64::<LittleEndian>()
            .map_err(|e| e.to_string())?;
        if channel_count != UNKNOWN_CHANNEL_COUNT {
            store.set_channel_count(to_count(channel_count, "channel count")?);
        }
        let entry_count = source
            .read_u64::<LittleEndian>()
            .map_err(|e| e.to_string())?;
        for _ in 0..entry_count {
            let (key, matrix) = read_entry(&mut source)?;
            store.insert(key, matrix);
        }
        Ok(store)
    }

    fn encode<W: Write>(&self, store: &FactorStore, mut sink: W) -> CodecResult<()> {
        sink.write_all(MAGIC).map_err(|e| e.to_string())?;
        sink.write_u32::<LittleEndian>(VERSION)
            .map_err(|e| e.to_string())?;
        let channel_count = store
            .channel_count()
            .map_or(UNKNOWN_CHANNEL_COUNT, |count| count as u64);
        sink.write_u64::<LittleEndian>(channel_count)
            .map_err(|e| e.to_string())?;
        sink.write_u64::<LittleEndian>(store.len() as u64)
            .map_err(|e| e.to_string())?;
        for (key, matrix) in store.entries() {
            let key_length = u16::try_from(key.len())
                .map_err(|_| format!("key '{}' is too long", key))?;
            sink.write_u16::<LittleEndian>(key_length)
                .map_err(|e| e.to_string())?;
            sink.write_all(key.as_bytes()).map_err(|e| e.to_string())?;
            sink.write_u64::<LittleEndian>(matrix.rows() as u64)
                .map_err(|e| e.to_string())?;
            sink.write_u64::<LittleEndian>(matrix.cols() as u64)
                .map_err(|e| e.to_string())?;
            for value in matrix.data() {
                sink.write_f64::<LittleEndian>(*value)
                    .map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }
}

use std::io::{BufRead, Write};

use super::{CodecResult, FactorCodec, FactorStore};

pub struct JsonCodec;

impl FactorCodec for JsonCodec {
    fn decode<R: BufRead>(&self, source: R) -> CodecResult<FactorStore> {
        serde_json::from_reader(source).map_err(|e| e.to_string())
    }

    fn encode<W: Write>(&self, store: &FactorStore, sink: W) -> CodecResult<()> {
        serde_json::to_writer(sink, store).map_err(|e| e.to_string())
    }
}

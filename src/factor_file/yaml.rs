use std::io::{BufRead, Write};

use super::{CodecResult, FactorCodec, FactorStore};

pub struct YamlCodec;

impl FactorCodec for YamlCodec {
    fn decode<R: BufRead>(&self, source: R) -> CodecResult<FactorStore> {
        serde_yaml::from_reader(source).map_err(|e| e.to_string())
    }

    fn encode<W: Write>(&self, store: &FactorStore, sink: W) -> CodecResult<()> {
        serde_yaml::to_writer(sink, store).map_err(|e| e.to_string())
    }
}

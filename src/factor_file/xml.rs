//! XML layout of a factor file.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <factors channels="1">
//!   <U_0 rows="2" cols="2">-0.7071 -0.7071 -0.7071 0.7071</U_0>
//!   <W_0 rows="2" cols="1">7.74 0.0000001</W_0>
//!   <Vt_0 rows="2" cols="2">1 0 0 1</Vt_0>
//! </factors>
//! ```
//!
//! Values are listed in row-major order, separated by whitespace.

use std::io::{BufRead, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{CodecResult, FactorCodec, FactorStore, StoredMatrix, CHANNEL_COUNT_KEY};

const ROOT_ELEMENT: &str = "factors";
const ROWS_ATTRIBUTE: &str = "rows";
const COLS_ATTRIBUTE: &str = "cols";

pub struct XmlCodec;

struct OpenMatrix {
    key: String,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

fn attribute(element: &BytesStart<'_>, name: &str) -> CodecResult<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        if attribute.key.as_ref() == name.as_bytes() {
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_count(element: &BytesStart<'_>, name: &str) -> CodecResult<Option<usize>> {
    attribute(element, name)?
        .map(|value| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|e| format!("attribute '{}' is not a count: {}", name, e))
        })
        .transpose()
}

fn open_matrix(element: &BytesStart<'_>) -> CodecResult<OpenMatrix> {
    let key = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let rows = parse_count(element, ROWS_ATTRIBUTE)?
        .ok_or_else(|| format!("element '{}' has no '{}' attribute", key, ROWS_ATTRIBUTE))?;
    let cols = parse_count(element, COLS_ATTRIBUTE)?
        .ok_or_else(|| format!("element '{}' has no '{}' attribute", key, COLS_ATTRIBUTE))?;
    Ok(OpenMatrix {
        key,
        rows,
        cols,
        data: Vec::new(),
    })
}

fn read_root(element: &BytesStart<'_>, store: &mut FactorStore) -> CodecResult<()> {
    if let Some(count) = parse_count(element, CHANNEL_COUNT_KEY)? {
        store.set_channel_count(count);
    }
    Ok(())
}

fn is_root(element: &BytesStart<'_>) -> bool {
    element.name().as_ref() == ROOT_ELEMENT.as_bytes()
}

impl FactorCodec for XmlCodec {
    fn decode<R: BufRead>(&self, source: R) -> CodecResult<FactorStore> {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        let mut buffer = Vec::new();
        let mut store = FactorStore::new();
        let mut current: Option<OpenMatrix> = None;
        let mut seen_root = false;

        loop {
            match reader.read_event_into(&mut buffer).map_err(|e| e.to_string())? {
                Event::Start(ref element) if !seen_root => {
                    if !is_root(element) {
                        return Err(format!("expected root element '{}'", ROOT_ELEMENT));
                    }
                    read_root(element, &mut store)?;
                    seen_root = true;
                }
                Event::Empty(ref element) if !seen_root => {
                    if !is_root(element) {
                        return Err(format!("expected root element '{}'", ROOT_ELEMENT));
                    }
                    read_root(element, &mut store)?;
                    seen_root = true;
                }
                Event::Start(ref element) => {
                    if current.is_some() {
                        return Err("factor elements must not be nested".to_owned());
                    }
                    current = Some(open_matrix(element)?);
                }
                Event::Empty(ref element) => {
                    let matrix = open_matrix(element)?;
                    store.insert(matrix.key, StoredMatrix::new(matrix.rows, matrix.cols, Vec::new()));
                }
                Event::Text(ref text) => {
                    if let Some(matrix) = current.as_mut() {
                        let text = text.unescape().map_err(|e| e.to_string())?;
                        for token in text.split_whitespace() {
                            let value = token.parse::<f64>().map_err(|e| {
                                format!("value '{}' in '{}' is not a number: {}", token, matrix.key, e)
                            })?;
                            matrix.data.push(value);
                        }
                    }
                }
                Event::End(_) => {
                    if let Some(matrix) = current.take() {
                        store.insert(matrix.key, StoredMatrix::new(matrix.rows, matrix.cols, matrix.data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buffer.clear();
        }

        if !seen_root {
            return Err(format!("document has no '{}' element", ROOT_ELEMENT));
        }
        Ok(store)
    }

    fn encode<W: Write>(&self, store: &FactorStore, sink: W) -> CodecResult<()> {
        let mut writer = Writer::new_with_indent(sink, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| e.to_string())?;

        let mut root = BytesStart::new(ROOT_ELEMENT);
        let count = store.channel_count().map(|count| count.to_string());
        if let Some(count) = count.as_deref() {
            root.push_attribute((CHANNEL_COUNT_KEY, count));
        }
        writer
            .write_event(Event::Start(root))
            .map_err(|e| e.to_string())?;

        for (key, matrix) in store.entries() {
            let rows = matrix.rows().to_string();
            let cols = matrix.cols().to_string();
            let mut element = BytesStart::new(key);
            element.push_attribute((ROWS_ATTRIBUTE, rows.as_str()));
            element.push_attribute((COLS_ATTRIBUTE, cols.as_str()));
            let values = matrix
                .data()
                .iter()
                .map(f64::to_string)
                .collect::<Vec<String>>()
                .join(" ");
            writer
                .write_event(Event::Start(element))
                .map_err(|e| e.to_string())?;
            writer
                .write_event(Event::Text(BytesText::new(&values)))
                .map_err(|e| e.to_string())?;
            writer
                .write_event(Event::End(BytesEnd::new(key)))
                .map_err(|e| e.to_string())?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))
            .map_err(|e| e.to_string())?;
        writer
            .into_inner()
            .write_all(b"\n")
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::super::FactorCodec;
    use super::XmlCodec;

    #[test]
    fn read_hand_written_document() {
        let document = r#"<?xml version="1.0"?>
<factors channels="1">
  <U_0 rows="2" cols="1">0.6
    0.8</U_0>
  <W_0 rows="1" cols="1">5</W_0>
  <Vt_0 rows="1" cols="1">-1e0</Vt_0>
</factors>"#;
        let store = XmlCodec.decode(document.as_bytes()).unwrap();
        assert_eq!(store.channel_count(), Some(1));
        assert_eq!(store.get("U_0").unwrap().data(), &[0.6, 0.8]);
        assert_eq!(store.get("W_0").unwrap().data(), &[5.0]);
        assert_eq!(store.get("Vt_0").unwrap().data(), &[-1.0]);
    }

    #[test]
    fn read_empty_matrix_element() {
        let document = r#"<factors><U_0 rows="0" cols="0"/></factors>"#;
        let store = XmlCodec.decode(document.as_bytes()).unwrap();
        assert_eq!(store.channel_count(), None);
        assert!(store.get("U_0").unwrap().data().is_empty());
    }

    #[test]
    fn reject_foreign_root_element() {
        let document = r#"<annotation><folder>x</folder></annotation>"#;
        assert!(XmlCodec.decode(document.as_bytes()).is_err());
    }

    #[test]
    fn reject_non_numeric_values() {
        let document = r#"<factors><W_0 rows="1" cols="1">abc</W_0></factors>"#;
        assert!(XmlCodec.decode(document.as_bytes()).is_err());
    }

    #[test]
    fn reject_matrix_without_dimensions() {
        let document = r#"<factors><W_0 cols="1">1</W_0></factors>"#;
        assert!(XmlCodec.decode(document.as_bytes()).is_err());
    }

    #[test]
    fn write_matrix_elements_under_root() {
        let store = super::super::test::sample_store();
        let mut buffer = Vec::new();
        XmlCodec.encode(&store, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains(r#"<factors channels="1">"#), "{}", text);
        assert!(
            text.contains(r#"<W_0 rows="2" cols="1">7.745966692414833 "#),
            "{}",
            text
        );
    }
}

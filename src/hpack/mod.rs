//! HPACK header compression (RFC 7541).
//!
//! A [`Decoder`] and [`Encoder`] each own one side's dynamic table; the
//! static table (RFC 7541 Appendix A) is process-wide and read-only.
//! Integer and string/Huffman codecs are free functions, since they carry
//! no state of their own.

mod dynamic_table;
mod huffman;
mod integer;
pub mod static_table;

pub use dynamic_table::DynamicTable;

use std::fmt;

/// Errors the HPACK codec can raise. All of them are connection-fatal
/// protocol errors from the HTTP/2 layer's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HpackError {
    /// Input ended before a complete representation was read.
    Truncated,
    /// A variable-length integer exceeded the codec's 64-bit accumulator.
    IntegerOverflow,
    /// An indexed representation referenced an index past the combined
    /// static+dynamic table.
    InvalidIndex(u64),
    /// Huffman-decoded bytes were not valid UTF-8 where UTF-8 was required.
    InvalidUtf8,
    /// A Huffman code did not match any symbol.
    HuffmanInvalidCode,
    /// Trailing bits after the last full Huffman symbol were not a valid
    /// EOS-prefix padding.
    HuffmanPaddingInvalid,
}

impl fmt::Display for HpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HpackError::Truncated => write!(f, "truncated HPACK representation"),
            HpackError::IntegerOverflow => write!(f, "HPACK integer overflow"),
            HpackError::InvalidIndex(i) => write!(f, "invalid HPACK table index {i}"),
            HpackError::InvalidUtf8 => write!(f, "HPACK string was not valid UTF-8"),
            HpackError::HuffmanInvalidCode => write!(f, "invalid Huffman code"),
            HpackError::HuffmanPaddingInvalid => write!(f, "invalid Huffman EOS padding"),
        }
    }
}

impl std::error::Error for HpackError {}

const STATIC_TABLE_LEN: usize = static_table::STATIC_TABLE.len();

/// How an encoded header name/value pair should be represented on the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexing {
    /// Insert into the dynamic table after emitting (not used by the
    /// HTTP/2 response encoder, but supported for decode).
    Incremental,
    /// Emit as a literal, do not insert into the dynamic table.
    Without,
    /// Emit as a literal explicitly marked "never index" (sensitive
    /// headers); semantically identical to `Without` for this codec.
    Never,
}

/// A decoded header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name (always lowercase for regular headers per HTTP/2).
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Decodes HPACK header blocks against a per-connection dynamic table.
#[derive(Debug, Default)]
pub struct Decoder {
    dynamic: DynamicTable,
}

impl Decoder {
    /// Creates a decoder with the given dynamic table size bound.
    pub fn new(max_dynamic_size: usize) -> Self {
        Self {
            dynamic: DynamicTable::new(max_dynamic_size),
        }
    }

    fn lookup(&self, index: u64) -> Result<(String, String), HpackError> {
        let index = index as usize;
        if index == 0 {
            return Err(HpackError::InvalidIndex(index as u64));
        }
        if index <= STATIC_TABLE_LEN {
            let (name, value) = static_table::by_index(index).expect("bounds checked above");
            return Ok((name.to_string(), value.to_string()));
        }
        self.dynamic
            .get(index - STATIC_TABLE_LEN)
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .ok_or(HpackError::InvalidIndex(index as u64))
    }

    /// Decodes one complete header block (the concatenation of a HEADERS
    /// frame's fragment and any CONTINUATION fragments) into an ordered
    /// list of headers. Dynamic-table-size-update entries are applied
    /// in-place and do not appear in the output.
    pub fn decode_block(&mut self, mut block: &[u8]) -> Result<Vec<Header>, HpackError> {
        let mut headers = Vec::new();
        while !block.is_empty() {
            let first = block[0];
            if first & 0x80 != 0 {
                // Indexed Header Field (RFC 7541 §6.1).
                let (index, consumed) = integer::decode(block, 7)?;
                let (name, value) = self.lookup(index)?;
                headers.push(Header { name, value });
                block = &block[consumed..];
            } else if first & 0x40 != 0 {
                // Literal Header Field with Incremental Indexing (§6.2.1).
                let (name, value, consumed) = self.decode_literal(block, 6)?;
                self.dynamic.insert(name.clone(), value.clone());
                headers.push(Header { name, value });
                block = &block[consumed..];
            } else if first & 0x20 != 0 {
                // Dynamic Table Size Update (§6.3).
                let (new_size, consumed) = integer::decode(block, 5)?;
                self.dynamic.set_max_size(new_size as usize);
                block = &block[consumed..];
            } else {
                // Literal Header Field without/never Indexing (§6.2.2/6.2.3).
                let (name, value, consumed) = self.decode_literal(block, 4)?;
                headers.push(Header { name, value });
                block = &block[consumed..];
            }
        }
        Ok(headers)
    }

    fn decode_literal(
        &self,
        block: &[u8],
        prefix_bits: u8,
    ) -> Result<(String, String, usize), HpackError> {
        let (name_index, mut consumed) = integer::decode(block, prefix_bits)?;
        let name = if name_index == 0 {
            let (s, n) = decode_string(&block[consumed..])?;
            consumed += n;
            s
        } else {
            self.lookup(name_index)?.0
        };
        let (value, n) = decode_string(&block[consumed..])?;
        consumed += n;
        Ok((name, value, consumed))
    }
}

/// Decodes one HPACK string literal (RFC 7541 §5.2), returning the string
/// and the number of input bytes consumed.
fn decode_string(input: &[u8]) -> Result<(String, usize), HpackError> {
    if input.is_empty() {
        return Err(HpackError::Truncated);
    }
    let huffman = input[0] & 0x80 != 0;
    let (len, mut consumed) = integer::decode(input, 7)?;
    let len = len as usize;
    let raw = input
        .get(consumed..consumed + len)
        .ok_or(HpackError::Truncated)?;
    consumed += len;

    let bytes = if huffman {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    let s = String::from_utf8(bytes).map_err(|_| HpackError::InvalidUtf8)?;
    Ok((s, consumed))
}

/// Encodes one HPACK string literal, choosing Huffman whenever it is no
/// larger than the raw octets.
fn encode_string(s: &str, out: &mut Vec<u8>) {
    let raw = s.as_bytes();
    let huff_len = huffman::encoded_len(raw);
    if huff_len < raw.len() {
        let encoded = huffman::encode(raw);
        out.extend(integer::encode(encoded.len() as u64, 7, 0x80));
        out.extend(encoded);
    } else {
        out.extend(integer::encode(raw.len() as u64, 7, 0x00));
        out.extend(raw);
    }
}

/// Encodes HPACK header blocks against a per-connection dynamic table.
/// The response encoder always uses [`Indexing::Without`]; the other modes
/// exist so the codec's encode surface matches what it can decode,
/// mirroring the H1 parser's own parser/writer symmetry.
#[derive(Debug, Default)]
pub struct Encoder {
    dynamic: DynamicTable,
}

impl Encoder {
    /// Creates an encoder with the given dynamic table size bound. The
    /// response encoder never grows the table (it always encodes literals
    /// without indexing), so a size of 0 is the typical choice.
    pub fn new(max_dynamic_size: usize) -> Self {
        Self {
            dynamic: DynamicTable::new(max_dynamic_size),
        }
    }

    /// Names this encoder will look up an indexed representation for.
    /// Every other header is encoded with a fully literal name, per
    /// spec's "Response emission" rule: indexed names are a special case
    /// for these three, not a general optimization.
    const INDEXED_NAME_HEADERS: &'static [&'static str] = &[":status", "content-type", "content-length"];

    /// Encodes one header field into `out`. `name` gets an indexed
    /// representation from the static table only when it is `:status`,
    /// `content-type`, or `content-length`; every other header is encoded
    /// fully literal (literal name, literal value), never matched against
    /// the static table even when it happens to share a name with an
    /// entry there.
    pub fn encode_header(&mut self, name: &str, value: &str, indexing: Indexing, out: &mut Vec<u8>) {
        let prefer_indexed_name = Self::INDEXED_NAME_HEADERS.contains(&name);

        if prefer_indexed_name {
            if let Some(index) = static_table::index_of_name_value(name, value) {
                out.extend(integer::encode(index as u64, 7, 0x80));
                return;
            }
        }

        let prefix_byte = match indexing {
            Indexing::Incremental => 0x40,
            Indexing::Without => 0x00,
            Indexing::Never => 0x10,
        };
        let prefix_bits = match indexing {
            Indexing::Incremental => 6,
            Indexing::Without | Indexing::Never => 4,
        };

        let indexed_name = if prefer_indexed_name { static_table::index_of_name(name) } else { None };
        match indexed_name {
            Some(index) => out.extend(integer::encode(index as u64, prefix_bits, prefix_byte)),
            None => {
                out.push(prefix_byte);
                encode_string(name, out);
            }
        }
        encode_string(value, out);

        if matches!(indexing, Indexing::Incremental) {
            self.dynamic.insert(name.to_string(), value.to_string());
        }
    }

    /// Encodes an ordered list of headers into one block.
    pub fn encode_block(&mut self, headers: &[(&str, &str)], indexing: Indexing) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in headers {
            self.encode_header(name, value, indexing, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip_with_static_names() {
        let mut enc = Encoder::new(0);
        let block = enc.encode_block(
            &[
                (":status", "200"),
                ("content-type", "text/plain"),
                ("content-length", "2"),
            ],
            Indexing::Without,
        );

        let mut dec = Decoder::new(4096);
        let headers = dec.decode_block(&block).unwrap();
        assert_eq!(headers[0].name, ":status");
        assert_eq!(headers[0].value, "200");
        assert_eq!(headers[1].name, "content-type");
        assert_eq!(headers[1].value, "text/plain");
        assert_eq!(headers[2].name, "content-length");
        assert_eq!(headers[2].value, "2");
    }

    #[test]
    fn fully_indexed_status_200_uses_a_single_byte() {
        let mut enc = Encoder::new(0);
        let block = enc.encode_block(&[(":status", "200")], Indexing::Without);
        assert_eq!(block, vec![0x80 | 8]);
    }

    #[test]
    fn incremental_indexing_grows_the_dynamic_table() {
        let mut enc = Encoder::new(4096);
        let block = enc.encode_block(&[("x-custom", "value")], Indexing::Incremental);
        assert_eq!(enc.dynamic.len(), 1);

        let mut dec = Decoder::new(4096);
        let headers = dec.decode_block(&block).unwrap();
        assert_eq!(headers[0].name, "x-custom");
        assert_eq!(dec.dynamic.len(), 1);
    }

    #[test]
    fn dynamic_table_size_update_is_honored_before_literals() {
        let mut dec = Decoder::new(4096);
        // Size update to 0, then a literal without indexing for a name not
        // in the static table.
        let mut block = integer::encode(0, 5, 0x20);
        let mut enc = Encoder::new(0);
        block.extend(enc.encode_block(&[("x-new", "v")], Indexing::Without));
        let headers = dec.decode_block(&block).unwrap();
        assert_eq!(headers[0].name, "x-new");
        assert_eq!(dec.dynamic.max_size(), 0);
    }

    #[test]
    fn huffman_round_trips_through_full_header_encode() {
        let mut enc = Encoder::new(0);
        let long_value = "a".repeat(200);
        let block = enc.encode_block(&[("x-long", long_value.as_str())], Indexing::Without);
        let mut dec = Decoder::new(4096);
        let headers = dec.decode_block(&block).unwrap();
        assert_eq!(headers[0].value, long_value);
    }

    #[test]
    fn non_pseudo_header_sharing_a_static_table_name_stays_fully_literal() {
        // "cache-control" is static table entry 24 (and static_table::
        // index_of_name would happily find it); only :status,
        // content-type, and content-length are allowed an indexed-name
        // representation, so this must come out name-literal,
        // value-literal instead, matching exactly what a literal-without-
        // indexing representation of a name the encoder never looked up
        // would produce.
        let mut enc = Encoder::new(0);
        let block = enc.encode_block(&[("cache-control", "no-cache")], Indexing::Without);

        let mut expected = vec![0x00];
        encode_string("cache-control", &mut expected);
        encode_string("no-cache", &mut expected);
        assert_eq!(block, expected);

        let mut dec = Decoder::new(4096);
        let headers = dec.decode_block(&block).unwrap();
        assert_eq!(headers[0].name, "cache-control");
        assert_eq!(headers[0].value, "no-cache");
    }

    #[test]
    fn invalid_index_is_reported() {
        let mut dec = Decoder::new(4096);
        let block = integer::encode(200, 7, 0x80);
        assert_eq!(dec.decode_block(&block), Err(HpackError::InvalidIndex(200)));
    }
}

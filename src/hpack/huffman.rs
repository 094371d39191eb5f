//! Huffman coding for HPACK string literals (RFC 7541 Appendix B). The
//! 257-symbol code (256 octet values plus EOS) is canonical: it is fully
//! determined by each symbol's code *length*, which is what this module
//! hardcodes. Codes are derived from those lengths once, the first time
//! either direction is used, and cached for the life of the process.

use std::sync::OnceLock;

/// Code length, in bits, for each of the 256 octet values plus EOS (index
/// 256), per RFC 7541 Appendix B.
const CODE_LENGTHS: [u8; 257] = [
    13, 23, 28, 28, 28, 28, 28, 28, 28, 24, 30, 28, 28, 30, 28, 28, 28, 28, 28, 28, 28, 28, 30,
    28, 28, 28, 28, 28, 28, 28, 28, 28, 6, 10, 10, 12, 13, 6, 8, 11, 10, 10, 8, 11, 8, 6, 6, 6, 5,
    5, 5, 6, 6, 6, 6, 6, 6, 6, 7, 8, 15, 6, 12, 10, 13, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 8, 7, 8, 13, 19, 13, 14, 6, 15, 5, 6, 5, 6, 5, 6, 6, 6, 5, 7, 7,
    6, 6, 6, 5, 6, 7, 6, 5, 5, 6, 7, 7, 7, 7, 7, 15, 11, 14, 13, 28, 20, 22, 20, 20, 22, 22, 22,
    23, 22, 23, 23, 23, 23, 23, 24, 23, 24, 24, 22, 23, 24, 23, 23, 23, 23, 21, 22, 23, 22, 23,
    23, 24, 22, 21, 20, 22, 22, 23, 23, 21, 23, 22, 22, 24, 22, 23, 23, 21, 21, 22, 21, 21, 21,
    21, 22, 21, 22, 23, 23, 21, 22, 21, 21, 24, 22, 23, 23, 21, 21, 23, 22, 21, 21, 23, 22, 22,
    21, 21, 24, 22, 21, 22, 23, 23, 21, 23, 21, 21, 20, 22, 22, 21, 20, 21, 21, 21, 21, 21, 22,
    22, 22, 23, 23, 22, 21, 21, 20, 22, 22, 22, 23, 23, 22, 22, 22, 24, 22, 22, 22, 22, 22, 22,
    22, 22, 23, 26, 27, 24, 30,
];

struct Tables {
    codes: [u32; 257],
    lens: [u8; 257],
    trie: Vec<TrieNode>,
}

#[derive(Clone, Copy)]
struct TrieNode {
    children: [Option<u32>; 2],
    symbol: Option<u16>,
}

fn build() -> Tables {
    let mut order: Vec<usize> = (0..257).collect();
    order.sort_by_key(|&sym| (CODE_LENGTHS[sym], sym));

    let mut codes = [0u32; 257];
    let mut code: u32 = 0;
    let mut prev_len: u8 = 0;
    for sym in order {
        let len = CODE_LENGTHS[sym];
        code <<= (len - prev_len) as u32;
        codes[sym] = code;
        code += 1;
        prev_len = len;
    }

    let mut trie = vec![TrieNode {
        children: [None, None],
        symbol: None,
    }];
    for sym in 0..257 {
        let len = CODE_LENGTHS[sym];
        let c = codes[sym];
        let mut cur = 0u32;
        for bit_pos in (0..len).rev() {
            let bit = ((c >> bit_pos) & 1) as usize;
            cur = match trie[cur as usize].children[bit] {
                Some(next) => next,
                None => {
                    trie.push(TrieNode {
                        children: [None, None],
                        symbol: None,
                    });
                    let idx = (trie.len() - 1) as u32;
                    trie[cur as usize].children[bit] = Some(idx);
                    idx
                }
            };
        }
        trie[cur as usize].symbol = Some(sym as u16);
    }

    Tables {
        codes,
        lens: CODE_LENGTHS,
        trie,
    }
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(build)
}

/// Huffman-encodes `input`, padding the final partial byte with 1 bits
/// (the EOS prefix), per RFC 7541 §5.2.
pub fn encode(input: &[u8]) -> Vec<u8> {
    let t = tables();
    let mut out = Vec::with_capacity(input.len());
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;

    for &byte in input {
        let code = t.codes[byte as usize] as u64;
        let len = t.lens[byte as usize] as u32;
        acc = (acc << len) | code;
        acc_bits += len;
        while acc_bits >= 8 {
            acc_bits -= 8;
            out.push(((acc >> acc_bits) & 0xff) as u8);
        }
    }
    if acc_bits > 0 {
        let pad = 8 - acc_bits;
        let byte = ((acc << pad) | ((1u64 << pad) - 1)) & 0xff;
        out.push(byte as u8);
    }
    out
}

/// The length, in bytes, that `encode(input)` would produce. Used by the
/// string codec to decide whether Huffman actually shrinks a literal.
pub fn encoded_len(input: &[u8]) -> usize {
    let t = tables();
    let bits: u64 = input.iter().map(|&b| t.lens[b as usize] as u64).sum();
    ((bits + 7) / 8) as usize
}

/// Decodes a Huffman-encoded string. Trailing bits that don't resolve to a
/// full symbol are accepted as EOS padding as long as they are all 1s and
/// shorter than a byte.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, super::HpackError> {
    let t = tables();
    let mut out = Vec::with_capacity(input.len() * 2);
    let mut cur: u32 = 0;
    let mut pending_ones = 0u32;
    let mut bits_since_symbol = 0u32;

    for &byte in input {
        for bit_pos in (0..8).rev() {
            let bit = ((byte >> bit_pos) & 1) as usize;
            let node = &t.trie[cur as usize];
            match node.children[bit] {
                Some(next) => {
                    cur = next;
                    bits_since_symbol += 1;
                    pending_ones = if bit == 1 { pending_ones + 1 } else { 0 };
                }
                None => return Err(super::HpackError::HuffmanInvalidCode),
            }
            if let Some(sym) = t.trie[cur as usize].symbol {
                if sym == 256 {
                    return Err(super::HpackError::HuffmanInvalidCode);
                }
                out.push(sym as u8);
                cur = 0;
                bits_since_symbol = 0;
                pending_ones = 0;
            }
        }
    }

    if cur != 0 {
        if bits_since_symbol >= 8 || pending_ones != bits_since_symbol {
            return Err(super::HpackError::HuffmanPaddingInvalid);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ascii() {
        let input = b"www.example.com";
        let encoded = encode(input);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn round_trips_empty_string() {
        assert_eq!(decode(&encode(b"")).unwrap(), b"");
    }

    #[test]
    fn round_trips_every_byte_value() {
        let input: Vec<u8> = (0..=255u8).collect();
        let encoded = encode(&input);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn encoded_len_matches_actual_output_length() {
        let input = b"some header value";
        assert_eq!(encoded_len(input), encode(input).len());
    }
}

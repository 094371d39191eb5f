//! HPACK variable-width integer codec (RFC 7541 §5.1), parameterized by the
//! number of prefix bits available in the first octet (4/5/6/7 depending
//! on the representation).

use super::HpackError;

/// Encodes `value` using an `prefix_bits`-bit prefix in the first octet,
/// ORed with `prefix_byte`'s high bits (the representation-selecting flag
/// bits the caller has already set outside the prefix).
pub fn encode(value: u64, prefix_bits: u8, prefix_byte: u8) -> Vec<u8> {
    let max_prefix = (1u64 << prefix_bits) - 1;
    if value < max_prefix {
        return vec![prefix_byte | value as u8];
    }

    let mut out = vec![prefix_byte | max_prefix as u8];
    let mut remainder = value - max_prefix;
    while remainder >= 128 {
        out.push(((remainder % 128) + 128) as u8);
        remainder /= 128;
    }
    out.push(remainder as u8);
    out
}

/// Decodes an integer starting at `input[0]`'s low `prefix_bits` bits,
/// returning the value and the number of bytes consumed.
pub fn decode(input: &[u8], prefix_bits: u8) -> Result<(u64, usize), HpackError> {
    if input.is_empty() {
        return Err(HpackError::Truncated);
    }
    let max_prefix = (1u64 << prefix_bits) - 1;
    let prefix_value = (input[0] as u64) & max_prefix;
    if prefix_value < max_prefix {
        return Ok((prefix_value, 1));
    }

    let mut value = max_prefix;
    let mut m = 0u32;
    let mut consumed = 1;
    loop {
        let byte = *input.get(consumed).ok_or(HpackError::Truncated)?;
        consumed += 1;
        value = value
            .checked_add(((byte & 0x7f) as u64) << m)
            .ok_or(HpackError::IntegerOverflow)?;
        m += 7;
        if byte & 0x80 == 0 {
            break;
        }
        if m > 63 {
            return Err(HpackError::IntegerOverflow);
        }
    }
    Ok((value, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_values_fitting_in_prefix() {
        for prefix_bits in [4u8, 5, 6, 7] {
            for value in [0u64, 5, 10] {
                let encoded = encode(value, prefix_bits, 0);
                let (decoded, consumed) = decode(&encoded, prefix_bits).unwrap();
                assert_eq!(decoded, value);
                assert_eq!(consumed, encoded.len());
            }
        }
    }

    #[test]
    fn round_trips_values_needing_continuation() {
        for prefix_bits in [4u8, 5, 6, 7] {
            for value in [200u64, 1337, 1_000_000, (1u64 << 28) - 1] {
                let encoded = encode(value, prefix_bits, 0);
                let (decoded, consumed) = decode(&encoded, prefix_bits).unwrap();
                assert_eq!(decoded, value, "prefix {prefix_bits} value {value}");
                assert_eq!(consumed, encoded.len());
            }
        }
    }

    #[test]
    fn rfc_example_1337_with_5_bit_prefix() {
        // RFC 7541 C.1.2: 1337 encoded with a 5-bit prefix is 0x1f 0x9a 0x0a.
        let encoded = encode(1337, 5, 0);
        assert_eq!(encoded, vec![0x1f, 0x9a, 0x0a]);
    }

    #[test]
    fn preserves_flag_bits_outside_the_prefix() {
        let encoded = encode(10, 7, 0x80);
        assert_eq!(encoded, vec![0x8a]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(decode(&[0xff], 7).is_err());
    }
}

//! Multi-base hash codec (hex / base58 / base64).
//!
//! Anchors are keyed by their lowercase hex form, but clients may submit and
//! query hashes in any of the three encodings. Base58 uses the Bitcoin
//! alphabet and is implemented as arbitrary-precision base conversion over a
//! little-endian digit array, so leading zero bytes survive as leading `'1'`s.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The Bitcoin base58 alphabet (no `0`, `O`, `I`, `l`).
pub const BASE58_ALPHABET: &[u8; 58] =
    b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Byte lengths accepted as "some hash": MD5, SHA-1, SHA-256, SHA-384, SHA-512.
pub const HASH_LENGTHS: &[usize] = &[16, 20, 32, 48, 64];

/// The only byte length accepted by the strict SHA-256 check.
pub const SHA256_LENGTHS: &[usize] = &[32];

const INVALID: u8 = 0xff;

const BASE58_MAP: [u8; 128] = build_base58_map();

const fn build_base58_map() -> [u8; 128] {
    let mut map = [INVALID; 128];
    let mut i = 0;
    while i < BASE58_ALPHABET.len() {
        map[BASE58_ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    map
}

/// Errors produced while decoding an encoded hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Invalid base58 character '{character}' at position {position}")]
    InvalidCharacter { character: char, position: usize },

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("Input of {length} characters is longer than any accepted hash ({max} max)")]
    InputTooLong { length: usize, max: usize },

    #[error("Decoded length of {length} bytes is not an accepted hash size")]
    InvalidLength { length: usize },
}

/// A supported text encoding for hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Hex,
    Base58,
    Base64,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Base58 => "base58",
            Self::Base64 => "base64",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(Self::Hex),
            "base58" => Ok(Self::Base58),
            "base64" => Ok(Self::Base64),
            other => Err(CodecError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// Encode `bytes` in the given encoding. Hex output is lowercase.
pub fn encode(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Hex => hex::encode(bytes),
        Encoding::Base58 => base58_encode(bytes),
        Encoding::Base64 => STANDARD.encode(bytes),
    }
}

/// Decode `input` from the given encoding.
pub fn decode(input: &str, encoding: Encoding) -> Result<Vec<u8>, CodecError> {
    match encoding {
        Encoding::Hex => hex::decode(input).map_err(|e| CodecError::InvalidHex(e.to_string())),
        Encoding::Base58 => base58_decode(input),
        Encoding::Base64 => STANDARD
            .decode(input)
            .map_err(|e| CodecError::InvalidBase64(e.to_string())),
    }
}

/// Longest text `encoding` produces for `bytes` bytes.
pub fn max_encoded_len(bytes: usize, encoding: Encoding) -> usize {
    match encoding {
        Encoding::Hex => bytes * 2,
        // Padded output.
        Encoding::Base64 => bytes.div_ceil(3) * 4,
        // Each leading zero byte is one '1', so all-nonzero input is the worst case.
        Encoding::Base58 => (bytes * 138).div_ceil(100) + 1,
    }
}

/// Decode a hash whose byte length must be in `allowed`.
///
/// Input longer than the encoding of the largest allowed length is rejected
/// before any decoding work.
pub fn decode_hash(input: &str, encoding: Encoding, allowed: &[usize]) -> Result<Vec<u8>, CodecError> {
    let max = max_encoded_len(allowed.iter().copied().max().unwrap_or(0), encoding);
    if input.len() > max {
        return Err(CodecError::InputTooLong {
            length: input.len(),
            max,
        });
    }
    let bytes = decode(input, encoding)?;
    if !allowed.contains(&bytes.len()) {
        return Err(CodecError::InvalidLength { length: bytes.len() });
    }
    Ok(bytes)
}

/// Returns `true` if `input` decodes and its byte length is in `allowed`.
pub fn validate(input: &str, encoding: Encoding, allowed: &[usize]) -> bool {
    decode_hash(input, encoding, allowed).is_ok()
}

/// Generic check: any of the common hash sizes.
pub fn is_valid_hash(input: &str, encoding: Encoding) -> bool {
    validate(input, encoding, HASH_LENGTHS)
}

/// Strict check used by the legacy API: exactly 32 bytes.
pub fn is_valid_sha256(input: &str, encoding: Encoding) -> bool {
    validate(input, encoding, SHA256_LENGTHS)
}

/// Re-encode a hash from `encoding` to lowercase hex (the anchor key form).
pub fn to_hex(input: &str, encoding: Encoding) -> Result<String, CodecError> {
    Ok(hex::encode(decode(input, encoding)?))
}

/// Encode bytes as base58.
pub fn base58_encode(bytes: &[u8]) -> String {
    let zeros = bytes.iter().take_while(|&&b| b == 0).count();

    // Base-58 digits, least significant first. log(256)/log(58) ≈ 1.37.
    let mut digits: Vec<u8> = Vec::with_capacity((bytes.len() - zeros) * 138 / 100 + 1);
    for &byte in &bytes[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('1').take(zeros));
    out.extend(
        digits
            .iter()
            .rev()
            .map(|&d| BASE58_ALPHABET[d as usize] as char),
    );
    out
}

/// Decode a base58 string.
pub fn base58_decode(input: &str) -> Result<Vec<u8>, CodecError> {
    // Base-256 bytes, least significant first.
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len() * 733 / 1000 + 1);
    let mut zeros = 0usize;
    let mut leading = true;

    for (position, character) in input.chars().enumerate() {
        let value = base58_value(character)
            .ok_or(CodecError::InvalidCharacter { character, position })?;

        if leading && value == 0 {
            zeros += 1;
            continue;
        }
        leading = false;

        let mut carry = value as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; zeros];
    out.extend(bytes.iter().rev());
    Ok(out)
}

fn base58_value(c: char) -> Option<u8> {
    if !c.is_ascii() {
        return None;
    }
    match BASE58_MAP[c as usize] {
        INVALID => None,
        v => Some(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR_HEX: &str = "2c67899b31a40620b0760035720a9cabd7f414c6da3db561461b1e48fe26cb08";
    const VECTOR_B58: &str = "3zLWTHPNkmDsCRi2kZqFXFSBnTYykz13gHLezU4p6zmu";
    const VECTOR_B64: &str = "LGeJmzGkBiCwdgA1cgqcq9f0FMbaPbVhRhseSP4mywg=";

    #[test]
    fn literal_vectors_agree() {
        let from_hex = decode(VECTOR_HEX, Encoding::Hex).unwrap();
        assert_eq!(decode(VECTOR_B58, Encoding::Base58).unwrap(), from_hex);
        assert_eq!(decode(VECTOR_B64, Encoding::Base64).unwrap(), from_hex);

        assert_eq!(encode(&from_hex, Encoding::Base58), VECTOR_B58);
        assert_eq!(encode(&from_hex, Encoding::Base64), VECTOR_B64);
        assert_eq!(encode(&from_hex, Encoding::Hex), VECTOR_HEX);
    }

    #[test]
    fn base58_known_strings() {
        assert_eq!(base58_encode(b"hello world"), "StV1DL6CwTryKyV");
        assert_eq!(base58_encode(&[]), "");
        assert_eq!(base58_encode(&[0]), "1");
        assert_eq!(base58_encode(&[0, 0, 0, 255]), "1115Q");
        assert_eq!(base58_decode("1115Q").unwrap(), vec![0, 0, 0, 255]);
        assert_eq!(base58_decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn base58_leading_zeros_preserved() {
        let encoded = base58_encode(&[0, 0, 1]);
        assert_eq!(encoded, "112");
        assert!(encoded.starts_with("11"));
        assert_eq!(base58_decode(&encoded).unwrap(), vec![0, 0, 1]);

        for k in 0..5 {
            let mut bytes = vec![0u8; k];
            bytes.extend_from_slice(&[0x2c, 0x67, 0x89]);
            let encoded = base58_encode(&bytes);
            let ones = encoded.chars().take_while(|&c| c == '1').count();
            assert_eq!(ones, k, "{k} leading zero bytes");
            assert_eq!(base58_decode(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn roundtrip_all_encodings() {
        let samples: [&[u8]; 5] = [
            &[],
            &[0],
            &[0, 0, 0],
            &[255, 254, 0, 1],
            b"anchors are forever, even with \x00 bytes",
        ];
        for sample in samples {
            for enc in [Encoding::Hex, Encoding::Base58, Encoding::Base64] {
                let encoded = encode(sample, enc);
                assert_eq!(decode(&encoded, enc).unwrap(), sample, "{enc}");
            }
        }
    }

    #[test]
    fn base58_rejects_unknown_character() {
        let err = base58_decode("3zL0TH").unwrap_err();
        assert_eq!(
            err,
            CodecError::InvalidCharacter {
                character: '0',
                position: 3
            }
        );
        assert!(err.to_string().contains("'0'"));

        assert!(matches!(
            base58_decode("abc⚓"),
            Err(CodecError::InvalidCharacter { character: '⚓', .. })
        ));
    }

    #[test]
    fn validate_sha256_lengths() {
        let h32 = encode(&[7u8; 32], Encoding::Base58);
        let h31 = encode(&[7u8; 31], Encoding::Base58);
        let h33 = encode(&[7u8; 33], Encoding::Base58);
        assert!(is_valid_sha256(&h32, Encoding::Base58));
        assert!(!is_valid_sha256(&h31, Encoding::Base58));
        assert!(!is_valid_sha256(&h33, Encoding::Base58));

        // The generic check accepts other digest sizes.
        assert!(is_valid_hash(&hex::encode([1u8; 20]), Encoding::Hex));
        assert!(is_valid_hash(&hex::encode([1u8; 64]), Encoding::Hex));
        assert!(!is_valid_hash(&hex::encode([1u8; 31]), Encoding::Hex));
        assert!(!is_valid_hash("zz", Encoding::Hex));
    }

    #[test]
    fn oversized_input_rejected_before_decoding() {
        // An invalid character would be reported if the input were decoded.
        let long = format!("z0{}", "z".repeat(9_998));
        assert_eq!(
            decode_hash(&long, Encoding::Base58, SHA256_LENGTHS),
            Err(CodecError::InputTooLong {
                length: 10_000,
                max: 46
            })
        );
        assert!(!is_valid_sha256(&long, Encoding::Base58));
        assert!(!is_valid_hash(&"a".repeat(10_000), Encoding::Hex));
        assert!(!is_valid_hash(&"A".repeat(10_000), Encoding::Base64));
    }

    #[test]
    fn length_bound_admits_every_accepted_size() {
        for &n in HASH_LENGTHS {
            for enc in [Encoding::Hex, Encoding::Base58, Encoding::Base64] {
                let worst = encode(&vec![0xff; n], enc);
                assert!(worst.len() <= max_encoded_len(n, enc), "{enc} {n}");
                assert!(is_valid_hash(&worst, enc), "{enc} {n}");
            }
        }
    }

    #[test]
    fn decode_hash_reports_cause() {
        assert!(matches!(
            decode_hash("3zL0TH", Encoding::Base58, HASH_LENGTHS),
            Err(CodecError::InvalidCharacter { character: '0', position: 3 })
        ));
        let h31 = hex::encode([1u8; 31]);
        assert_eq!(
            decode_hash(&h31, Encoding::Hex, HASH_LENGTHS),
            Err(CodecError::InvalidLength { length: 31 })
        );
        assert_eq!(decode_hash(VECTOR_B58, Encoding::Base58, SHA256_LENGTHS).unwrap().len(), 32);
    }

    #[test]
    fn encoding_parse() {
        assert_eq!("base58".parse::<Encoding>().unwrap(), Encoding::Base58);
        assert_eq!(Encoding::default(), Encoding::Hex);
        assert_eq!(
            "base32".parse::<Encoding>().unwrap_err(),
            CodecError::UnsupportedEncoding("base32".into())
        );
    }

    #[test]
    fn to_hex_from_base64() {
        assert_eq!(to_hex(VECTOR_B64, Encoding::Base64).unwrap(), VECTOR_HEX);
    }
}

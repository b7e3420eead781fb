//! Compact three-part signed token handling (`header.payload.signature`).

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// Base64url without padding on encode, padding optional on decode.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A compact token split into its three base64url segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactToken<'a> {
    signed: &'a str,
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> CompactToken<'a> {
    /// Split a token on exactly two `.` separators.
    ///
    /// Returns `None` for any other separator count or an empty segment.
    pub fn split(token: &'a str) -> Option<Self> {
        let (signed, signature) = token.rsplit_once('.')?;
        let (header, payload) = signed.split_once('.')?;
        if payload.contains('.') || header.is_empty() || payload.is_empty() || signature.is_empty()
        {
            return None;
        }
        Some(Self {
            signed,
            header,
            payload,
            signature,
        })
    }

    /// The ASCII `header.payload` text covered by the signature.
    pub fn signed_input(&self) -> &'a [u8] {
        self.signed.as_bytes()
    }

    /// Decoded header bytes.
    pub fn header(&self) -> Option<Vec<u8>> {
        decode(self.header)
    }

    /// Decoded payload bytes.
    pub fn payload(&self) -> Option<Vec<u8>> {
        decode(self.payload)
    }

    /// Decoded signature bytes.
    pub fn signature(&self) -> Option<Vec<u8>> {
        decode(self.signature)
    }
}

/// Decode one base64url segment.
pub fn decode(segment: &str) -> Option<Vec<u8>> {
    BASE64URL.decode(segment).ok()
}

/// Encode bytes as an unpadded base64url segment.
pub fn encode(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}

//! Base64 text handling for header envelopes.
//!
//! Envelopes use the standard alphabet with canonical padding. Decoding is
//! strict: missing or extra padding and non-alphabet bytes are rejected, so
//! one payload has exactly one textual form.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use std::borrow::Cow;
use std::fmt::Display;

/// Base64 text, borrowed from a header or owned after encoding.
///
/// ```rust
/// use paygate_types::util::Base64Bytes;
///
/// let encoded = Base64Bytes::encode(br#"{"a":1}"#);
/// assert_eq!(encoded.to_string(), "eyJhIjoxfQ==");
/// assert_eq!(encoded.decode().unwrap(), br#"{"a":1}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decodes the text into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes raw bytes into base64 text.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }

    /// Returns the text as a `str`. Encoded output is always ASCII.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.0.as_ref())
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl<'a> From<&'a str> for Base64Bytes<'a> {
    fn from(text: &'a str) -> Self {
        Base64Bytes(Cow::Borrowed(text.as_bytes()))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str())
    }
}

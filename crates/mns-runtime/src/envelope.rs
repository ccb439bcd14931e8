//! The signed message envelope and its wire codec.
//!
//! # Wire format
//!
//! An envelope travels as `base64(json(envelope))`: the JSON object with the
//! fields `content`, `tag`, `traceId` and `sign` is rendered to text, and the
//! whole text is Base64 encoded (standard alphabet, padded) because the
//! transport only carries text-safe bodies. Decoding reverses both steps.
//! Producers and consumers in other services must use the same two steps.
//!
//! Missing fields decode to their empty value, so a body carrying only
//! `{"content":"x","tag":"t1"}` is accepted.

use crate::error::SerializationError;
use crate::signer::Signer;
use crate::trace;
use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;

/// Message payload exchanged over queues and topics
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Arbitrary application data
    #[serde(default)]
    pub content: Value,

    /// Routing or filter label
    #[serde(default)]
    pub tag: String,

    /// Correlation identifier, generated on publish when empty
    #[serde(default, rename = "traceId")]
    pub trace_id: String,

    /// Signature over `trace_id`, generated on publish when empty
    #[serde(default)]
    pub sign: String,
}

impl Envelope {
    /// Create new envelope around `content`
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Set the routing tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Set an explicit trace id
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Set an explicit signature
    pub fn with_sign(mut self, sign: impl Into<String>) -> Self {
        self.sign = sign.into();
        self
    }

    /// Fill in trace id and signature where they are empty.
    ///
    /// The trace id comes from the enclosing [`trace::scope`] when there is
    /// one, otherwise a fresh id is generated. Values already present are
    /// left untouched.
    pub fn seal(&mut self, signer: &Signer) {
        if self.trace_id.is_empty() {
            self.trace_id = trace::current_or_new();
        }
        if self.sign.is_empty() {
            self.sign = signer.sign(&self.trace_id);
        }
    }

    /// Both trace id and signature are present
    pub fn is_sealed(&self) -> bool {
        !self.trace_id.is_empty() && !self.sign.is_empty()
    }

    /// Check that `sign` was produced over `trace_id` by `signer`'s secret
    pub fn verify(&self, signer: &Signer) -> bool {
        self.is_sealed() && signer.verify(&self.trace_id, &self.sign)
    }

    /// Deserialize `content` into a typed value
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        Ok(serde_json::from_value(self.content.clone())?)
    }

    /// Encode to the transport body format
    pub fn encode(&self) -> Result<String, SerializationError> {
        let json = serde_json::to_vec(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }

    /// Decode a transport body
    pub fn decode(body: &str) -> Result<Self, SerializationError> {
        let json = general_purpose::STANDARD.decode(body.as_bytes())?;
        let text = std::str::from_utf8(&json).map_err(|_| SerializationError::InvalidUtf8)?;
        Ok(serde_json::from_str(text)?)
    }
}

#![forbid(unsafe_code)]

//! Seal and open typed payloads inside a `pf_` envelope.
//!
//! Sealing serializes to JSON, then compresses, then encrypts. Opening reverses the steps in
//! strict inverse order. When either step ran, the resulting bytes are carried as standard
//! base64 text; with neither, the JSON text is the payload as-is.

mod gzip;
mod xchacha;

pub use gzip::GzipCompressor;
pub use xchacha::{KdfParams, PasswordCipher};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pf_core::envelope::{self, EnvelopeError, EnvelopeFlags};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub trait Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, String>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, String>;
}

pub trait Cipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, String>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, String>;
}

#[derive(Debug)]
pub enum PipelineError {
    InvalidEnvelope(EnvelopeError),
    Serialization(String),
    Deserialization(String),
    CompressionFailed(String),
    DecompressionFailed(String),
    EncryptionFailed(String),
    DecryptionFailed(String),
    MissingDecompressor,
    MissingDecryptor,
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEnvelope(_) => "INVALID_ENVELOPE",
            Self::Deserialization(_) => "DESERIALIZE_FAILED",
            Self::DecompressionFailed(_) | Self::MissingDecompressor => "DECOMPRESS_FAILED",
            Self::DecryptionFailed(_) | Self::MissingDecryptor => "DECRYPT_FAILED",
            Self::Serialization(_) | Self::CompressionFailed(_) | Self::EncryptionFailed(_) => {
                "STORE_ERROR"
            }
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEnvelope(err) => write!(f, "{err}"),
            Self::Serialization(message) => write!(f, "serialization failed: {message}"),
            Self::Deserialization(message) => write!(f, "deserialization failed: {message}"),
            Self::CompressionFailed(message) => write!(f, "compression failed: {message}"),
            Self::DecompressionFailed(message) => write!(f, "decompression failed: {message}"),
            Self::EncryptionFailed(message) => write!(f, "encryption failed: {message}"),
            Self::DecryptionFailed(message) => write!(f, "decryption failed: {message}"),
            Self::MissingDecompressor => {
                write!(f, "payload is compressed but no decompressor is configured")
            }
            Self::MissingDecryptor => {
                write!(f, "payload is encrypted but no decryption key is configured")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<EnvelopeError> for PipelineError {
    fn from(value: EnvelopeError) -> Self {
        Self::InvalidEnvelope(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Opened<T> {
    pub data: T,
    pub model_version: f64,
    pub flags: EnvelopeFlags,
}

pub fn seal<T: Serialize + ?Sized>(
    data: &T,
    model_version: f64,
    compressor: Option<&dyn Compressor>,
    cipher: Option<&dyn Cipher>,
) -> Result<String, PipelineError> {
    let json =
        serde_json::to_vec(data).map_err(|err| PipelineError::Serialization(err.to_string()))?;
    let flags = EnvelopeFlags::new(compressor.is_some(), cipher.is_some());

    if flags == EnvelopeFlags::PLAIN {
        let text =
            String::from_utf8(json).map_err(|err| PipelineError::Serialization(err.to_string()))?;
        return Ok(envelope::encode(flags, model_version, &text)?);
    }

    let mut bytes = json;
    if let Some(compressor) = compressor {
        bytes = compressor
            .compress(&bytes)
            .map_err(PipelineError::CompressionFailed)?;
    }
    if let Some(cipher) = cipher {
        bytes = cipher
            .encrypt(&bytes)
            .map_err(PipelineError::EncryptionFailed)?;
    }
    Ok(envelope::encode(flags, model_version, &STANDARD.encode(bytes))?)
}

pub fn open<T: DeserializeOwned>(
    sealed: &str,
    decompressor: Option<&dyn Compressor>,
    decryptor: Option<&dyn Cipher>,
) -> Result<Opened<T>, PipelineError> {
    let env = envelope::decode(sealed)?;

    let data = if env.flags == EnvelopeFlags::PLAIN {
        serde_json::from_str(env.payload)
            .map_err(|err| PipelineError::Deserialization(err.to_string()))?
    } else {
        let mut bytes = STANDARD.decode(env.payload).map_err(|err| {
            let message = format!("payload is not valid base64: {err}");
            if env.flags.encrypted {
                PipelineError::DecryptionFailed(message)
            } else {
                PipelineError::DecompressionFailed(message)
            }
        })?;
        if env.flags.encrypted {
            let cipher = decryptor.ok_or(PipelineError::MissingDecryptor)?;
            bytes = cipher
                .decrypt(&bytes)
                .map_err(PipelineError::DecryptionFailed)?;
        }
        if env.flags.compressed {
            let compressor = decompressor.ok_or(PipelineError::MissingDecompressor)?;
            bytes = compressor
                .decompress(&bytes)
                .map_err(PipelineError::DecompressionFailed)?;
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| PipelineError::Deserialization(err.to_string()))?
    };

    Ok(Opened {
        data,
        model_version: env.model_version,
        flags: env.flags,
    })
}

/// The codec set a store or engine seals with. Opening always offers the compressor, so data
/// sealed by a device with compression enabled stays readable here.
pub struct Codecs {
    compressor: Box<dyn Compressor + Send + Sync>,
    compress_on_seal: bool,
    cipher: Option<Box<dyn Cipher + Send + Sync>>,
}

impl Default for Codecs {
    fn default() -> Self {
        Self::plain()
    }
}

impl std::fmt::Debug for Codecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codecs")
            .field("compress_on_seal", &self.compress_on_seal)
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

impl Codecs {
    pub fn plain() -> Self {
        Self {
            compressor: Box::new(GzipCompressor::default()),
            compress_on_seal: false,
            cipher: None,
        }
    }

    pub fn compressed(mut self, enabled: bool) -> Self {
        self.compress_on_seal = enabled;
        self
    }

    pub fn with_cipher(mut self, cipher: impl Cipher + Send + Sync + 'static) -> Self {
        self.cipher = Some(Box::new(cipher));
        self
    }

    pub fn flags(&self) -> EnvelopeFlags {
        EnvelopeFlags::new(self.compress_on_seal, self.cipher.is_some())
    }

    pub fn seal<T: Serialize + ?Sized>(
        &self,
        data: &T,
        model_version: f64,
    ) -> Result<String, PipelineError> {
        let compressor = self
            .compress_on_seal
            .then_some(self.compressor.as_ref() as &dyn Compressor);
        let sealed = seal(data, model_version, compressor, self.cipher())?;
        tracing::debug!(
            model_version,
            compressed = self.compress_on_seal,
            encrypted = self.cipher.is_some(),
            bytes = sealed.len(),
            "snapshot sealed"
        );
        Ok(sealed)
    }

    pub fn open<T: DeserializeOwned>(&self, sealed: &str) -> Result<Opened<T>, PipelineError> {
        let opened = open(sealed, Some(self.compressor.as_ref()), self.cipher())?;
        tracing::debug!(
            model_version = opened.model_version,
            compressed = opened.flags.compressed,
            encrypted = opened.flags.encrypted,
            "snapshot opened"
        );
        Ok(opened)
    }

    fn cipher(&self) -> Option<&dyn Cipher> {
        self.cipher.as_deref().map(|cipher| cipher as &dyn Cipher)
    }
}

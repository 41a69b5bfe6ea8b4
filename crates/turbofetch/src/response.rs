//! Exchanges and the typed result shapes they are decoded into.

use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use turbofetch_transport_traits::{BuiltRequest, ResponseMeta, TransportError, TransportOutcome};

use crate::cache::CachedResponse;
use crate::error::{Error, Result};

/// The outcome of one attempt: what was sent and what came back.
///
/// Plugins and the recovery coordinator inspect exchanges; the final exchange
/// of a request is decoded into the caller's requested shape.
#[derive(Debug)]
pub struct Exchange {
    /// The request as sent, after every `prepare` hook ran.
    pub request: BuiltRequest,
    /// Response metadata, if the remote endpoint answered.
    pub response: Option<ResponseMeta>,
    /// Response body, if any.
    pub body: Option<Bytes>,
    /// The attempt's error: a transport failure or a plugin rejection.
    pub error: Option<Error>,
    /// Whether the response was served from the cache.
    pub from_cache: bool,
}

impl Exchange {
    /// Creates a successful exchange. Mostly useful for
    /// `RecoveryOutcome::PassOver`.
    pub fn new(request: BuiltRequest, response: ResponseMeta, body: impl Into<Bytes>) -> Self {
        Self {
            request,
            response: Some(response),
            body: Some(body.into()),
            error: None,
            from_cache: false,
        }
    }

    /// Creates a failed exchange with no response.
    pub fn failure(request: BuiltRequest, error: Error) -> Self {
        Self {
            request,
            response: None,
            body: None,
            error: Some(error),
            from_cache: false,
        }
    }

    pub(crate) fn from_outcome(request: BuiltRequest, outcome: TransportOutcome) -> Self {
        Self {
            request,
            response: outcome.response,
            body: outcome.body,
            error: outcome.error.map(Error::Transport),
            from_cache: false,
        }
    }

    pub(crate) fn from_cache(request: BuiltRequest, cached: CachedResponse) -> Self {
        Self {
            request,
            response: Some(cached.response),
            body: Some(cached.body),
            error: None,
            from_cache: true,
        }
    }

    /// Replaces the error.
    #[must_use]
    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    /// Status code, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|r| r.status)
    }

    /// `true` if there is no error and the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.response.as_ref().is_some_and(ResponseMeta::is_success)
    }

    /// Converts the exchange into raw data, surfacing its error if any.
    ///
    /// # Errors
    ///
    /// Returns the attempt's error, or an invalid-response transport error if
    /// the transport reported neither a response nor an error.
    pub fn into_data(self) -> Result<DataResponse> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let response = self.response.ok_or_else(|| {
            Error::Transport(TransportError::InvalidResponse(
                "transport reported neither a response nor an error".to_string(),
            ))
        })?;
        Ok(DataResponse {
            request: self.request,
            response,
            body: self.body.unwrap_or_default(),
        })
    }
}

/// Raw bytes plus response metadata.
#[derive(Debug, Clone)]
pub struct DataResponse {
    /// The request as finally sent.
    pub request: BuiltRequest,
    /// Response metadata.
    pub response: ResponseMeta,
    /// Response body.
    pub body: Bytes,
}

impl DataResponse {
    /// Status code.
    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    /// Body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decoding`] if the body is not valid UTF-8.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|e| Error::decoding(e.to_string()))
    }

    /// Body deserialized from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decoding`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::decoding(e.to_string()))
    }
}

/// Image formats recognised by their magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Portable Network Graphics
    Png,
    /// JPEG / JFIF
    Jpeg,
    /// GIF87a / GIF89a
    Gif,
    /// WebP (RIFF container)
    Webp,
    /// Windows bitmap
    Bmp,
}

impl ImageFormat {
    /// Detects the format from the leading bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        match data {
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            [b'B', b'M', ..] => Some(Self::Bmp),
            _ => None,
        }
    }

    /// MIME type for the format.
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
        }
    }
}

/// Validated image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Detected format.
    pub format: ImageFormat,
    /// Encoded image data.
    pub data: Bytes,
}

impl Image {
    /// Validates `data` as an image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decoding`] if the bytes are not a recognised image.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let format = ImageFormat::detect(&data)
            .ok_or_else(|| Error::decoding("response body is not a recognised image format"))?;
        Ok(Self { format, data })
    }
}

pub(crate) fn decode_data(exchange: Exchange) -> Result<DataResponse> {
    exchange.into_data()
}

pub(crate) fn decode_json(exchange: Exchange) -> Result<Value> {
    let data = exchange.into_data()?;
    if data.body.is_empty() {
        return Ok(Value::Null);
    }
    data.json()
}

pub(crate) fn decode_decodable<T: DeserializeOwned>(exchange: Exchange) -> Result<T> {
    exchange.into_data()?.json()
}

pub(crate) fn decode_image(exchange: Exchange) -> Result<Image> {
    Image::from_bytes(exchange.into_data()?.body)
}

pub(crate) fn decode_empty(exchange: Exchange) -> Result<()> {
    exchange.into_data().map(|_| ())
}

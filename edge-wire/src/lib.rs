//! Wire protocol spoken between the dispatcher and out-of-process workers.
//!
//! A worker process receives exactly one CBOR-encoded [`WireRequest`] on
//! stdin and must write exactly one CBOR-encoded [`WireResponse`] to stdout
//! before exiting. Function authors can use [`serve_stdio`] to handle the
//! framing.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

pub use serde_bytes::ByteBuf;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WireHeader {
    pub name: ByteBuf,
    pub value: ByteBuf,
}

impl WireHeader {
    pub fn new<N: AsRef<[u8]>, V: AsRef<[u8]>>(name: N, value: V) -> Self {
        Self {
            name: ByteBuf::from(name.as_ref().to_vec()),
            value: ByteBuf::from(value.as_ref().to_vec()),
        }
    }
}

/// Request metadata the dispatcher attaches for the worker's benefit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct WireMeta {
    pub request_id: Option<String>,
    pub function: Option<String>,
    pub deadline_ms: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: Vec<WireHeader>,
    pub body: ByteBuf,
    pub meta: Option<WireMeta>,
}

impl WireRequest {
    /// Looks up the first header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name.as_bytes()))
            .map(|h| h.value.as_slice())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<WireHeader>,
    pub body: ByteBuf,
}

impl WireResponse {
    pub fn new<B: Into<Vec<u8>>>(status: u16, headers: Vec<WireHeader>, body: B) -> Self {
        Self {
            status,
            headers,
            body: ByteBuf::from(body.into()),
        }
    }
}

pub fn encode_request(req: &WireRequest) -> Result<Vec<u8>, serde_cbor::Error> {
    serde_cbor::to_vec(req)
}

pub fn decode_request(bytes: &[u8]) -> Result<WireRequest, serde_cbor::Error> {
    serde_cbor::from_slice(bytes)
}

pub fn encode_response(resp: &WireResponse) -> Result<Vec<u8>, serde_cbor::Error> {
    serde_cbor::to_vec(resp)
}

pub fn decode_response(bytes: &[u8]) -> Result<WireResponse, serde_cbor::Error> {
    serde_cbor::from_slice(bytes)
}

/// Error raised while serving a single request over stdio.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("stdio error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire codec error: {0}")]
    Codec(#[from] serde_cbor::Error),
}

/// Reads one request from `input`, runs `handler` and writes the response to `output`.
pub fn serve<R, W, F>(mut input: R, mut output: W, handler: F) -> Result<(), ServeError>
where
    R: Read,
    W: Write,
    F: FnOnce(WireRequest) -> WireResponse,
{
    let mut buf = Vec::new();
    input.read_to_end(&mut buf)?;

    let request = decode_request(&buf)?;
    let response = handler(request);

    output.write_all(&encode_response(&response)?)?;
    output.flush()?;
    Ok(())
}

/// Worker entry point: serve one request over stdin/stdout.
pub fn serve_stdio<F>(handler: F) -> Result<(), ServeError>
where
    F: FnOnce(WireRequest) -> WireResponse,
{
    serve(std::io::stdin().lock(), std::io::stdout().lock(), handler)
}

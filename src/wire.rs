//! Broadcast datagram codec
//!
//! Every discovery datagram is a UTF-8 JSON object:
//!
//! ```text
//! {"serviceId":"AMS-AUTH-SERVICE-192.168.1.10-8081","serviceName":"AMS-AUTH-SERVICE",
//!  "ipAddress":"192.168.1.10","httpPort":8081,"grpcPort":9091,
//!  "timestamp":1718000000000,"version":"1.0.0","status":"ACTIVE"}
//! ```
//!
//! The field names are fixed by the deployed protocol and are spelled out here
//! field by field instead of being derived from [`PeerDescriptor`], so renaming
//! a Rust field can never change what goes on the wire. `instanceId` and
//! `schemaVersion` are accepted as aliases when decoding; unknown fields are
//! ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{PeerDescriptor, DEFAULT_SCHEMA_VERSION, STATUS_ACTIVE};

/// Errors produced while decoding a datagram
#[derive(Error, Debug)]
pub enum CodecError {
    /// Payload is not valid JSON for a descriptor
    #[error("Invalid descriptor JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required identity field is empty
    #[error("Descriptor field '{0}' is empty")]
    EmptyField(&'static str),

    /// Payload exceeds the datagram budget
    #[error("Descriptor is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
}

#[derive(Serialize)]
struct WireDescriptorV1<'a> {
    #[serde(rename = "serviceId")]
    service_id: &'a str,
    #[serde(rename = "serviceName")]
    service_name: &'a str,
    #[serde(rename = "ipAddress")]
    ip_address: &'a str,
    #[serde(rename = "httpPort")]
    http_port: u16,
    #[serde(rename = "grpcPort")]
    grpc_port: u16,
    timestamp: i64,
    version: &'a str,
    status: &'a str,
}

#[derive(Deserialize)]
struct IncomingDescriptorV1 {
    #[serde(rename = "serviceId", alias = "instanceId")]
    service_id: String,
    #[serde(rename = "serviceName")]
    service_name: String,
    #[serde(rename = "ipAddress")]
    ip_address: String,
    #[serde(rename = "httpPort")]
    http_port: u16,
    #[serde(rename = "grpcPort", default)]
    grpc_port: u16,
    #[serde(default)]
    timestamp: i64,
    #[serde(rename = "version", alias = "schemaVersion", default = "default_version")]
    version: String,
    #[serde(default = "default_status")]
    status: String,
}

fn default_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}

fn default_status() -> String {
    STATUS_ACTIVE.to_string()
}

/// Serialize a descriptor into a datagram body
pub fn encode(descriptor: &PeerDescriptor) -> Result<Vec<u8>, CodecError> {
    let wire = WireDescriptorV1 {
        service_id: &descriptor.instance_id,
        service_name: &descriptor.service_name,
        ip_address: &descriptor.ip_address,
        http_port: descriptor.http_port,
        grpc_port: descriptor.grpc_port,
        timestamp: descriptor.timestamp,
        version: &descriptor.schema_version,
        status: &descriptor.status,
    };

    Ok(serde_json::to_vec(&wire)?)
}

/// Serialize a descriptor and check it fits in a single datagram
pub fn encode_bounded(descriptor: &PeerDescriptor, max: usize) -> Result<Vec<u8>, CodecError> {
    let bytes = encode(descriptor)?;
    if bytes.len() > max {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            max,
        });
    }
    Ok(bytes)
}

/// Parse a datagram body into a descriptor
pub fn decode(payload: &[u8]) -> Result<PeerDescriptor, CodecError> {
    let wire: IncomingDescriptorV1 = serde_json::from_slice(payload)?;

    if wire.service_id.trim().is_empty() {
        return Err(CodecError::EmptyField("serviceId"));
    }
    if wire.service_name.trim().is_empty() {
        return Err(CodecError::EmptyField("serviceName"));
    }
    if wire.ip_address.trim().is_empty() {
        return Err(CodecError::EmptyField("ipAddress"));
    }

    Ok(PeerDescriptor {
        instance_id: wire.service_id,
        service_name: wire.service_name,
        ip_address: wire.ip_address,
        http_port: wire.http_port,
        grpc_port: wire.grpc_port,
        timestamp: wire.timestamp,
        schema_version: wire.version,
        status: wire.status,
    })
}

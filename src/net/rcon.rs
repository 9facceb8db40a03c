//! Minimal RCON client: connect, authenticate, send one command, take one
//! reply, disconnect. The wire format is the Source remote-console framing
//! the game speaks: little-endian `length, request id, type, body, \0\0`.
//! An auth response carrying request id -1 means the password was rejected.
//!
//! Replies are bounded by a timeout; a server that accepts the connection
//! but never answers surfaces as `RconError::Timeout` instead of hanging
//! the calling task.

use std::io;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const TYPE_AUTH: i32 = 3;
const TYPE_COMMAND: i32 = 2;
const TYPE_AUTH_RESPONSE: i32 = 2;

const AUTH_REQUEST_ID: i32 = 1;
const COMMAND_REQUEST_ID: i32 = 2;

/// Largest packet body the protocol allows; anything bigger is garbage.
const MAX_PACKET_LEN: usize = 4110;

#[derive(Debug, thiserror::Error)]
pub enum RconError {
    #[error("could not connect to rcon at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("rcon authentication rejected")]
    Auth,
    #[error("timed out waiting for rcon reply")]
    Timeout,
    #[error("malformed rcon packet: {0}")]
    Protocol(String),
    #[error("rcon io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, PartialEq)]
struct Packet {
    id: i32,
    kind: i32,
    body: String,
}

fn encode_packet(id: i32, kind: i32, body: &str) -> Vec<u8> {
    let len = (4 + 4 + body.len() + 2) as i32;
    let mut out = Vec::with_capacity(4 + len as usize);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(&[0, 0]);
    out
}

/// Decodes a packet payload (everything after the length prefix).
fn decode_payload(payload: &[u8]) -> Result<Packet, RconError> {
    if payload.len() < 10 {
        return Err(RconError::Protocol(format!(
            "payload too short: {} bytes",
            payload.len()
        )));
    }
    let id = i32::from_le_bytes(payload[0..4].try_into().expect("sized slice"));
    let kind = i32::from_le_bytes(payload[4..8].try_into().expect("sized slice"));
    let body = String::from_utf8_lossy(&payload[8..payload.len() - 2]).into_owned();
    Ok(Packet { id, kind, body })
}

async fn read_packet(stream: &mut TcpStream) -> Result<Packet, RconError> {
    let read = async {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = i32::from_le_bytes(len_buf) as usize;
        if len < 10 || len > MAX_PACKET_LEN {
            return Err(RconError::Protocol(format!("implausible packet length {len}")));
        }
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;
        decode_payload(&payload)
    };
    match timeout(REPLY_TIMEOUT, read).await {
        Ok(result) => result,
        Err(_) => Err(RconError::Timeout),
    }
}

/// Opens a session, authenticates, executes `command`, and returns the
/// single textual reply. A blank host falls back to the wildcard address,
/// matching how the game treats an unset `server-ip`.
pub async fn send_command(
    host: &str,
    port: u16,
    password: &str,
    command: &str,
) -> Result<String, RconError> {
    let host = if host.trim().is_empty() { "0.0.0.0" } else { host };
    let addr = format!("{host}:{port}");

    let mut stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(RconError::Connect { addr, source: e }),
        Err(_) => {
            return Err(RconError::Connect {
                addr,
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            })
        }
    };

    stream
        .write_all(&encode_packet(AUTH_REQUEST_ID, TYPE_AUTH, password))
        .await?;

    // Some servers send an empty response-value packet ahead of the auth
    // response; skip anything that is not the auth verdict.
    loop {
        let packet = read_packet(&mut stream).await?;
        if packet.kind != TYPE_AUTH_RESPONSE {
            continue;
        }
        if packet.id == -1 {
            return Err(RconError::Auth);
        }
        if packet.id != AUTH_REQUEST_ID {
            return Err(RconError::Protocol(format!(
                "auth response for unknown request id {}",
                packet.id
            )));
        }
        break;
    }

    stream
        .write_all(&encode_packet(COMMAND_REQUEST_ID, TYPE_COMMAND, command))
        .await?;
    let reply = read_packet(&mut stream).await?;
    debug!("rcon reply from {addr}: {}", reply.body);

    let _ = stream.shutdown().await;
    Ok(reply.body)
}

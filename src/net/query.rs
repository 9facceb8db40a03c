//! Liveness probe over the game's UDP query protocol (the GameSpy4 basic
//! stat exchange). Two datagrams: a handshake that yields a challenge
//! token, then a stat request carrying that token. The payload we care
//! about is the MOTD and the player counts; the rest is parsed and
//! dropped.

use std::io;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;

/// Arbitrary session id; the protocol masks each byte with 0x0F.
const SESSION_ID: [u8; 4] = [0x01, 0x02, 0x03, 0x04];

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no query response from {addr}")]
    Unreachable { addr: String },
    #[error("malformed query response: {0}")]
    Malformed(String),
    #[error("query io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatus {
    pub motd: String,
    pub players: u32,
    pub max_players: u32,
}

fn handshake_request() -> Vec<u8> {
    let mut out = Vec::with_capacity(7);
    out.extend_from_slice(&MAGIC);
    out.push(TYPE_HANDSHAKE);
    out.extend_from_slice(&SESSION_ID);
    out
}

fn stat_request(challenge: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(11);
    out.extend_from_slice(&MAGIC);
    out.push(TYPE_STAT);
    out.extend_from_slice(&SESSION_ID);
    out.extend_from_slice(&challenge.to_be_bytes());
    out
}

/// Pulls the next null-terminated string off the buffer, advancing it.
fn take_string<'a>(buf: &mut &'a [u8]) -> Result<&'a str, QueryError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| QueryError::Malformed("unterminated string field".to_string()))?;
    let s = std::str::from_utf8(&buf[..end])
        .map_err(|_| QueryError::Malformed("non-utf8 string field".to_string()))?;
    *buf = &buf[end + 1..];
    Ok(s)
}

/// The handshake reply is `09`, the session id, then the challenge token
/// rendered as a decimal ASCII string.
fn parse_challenge(datagram: &[u8]) -> Result<i32, QueryError> {
    if datagram.len() < 6 || datagram[0] != TYPE_HANDSHAKE {
        return Err(QueryError::Malformed("bad handshake header".to_string()));
    }
    let mut rest = &datagram[5..];
    let token = take_string(&mut rest)?;
    token
        .parse::<i32>()
        .map_err(|_| QueryError::Malformed(format!("challenge token {token:?} is not a number")))
}

/// Basic stat reply: `00`, session id, then null-terminated MOTD,
/// gametype, map, numplayers, maxplayers, followed by the host port and
/// host ip we do not use.
fn parse_basic_stat(datagram: &[u8]) -> Result<QueryStatus, QueryError> {
    if datagram.len() < 6 || datagram[0] != TYPE_STAT {
        return Err(QueryError::Malformed("bad stat header".to_string()));
    }
    let mut rest = &datagram[5..];
    let motd = take_string(&mut rest)?.to_string();
    let _gametype = take_string(&mut rest)?;
    let _map = take_string(&mut rest)?;
    let players = take_string(&mut rest)?;
    let max_players = take_string(&mut rest)?;
    let players = players
        .parse::<u32>()
        .map_err(|_| QueryError::Malformed(format!("player count {players:?}")))?;
    let max_players = max_players
        .parse::<u32>()
        .map_err(|_| QueryError::Malformed(format!("max player count {max_players:?}")))?;
    Ok(QueryStatus {
        motd,
        players,
        max_players,
    })
}

async fn exchange(socket: &UdpSocket, request: &[u8], addr: &str) -> Result<Vec<u8>, QueryError> {
    socket.send(request).await?;
    let mut buf = vec![0u8; 2048];
    match timeout(QUERY_TIMEOUT, socket.recv(&mut buf)).await {
        Ok(Ok(n)) => {
            buf.truncate(n);
            Ok(buf)
        }
        Ok(Err(e)) => Err(QueryError::Io(e)),
        Err(_) => Err(QueryError::Unreachable {
            addr: addr.to_string(),
        }),
    }
}

/// Probes a server's query port. A blank host falls back to the wildcard
/// address the game binds when `server-ip` is unset.
pub async fn query_status(host: &str, port: u16) -> Result<QueryStatus, QueryError> {
    let host = if host.trim().is_empty() { "0.0.0.0" } else { host };
    let addr = format!("{host}:{port}");

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&addr).await?;

    let challenge = parse_challenge(&exchange(&socket, &handshake_request(), &addr).await?)?;
    parse_basic_stat(&exchange(&socket, &stat_request(challenge), &addr).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_datagram(motd: &str, players: &str, max: &str) -> Vec<u8> {
        let mut out = vec![TYPE_STAT];
        out.extend_from_slice(&SESSION_ID);
        for field in [motd, "SMP", "world", players, max] {
            out.extend_from_slice(field.as_bytes());
            out.push(0);
        }
        out.extend_from_slice(&25565u16.to_le_bytes());
        out.extend_from_slice(b"127.0.0.1\0");
        out
    }

    #[test]
    fn challenge_parses_decimal_token() {
        let mut datagram = vec![TYPE_HANDSHAKE];
        datagram.extend_from_slice(&SESSION_ID);
        datagram.extend_from_slice(b"9513307\0");
        assert_eq!(parse_challenge(&datagram).unwrap(), 9513307);
    }

    #[test]
    fn challenge_rejects_wrong_type() {
        let mut datagram = vec![TYPE_STAT];
        datagram.extend_from_slice(&SESSION_ID);
        datagram.extend_from_slice(b"1\0");
        assert!(matches!(
            parse_challenge(&datagram),
            Err(QueryError::Malformed(_))
        ));
    }

    #[test]
    fn basic_stat_parses_counts() {
        let status = parse_basic_stat(&stat_datagram("A Server", "3", "20")).unwrap();
        assert_eq!(
            status,
            QueryStatus {
                motd: "A Server".to_string(),
                players: 3,
                max_players: 20
            }
        );
    }

    #[test]
    fn basic_stat_rejects_non_numeric_count() {
        assert!(matches!(
            parse_basic_stat(&stat_datagram("A Server", "three", "20")),
            Err(QueryError::Malformed(_))
        ));
    }

    #[test]
    fn basic_stat_rejects_truncated_fields() {
        let mut datagram = vec![TYPE_STAT];
        datagram.extend_from_slice(&SESSION_ID);
        datagram.extend_from_slice(b"motd only, never terminated");
        assert!(matches!(
            parse_basic_stat(&datagram),
            Err(QueryError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn live_probe_against_fake_responder() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = responder.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, peer) = responder.recv_from(&mut buf).await.unwrap();
            let mut reply = vec![TYPE_HANDSHAKE];
            reply.extend_from_slice(&SESSION_ID);
            reply.extend_from_slice(b"42\0");
            responder.send_to(&reply, peer).await.unwrap();

            let (n, peer) = responder.recv_from(&mut buf).await.unwrap();
            // Stat request must echo the challenge token big-endian.
            assert_eq!(&buf[7..n], &42i32.to_be_bytes());
            responder
                .send_to(&stat_datagram("Fake", "1", "8"), peer)
                .await
                .unwrap();
        });

        let status = query_status("127.0.0.1", port).await.unwrap();
        assert_eq!(status.players, 1);
        assert_eq!(status.max_players, 8);
        assert_eq!(status.motd, "Fake");
    }

    #[tokio::test]
    async fn silent_port_does_not_answer() {
        // Nothing is bound here: either the recv times out or the kernel
        // reflects an ICMP port-unreachable as a socket error.
        let err = query_status("127.0.0.1", 1).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Unreachable { .. } | QueryError::Io(_)
        ));
    }
}

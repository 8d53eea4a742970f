/**
 * CLIENT RESP - Sous-ensemble du protocole Redis utilisé par la découverte
 *
 * RÔLE : Envoyer une commande (AUTH, CONFIG GET, INFO) et décoder la réponse.
 *
 * FONCTIONNEMENT :
 * - Requête = tableau de bulk strings (`*N\r\n$len\r\narg\r\n...`)
 * - Réponses : `+status`, `-erreur`, `:entier`, `$bulk`, `*tableau`
 * - Chaque appel réseau (connexion comprise) est borné par le même timeout
 */

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed by peer")]
    Closed,
    #[error("protocol violation: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Contenu texte d'un status ou d'un bulk non nul
    pub fn into_text(self) -> Option<String> {
        match self {
            Reply::Status(s) | Reply::Bulk(Some(s)) => Some(s),
            _ => None,
        }
    }
}

pub struct RedisConnection {
    stream: BufReader<TcpStream>,
    timeout: Duration,
}

impl RedisConnection {
    pub async fn connect(address: &str, limit: Duration) -> Result<Self, ProtocolError> {
        let stream = timeout(limit, TcpStream::connect(address))
            .await
            .map_err(|_| ProtocolError::Timeout(limit))??;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: BufReader::new(stream),
            timeout: limit,
        })
    }

    pub async fn command(&mut self, args: &[&str]) -> Result<Reply, ProtocolError> {
        let limit = self.timeout;
        timeout(limit, self.roundtrip(args))
            .await
            .map_err(|_| ProtocolError::Timeout(limit))?
    }

    async fn roundtrip(&mut self, args: &[&str]) -> Result<Reply, ProtocolError> {
        let request = encode_command(args);
        self.stream.get_mut().write_all(&request).await?;
        read_reply(&mut self.stream).await
    }
}

pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn read_line<R>(reader: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(ProtocolError::Closed);
    }
    match line.strip_suffix("\r\n") {
        Some(body) => Ok(body.to_string()),
        None => Err(ProtocolError::Malformed(format!("unterminated line {line:?}"))),
    }
}

/// Plafond d'un bulk string (limite côté serveur Redis : 512 MiB)
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// Plafond d'éléments d'un tableau ; les réponses attendues en ont deux
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

fn parse_length(raw: &str) -> Result<i64, ProtocolError> {
    raw.parse::<i64>()
        .map_err(|_| ProtocolError::Malformed(format!("invalid length {raw:?}")))
}

/// Longueur d'en-tête `$`/`*` : -1 = nul, sinon bornée par `max`
fn parse_header_length(raw: &str, max: i64) -> Result<Option<usize>, ProtocolError> {
    match parse_length(raw)? {
        -1 => Ok(None),
        len if (0..=max).contains(&len) => Ok(Some(len as usize)),
        len => Err(ProtocolError::Malformed(format!("length {len} out of range (max {max})"))),
    }
}

/// Décode une réponse complète ; récursif pour les tableaux
pub fn read_reply<'a, R>(
    reader: &'a mut R,
) -> Pin<Box<dyn Future<Output = Result<Reply, ProtocolError>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line(reader).await?;
        let Some(kind) = line.chars().next() else {
            return Err(ProtocolError::Malformed("empty reply line".into()));
        };
        let body = &line[kind.len_utf8()..];

        match kind {
            '+' => Ok(Reply::Status(body.to_string())),
            '-' => Ok(Reply::Error(body.to_string())),
            ':' => Ok(Reply::Integer(parse_length(body)?)),
            '$' => {
                let Some(len) = parse_header_length(body, MAX_BULK_LEN)? else {
                    return Ok(Reply::Bulk(None));
                };
                let mut buf = vec![0u8; len + 2];
                reader.read_exact(&mut buf).await?;
                if !buf.ends_with(b"\r\n") {
                    return Err(ProtocolError::Malformed("bulk string not CRLF terminated".into()));
                }
                buf.truncate(len);
                let text = String::from_utf8(buf)
                    .map_err(|e| ProtocolError::Malformed(format!("bulk string not utf-8: {e}")))?;
                Ok(Reply::Bulk(Some(text)))
            }
            '*' => {
                let Some(len) = parse_header_length(body, MAX_ARRAY_LEN)? else {
                    return Ok(Reply::Array(None));
                };
                // croissance au fil des éléments reçus, pas sur la foi de l'en-tête
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(read_reply(reader).await?);
                }
                Ok(Reply::Array(Some(items)))
            }
            other => Err(ProtocolError::Malformed(format!("unknown reply type {other:?}"))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rediboard_devkit::FakeRedis;

    async fn decode(raw: &str) -> Result<Reply, ProtocolError> {
        let mut reader = BufReader::new(raw.as_bytes());
        read_reply(&mut reader).await
    }

    #[test]
    fn test_encode_command() {
        assert_eq!(
            encode_command(&["CONFIG", "GET", "maxmemory"]),
            b"*3\r\n$6\r\nCONFIG\r\n$3\r\nGET\r\n$9\r\nmaxmemory\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_decode_reply_kinds() {
        assert_eq!(decode("+OK\r\n").await.unwrap(), Reply::Status("OK".into()));
        assert_eq!(
            decode("-ERR invalid password\r\n").await.unwrap(),
            Reply::Error("ERR invalid password".into())
        );
        assert_eq!(decode(":12\r\n").await.unwrap(), Reply::Integer(12));
        assert_eq!(decode("$-1\r\n").await.unwrap(), Reply::Bulk(None));
        assert_eq!(
            decode("$11\r\nrole:master\r\n").await.unwrap(),
            Reply::Bulk(Some("role:master".into()))
        );
        assert_eq!(
            decode("*2\r\n$9\r\nmaxmemory\r\n$1\r\n0\r\n").await.unwrap(),
            Reply::Array(Some(vec![
                Reply::Bulk(Some("maxmemory".into())),
                Reply::Bulk(Some("0".into())),
            ]))
        );
        assert_eq!(decode("*0\r\n").await.unwrap(), Reply::Array(Some(vec![])));
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage() {
        assert!(matches!(decode("").await, Err(ProtocolError::Closed)));
        assert!(matches!(decode("?what\r\n").await, Err(ProtocolError::Malformed(_))));
        assert!(matches!(decode("$abc\r\n").await, Err(ProtocolError::Malformed(_))));
        assert!(matches!(decode("+OK\n").await, Err(ProtocolError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_decode_rejects_oversized_lengths() {
        assert!(matches!(
            decode("$9223372036854775807\r\n").await,
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode("*100000000000000\r\n").await,
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(decode("$-2\r\n").await, Err(ProtocolError::Malformed(_))));
        // en-tête plausible mais corps tronqué : erreur d'E/S, pas d'allocation géante
        assert!(matches!(decode("*1000\r\n:1\r\n").await, Err(ProtocolError::Closed)));
    }

    #[tokio::test]
    async fn test_command_rejects_oversized_array_header() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
            socket.write_all(b"*100000000000000\r\n").await.unwrap();
        });

        let mut conn = RedisConnection::connect(&addr.to_string(), Duration::from_millis(500))
            .await
            .unwrap();
        let err = conn.command(&["INFO"]).await;
        assert!(matches!(err, Err(ProtocolError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_command_against_fake_server() {
        let server = FakeRedis::start().await.unwrap();
        server.set_config("maxmemory-policy", "allkeys-lru");

        let mut conn = RedisConnection::connect(&server.address(), Duration::from_millis(500))
            .await
            .unwrap();
        let reply = conn.command(&["CONFIG", "GET", "maxmemory-policy"]).await.unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Bulk(Some("maxmemory-policy".into())),
                Reply::Bulk(Some("allkeys-lru".into())),
            ]))
        );
        assert_eq!(server.received(), vec!["CONFIG GET maxmemory-policy".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // port réservé puis libéré : rien n'écoute dessus
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let err = RedisConnection::connect(&addr.to_string(), Duration::from_millis(200)).await;
        assert!(matches!(err, Err(ProtocolError::Io(_)) | Err(ProtocolError::Timeout(_))));
    }
}

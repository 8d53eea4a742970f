/*!
Faux serveur Redis pour développement sans instance réelle

Écoute sur 127.0.0.1 (port éphémère), parle le sous-ensemble RESP utilisé par
le kernel et enregistre toutes les commandes reçues pour les assertions.
*/

use anyhow::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct FakeState {
    password: Option<String>,
    config: HashMap<String, String>,
    config_errors: HashMap<String, String>,
    info: String,
    info_error: Option<String>,
    info_raw: Option<String>,
    reply_delay: Option<Duration>,
    received: Vec<String>,
}

/// Serveur scriptable ; s'arrête quand il est droppé
pub struct FakeRedis {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
    task: JoinHandle<()>,
}

impl FakeRedis {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(FakeState::default()));

        let shared = state.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, peer)) = listener.accept().await else { break };
                log::debug!("🔌 [FAKE] connection from {}", peer);
                let state = shared.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(socket, state).await {
                        log::debug!("🔌 [FAKE] connection ended: {}", e);
                    }
                });
            }
        });

        log::info!("🧪 [FAKE] redis listening on {}", addr);
        Ok(Self { addr, state, task })
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Exige AUTH avant toute autre commande
    pub fn require_password(&self, password: &str) {
        self.state.lock().unwrap().password = Some(password.to_string());
    }

    pub fn set_config(&self, item: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.config_errors.remove(item);
        state.config.insert(item.to_string(), value.to_string());
    }

    /// CONFIG GET `item` répondra `-ERR message`
    pub fn fail_config(&self, item: &str, message: &str) {
        self.state.lock().unwrap().config_errors.insert(item.to_string(), message.to_string());
    }

    pub fn set_info(&self, report: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.info = report.into();
        state.info_error = None;
        state.info_raw = None;
    }

    /// INFO répondra ces octets tels quels (réponses hors protocole)
    pub fn set_info_raw(&self, raw: &str) {
        self.state.lock().unwrap().info_raw = Some(raw.to_string());
    }

    pub fn fail_info(&self, message: &str) {
        self.state.lock().unwrap().info_error = Some(message.to_string());
    }

    /// Retarde chaque réponse (simule une instance lente)
    pub fn delay_replies(&self, delay: Duration) {
        self.state.lock().unwrap().reply_delay = Some(delay);
    }

    /// Commandes reçues, arguments joints par un espace
    pub fn received(&self) -> Vec<String> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn received_matching(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .received
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .count()
    }

    pub fn clear_received(&self) {
        self.state.lock().unwrap().received.clear();
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(socket: TcpStream, state: Arc<Mutex<FakeState>>) -> Result<()> {
    let mut reader = BufReader::new(socket);
    let mut authenticated = false;

    while let Some(args) = read_command(&mut reader).await? {
        let (reply, delay) = {
            let mut st = state.lock().unwrap();
            st.received.push(args.join(" "));
            (respond(&mut st, &args, &mut authenticated), st.reply_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reader.get_mut().write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

fn respond(state: &mut FakeState, args: &[String], authenticated: &mut bool) -> String {
    let Some(name) = args.first().map(|a| a.to_ascii_uppercase()) else {
        return "-ERR empty command\r\n".into();
    };

    if name == "AUTH" {
        return match (&state.password, args.get(1)) {
            (None, _) => "-ERR Client sent AUTH, but no password is set\r\n".into(),
            (Some(expected), Some(given)) if expected == given => {
                *authenticated = true;
                "+OK\r\n".into()
            }
            _ => "-ERR invalid password\r\n".into(),
        };
    }

    if state.password.is_some() && !*authenticated {
        return "-NOAUTH Authentication required.\r\n".into();
    }

    match name.as_str() {
        "CONFIG" if args.len() == 3 && args[1].eq_ignore_ascii_case("GET") => {
            let item = &args[2];
            if let Some(message) = state.config_errors.get(item) {
                format!("-ERR {message}\r\n")
            } else if let Some(value) = state.config.get(item) {
                format!("*2\r\n{}{}", bulk(item), bulk(value))
            } else {
                "*0\r\n".into()
            }
        }
        "INFO" => match (&state.info_raw, &state.info_error) {
            (Some(raw), _) => raw.clone(),
            (None, Some(message)) => format!("-ERR {message}\r\n"),
            (None, None) => bulk(&state.info),
        },
        _ => format!("-ERR unknown command '{}'\r\n", args[0]),
    }
}

fn bulk(value: &str) -> String {
    format!("${}\r\n{}\r\n", value.len(), value)
}

async fn read_command(reader: &mut BufReader<TcpStream>) -> Result<Option<Vec<String>>> {
    let mut header = String::new();
    if reader.read_line(&mut header).await? == 0 {
        return Ok(None);
    }
    let count: usize = header
        .trim_end()
        .strip_prefix('*')
        .ok_or_else(|| anyhow::anyhow!("expected array header, got {:?}", header))?
        .parse()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let mut len_line = String::new();
        reader.read_line(&mut len_line).await?;
        let len: usize = len_line
            .trim_end()
            .strip_prefix('$')
            .ok_or_else(|| anyhow::anyhow!("expected bulk header, got {:?}", len_line))?
            .parse()?;
        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await?;
        buf.truncate(len);
        args.push(String::from_utf8(buf)?);
    }
    Ok(Some(args))
}

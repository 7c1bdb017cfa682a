//! Fixtures shared by the unit tests.

use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::alerting::{AlertError, SmsTransport};
use crate::database::CheckRecord;

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let Ok(n) = stream.read(&mut chunk).await else { break };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// Answer exactly one request with `head` (status line plus optional headers)
/// and an empty body. The handle yields the raw request text.
pub async fn serve_once(head: &str) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!("{head}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });

    (addr, handle)
}

/// Accept connections and never answer them.
pub async fn silent_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    (addr, handle)
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Captures every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingSms {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsTransport for RecordingSms {
    async fn send(&self, phone: &str, message: &str) -> Result<(), AlertError> {
        self.sent.lock().unwrap().push((phone.to_string(), message.to_string()));
        if self.fail {
            return Err(AlertError::Rejected { status: 500, body: "test transport".into() });
        }
        Ok(())
    }
}

/// A valid check record pointing at `url` over plain HTTP.
pub fn check_record(id: &str, url: &str) -> CheckRecord {
    CheckRecord {
        id: Some(id.to_string()),
        user_phone: Some("5551234567".into()),
        protocol: Some("http".into()),
        url: Some(url.to_string()),
        method: Some("get".into()),
        success_codes: Some(vec![200]),
        timeout_seconds: Some(2),
        ..Default::default()
    }
}

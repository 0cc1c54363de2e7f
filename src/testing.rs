//! Fake upstreams shared by the unit tests

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A plain-HTTP forward proxy that answers each connection with the next
/// canned response and records the request heads it saw.
pub struct FakeHttpProxy {
    pub endpoint: String,
    pub requests: Arc<Mutex<Vec<String>>>,
    pub task: JoinHandle<()>,
}

impl FakeHttpProxy {
    pub async fn start(responses: Vec<String>) -> Self {
        Self::start_raw(responses.into_iter().map(String::into_bytes).collect()).await
    }

    /// Like `start`, for responses that are not valid UTF-8
    pub async fn start_raw(responses: Vec<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        let task = tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let head = read_head(&mut stream).await;
                seen.lock().await.push(head);
                let _ = stream.write_all(&response).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            endpoint,
            requests,
            task,
        }
    }

    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

/// A proxy that accepts one connection, reads the request and never answers.
///
/// The task resolves once the client side has closed the socket, which is
/// how tests prove a cancelled fetch did not leave the connection open.
pub async fn silent_proxy() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_head(&mut stream).await;
        let mut buf = [0u8; 256];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    });
    (endpoint, task)
}

/// A canned `200 OK` response
pub fn ok_response(content_type: Option<&str>, body: &str) -> String {
    let mut response = String::from("HTTP/1.1 200 OK\r\n");
    if let Some(content_type) = content_type {
        response.push_str(&format!("Content-Type: {}\r\n", content_type));
    }
    response.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    response
}

pub fn status_response(status: u16, reason: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    )
}

pub fn redirect_response(location: &str) -> String {
    format!(
        "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        location
    )
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// In-memory proxy source; `None` behaves like an unreachable upstream.
pub struct StaticProxySource {
    listings: Option<Vec<crate::models::ProxyListing>>,
}

impl StaticProxySource {
    pub fn new(listings: Vec<crate::models::ProxyListing>) -> Self {
        Self {
            listings: Some(listings),
        }
    }

    pub fn failing() -> Self {
        Self { listings: None }
    }
}

#[async_trait::async_trait]
impl crate::services::ProxySource for StaticProxySource {
    async fn snapshot(&self) -> crate::error::Result<crate::services::ProxySnapshot> {
        match &self.listings {
            Some(listings) => Ok(crate::services::ProxySnapshot {
                listings: Arc::new(listings.clone()),
                fetched_at: chrono::Utc::now(),
            }),
            None => Err(crate::error::LensError::Upstream(
                "Failed to fetch proxies".to_string(),
            )),
        }
    }
}

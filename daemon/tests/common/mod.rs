//! Test utilities for integration tests in the daemon crate.

#![allow(dead_code)]

use schema::{Message, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Run the given future with a timeout, failing the test if it elapses.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Run a future with a default timeout of 60 seconds.
pub async fn run_with_default_timeout<F, T>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    run_with_timeout(Duration::from_secs(60), fut).await
}

/// Line-framed control connection to a running daemon
pub struct Control {
    stream: BufReader<TcpStream>,
}

impl Control {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to daemon");
        Self {
            stream: BufReader::new(stream),
        }
    }

    pub async fn request(&mut self, message: &Message) -> Response {
        let mut request = serde_json::to_vec(message).expect("encode request");
        request.push(b'\n');
        self.stream
            .get_mut()
            .write_all(&request)
            .await
            .expect("send request");

        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await.expect("read response");
        assert!(n > 0, "daemon closed the connection");
        serde_json::from_str(line.trim_end()).expect("decode response")
    }
}

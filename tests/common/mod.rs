#![allow(dead_code)]

use anyhow::Result;
use ssl_checker::resolver::ProbeRequest;
use ssl_checker::validation::parse_target;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing_subscriber::fmt::MakeWriter;

/// Writes a host file with a unique name under the temp directory
pub async fn create_host_file(lines: &[&str]) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("ssl_checker_hosts_{}.txt", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, lines.join("\n")).await?;
    Ok(path)
}

/// A listener that accepts TCP connections but never answers a ClientHello
pub async fn silent_listener() -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// An address on which nothing is listening
pub async fn closed_port() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

pub fn request(index: usize, environment: &str, target: &str) -> ProbeRequest {
    ProbeRequest {
        index,
        environment: environment.to_string(),
        hostname: target.to_string(),
        endpoint: parse_target(target, 443).expect("valid test target"),
    }
}

/// In-memory log sink shared between a subscriber and the test
#[derive(Clone, Default)]
pub struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLog {
    type Writer = CapturedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

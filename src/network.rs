//! Status endpoint
//!
//!  Tiny HTTP/1.1 server on a plain tokio listener. `GET /status.json`
//!  returns the monitor status, `POST /pause` and `POST /resume` control the
//!  loop; anything else is a 404.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::monitor::{PauseHandle, SharedStatus};

pub async fn run_status_server(
    port: u16,
    status: SharedStatus,
    pause: PauseHandle,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Status server listening on port {}", port);
    serve(listener, status, pause, cancel).await
}

async fn serve(
    listener: TcpListener,
    status: SharedStatus,
    pause: PauseHandle,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (socket, addr) = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Status server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };
        debug!("Status client connected: {}", addr);
        let status = status.clone();
        let pause = pause.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_request(socket, addr, status, pause).await {
                debug!("Status request error: {}", e);
            }
        });
    }
}

async fn handle_request(
    mut socket: TcpStream,
    addr: SocketAddr,
    status: SharedStatus,
    pause: PauseHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = vec![0u8; 4096];
    let n = socket.read(&mut buffer).await?;
    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Ok(());
    }
    let (method, url) = (parts[0], parts[1]);
    let path = url.split('?').next().unwrap_or(url);
    debug!("{} {} from {}", method, path, addr);

    let (code, body) = match (method, path) {
        ("GET", "/status.json") => {
            let json = {
                let status = status.read();
                serde_json::to_string_pretty(&*status)?
            };
            ("200 OK", json)
        }
        ("POST", "/pause") => {
            if pause.pause() {
                info!("Pause requested by {}", addr);
            }
            ("200 OK", "{\"paused\": true}".to_string())
        }
        ("POST", "/resume") => {
            if pause.resume() {
                info!("Resume requested by {}", addr);
            }
            ("200 OK", "{\"paused\": false}".to_string())
        }
        _ => ("404 Not Found", "{\"error\": \"not found\"}".to_string()),
    };

    let header = format!(
        "HTTP/1.1 {}\r\n\
         Server: medtrack\r\n\
         Content-Type: application/json;charset=utf-8\r\n\
         Connection: close\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         \r\n",
        code,
        body.len()
    );

    socket.write_all(header.as_bytes()).await?;
    socket.write_all(body.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::RwLock;

    use super::*;
    use crate::monitor::{CycleReport, MonitorStatus};

    async fn send(addr: SocketAddr, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("{} {} HTTP/1.1\r\nHost: localhost\r\n\r\n", method, path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_status_json_and_404() {
        let status: SharedStatus = Arc::new(RwLock::new(MonitorStatus::default()));
        status.write().last_report = Some(CycleReport {
            cycle: 7,
            emitted: 2,
            ..CycleReport::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            status.clone(),
            PauseHandle::default(),
            cancel.clone(),
        ));

        let response = send(addr, "GET", "/status.json").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["phase"], "idle");
        assert_eq!(value["last_report"]["cycle"], 7);
        assert_eq!(value["last_report"]["emitted"], 2);

        let response = send(addr, "GET", "/gmap.html").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));

        cancel.cancel();
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_pause_and_resume_routes() {
        let status: SharedStatus = Arc::new(RwLock::new(MonitorStatus::default()));
        let pause = PauseHandle::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, status, pause.clone(), cancel.clone()));

        let response = send(addr, "POST", "/pause").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("{\"paused\": true}"));
        assert!(pause.is_paused());

        // Only POST changes state
        let response = send(addr, "GET", "/resume").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
        assert!(pause.is_paused());

        let response = send(addr, "POST", "/resume").await;
        assert!(response.ends_with("{\"paused\": false}"));
        assert!(!pause.is_paused());

        cancel.cancel();
        assert!(server.await.unwrap().is_ok());
    }
}

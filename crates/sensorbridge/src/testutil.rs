//! Helpers shared by tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one HTTP request with `status_line` and return the raw request.
pub(crate) async fn serve_once(listener: TcpListener, status_line: &'static str) -> String {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = vec![0u8; 8192];
    let mut request = Vec::new();
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|l| {
                    l.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            if request.len() >= header_end + 4 + content_length {
                break;
            }
        }
        if n == 0 {
            break;
        }
    }
    let response = format!("{status_line}\r\ncontent-length: 4\r\n\r\nnull");
    stream.write_all(response.as_bytes()).await.unwrap();
    String::from_utf8_lossy(&request).to_string()
}

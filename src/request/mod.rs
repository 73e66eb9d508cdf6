use std::{path::PathBuf, time::Duration};

use base64::{engine::general_purpose, Engine as _};
use derive_builder::Builder;
use eyre::{Result, WrapErr};
use futures::future::BoxFuture;

use crate::{config::HandlerType, session::Credential};

use self::prompt::Prompt;

pub mod http;
pub mod openai;
pub mod prompt;

pub trait Handler: Send + Sync {
    /// Send one request to the model and return its raw text, untouched.
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> BoxFuture<'a, Result<String>>;
}

/// The staged image handed to a handler. The file lives only as long as the
/// scratch copy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub path: PathBuf,
    pub mime: &'static str,
}

impl ImageAttachment {
    pub async fn to_data_url(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .wrap_err_with(|| format!("unable to read staged image {}", self.path.display()))?;
        let encoded = general_purpose::STANDARD.encode(bytes);
        Ok(format!("data:{};base64,{encoded}", self.mime))
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct GenerationRequest {
    pub model: String,
    pub credential: Credential,
    pub prompt: Prompt,
    pub image: ImageAttachment,
}

pub fn build_handler(
    handler_type: HandlerType,
    timeout: Duration,
    api_base: Option<String>,
) -> Result<Box<dyn Handler>> {
    let handler: Box<dyn Handler> = match handler_type {
        HandlerType::Openai => {
            let mut handler = openai::OpenAIHandler::new(timeout)?;
            if let Some(base) = api_base {
                handler = handler.with_api_base(base);
            }
            Box::new(handler)
        }
        HandlerType::Http => {
            let mut handler = http::HttpHandler::new(timeout)?;
            if let Some(base) = api_base {
                handler = handler.with_api_base(base);
            }
            Box::new(handler)
        }
    };
    Ok(handler)
}

/// Canned chat-completion endpoint on the loopback interface, shared by handler tests.
#[cfg(test)]
pub(crate) mod fake_server {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// Serve exactly one request. Resolves to the raw request text.
    pub async fn serve_once(status: u16, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (format!("http://{addr}"), handle)
    }

    /// Answer every connection with the same response and count how many arrive.
    pub async fn serve_counting(status: u16, body: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {status} Status\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.ok();
                socket.shutdown().await.ok();
            }
        });
        (format!("http://{addr}"), connections)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(idx) = text.find("\r\n\r\n") {
                let head = text[..idx].to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= idx + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn completion_body(content: Option<&str>) -> String {
        serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "created": 1_700_000_000u32,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "logprobs": null,
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
        })
        .to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_data_url_encodes_staged_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let request = test_support::sample_request(dir.path(), b"png-bytes");
        let url = request.image.to_data_url().await.unwrap();
        assert_eq!(url, "data:image/png;base64,cG5nLWJ5dGVz");
    }

    #[tokio::test]
    async fn test_missing_staged_image_fails() {
        let attachment = ImageAttachment {
            path: PathBuf::from("/definitely/not/here.png"),
            mime: "image/png",
        };
        assert!(attachment.to_data_url().await.is_err());
    }

    #[test]
    fn test_builder_requires_every_field() {
        let err = GenerationRequestBuilder::default().model("gpt-4o").build();
        assert!(err.is_err());
    }
}

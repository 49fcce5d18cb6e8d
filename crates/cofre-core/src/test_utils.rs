//! Test utilities for cofre-core
//!
//! Provides a mock chat-completion server so integration tests can exercise
//! the real HTTP backend, including its timeout behavior, without network
//! access.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::Json, routing::post, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Mock OpenAI-compatible chat-completion server
pub struct MockChatServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockChatServer {
    /// Start a server that always answers with `response_text` as the
    /// assistant message content
    pub async fn start(response_text: &str) -> Self {
        Self::start_inner(response_text.to_string(), None).await
    }

    /// Start a server that sleeps before answering, for timeout tests
    pub async fn start_slow(response_text: &str, delay: Duration) -> Self {
        Self::start_inner(response_text.to_string(), Some(delay)).await
    }

    async fn start_inner(response_text: String, delay: Option<Duration>) -> Self {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(request): Json<ChatRequest>| {
                let response_text = response_text.clone();
                async move {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let prompt_len: usize =
                        request.messages.iter().map(|m| m.content.len()).sum();
                    Json(ChatResponse {
                        choices: vec![Choice {
                            message: Message {
                                role: "assistant".to_string(),
                                content: response_text.clone(),
                            },
                        }],
                        usage: Usage {
                            prompt_tokens: (prompt_len / 4) as u32,
                            completion_tokens: (response_text.len() / 4) as u32,
                        },
                    })
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockChatServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[allow(dead_code)]
    model: String,
    messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[allow(dead_code)]
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Serialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

//! Scripted factory and pipeline for tests

use super::{ConstructOptions, Pipeline, PipelineFactory, Task};
use crate::error::{Result, SentiError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Output {
    Payload(serde_json::Value),
    Fails(String),
    Unreachable(String),
}

/// Pipeline returning a fixed payload (or error) and counting calls
pub(crate) struct MockPipeline {
    output: Output,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockPipeline {
    pub(crate) fn returning(payload: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            output: Output::Payload(payload),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            output: Output::Fails(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Fails like a pipeline whose server cannot be reached
    pub(crate) fn unreachable(message: &str) -> Arc<Self> {
        Arc::new(Self {
            output: Output::Unreachable(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn slow(payload: serde_json::Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            output: Output::Payload(payload),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pipeline for MockPipeline {
    async fn run(&self, _text: &str) -> Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.output {
            Output::Payload(payload) => Ok(payload.clone()),
            Output::Fails(message) => Err(SentiError::InferenceException(message.clone())),
            Output::Unreachable(message) => Err(SentiError::Network(message.clone())),
        }
    }
}

/// Factory answering each construct call from a script
#[derive(Default)]
pub(crate) struct MockFactory {
    script: Mutex<VecDeque<std::result::Result<Arc<MockPipeline>, String>>>,
    calls: Mutex<Vec<(Task, String, ConstructOptions)>>,
}

impl MockFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Next construct call succeeds with `pipeline`
    pub(crate) fn then_ok(self, pipeline: Arc<MockPipeline>) -> Self {
        self.script.lock().unwrap().push_back(Ok(pipeline));
        self
    }

    /// Next construct call fails with `message`
    pub(crate) fn then_err(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Task, String, ConstructOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineFactory for MockFactory {
    fn name(&self) -> &str {
        "mock"
    }

    async fn construct(
        &self,
        task: Task,
        model: &str,
        options: &ConstructOptions,
    ) -> Result<Arc<dyn Pipeline>> {
        self.calls
            .lock()
            .unwrap()
            .push((task, model.to_string(), options.clone()));

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(pipeline)) => Ok(pipeline as Arc<dyn Pipeline>),
            Some(Err(message)) => Err(SentiError::Construction(message)),
            None => Err(SentiError::Construction("no scripted outcome".to_string())),
        }
    }
}

/// Canned HTTP reply of a [`FakeServer`] route
#[cfg(feature = "hub")]
pub(crate) struct Reply {
    body: String,
    truncated: bool,
}

#[cfg(feature = "hub")]
impl Reply {
    pub(crate) fn json(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            truncated: false,
        }
    }

    /// Announces more bytes than it sends, then hangs up
    pub(crate) fn truncated(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            truncated: true,
        }
    }
}

/// Loopback HTTP server answering `"METHOD /path"` routes
///
/// Unknown routes get a 404. Every request is recorded as
/// `"METHOD /path | body"`.
#[cfg(feature = "hub")]
pub(crate) struct FakeServer {
    pub(crate) endpoint: String,
    requests: Arc<Mutex<Vec<String>>>,
}

#[cfg(feature = "hub")]
impl FakeServer {
    pub(crate) async fn start(routes: Vec<(&str, Reply)>) -> Self {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let routes: std::collections::HashMap<String, Reply> = routes
            .into_iter()
            .map(|(route, reply)| (route.to_string(), reply))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let (route, body) = read_request(&mut socket).await;
                seen.lock().unwrap().push(format!("{} | {}", route, body));

                let response = match routes.get(&route) {
                    Some(reply) => {
                        let length = if reply.truncated {
                            reply.body.len() + 64
                        } else {
                            reply.body.len()
                        };
                        format!(
                            "HTTP/1.1 200 OK\r\n\
                             content-type: application/json\r\n\
                             content-length: {}\r\n\
                             connection: close\r\n\r\n{}",
                            length, reply.body
                        )
                    }
                    None => "HTTP/1.1 404 Not Found\r\n\
                             content-length: 0\r\n\
                             connection: close\r\n\r\n"
                        .to_string(),
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { endpoint, requests }
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests starting with `route`
    pub(crate) fn requests_to(&self, route: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.starts_with(route))
            .collect()
    }
}

/// Read one request, returning `"METHOD /path"` and the body
#[cfg(feature = "hub")]
async fn read_request(socket: &mut tokio::net::TcpStream) -> (String, String) {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut head_end = None;

    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if head_end.is_none() {
            head_end = buf.windows(4).position(|w| w == b"\r\n\r\n");
        }
        if let Some(end) = head_end {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }

    let end = head_end.unwrap_or(buf.len());
    let head = String::from_utf8_lossy(&buf[..end]).into_owned();
    let route = head
        .lines()
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ");
    let body = String::from_utf8_lossy(&buf[(end + 4).min(buf.len())..]).into_owned();
    (route, body)
}

use crate::error::RequestFailure;
use reqwest::{Client, StatusCode, Url};
use stampede_core::{ConfigError, Endpoint, Method, Target};
use std::time::Duration;

/// Build the client shared by every iteration of a run.
pub fn client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("stampede/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// The request one iteration sends to one target.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    client: Client,
    method: reqwest::Method,
    url: Url,
    timeout: Duration,
    expected_status: StatusCode,
    discard_response_bodies: bool,
}

impl HttpRequest {
    pub fn new(client: Client, endpoint: &Endpoint, target: &Target) -> Result<Self, ConfigError> {
        let url = endpoint.url_for(target)?;
        let expected_status = StatusCode::from_u16(endpoint.expected_status).map_err(|_| {
            ConfigError::InvalidScenario {
                scenario: target.hostname.clone(),
                reason: format!("invalid expected status {}", endpoint.expected_status),
            }
        })?;
        let method = match endpoint.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        Ok(Self {
            client,
            method,
            url,
            timeout: endpoint.timeout,
            expected_status,
            discard_response_bodies: endpoint.discard_response_bodies,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send the request. Succeeds only on the expected status with the body fully received.
    /// Discarded bodies are still drained so the connection goes back to the pool.
    pub async fn send(&self) -> Result<(), RequestFailure> {
        let mut response = self
            .client
            .request(self.method.clone(), self.url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if self.discard_response_bodies {
            while response.chunk().await.map_err(classify)?.is_some() {}
        } else {
            response.bytes().await.map_err(classify)?;
        }

        if status == self.expected_status {
            Ok(())
        } else {
            Err(RequestFailure::Status(status.as_u16()))
        }
    }
}

fn classify(err: reqwest::Error) -> RequestFailure {
    if err.is_timeout() {
        RequestFailure::Timeout
    } else if err.is_connect() {
        RequestFailure::Connect(err.to_string())
    } else {
        RequestFailure::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A keep-alive HTTP/1.1 server answering every request with a large body. Returns its port
    /// and the number of connections it accepted.
    async fn large_body_server() -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    let body = vec![b'x'; 200 * 1024];
                    let head = format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n",
                        body.len()
                    );
                    let mut pending = Vec::new();
                    let mut buf = [0u8; 4096];
                    loop {
                        let read = match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(read) => read,
                        };
                        pending.extend_from_slice(&buf[..read]);
                        while let Some(end) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
                            pending.drain(..end + 4);
                            if socket.write_all(head.as_bytes()).await.is_err()
                                || socket.write_all(&body).await.is_err()
                            {
                                return;
                            }
                        }
                    }
                });
            }
        });

        (port, accepted)
    }

    #[test]
    fn builds_target_url() {
        let endpoint = Endpoint {
            port: Some(30000),
            method: Method::Post,
            ..Endpoint::default()
        };
        let target = Target::new("node-1", "10.0.0.7");
        let request = HttpRequest::new(client().unwrap(), &endpoint, &target).unwrap();
        assert_eq!(request.url().as_str(), "http://10.0.0.7:30000/");
        assert_eq!(request.method, reqwest::Method::POST);
        assert_eq!(request.expected_status, StatusCode::OK);
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_failure() {
        // NOTE: Port 9 (discard) is closed on any sane test host.
        let endpoint = Endpoint {
            port: Some(9),
            timeout: Duration::from_secs(5),
            ..Endpoint::default()
        };
        let request =
            HttpRequest::new(client().unwrap(), &endpoint, &Target::from_address("127.0.0.1"))
                .unwrap();
        assert!(matches!(
            request.send().await,
            Err(RequestFailure::Connect(_))
        ));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn discarded_bodies_keep_connections_alive() {
        let (port, accepted) = large_body_server().await;
        let endpoint = Endpoint {
            port: Some(port),
            discard_response_bodies: true,
            ..Endpoint::default()
        };
        let request =
            HttpRequest::new(client().unwrap(), &endpoint, &Target::from_address("127.0.0.1"))
                .unwrap();

        for _ in 0..20 {
            request.send().await.unwrap();
        }
        assert_eq!(accepted.load(Ordering::Relaxed), 1);
    }
}

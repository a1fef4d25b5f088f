//! Shared fixtures: a throwaway identity service and key encoding helpers

#![allow(dead_code)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;

pub const SERVICE_USER: &str = "lega";
pub const SERVICE_PASSWORD: &str = "secret";

/// Handle to a running identity service double
pub struct IdentityService {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl IdentityService {
    /// Base URL to configure as the identity endpoint
    pub fn endpoint(&self) -> String {
        format!("http://{}/users", self.addr)
    }

    /// Number of requests served so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Spawn an identity service answering `GET /users/<name>` with the body
/// registered for `<name>`, 404 for unknown users and 401 without the
/// service credentials.
pub async fn spawn_identity_service(users: Vec<(String, String)>) -> IdentityService {
    let users: Arc<HashMap<String, String>> = Arc::new(users.into_iter().collect());
    let hits = Arc::new(AtomicUsize::new(0));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_hits = hits.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(s) => s,
                Err(_) => continue,
            };
            let users = users.clone();
            let hits = server_hits.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = hyper::service::service_fn(move |req| {
                    let users = users.clone();
                    let hits = hits.clone();
                    async move { handle(req, &users, &hits) }
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    IdentityService { addr, hits }
}

fn handle(
    req: Request<Incoming>,
    users: &HashMap<String, String>,
    hits: &AtomicUsize,
) -> Result<Response<Full<Bytes>>, Infallible> {
    hits.fetch_add(1, Ordering::SeqCst);

    let expected = format!("Basic {}", B64.encode(format!("{}:{}", SERVICE_USER, SERVICE_PASSWORD)));
    let authorized = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());

    let (status, body) = if !authorized {
        (StatusCode::UNAUTHORIZED, String::new())
    } else {
        match req.uri().path().strip_prefix("/users/").and_then(|u| users.get(u)) {
            Some(body) => (StatusCode::OK, body.clone()),
            None => (StatusCode::NOT_FOUND, "{}".to_string()),
        }
    };

    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    Ok(resp)
}

fn put_field(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// Wire blob of an RSA key with the given big-endian magnitudes
pub fn rsa_blob(exponent: &[u8], modulus: &[u8]) -> Vec<u8> {
    let mut blob = Vec::new();
    put_field(&mut blob, b"ssh-rsa");
    put_field(&mut blob, exponent);
    // mpint: keep the value positive
    let mut m = vec![0u8];
    m.extend_from_slice(modulus);
    put_field(&mut blob, &m);
    blob
}

/// Authorized-keys line for an RSA key
pub fn rsa_line(exponent: &[u8], modulus: &[u8]) -> String {
    format!("ssh-rsa {} test@inbox", B64.encode(rsa_blob(exponent, modulus)))
}

/// Wire blob of a key type that is recognised but not decoded
pub fn ed25519_blob() -> Vec<u8> {
    let mut blob = Vec::new();
    put_field(&mut blob, b"ssh-ed25519");
    put_field(&mut blob, &[0x42; 32]);
    blob
}

/// Fresh username so concurrent tests never share cache entries or buckets
pub fn random_user() -> String {
    format!("user-{}", uuid::Uuid::new_v4().simple())
}

//! 外部签名服务客户端：提交目标请求描述，取回签名后的 Header 与 URL。

use std::collections::BTreeMap;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signer request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("signer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// 一次待签名的请求；每批现场构造，用完即弃。
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub url: String,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub headers: Vec<(String, String)>,
    pub sign_url: String,
}

pub trait RequestSigner: Send + Sync {
    fn sign(&self, request: &RequestDescriptor) -> Result<SignedRequest, SignerError>;
}

#[derive(Serialize)]
struct SignBody<'a> {
    surl: &'a str,
    params: &'a BTreeMap<String, String>,
    devices: Map<String, Value>,
    data: Map<String, Value>,
    header: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct SignReply {
    #[serde(default)]
    headers: Map<String, Value>,
    sign_url: String,
}

pub struct HttpSigner {
    client: Client,
    endpoint: String,
}

impl HttpSigner {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl RequestSigner for HttpSigner {
    fn sign(&self, request: &RequestDescriptor) -> Result<SignedRequest, SignerError> {
        let body = SignBody {
            surl: &request.url,
            params: &request.params,
            devices: Map::new(),
            data: Map::new(),
            header: &request.headers,
        };
        let resp = self.client.post(&self.endpoint).json(&body).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(SignerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let reply: SignReply = resp.json()?;
        debug!(target: "network", headers = reply.headers.len(), "签名完成");

        let headers = reply
            .headers
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        Ok(SignedRequest {
            headers,
            sign_url: reply.sign_url,
        })
    }
}

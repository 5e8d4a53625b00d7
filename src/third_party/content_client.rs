//! 批量正文接口：签名后 GET，返回 `item_id -> {content, title, ...}` 的原始映射。
//!
//! 这里不做任何重试，失败由批次下载器和编排器按轮次处理。

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::signer::{RequestDescriptor, RequestSigner, SignerError};
use crate::base_system::context::OfficialApi;
use crate::download::models::FetchMode;

/// 单次请求的章节数上限。
pub const MAX_BATCH_SIZE: usize = 30;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("batch of {0} items exceeds the per-request limit")]
    TooManyItems(usize),
    #[error("sign failed: {0}")]
    Signer(#[from] SignerError),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Body(#[source] reqwest::Error),
}

pub struct ContentGateway {
    client: Client,
    signer: Arc<dyn RequestSigner>,
    identity: OfficialApi,
    batch_full_url: String,
}

impl ContentGateway {
    /// `client` 应带有正文请求的超时设置。
    pub fn new(
        client: Client,
        signer: Arc<dyn RequestSigner>,
        identity: OfficialApi,
        batch_full_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            signer,
            identity,
            batch_full_url: batch_full_url.into(),
        }
    }

    pub fn describe(&self, item_ids: &[String], mode: FetchMode) -> RequestDescriptor {
        let id = &self.identity;
        let params: BTreeMap<String, String> = [
            ("item_ids", item_ids.join(",")),
            ("key_register_ts", "0".to_string()),
            ("req_type", mode.req_type().to_string()),
            ("iid", id.install_id.clone()),
            ("device_id", id.device_id.clone()),
            ("aid", id.aid.clone()),
            ("version_code", id.version_code.clone()),
            ("version_name", id.version_name.clone()),
            ("device_platform", "android".to_string()),
            ("os", "android".to_string()),
            ("ssmix", "a".to_string()),
            ("update_version_code", id.update_version_code.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let mut headers = BTreeMap::new();
        headers.insert("Cookie".to_string(), format!("install_id={}", id.install_id));

        RequestDescriptor {
            url: self.batch_full_url.clone(),
            params,
            headers,
        }
    }

    pub fn fetch_batch(
        &self,
        item_ids: &[String],
        mode: FetchMode,
    ) -> Result<Map<String, Value>, GatewayError> {
        if item_ids.len() > MAX_BATCH_SIZE {
            return Err(GatewayError::TooManyItems(item_ids.len()));
        }

        let signed = self.signer.sign(&self.describe(item_ids, mode))?;
        let mut headers = HeaderMap::new();
        for (k, v) in &signed.headers {
            match (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(target: "network", header = %k, "忽略非法签名 Header"),
            }
        }

        let resp = self
            .client
            .get(&signed.sign_url)
            .headers(headers)
            .send()
            .map_err(GatewayError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        let body: Value = resp.json().map_err(GatewayError::Body)?;

        let data = match body {
            Value::Object(mut top) => match top.remove("data") {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            },
            _ => Map::new(),
        };
        debug!(target: "network", requested = item_ids.len(), returned = data.len(), "批量正文返回");
        Ok(data)
    }
}

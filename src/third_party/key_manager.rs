//! 会话密钥：一次注册握手换取正文解密密钥，本实例生命周期内复用。

use std::sync::Mutex;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::base_system::context::OfficialApi;
use crate::book_parser::crypto::{ChapterCipher, CryptoError, register_plaintext};

/// 注册明文中与设备 ID 拼接的盐。
const REGISTER_SALT: &str = "0";

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("device id / registration salt must be numeric: {0}")]
    InvalidId(#[source] CryptoError),
    #[error("registration request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("registration returned HTTP {0}")]
    Status(u16),
    #[error("registration response malformed: {0}")]
    Payload(String),
    #[error("session key decrypt failed: {0}")]
    Crypto(#[source] CryptoError),
}

#[derive(Deserialize)]
struct RegisterReply {
    data: Option<RegisterData>,
}

#[derive(Deserialize)]
struct RegisterData {
    key: Option<String>,
}

pub struct KeyManager {
    client: Client,
    register_url: String,
    identity: OfficialApi,
    cached: Mutex<Option<String>>,
}

impl KeyManager {
    pub fn new(client: Client, register_url: impl Into<String>, identity: OfficialApi) -> Self {
        Self {
            client,
            register_url: register_url.into(),
            identity,
            cached: Mutex::new(None),
        }
    }

    /// 返回 hex 编码的会话密钥；并发调用时只有一个线程执行握手。
    pub fn get_key(&self) -> Result<String, RegistrationError> {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }
        let key = self.register()?;
        *cached = Some(key.clone());
        Ok(key)
    }

    fn register(&self) -> Result<String, RegistrationError> {
        let plain = register_plaintext(&self.identity.device_id, REGISTER_SALT)
            .map_err(RegistrationError::InvalidId)?;
        let bootstrap = ChapterCipher::bootstrap();
        let body = serde_json::json!({
            "content": bootstrap.seal_base64(&plain),
            "keyver": 1,
        });

        debug!(target: "network", url = %self.register_url, "注册会话密钥");
        let resp = self
            .client
            .post(&self.register_url)
            .query(&[("aid", self.identity.aid.as_str())])
            .header(COOKIE, format!("install_id={}", self.identity.install_id))
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .map_err(RegistrationError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RegistrationError::Status(status.as_u16()));
        }
        let reply: RegisterReply = resp
            .json()
            .map_err(|e| RegistrationError::Payload(e.to_string()))?;
        let wrapped = reply
            .data
            .and_then(|d| d.key)
            .ok_or_else(|| RegistrationError::Payload("missing data.key".to_string()))?;

        let raw_key = bootstrap
            .open_base64(&wrapped)
            .map_err(RegistrationError::Crypto)?;
        let key = hex::encode(raw_key);
        info!(target: "network", "获取解密密钥成功");
        Ok(key)
    }
}

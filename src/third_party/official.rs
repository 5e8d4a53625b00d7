//! 官方接口组合：签名网关 + 会话密钥，按配置构建。

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::{Map, Value};

use super::content_client::{ContentGateway, GatewayError};
use super::key_manager::{KeyManager, RegistrationError};
use super::signer::HttpSigner;
use crate::base_system::context::Config;
use crate::download::fetcher::ChapterSource;
use crate::download::models::FetchMode;

pub struct OfficialSource {
    gateway: ContentGateway,
    keys: KeyManager,
}

impl OfficialSource {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let api_client = Client::builder()
            .timeout(cfg.request_timeout())
            .danger_accept_invalid_certs(cfg.insecure_tls)
            .build()
            .context("build api client")?;
        let batch_client = Client::builder()
            .timeout(cfg.batch_timeout())
            .danger_accept_invalid_certs(cfg.insecure_tls)
            .build()
            .context("build batch client")?;

        let signer = Arc::new(HttpSigner::new(
            api_client.clone(),
            cfg.endpoints.signer_url.clone(),
        ));
        let gateway = ContentGateway::new(
            batch_client,
            signer,
            cfg.official_api.clone(),
            cfg.endpoints.batch_full_url.clone(),
        );
        let keys = KeyManager::new(
            api_client,
            cfg.endpoints.register_key_url.clone(),
            cfg.official_api.clone(),
        );
        Ok(Self { gateway, keys })
    }
}

impl ChapterSource for OfficialSource {
    fn fetch_batch(
        &self,
        item_ids: &[String],
        mode: FetchMode,
    ) -> Result<Map<String, Value>, GatewayError> {
        self.gateway.fetch_batch(item_ids, mode)
    }

    fn session_key(&self) -> Result<String, RegistrationError> {
        self.keys.get_key()
    }
}

//! 官方正文接口：外部签名、批量正文、会话密钥。

pub mod content_client;
pub mod key_manager;
pub mod official;
pub mod signer;

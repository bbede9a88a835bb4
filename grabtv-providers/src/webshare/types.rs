//! Webshare API data structures

use serde::Deserialize;

/// Envelope fields present on every Webshare response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl WsStatus {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

/// `/api/salt/` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsSaltResp {
    #[serde(flatten)]
    pub status: WsStatus,
    #[serde(default)]
    pub salt: Option<String>,
}

/// `/api/login/` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsLoginResp {
    #[serde(flatten)]
    pub status: WsStatus,
    #[serde(default)]
    pub token: Option<String>,
}

/// `/api/device_token/` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsDeviceTokenResp {
    #[serde(flatten)]
    pub status: WsStatus,
    #[serde(default)]
    pub device_token: Option<String>,
}

/// `/api/user_data/` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsUserData {
    #[serde(flatten)]
    pub status: WsStatus,
    #[serde(default)]
    pub ident: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub vip: bool,
    #[serde(default)]
    pub vip_days: Option<u32>,
}

/// One file in a `/api/search/` flat listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsFile {
    #[serde(default)]
    pub ident: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub img: Option<String>,
}

/// `/api/search/` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsSearchResp {
    #[serde(flatten)]
    pub status: WsStatus,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub files: Vec<WsFile>,
}

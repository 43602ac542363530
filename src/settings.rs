use serde::{Deserialize, Serialize};
use std::fmt;

/// Subset of the mihomo `/configs` bundle this crate reads and patches.
/// Unknown fields returned by the controller are ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub port: u16,
    #[serde(default, rename = "mixed-port")]
    pub mixed_port: u16,
    #[serde(default)]
    pub mode: String,
    #[serde(default, rename = "log-level")]
    pub log_level: String,
    #[serde(default, rename = "allow-lan")]
    pub allow_lan: bool,
    #[serde(default)]
    pub ipv6: bool,
}

/// Partial bundle for `PATCH /configs`. Only set fields are serialized.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CorePatch {
    #[serde(rename = "allow-lan", skip_serializing_if = "Option::is_none")]
    pub allow_lan: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<bool>,
}

impl CorePatch {
    pub fn allow_lan(value: bool) -> Self {
        Self {
            allow_lan: Some(value),
            ..Default::default()
        }
    }

    pub fn ipv6(value: bool) -> Self {
        Self {
            ipv6: Some(value),
            ..Default::default()
        }
    }
}

/// App-side settings owned by the client itself rather than the core.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClientSettings {
    #[serde(default)]
    pub dns_override: bool,
    #[serde(default = "default_start_page")]
    pub start_page: String,
    #[serde(default)]
    pub system_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            dns_override: false,
            start_page: default_start_page(),
            system_proxy: false,
            language: None,
        }
    }
}

fn default_start_page() -> String {
    "/".to_string()
}

/// Partial counterpart of [`ClientSettings`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ClientSettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_override: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_proxy: Option<bool>,
}

impl ClientSettingsPatch {
    pub fn dns_override(value: bool) -> Self {
        Self {
            dns_override: Some(value),
            ..Default::default()
        }
    }

    pub fn start_page(page: impl Into<String>) -> Self {
        Self {
            start_page: Some(page.into()),
            ..Default::default()
        }
    }

    pub fn system_proxy(value: bool) -> Self {
        Self {
            system_proxy: Some(value),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, settings: &mut ClientSettings) {
        if let Some(dns_override) = self.dns_override {
            settings.dns_override = dns_override;
        }
        if let Some(start_page) = &self.start_page {
            settings.start_page = start_page.clone();
        }
        if let Some(system_proxy) = self.system_proxy {
            settings.system_proxy = system_proxy;
        }
    }
}

/// Every setting the patcher knows how to change.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SettingKey {
    AllowLan,
    Ipv6,
    DnsOverride,
    StartPage,
    SystemProxy,
}

impl SettingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::AllowLan => "allow-lan",
            SettingKey::Ipv6 => "ipv6",
            SettingKey::DnsOverride => "dns-override",
            SettingKey::StartPage => "start-page",
            SettingKey::SystemProxy => "system-proxy",
        }
    }

    pub fn accepts(self, value: &SettingValue) -> bool {
        match self {
            SettingKey::StartPage => matches!(value, SettingValue::Text(_)),
            _ => matches!(value, SettingValue::Bool(_)),
        }
    }

    pub fn expected_kind(self) -> &'static str {
        match self {
            SettingKey::StartPage => "text",
            _ => "boolean",
        }
    }

    /// Key under which the setting is mirrored in the durable side store.
    /// Only the DNS toggle must survive restarts.
    pub(crate) fn side_store_key(self) -> Option<&'static str> {
        match self {
            SettingKey::DnsOverride => Some("dns_override_enabled"),
            _ => None,
        }
    }

    /// Whether a successful patch schedules a delayed core-config re-fetch.
    pub(crate) fn reconciles(self) -> bool {
        matches!(self, SettingKey::DnsOverride)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}

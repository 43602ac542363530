use crate::{
    config::AppConfig,
    settings::{ClientSettings, ClientSettingsPatch, CoreConfig, CorePatch},
};
use anyhow::{Context, Result, ensure};
use log::info;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};
use trait_variant::make;

/// Everything the settings layer treats as an external collaborator: the
/// mihomo external controller (read/patch of the core config plus the DNS
/// override command) and the app-side settings store.
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait BackendClient {
    async fn core_config(&self) -> Result<CoreConfig>;
    async fn patch_core(&self, patch: CorePatch) -> Result<()>;
    async fn patch_client_settings(&self, patch: ClientSettingsPatch) -> Result<()>;
    async fn apply_dns_override(&self, enable: bool) -> Result<()>;
}

#[derive(Clone)]
pub struct MihomoClient {
    http: Client,
    base_url: String,
    api_secret: Option<String>,
    settings_file: PathBuf,
}

impl MihomoClient {
    const CONFIGS_ENDPOINT: &str = "/configs";

    pub fn new() -> Result<Self> {
        let config = AppConfig::get();
        let http = Client::builder()
            .build()
            .context("failed to create http client")?;

        Ok(MihomoClient {
            http,
            base_url: config.controller.base_url.trim_end_matches('/').to_string(),
            api_secret: config.controller.api_secret.clone(),
            settings_file: config.paths.client_settings_file.clone(),
        })
    }

    /// Reads the persisted app-side settings, defaulting on first run.
    pub fn load_client_settings(&self) -> Result<ClientSettings> {
        read_client_settings(&self.settings_file)
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_secret {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }

    /// GET request to the external controller
    async fn get(&self, path: &str) -> Result<String> {
        let url = self.build_url(path);
        info!("GET {url}");

        let res = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .context(format!("failed to send GET request to {url}"))?;

        handle_http_response(res, &format!("GET {url}")).await
    }

    /// PATCH request to the external controller with JSON body
    async fn patch_json(&self, path: &str, body: impl Debug + Serialize) -> Result<String> {
        let url = self.build_url(path);
        info!("PATCH {url} with body: {body:?}");

        let res = self
            .authorized(self.http.patch(&url))
            .json(&body)
            .send()
            .await
            .context(format!("failed to send PATCH request to {url}"))?;

        handle_http_response(res, &format!("PATCH {url}")).await
    }
}

impl BackendClient for MihomoClient {
    async fn core_config(&self) -> Result<CoreConfig> {
        let body = self.get(Self::CONFIGS_ENDPOINT).await?;
        serde_json::from_str(&body).context("failed to parse core config")
    }

    async fn patch_core(&self, patch: CorePatch) -> Result<()> {
        self.patch_json(Self::CONFIGS_ENDPOINT, patch)
            .await
            .map(|_| ())
    }

    async fn patch_client_settings(&self, patch: ClientSettingsPatch) -> Result<()> {
        write_client_settings(&self.settings_file, patch)
    }

    async fn apply_dns_override(&self, enable: bool) -> Result<()> {
        self.patch_json(
            Self::CONFIGS_ENDPOINT,
            serde_json::json!({ "dns": { "enable": enable } }),
        )
        .await
        .map(|_| ())
    }
}

/// Ensures the response status is successful and extracts the body text.
async fn handle_http_response(res: Response, context_msg: &str) -> Result<String> {
    let status = res.status();
    let body = res.text().await.context("failed to read response body")?;

    ensure!(
        status.is_success(),
        "{context_msg} failed with status {status} and body: {body}"
    );

    Ok(body)
}

fn read_client_settings(path: &Path) -> Result<ClientSettings> {
    if !path.exists() {
        return Ok(ClientSettings::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read client settings {}", path.display()))?;

    serde_json::from_str(&raw).context("failed to parse client settings")
}

fn write_client_settings(path: &Path, patch: ClientSettingsPatch) -> Result<()> {
    let mut settings = read_client_settings(path)?;
    patch.apply_to(&mut settings);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create settings directory")?;
    }

    let raw = serde_json::to_string_pretty(&settings).context("failed to serialize settings")?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write client settings {}", path.display()))
}

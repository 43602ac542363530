use crate::{
    backend::BackendClient,
    notify::{NoticeLevel, Notifier},
    settings::{ClientSettingsPatch, CorePatch, SettingKey, SettingValue},
    side_store::SideStore,
    state::SettingsState,
};
use anyhow::bail;
use log::{debug, warn};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    /// Rejected before any state mutation.
    #[error("{setting} expects a {expected} value")]
    InvalidValue {
        setting: SettingKey,
        expected: &'static str,
    },

    /// A second change to the same setting was requested while one is still
    /// pending. The caller decides whether to surface or ignore it.
    #[error("a change to {0} is already in flight")]
    InFlight(SettingKey),

    /// The backend rejected the change; local state has been rolled back.
    #[error("failed to persist {setting}")]
    Remote {
        setting: SettingKey,
        #[source]
        source: anyhow::Error,
    },
}

/// Applies setting changes optimistically: local state first, then the
/// backend, rolling back on failure.
///
/// At most one change per setting may be in flight at a time; concurrent
/// attempts get [`PatchError::InFlight`].
pub struct SettingsPatcher<C, N> {
    state: Arc<SettingsState>,
    store: Arc<SideStore>,
    client: Arc<C>,
    notifier: Arc<N>,
    in_flight: Mutex<HashSet<SettingKey>>,
    reconcile_delay: Duration,
}

impl<C, N> SettingsPatcher<C, N>
where
    C: BackendClient + Send + Sync + 'static,
    N: Notifier,
{
    pub fn new(
        state: Arc<SettingsState>,
        store: Arc<SideStore>,
        client: Arc<C>,
        notifier: Arc<N>,
        reconcile_delay: Duration,
    ) -> Self {
        Self {
            state,
            store,
            client,
            notifier,
            in_flight: Mutex::new(HashSet::new()),
            reconcile_delay,
        }
    }

    pub async fn apply(&self, key: SettingKey, value: SettingValue) -> Result<(), PatchError> {
        if !key.accepts(&value) {
            return Err(PatchError::InvalidValue {
                setting: key,
                expected: key.expected_kind(),
            });
        }

        let _in_flight = self.mark_in_flight(key)?;

        let previous = self.state.get(key);
        self.state.set(key, &value);
        self.mirror_to_store(key, &value);

        match self.forward(key, &value).await {
            Ok(()) => {
                if key.reconciles() {
                    self.schedule_reconcile();
                }
                Ok(())
            }
            Err(source) => {
                self.state.set(key, &previous);
                self.mirror_to_store(key, &previous);
                self.notifier.notify(
                    NoticeLevel::Error,
                    &format!("failed to change {key}: {source:#}"),
                );
                if let Err(e) = self.compensate(key, &previous).await {
                    debug!("compensating request for {key} failed: {e:#}");
                }
                Err(PatchError::Remote {
                    setting: key,
                    source,
                })
            }
        }
    }

    fn mark_in_flight(&self, key: SettingKey) -> Result<InFlightGuard<'_>, PatchError> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(key) {
            return Err(PatchError::InFlight(key));
        }

        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            key,
        })
    }

    async fn forward(&self, key: SettingKey, value: &SettingValue) -> anyhow::Result<()> {
        match (key, value) {
            (SettingKey::AllowLan, SettingValue::Bool(v)) => {
                self.client.patch_core(CorePatch::allow_lan(*v)).await
            }
            (SettingKey::Ipv6, SettingValue::Bool(v)) => {
                self.client.patch_core(CorePatch::ipv6(*v)).await
            }
            (SettingKey::DnsOverride, SettingValue::Bool(v)) => {
                self.client
                    .patch_client_settings(ClientSettingsPatch::dns_override(*v))
                    .await?;
                self.client.apply_dns_override(*v).await
            }
            (SettingKey::StartPage, SettingValue::Text(page)) => {
                self.client
                    .patch_client_settings(ClientSettingsPatch::start_page(page.clone()))
                    .await
            }
            (SettingKey::SystemProxy, SettingValue::Bool(v)) => {
                self.client
                    .patch_client_settings(ClientSettingsPatch::system_proxy(*v))
                    .await
            }
            _ => bail!("mismatched value kind for {key}"),
        }
    }

    // The DNS override command is not replayed on rollback, only the settings
    // patch is compensated.
    async fn compensate(&self, key: SettingKey, previous: &SettingValue) -> anyhow::Result<()> {
        match (key, previous) {
            (SettingKey::DnsOverride, SettingValue::Bool(v)) => {
                self.client
                    .patch_client_settings(ClientSettingsPatch::dns_override(*v))
                    .await
            }
            _ => self.forward(key, previous).await,
        }
    }

    fn mirror_to_store(&self, key: SettingKey, value: &SettingValue) {
        let Some(store_key) = key.side_store_key() else {
            return;
        };

        let raw = match value {
            SettingValue::Bool(v) => v.to_string(),
            SettingValue::Text(text) => text.clone(),
        };

        if let Err(e) = self.store.set(store_key, &raw) {
            warn!("failed to mirror {key} to the side store: {e:#}");
        }
    }

    /// Detached re-fetch of the core config after a fixed delay. Overlapping
    /// tasks from rapid repeated toggles are not coalesced; the last fetch to
    /// complete wins.
    fn schedule_reconcile(&self) {
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let delay = self.reconcile_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match client.core_config().await {
                Ok(core) => state.replace_core(core),
                Err(e) => warn!("settings reconciliation failed: {e:#}"),
            }
        });
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<SettingKey>>,
    key: SettingKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.key);
    }
}

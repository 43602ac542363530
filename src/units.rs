//! The one-click-setup convergence steps.
//!
//! Each unit checks whether its settings already match the target and only
//! goes through the patcher when they do not, so re-running a converged unit
//! issues no remote calls.

use crate::{
    backend::BackendClient,
    notify::Notifier,
    patcher::SettingsPatcher,
    settings::{SettingKey, SettingValue},
    setup::{SetupFuture, SetupUnit},
    state::SettingsState,
};
use std::sync::Arc;

/// Start page the one-click setup converges to.
pub const EASY_START_PAGE: &str = "/easy";

pub const SYSTEM_UNIT: &str = "system";
pub const INTERFACE_UNIT: &str = "interface";
pub const CORE_UNIT: &str = "core";

/// Slot order for the one-click setup run. System proxy comes first so the
/// later network-facing changes take effect behind it.
pub const SETUP_ORDER: [&str; 3] = [SYSTEM_UNIT, INTERFACE_UNIT, CORE_UNIT];

pub struct SystemProxyUnit<C, N> {
    state: Arc<SettingsState>,
    patcher: Arc<SettingsPatcher<C, N>>,
}

impl<C, N> SystemProxyUnit<C, N> {
    pub fn new(state: Arc<SettingsState>, patcher: Arc<SettingsPatcher<C, N>>) -> Self {
        Self { state, patcher }
    }
}

impl<C, N> SetupUnit for SystemProxyUnit<C, N>
where
    C: BackendClient + Send + Sync + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        SYSTEM_UNIT
    }

    fn setup(&self) -> SetupFuture<'_> {
        Box::pin(async move {
            if !self.state.snapshot().client.system_proxy {
                self.patcher
                    .apply(SettingKey::SystemProxy, SettingValue::Bool(true))
                    .await?;
            }
            Ok(())
        })
    }
}

pub struct StartPageUnit<C, N> {
    state: Arc<SettingsState>,
    patcher: Arc<SettingsPatcher<C, N>>,
}

impl<C, N> StartPageUnit<C, N> {
    pub fn new(state: Arc<SettingsState>, patcher: Arc<SettingsPatcher<C, N>>) -> Self {
        Self { state, patcher }
    }
}

impl<C, N> SetupUnit for StartPageUnit<C, N>
where
    C: BackendClient + Send + Sync + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        INTERFACE_UNIT
    }

    fn setup(&self) -> SetupFuture<'_> {
        Box::pin(async move {
            let start_page = self.state.snapshot().client.start_page;
            if !start_page.eq_ignore_ascii_case(EASY_START_PAGE) {
                self.patcher
                    .apply(
                        SettingKey::StartPage,
                        SettingValue::Text(EASY_START_PAGE.to_string()),
                    )
                    .await?;
            }
            Ok(())
        })
    }
}

pub struct CoreSettingsUnit<C, N> {
    state: Arc<SettingsState>,
    patcher: Arc<SettingsPatcher<C, N>>,
}

impl<C, N> CoreSettingsUnit<C, N> {
    pub fn new(state: Arc<SettingsState>, patcher: Arc<SettingsPatcher<C, N>>) -> Self {
        Self { state, patcher }
    }
}

impl<C, N> SetupUnit for CoreSettingsUnit<C, N>
where
    C: BackendClient + Send + Sync + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        CORE_UNIT
    }

    fn setup(&self) -> SetupFuture<'_> {
        Box::pin(async move {
            let snapshot = self.state.snapshot();

            // allow LAN so VMs, WSL and other devices can reach the proxy
            if !snapshot.core.allow_lan {
                self.patcher
                    .apply(SettingKey::AllowLan, SettingValue::Bool(true))
                    .await?;
            }

            // use the profile's DNS settings instead of the override
            if snapshot.client.dns_override {
                self.patcher
                    .apply(SettingKey::DnsOverride, SettingValue::Bool(false))
                    .await?;
            }

            if !snapshot.core.ipv6 {
                self.patcher
                    .apply(SettingKey::Ipv6, SettingValue::Bool(true))
                    .await?;
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackendClient;
    use crate::notify::MockNotifier;
    use crate::settings::{ClientSettings, ClientSettingsPatch, CoreConfig, CorePatch};
    use crate::side_store::SideStore;
    use mockall::predicate::eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn harness(
        client: MockBackendClient,
        core: CoreConfig,
        client_settings: ClientSettings,
        dir: &TempDir,
    ) -> (
        Arc<SettingsState>,
        Arc<SettingsPatcher<MockBackendClient, MockNotifier>>,
    ) {
        let state = Arc::new(SettingsState::new(core, client_settings));
        let patcher = Arc::new(SettingsPatcher::new(
            Arc::clone(&state),
            Arc::new(SideStore::open(dir.path().join("state.ini")).expect("should open store")),
            Arc::new(client),
            Arc::new(MockNotifier::new()),
            Duration::from_millis(500),
        ));
        (state, patcher)
    }

    #[tokio::test]
    async fn converged_units_make_no_remote_calls() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        // no expectations: any backend call would panic
        let (state, patcher) = harness(
            MockBackendClient::new(),
            CoreConfig {
                allow_lan: true,
                ipv6: true,
                ..Default::default()
            },
            ClientSettings {
                dns_override: false,
                start_page: "/easy".to_string(),
                system_proxy: true,
                language: None,
            },
            &dir,
        );

        let units: Vec<Box<dyn SetupUnit>> = vec![
            Box::new(SystemProxyUnit::new(Arc::clone(&state), Arc::clone(&patcher))),
            Box::new(StartPageUnit::new(Arc::clone(&state), Arc::clone(&patcher))),
            Box::new(CoreSettingsUnit::new(Arc::clone(&state), Arc::clone(&patcher))),
        ];

        for unit in &units {
            unit.setup().await.expect("converged setup should no-op");
            unit.setup().await.expect("second run should still no-op");
        }
    }

    #[tokio::test]
    async fn enables_allow_lan_when_disabled() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let mut client = MockBackendClient::new();
        client
            .expect_patch_core()
            .with(eq(CorePatch::allow_lan(true)))
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let (state, patcher) = harness(
            client,
            CoreConfig {
                allow_lan: false,
                ipv6: true,
                ..Default::default()
            },
            ClientSettings::default(),
            &dir,
        );

        CoreSettingsUnit::new(Arc::clone(&state), patcher)
            .setup()
            .await
            .expect("setup should succeed");

        assert!(state.snapshot().core.allow_lan);
    }

    #[tokio::test(start_paused = true)]
    async fn disables_dns_override_and_schedules_reconcile() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let mut client = MockBackendClient::new();
        client
            .expect_patch_client_settings()
            .with(eq(ClientSettingsPatch::dns_override(false)))
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));
        client
            .expect_apply_dns_override()
            .with(eq(false))
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));
        client
            .expect_core_config()
            .times(1)
            .returning(|| Box::pin(async { Ok(CoreConfig::default()) }));

        let (state, patcher) = harness(
            client,
            CoreConfig {
                allow_lan: true,
                ipv6: true,
                ..Default::default()
            },
            ClientSettings {
                dns_override: true,
                ..Default::default()
            },
            &dir,
        );

        CoreSettingsUnit::new(Arc::clone(&state), patcher)
            .setup()
            .await
            .expect("setup should succeed");

        assert!(!state.snapshot().client.dns_override);

        // the delayed re-fetch fires exactly once
        tokio::time::sleep(Duration::from_millis(600)).await;
    }

    #[tokio::test]
    async fn start_page_comparison_ignores_case() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let (state, patcher) = harness(
            MockBackendClient::new(),
            CoreConfig::default(),
            ClientSettings {
                start_page: "/Easy".to_string(),
                ..Default::default()
            },
            &dir,
        );

        StartPageUnit::new(state, patcher)
            .setup()
            .await
            .expect("converged setup should no-op");
    }

    #[tokio::test]
    async fn sets_the_start_page_when_elsewhere() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let mut client = MockBackendClient::new();
        client
            .expect_patch_client_settings()
            .with(eq(ClientSettingsPatch::start_page("/easy")))
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let (state, patcher) = harness(client, CoreConfig::default(), ClientSettings::default(), &dir);

        StartPageUnit::new(Arc::clone(&state), patcher)
            .setup()
            .await
            .expect("setup should succeed");

        assert_eq!(state.snapshot().client.start_page, "/easy");
    }
}

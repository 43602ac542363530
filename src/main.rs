use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{error, info};
use mihomo_easy_setup::{
    backend::{BackendClient, MihomoClient},
    config::AppConfig,
    notify::LogNotifier,
    patcher::SettingsPatcher,
    setup::SetupRunner,
    side_store::SideStore,
    state::SettingsState,
    units::{CoreSettingsUnit, SETUP_ORDER, StartPageUnit, SystemProxyUnit},
};
use std::{io::Write, sync::Arc};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("one-click setup failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::get();
    let client = MihomoClient::new().context("failed to create controller client")?;

    let core = client
        .core_config()
        .await
        .context("failed to read the core config from the controller")?;
    let client_settings = client
        .load_client_settings()
        .context("failed to load client settings")?;
    let state = Arc::new(SettingsState::new(core, client_settings));

    let store = Arc::new(
        SideStore::open(&config.paths.side_store_file).context("failed to open side store")?,
    );
    let patcher = Arc::new(SettingsPatcher::new(
        Arc::clone(&state),
        store,
        Arc::new(client),
        Arc::new(LogNotifier),
        config.reconcile_delay,
    ));

    let runner = SetupRunner::new(&SETUP_ORDER);
    runner.register(Arc::new(SystemProxyUnit::new(
        Arc::clone(&state),
        Arc::clone(&patcher),
    )))?;
    runner.register(Arc::new(StartPageUnit::new(
        Arc::clone(&state),
        Arc::clone(&patcher),
    )))?;
    runner.register(Arc::new(CoreSettingsUnit::new(
        Arc::clone(&state),
        Arc::clone(&patcher),
    )))?;

    runner.run_all().await?;

    info!("one-click setup complete");
    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!(
        "{} version: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
}

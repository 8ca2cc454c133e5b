mod domain;
mod infrastructure;
mod presentation;

use domain::settings::SettingsService;

fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;

    let _logging_guard =
        infrastructure::logging::init_logger(&settings_service.get().log_settings)
            .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
            .ok();

    tracing::info!("Starting Light Gun Bridge");
    tracing::debug!(
        "Settings loaded from {}",
        settings_service.path().display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(presentation::app::run(settings_service.get()));
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

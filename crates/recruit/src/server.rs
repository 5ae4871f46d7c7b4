use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use migration::MigratorTrait;
use recruit_passkey::{EngineSettings, InFlight, PasskeyEngine};
use sea_orm::Database;

use crate::{
    app_state::AppState,
    config::Config,
    crypto, handlers,
    stores::{DbChallengeStore, DbCredentialStore, DbDirectory},
};

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    log::info!("Connecting to database");
    let db = Database::connect(&config.database_url).await?;

    log::info!("Running migrations");
    migration::Migrator::up(&db, None).await?;

    let settings = EngineSettings {
        timeout_ms: config.ceremony_timeout_ms,
        challenge_ttl: chrono::Duration::seconds(config.challenge_ttl_secs),
        counter_policy: config.counter_policy.into(),
        attestation_policy: config.attestation_policy.into(),
    };
    log::info!(
        "Passkey policies: counter={:?}, attestation={:?}",
        settings.counter_policy,
        settings.attestation_policy
    );

    let engine = PasskeyEngine::new(
        config.relying_party(),
        settings,
        DbChallengeStore::new(db.clone()),
        DbCredentialStore::new(db.clone()),
        DbDirectory::new(db.clone()),
    );

    let app_state = web::Data::new(AppState {
        engine,
        directory: DbDirectory::new(db),
        jwt: crypto::generate_ecdsa_keypair(config.rp_production_origin.clone())?,
        access_token_expiration: config.access_token_expiration,
        in_flight: InFlight::new(),
    });

    spawn_challenge_sweep(
        app_state.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    );

    log::info!("Starting HTTP server on {}", config.bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(handlers::configure)
    })
    .bind(&config.bind_address)?
    .run()
    .await?;

    Ok(())
}

/// Purges expired challenges on a fixed interval. Failures are logged and
/// retried on the next tick.
pub fn spawn_challenge_sweep(
    app_state: web::Data<AppState>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match app_state.engine.challenges().sweep().await {
                Ok(0) => {}
                Ok(removed) => log::debug!("Removed {} expired challenges", removed),
                Err(e) => log::warn!("Challenge sweep failed: {}", e),
            }
        }
    })
}

use actix_web::web;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use chrono::Utc;
use entity::user;
use migration::MigratorTrait;
use recruit_passkey::{EngineSettings, InFlight, PasskeyEngine, RelyingParty};
use sea_orm::{Database, EntityTrait, Set};

use crate::{app_state::AppState, crypto, stores};

pub const ORIGIN: &str = "http://localhost:3000";

/// In-memory database with one user, `alice@example.com` (id 1).
pub async fn setup_test_state() -> web::Data<AppState> {
    let db = Database::connect("sqlite::memory:").await.unwrap();

    // Run migrations
    migration::Migrator::up(&db, None).await.unwrap();

    // Create test user
    let now = Utc::now();
    let test_user = user::ActiveModel {
        username: Set("alice@example.com".to_string()),
        display_name: Set("Alice".to_string()),
        user_handle: Set(B64URL.encode(b"alice-handle")),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    user::Entity::insert(test_user).exec(&db).await.unwrap();

    let rp = RelyingParty::new(
        "Recruit",
        "localhost",
        ORIGIN,
        "jobs.example.com",
        "https://jobs.example.com",
    );

    web::Data::new(AppState {
        engine: PasskeyEngine::new(
            rp,
            EngineSettings::default(),
            stores::DbChallengeStore::new(db.clone()),
            stores::DbCredentialStore::new(db.clone()),
            stores::DbDirectory::new(db.clone()),
        ),
        directory: stores::DbDirectory::new(db),
        jwt: crypto::generate_ecdsa_keypair("https://jobs.example.com").unwrap(),
        access_token_expiration: 3600,
        in_flight: InFlight::new(),
    })
}

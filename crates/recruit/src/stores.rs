//! sea-orm implementations of the passkey engine's storage traits.
//!
//! Binary values live in text columns as unpadded base64url.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use chrono::{DateTime, Utc};
use entity::{challenge as challenge_entity, passkey as passkey_entity, user as user_entity};
use recruit_passkey::{
    Challenge, ChallengeStore, CoseAlgorithm, CredentialRecord, CredentialStore, CredentialUse,
    Identity, IdentityDirectory, StoreError, UserId,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};

fn backend(err: DbErr) -> StoreError {
    log::error!("Database error: {}", err);
    StoreError::Backend(err.to_string())
}

fn decode_column(column: &str, value: &str) -> Result<Vec<u8>, StoreError> {
    B64URL
        .decode(value)
        .map_err(|e| StoreError::Backend(format!("{column} is not base64url: {e}")))
}

#[derive(Clone)]
pub struct DbChallengeStore {
    db: DatabaseConnection,
}

impl DbChallengeStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChallengeStore for DbChallengeStore {
    async fn insert(&self, challenge: &Challenge) -> Result<(), StoreError> {
        let row = challenge_entity::ActiveModel {
            id: Set(challenge.id.clone()),
            challenge: Set(B64URL.encode(&challenge.challenge)),
            expires: Set(challenge.expires),
            allowed_credential: Set(challenge
                .allowed_credential
                .as_ref()
                .map(|id| B64URL.encode(id))),
        };

        challenge_entity::Entity::insert(row)
            .exec(&self.db)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Duplicate,
                _ => backend(e),
            })?;
        Ok(())
    }

    async fn take(&self, id: &str) -> Result<Option<Challenge>, StoreError> {
        let Some(row) = challenge_entity::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(backend)?
        else {
            return Ok(None);
        };

        // Whoever deletes the row owns the challenge.
        let deleted = challenge_entity::Entity::delete_many()
            .filter(challenge_entity::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(backend)?;
        if deleted.rows_affected != 1 {
            return Ok(None);
        }

        Ok(Some(Challenge {
            id: row.id,
            challenge: decode_column("webauthn_challenges.challenge", &row.challenge)?,
            expires: row.expires,
            allowed_credential: row
                .allowed_credential
                .as_deref()
                .map(|id| decode_column("webauthn_challenges.allowed_credential", id))
                .transpose()?,
        }))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = challenge_entity::Entity::delete_many()
            .filter(challenge_entity::Column::Expires.lte(now))
            .exec(&self.db)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected)
    }
}

#[derive(Clone)]
pub struct DbCredentialStore {
    db: DatabaseConnection,
}

impl DbCredentialStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn record_from_model(model: passkey_entity::Model) -> Result<CredentialRecord, StoreError> {
    let algorithm = CoseAlgorithm::try_from(model.algorithm).map_err(|_| {
        StoreError::Backend(format!("unsupported stored algorithm {}", model.algorithm))
    })?;
    let sign_count = u32::try_from(model.sign_count)
        .map_err(|_| StoreError::Backend(format!("sign count {} out of range", model.sign_count)))?;
    let transports: Vec<String> = serde_json::from_str(&model.transports)
        .map_err(|e| StoreError::Backend(format!("passkeys.transports: {e}")))?;

    Ok(CredentialRecord {
        credential_id: decode_column("passkeys.credential_id", &model.credential_id)?,
        user_id: model.user_id,
        public_key: decode_column("passkeys.public_key", &model.public_key)?,
        algorithm,
        sign_count,
        transports,
        backup_eligible: model.backup_eligible,
        backup_state: model.backup_state,
        uv_initialized: model.uv_initialized,
        nickname: model.nickname,
        created_at: model.created_at,
        last_used_at: model.last_used_at,
    })
}

#[async_trait]
impl CredentialStore for DbCredentialStore {
    async fn find(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StoreError> {
        passkey_entity::Entity::find()
            .filter(passkey_entity::Column::CredentialId.eq(B64URL.encode(credential_id)))
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(record_from_model)
            .transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<CredentialRecord>, StoreError> {
        passkey_entity::Entity::find()
            .filter(passkey_entity::Column::UserId.eq(user_id))
            .order_by_asc(passkey_entity::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(record_from_model)
            .collect()
    }

    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let transports = serde_json::to_string(&record.transports)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let row = passkey_entity::ActiveModel {
            user_id: Set(record.user_id),
            credential_id: Set(B64URL.encode(&record.credential_id)),
            public_key: Set(B64URL.encode(&record.public_key)),
            algorithm: Set(record.algorithm.id()),
            sign_count: Set(i64::from(record.sign_count)),
            transports: Set(transports),
            backup_eligible: Set(record.backup_eligible),
            backup_state: Set(record.backup_state),
            uv_initialized: Set(record.uv_initialized),
            nickname: Set(record.nickname.clone()),
            created_at: Set(record.created_at),
            last_used_at: Set(record.last_used_at),
            ..Default::default()
        };

        passkey_entity::Entity::insert(row)
            .exec(&self.db)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Duplicate,
                _ => backend(e),
            })?;
        Ok(())
    }

    async fn record_use(
        &self,
        credential_id: &[u8],
        usage: &CredentialUse,
    ) -> Result<(), StoreError> {
        let row = passkey_entity::Entity::find()
            .filter(passkey_entity::Column::CredentialId.eq(B64URL.encode(credential_id)))
            .one(&self.db)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;

        let mut active: passkey_entity::ActiveModel = row.into();
        active.sign_count = Set(i64::from(usage.sign_count));
        active.uv_initialized = Set(usage.uv_initialized);
        active.backup_state = Set(usage.backup_state);
        active.last_used_at = Set(Some(usage.used_at));
        active.update(&self.db).await.map_err(backend)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct DbDirectory {
    db: DatabaseConnection,
}

fn identity_from_model(model: user_entity::Model) -> Result<Identity, StoreError> {
    Ok(Identity {
        user_id: model.id,
        user_handle: decode_column("users.user_handle", &model.user_handle)?,
        name: model.username,
        display_name: model.display_name,
    })
}

impl DbDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Resolves a session's user id.
    pub async fn find_by_id(&self, user_id: UserId) -> Result<Option<Identity>, StoreError> {
        user_entity::Entity::find_by_id(user_id)
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(identity_from_model)
            .transpose()
    }
}

#[async_trait]
impl IdentityDirectory for DbDirectory {
    async fn find_by_handle(&self, user_handle: &[u8]) -> Result<Option<Identity>, StoreError> {
        user_entity::Entity::find()
            .filter(user_entity::Column::UserHandle.eq(B64URL.encode(user_handle)))
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(identity_from_model)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use migration::MigratorTrait;
    use sea_orm::Database;

    async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();

        let now = Utc::now();
        let alice = user_entity::ActiveModel {
            username: Set("alice".to_string()),
            display_name: Set("Alice".to_string()),
            user_handle: Set(B64URL.encode(b"alice-handle")),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        user_entity::Entity::insert(alice).exec(&db).await.unwrap();

        db
    }

    fn record(credential_id: &[u8]) -> CredentialRecord {
        CredentialRecord {
            credential_id: credential_id.to_vec(),
            user_id: 1,
            public_key: vec![0xa5, 0x01, 0x02],
            algorithm: CoseAlgorithm::Es256,
            sign_count: 3,
            transports: vec!["internal".to_string(), "hybrid".to_string()],
            backup_eligible: true,
            backup_state: false,
            uv_initialized: true,
            nickname: Some("Phone".to_string()),
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn test_challenge_take_is_single_use() {
        let store = DbChallengeStore::new(setup_test_db().await);
        let challenge = Challenge::generate(Duration::minutes(5));
        store.insert(&challenge).await.unwrap();

        let taken = store.take(&challenge.id).await.unwrap().unwrap();
        assert_eq!(taken.challenge, challenge.challenge);
        assert!(store.take(&challenge.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_challenge_keeps_allowed_credential() {
        let store = DbChallengeStore::new(setup_test_db().await);
        let challenge = Challenge::generate(Duration::minutes(5)).bound_to(b"cred-1".to_vec());
        store.insert(&challenge).await.unwrap();

        let taken = store.take(&challenge.id).await.unwrap().unwrap();
        assert_eq!(taken.challenge, challenge.challenge);
        assert_eq!(taken.allowed_credential.as_deref(), Some(&b"cred-1"[..]));
    }

    #[tokio::test]
    async fn test_challenge_sweep() {
        let store = DbChallengeStore::new(setup_test_db().await);
        let live = Challenge::generate(Duration::minutes(5));
        store.insert(&live).await.unwrap();
        store.insert(&Challenge::generate(Duration::seconds(-5))).await.unwrap();

        assert_eq!(store.delete_expired(Utc::now()).await.unwrap(), 1);
        assert!(store.take(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_credential_round_trip_and_uniqueness() {
        let store = DbCredentialStore::new(setup_test_db().await);
        let original = record(b"cred-1");
        store.create(&original).await.unwrap();

        let found = store.find(b"cred-1").await.unwrap().unwrap();
        assert_eq!(found.public_key, original.public_key);
        assert_eq!(found.transports, original.transports);
        assert_eq!(found.sign_count, 3);
        assert_eq!(store.list_for_user(1).await.unwrap().len(), 1);

        assert_eq!(store.create(&original).await, Err(StoreError::Duplicate));
        assert!(store.find(b"cred-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_use() {
        let store = DbCredentialStore::new(setup_test_db().await);
        store.create(&record(b"cred-1")).await.unwrap();

        let usage = CredentialUse {
            sign_count: 9,
            uv_initialized: true,
            backup_state: true,
            used_at: Utc::now(),
        };
        store.record_use(b"cred-1", &usage).await.unwrap();

        let found = store.find(b"cred-1").await.unwrap().unwrap();
        assert_eq!(found.sign_count, 9);
        assert!(found.backup_state);
        assert!(found.last_used_at.is_some());

        assert_eq!(
            store.record_use(b"missing", &usage).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_directory_lookups() {
        let directory = DbDirectory::new(setup_test_db().await);
        let alice = directory.find_by_handle(b"alice-handle").await.unwrap().unwrap();
        assert_eq!(alice.name, "alice");
        assert_eq!(directory.find_by_id(alice.user_id).await.unwrap(), Some(alice));
        assert!(directory.find_by_handle(b"nobody").await.unwrap().is_none());
    }
}

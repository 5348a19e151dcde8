use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

use crate::passkey::{Credential, CredentialId, CredentialPublicKey, User};
use crate::storage::errors::StorageError;

use super::types::CredentialStore;

const DB_TABLE_USERS: &str = "passkey_users";
const DB_TABLE_CREDENTIALS: &str = "passkey_credentials";

/// Credential store backed by SQLite through sqlx.
pub struct SqliteCredentialStore {
    pool: Pool<Sqlite>,
}

impl SqliteCredentialStore {
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        tracing::info!("Connecting to SQLite credential store");
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to an in-memory database opens a separate database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    async fn load_credentials(&self, user_id: &[u8]) -> Result<Vec<Credential>, StorageError> {
        let rows = sqlx::query(&format!(
            r#"SELECT * FROM {DB_TABLE_CREDENTIALS} WHERE user_id = ? ORDER BY rowid"#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(credential_from_row).collect()
    }
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential, StorageError> {
    let public_key: Vec<u8> = row.try_get("public_key")?;
    let sign_count: i64 = row.try_get("sign_count")?;
    let transports: String = row.try_get("transports")?;

    Ok(Credential {
        credential_id: CredentialId::new(row.try_get("credential_id")?),
        public_key: CredentialPublicKey::from_cose_bytes(&public_key)
            .map_err(|e| StorageError::Storage(format!("Stored public key: {e}")))?,
        sign_count: u32::try_from(sign_count)
            .map_err(|_| StorageError::Storage(format!("Stored counter out of range: {sign_count}")))?,
        transports: serde_json::from_str(&transports)?,
        aaguid: row.try_get("aaguid")?,
        attestation_format: row.try_get("attestation_format")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        last_used_at: row.try_get::<DateTime<Utc>, _>("last_used_at")?,
    })
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn init(&self) -> Result<(), StorageError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {DB_TABLE_USERS} (
                id BLOB PRIMARY KEY NOT NULL,
                name TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {DB_TABLE_CREDENTIALS} (
                credential_id BLOB PRIMARY KEY NOT NULL,
                user_id BLOB NOT NULL REFERENCES {DB_TABLE_USERS}(id),
                public_key BLOB NOT NULL,
                sign_count INTEGER NOT NULL DEFAULT 0,
                transports TEXT NOT NULL,
                aaguid TEXT NOT NULL,
                attestation_format TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                last_used_at TIMESTAMP NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"CREATE INDEX IF NOT EXISTS idx_{DB_TABLE_CREDENTIALS}_user_id ON {DB_TABLE_CREDENTIALS}(user_id)"#
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user(&self, name: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(&format!(
            r#"SELECT id, name, display_name, created_at FROM {DB_TABLE_USERS} WHERE name = ?"#
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Vec<u8> = row.try_get("id")?;
        let credentials = self.load_credentials(&id).await?;

        Ok(Some(User {
            id,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            credentials,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        }))
    }

    async fn put_user(&self, user: User) -> Result<User, StorageError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {DB_TABLE_USERS} (id, name, display_name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#
        ))
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.display_name)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        self.get_user(&user.name)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("user {}", user.name)))
    }

    async fn add_credential(&self, user_id: &[u8], credential: Credential) -> Result<(), StorageError> {
        let user_exists = sqlx::query(&format!(r#"SELECT 1 FROM {DB_TABLE_USERS} WHERE id = ?"#))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if !user_exists {
            return Err(StorageError::NotFound("user".to_string()));
        }

        let public_key = credential
            .public_key
            .to_cose_bytes()
            .map_err(|e| StorageError::Storage(e.to_string()))?;
        let transports = serde_json::to_string(&credential.transports)?;

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {DB_TABLE_CREDENTIALS}
            (credential_id, user_id, public_key, sign_count, transports, aaguid, attestation_format, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        ))
        .bind(credential.credential_id.as_bytes())
        .bind(user_id)
        .bind(public_key)
        .bind(i64::from(credential.sign_count))
        .bind(transports)
        .bind(&credential.aaguid)
        .bind(&credential.attestation_format)
        .bind(credential.created_at)
        .bind(credential.last_used_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                StorageError::DuplicateCredential(credential.credential_id.to_base64url()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn credential_exists(&self, credential_id: &CredentialId) -> Result<bool, StorageError> {
        let row = sqlx::query(&format!(
            r#"SELECT 1 FROM {DB_TABLE_CREDENTIALS} WHERE credential_id = ?"#
        ))
        .bind(credential_id.as_bytes())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn update_counter(
        &self,
        user_id: &[u8],
        credential_id: &CredentialId,
        previous: u32,
        new: u32,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {DB_TABLE_CREDENTIALS}
            SET sign_count = ?, last_used_at = ?
            WHERE credential_id = ? AND user_id = ? AND sign_count = ?
            "#
        ))
        .bind(i64::from(new))
        .bind(Utc::now())
        .bind(credential_id.as_bytes())
        .bind(user_id)
        .bind(i64::from(previous))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteCredentialStore {
        let store = SqliteCredentialStore::connect("sqlite::memory:").await.unwrap();
        store.init().await.unwrap();
        store
    }

    fn credential(id: &[u8], sign_count: u32) -> Credential {
        Credential {
            credential_id: CredentialId::new(id.to_vec()),
            public_key: CredentialPublicKey::Es256 {
                x: vec![1; 32],
                y: vec![2; 32],
            },
            sign_count,
            transports: vec!["usb".to_string(), "nfc".to_string()],
            aaguid: "abababab-abab-abab-abab-abababababab".to_string(),
            attestation_format: "packed".to_string(),
            created_at: Utc::now(),
            last_used_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = store().await;
        assert!(store.init().await.is_ok());
    }

    #[tokio::test]
    async fn test_user_round_trip() {
        let store = store().await;
        let user = User::new("alice@example.com", "alice").unwrap();
        let stored = store.put_user(user.clone()).await.unwrap();
        assert_eq!(stored.id, user.id);

        // Existing user wins
        let again = store
            .put_user(User::new("alice@example.com", "other").unwrap())
            .await
            .unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(again.display_name, "alice");

        assert!(store.get_user("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credentials_persist_with_key_and_order() {
        let store = store().await;
        let user = store.put_user(User::new("alice", "alice").unwrap()).await.unwrap();

        store.add_credential(&user.id, credential(b"first", 0)).await.unwrap();
        store.add_credential(&user.id, credential(b"second", 3)).await.unwrap();

        let user = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(user.credentials.len(), 2);
        assert_eq!(user.credentials[0].credential_id.as_bytes(), b"first");
        assert_eq!(user.credentials[1].sign_count, 3);
        assert_eq!(user.credentials[1].transports, vec!["usb", "nfc"]);
        assert_eq!(
            user.credentials[1].public_key,
            CredentialPublicKey::Es256 {
                x: vec![1; 32],
                y: vec![2; 32]
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_credential_across_users() {
        let store = store().await;
        let alice = store.put_user(User::new("alice", "alice").unwrap()).await.unwrap();
        let bob = store.put_user(User::new("bob", "bob").unwrap()).await.unwrap();

        store.add_credential(&alice.id, credential(b"dup", 0)).await.unwrap();
        let err = store.add_credential(&bob.id, credential(b"dup", 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateCredential(_)));
        assert!(
            store
                .credential_exists(&CredentialId::new(b"dup".to_vec()))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_add_credential_unknown_user() {
        let store = store().await;
        let err = store.add_credential(&[7; 32], credential(b"c", 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_counter_compare_and_set() {
        let store = store().await;
        let user = store.put_user(User::new("alice", "alice").unwrap()).await.unwrap();
        let id = CredentialId::new(b"c".to_vec());
        store.add_credential(&user.id, credential(b"c", 5)).await.unwrap();

        assert!(!store.update_counter(&user.id, &id, 4, 10).await.unwrap());
        assert!(store.update_counter(&user.id, &id, 5, 6).await.unwrap());
        assert!(!store.update_counter(&user.id, &id, 5, 7).await.unwrap());
        // Wrong owner never matches
        assert!(!store.update_counter(&[0; 32], &id, 6, 7).await.unwrap());

        let user = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(user.credentials[0].sign_count, 6);
    }
}

//! One-shot migration: re-encrypts connection rows still carrying legacy
//! plaintext token material into the versioned AES-GCM format.

use anyhow::{Context, Result, anyhow};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use social_connect::{
    config::ConfigLoader,
    crypto::{CryptoKey, connection_aad, encrypt_bytes, is_encrypted_payload},
    db,
    models::connection,
    platforms::Platform,
};

#[tokio::main]
async fn main() -> Result<()> {
    let loader = ConfigLoader::new();
    let config = loader.load().context("loading configuration")?;

    let key_bytes = config
        .crypto_key
        .clone()
        .context("crypto key not present in configuration")?;
    let crypto_key = CryptoKey::new(key_bytes).context("initializing crypto key")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    let connections = connection::Entity::find()
        .all(&db)
        .await
        .context("querying connections")?;

    let mut updated_count = 0usize;

    for conn in connections {
        let connection_id = conn.id;
        let platform: Platform = conn
            .platform
            .parse()
            .with_context(|| format!("connection {} has an unknown platform", connection_id))?;
        let aad = connection_aad(conn.user_id, platform);

        let mut new_access_cipher = None;
        if let Some(access) = conn.access_token_ciphertext.as_ref()
            && !access.is_empty()
            && !is_encrypted_payload(access)
        {
            let ciphertext = encrypt_bytes(&crypto_key, aad.as_bytes(), access).map_err(|err| {
                anyhow!(
                    "failed to encrypt access token for {}: {}",
                    connection_id,
                    err
                )
            })?;
            new_access_cipher = Some(ciphertext);
        }

        let mut new_refresh_cipher = None;
        if let Some(refresh) = conn.refresh_token_ciphertext.as_ref()
            && !refresh.is_empty()
            && !is_encrypted_payload(refresh)
        {
            let ciphertext =
                encrypt_bytes(&crypto_key, aad.as_bytes(), refresh).map_err(|err| {
                    anyhow!(
                        "failed to encrypt refresh token for {}: {}",
                        connection_id,
                        err
                    )
                })?;
            new_refresh_cipher = Some(ciphertext);
        }

        if new_access_cipher.is_none() && new_refresh_cipher.is_none() {
            continue;
        }

        // updated_at stays untouched: it doubles as the token issue time and
        // re-encryption does not issue new tokens.
        let mut active: connection::ActiveModel = conn.into();
        if let Some(cipher) = new_access_cipher {
            active.access_token_ciphertext = Set(Some(cipher));
        }
        if let Some(cipher) = new_refresh_cipher {
            active.refresh_token_ciphertext = Set(Some(cipher));
        }

        active
            .update(&db)
            .await
            .with_context(|| format!("updating connection {}", connection_id))?;
        updated_count += 1;
    }

    println!(
        "Re-encrypted {} connection(s) containing legacy plaintext tokens.",
        updated_count
    );

    Ok(())
}

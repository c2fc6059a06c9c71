use std::env;
use std::sync::Arc;

use anyhow::Result;
use codelink::{
    Contact, ConsumeRequest, MagicLinkBuilder, PasswordlessConfig, PasswordlessEngine, RocksStore,
    DEFAULT_TENANT,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Walks one full login round: issue a code, consume it as OTP, then do the
/// same again over the magic-link path for the now-existing user.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let email = env::args().nth(1).unwrap_or_else(|| "demo@example.com".into());
    let db_path = env::var("CODELINK_DB_PATH").unwrap_or_else(|_| "codelinkdb".into());

    let store = Arc::new(RocksStore::new(&db_path)?);
    let engine = PasswordlessEngine::new(store, PasswordlessConfig::from_env());

    let contact = Contact::parse_email(&email)?;

    println!("📨 Issuing one-time code for {email}");
    let created = engine.create_code(DEFAULT_TENANT, &contact, None).await?;
    println!("   device {} / code {}", created.device_id, created.user_input_code);

    let outcome = engine
        .consume_code(
            DEFAULT_TENANT,
            ConsumeRequest::UserInputCode {
                device_id: created.device_id,
                pre_auth_session_id: created.pre_auth_session_id,
                user_input_code: created.user_input_code,
            },
        )
        .await?;
    println!("🔑 OTP consumption: {}", serde_json::to_string_pretty(&outcome)?);

    let url = engine.create_magic_link(DEFAULT_TENANT, &contact).await?;
    println!("🔗 Magic link: {url}");

    let link = MagicLinkBuilder::parse(&url)?;
    let outcome = engine
        .consume_code(
            &link.tenant_id,
            ConsumeRequest::LinkCode {
                pre_auth_session_id: link.pre_auth_session_id,
                link_code: link.link_code,
            },
        )
        .await?;
    println!("🔑 Link consumption: {}", serde_json::to_string_pretty(&outcome)?);

    let swept = engine.gc_expired_codes(DEFAULT_TENANT).await?;
    println!("🧹 Swept {swept} dead devices");

    Ok(())
}

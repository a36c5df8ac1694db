//! CLI handlers for the callback receiver, token, status, and logout commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::auth::{BrowserLauncher, CallbackReceiver, ServeOutcome, TokenManager};
use crate::context::AppContext;
use crate::error::{RelayError, Result};

use super::{CallbackArgs, TokenKind};

/// Handle `tokenrelay callback`.
pub async fn handle_callback(ctx: &AppContext, args: &CallbackArgs) -> Result<()> {
    let lifetime = args
        .lifetime_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.polling_policy().ceiling);
    let server = CallbackReceiver::new(ctx)
        .bind(ctx.config.callback_addr()?)
        .await?;
    println!("👂 Listening on http://{}", server.local_addr()?);

    match server.serve(lifetime).await? {
        ServeOutcome::CodeAccepted => {
            println!("✅ Authorization code received");
            Ok(())
        }
        ServeOutcome::Expired => Err(RelayError::Timeout(lifetime.as_millis() as u64)),
    }
}

/// Handle `tokenrelay token [app|user|all]`.
pub async fn handle_token(
    ctx: &AppContext,
    browser: Arc<dyn BrowserLauncher>,
    kind: TokenKind,
) -> Result<()> {
    let manager = TokenManager::new(ctx, browser)?;

    if matches!(kind, TokenKind::App | TokenKind::All) {
        let token = manager.app_token().await?;
        println!(
            "✅ App token valid until {}",
            token.expires_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if matches!(kind, TokenKind::User | TokenKind::All) {
        if ctx.state.user_token()?.is_none() {
            println!(
                "⏳ Waiting for authorization (run `tokenrelay callback` if no receiver is up)..."
            );
        }
        let token = manager.user_token().await?;
        println!(
            "✅ User token valid until {}",
            token.expires_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Handle `tokenrelay status`.
pub fn handle_status(ctx: &AppContext) -> Result<()> {
    let now = Utc::now();
    println!("🔐 Stored state in {}\n", ctx.config.resolved_state_dir().display());

    match ctx.state.client_credentials() {
        Ok(Some(credentials)) => println!("  Client: ✅ {}", credentials.id),
        Ok(None) => println!("  Client: ❌ Not stored"),
        Err(e) => println!("  Client: ⚠️  Error: {e}"),
    }

    match ctx.state.app_token() {
        Ok(Some(token)) if token.expires_at > now => println!(
            "  App token: ✅ Valid (expires {})",
            token.expires_at.format("%Y-%m-%d %H:%M")
        ),
        Ok(Some(_)) => println!("  App token: ⚠️  Expired"),
        Ok(None) => println!("  App token: ❌ None"),
        Err(e) => println!("  App token: ⚠️  Error: {e}"),
    }

    match ctx.state.user_token() {
        Ok(Some(token)) => {
            let validity = if token.is_expired_at(now) {
                "⚠️  Expired".to_string()
            } else {
                format!("✅ Valid (expires {})", token.expires_at.format("%Y-%m-%d %H:%M"))
            };
            let refresh = if token.refresh_token.is_some() {
                "refreshable"
            } else {
                "no refresh token"
            };
            println!("  User token: {validity}, {refresh}");
        }
        Ok(None) => println!("  User token: ❌ None"),
        Err(e) => println!("  User token: ⚠️  Error: {e}"),
    }

    let pending = ctx.state.pending_code().ok().flatten().is_some();
    match ctx.state.session() {
        Ok(Some(_)) if pending => {
            println!("  Authorization: 📨 Code received, waiting for exchange")
        }
        Ok(Some(session)) => println!(
            "  Authorization: ⏳ In progress since {}",
            session.created_at.format("%H:%M:%S")
        ),
        Ok(None) => println!("  Authorization: idle"),
        Err(e) => println!("  Authorization: ⚠️  Error: {e}"),
    }

    Ok(())
}

/// Handle `tokenrelay logout`.
pub fn handle_logout(ctx: &AppContext, all: bool) -> Result<()> {
    ctx.state.clear_app_token()?;
    ctx.state.clear_user_token()?;
    ctx.state.clear_session()?;
    if all {
        ctx.state.clear_client_credentials()?;
    }
    tracing::info!(all, "cleared stored state");
    println!("✅ Logged out");
    Ok(())
}

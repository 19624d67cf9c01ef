//! `chatbridge ask`: one chat turn from the command line.

use chatbridge_config::AppConfig;
use chatbridge_core::message::SessionId;
use chatbridge_gateway::chat::ChatResponse;

pub async fn run(
    message: String,
    session: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_credentials() {
        eprintln!();
        eprintln!("  ERROR: No client credentials configured!");
        eprintln!();
        eprintln!("  Set these environment variables:");
        eprintln!("    CHATBRIDGE_CLIENT_ID=...");
        eprintln!("    CHATBRIDGE_CLIENT_SECRET=...");
        eprintln!();
        eprintln!("  Or add an [auth] section to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No client credentials found. See above for setup instructions.".into());
    }

    let session_id = match session.as_deref() {
        Some(raw) => SessionId::parse(raw).ok_or_else(|| format!("Not a valid session id: {raw}"))?,
        None => SessionId::new(),
    };

    let service = chatbridge_gateway::build_service(&config)?;
    let reply = service.chat(&session_id, &message).await?;

    if json {
        let response = ChatResponse::from(reply);
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", reply.text);
        eprintln!();
        eprintln!("   session: {}", reply.session_id);
        if let Some(total) = reply.usage.total_tokens {
            eprintln!(
                "   tokens:  {total} ({} cached)",
                reply.usage.precached_prompt_tokens
            );
        }
    }

    Ok(())
}

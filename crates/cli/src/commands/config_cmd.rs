//! `chatbridge config`: show what the process would run with.

use chatbridge_config::AppConfig;

pub fn run(default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Config error: {e}"))?;

    println!("Configuration ({})", AppConfig::config_dir().join("config.toml").display());
    println!("   API base:     {}", config.api_base);
    println!("   OAuth base:   {}", config.oauth_base);
    println!("   Model:        {}", config.model);
    println!(
        "   Credentials:  {}",
        if config.has_credentials() { "set" } else { "missing" }
    );
    println!(
        "   CA bundle:    {}",
        config
            .ca_bundle
            .as_ref()
            .map_or("system roots".to_string(), |p| p.display().to_string())
    );
    println!(
        "   Attachment:   {}",
        config
            .attachment
            .active_file()
            .map_or("none".to_string(), |p| p.display().to_string())
    );
    println!(
        "   History:      {} ({})",
        config.history.backend,
        config.history.dir().display()
    );
    println!(
        "   Timeouts:     token {}s, upload {}s, completion {}s",
        config.timeouts.token_secs, config.timeouts.upload_secs, config.timeouts.completion_secs
    );
    println!(
        "   System prompt: {} chars",
        config.resolve_system_prompt().chars().count()
    );

    Ok(())
}

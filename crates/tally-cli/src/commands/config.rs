use serde::Serialize;
use tally_core::config::SyncSettings;
use tally_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::commands::common::print_json;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            batch_size,
            sync_interval_secs,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            api_base_url,
            batch_size,
            sync_interval_secs,
            no_activate,
        ),
        ConfigCommands::Show { json } => run_config_show(global_profile, json),
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn run_config_init(
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    batch_size: Option<usize>,
    sync_interval_secs: Option<u64>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    profile.sync = apply_init_options(
        profile.sync.clone(),
        api_base_url,
        batch_size,
        sync_interval_secs,
    )?;

    if !no_activate || config.active_profile.is_none() {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!("Saved profile '{profile_name}' to {}", path.display());
    if config.active_profile.as_deref() == Some(profile_name.as_str()) {
        println!("Active profile: {profile_name}");
    }
    Ok(())
}

/// Merge explicit flags into existing settings and validate the result.
pub fn apply_init_options(
    mut settings: SyncSettings,
    api_base_url: Option<String>,
    batch_size: Option<usize>,
    sync_interval_secs: Option<u64>,
) -> Result<SyncSettings, CliError> {
    if let Some(url) = normalize_text_option(api_base_url) {
        settings.api_base_url = Some(url);
    }
    if let Some(batch_size) = batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(secs) = sync_interval_secs {
        settings.sync_interval_secs = secs;
    }

    settings.validate().map_err(CliError::Config)?;
    settings.api_base_url = settings.api_base_url();
    Ok(settings)
}

#[derive(Debug, Serialize)]
struct ConfigView<'a> {
    profile: &'a str,
    active_profile: Option<&'a str>,
    settings: &'a SyncSettings,
    api_token_set: bool,
}

fn run_config_show(global_profile: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let settings = config.effective_settings(&profile_name);
    let api_token_set = normalize_text_option(std::env::var("TALLY_API_TOKEN").ok()).is_some();

    if as_json {
        return print_json(&ConfigView {
            profile: &profile_name,
            active_profile: config.active_profile.as_deref(),
            settings: &settings,
            api_token_set,
        });
    }

    println!("Profile:        {profile_name}");
    println!(
        "API base URL:   {}",
        settings.api_base_url().as_deref().unwrap_or("(not set)")
    );
    println!("Batch size:     {}", settings.batch_size);
    println!("Sync interval:  {}s", settings.sync_interval_secs);
    println!("Retry attempts: {}", settings.max_retry_attempts);
    println!(
        "API token:      {}",
        if api_token_set { "set" } else { "not set" }
    );
    Ok(())
}

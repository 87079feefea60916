//! Usage: `composer-hub` command line (clap derive) dispatching into `commands/*`.

use crate::app::{app_state::AppState, logging};
use crate::commands;
use crate::domain::luis::LuisPublishRequest;
use crate::domain::provision::ProvisionRequest;
use crate::infra::{app_paths, config};
use crate::shared::error::AppResult;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "composer-hub", version, about = "Auth, provisioning and LUIS publishing helpers for bot projects")]
pub struct Cli {
    /// Config file (defaults to `composer-hub.toml` in the data dir)
    #[arg(long, global = true, env = config::CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Data directory (defaults to `~/.composer-hub`)
    #[arg(long, global = true, env = app_paths::DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Debug logging unless `COMPOSER_HUB_LOG` is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an access token for a resource or a set of scopes
    Token {
        #[arg(long)]
        resource: Option<String>,
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
    /// Clear cached tokens and end the session
    Logout,
    /// Start provisioning a publish target and poll until it finishes
    Provision {
        #[arg(long)]
        project: String,
        #[arg(long = "type")]
        target_type: String,
        /// JSON file with the provisioning config (must contain `name`)
        #[arg(long)]
        config_file: PathBuf,
        #[arg(long, env = "COMPOSER_ARM_TOKEN", hide_env_values = true)]
        arm_token: String,
        #[arg(long, env = "COMPOSER_GRAPH_TOKEN", hide_env_values = true)]
        graph_token: String,
    },
    /// List publish targets saved for a project
    Targets {
        #[arg(long)]
        project: String,
    },
    /// Assign the prediction resource to every LUIS app of a bot
    LuisPublish {
        #[arg(long)]
        bot_dir: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        environment: String,
        #[arg(long)]
        authoring_region: String,
        #[arg(long, env = "LUIS_AUTHORING_KEY", hide_env_values = true)]
        authoring_key: String,
        #[arg(long, env = "AZURE_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
        #[arg(long)]
        luis_resource: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Serve the embedded-host `/api/auth/*` routes
    HostServe {
        #[arg(long, default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
        #[arg(long, env = config::CSRF_TOKEN_ENV, hide_env_values = true)]
        csrf_token: Option<String>,
    },
}

fn load_config(cli: &Cli) -> AppResult<(config::AppConfig, PathBuf)> {
    let explicit = cli
        .config
        .clone()
        .or_else(|| cli.data_dir.as_ref().map(|d| d.join(config::CONFIG_FILE_NAME)));
    let mut loaded = config::load(explicit.as_deref())?;
    if let Some(dir) = cli.data_dir.as_ref() {
        loaded.storage.data_dir = Some(dir.clone());
    }
    let data_dir = loaded.data_dir()?;
    Ok((loaded, data_dir))
}

fn read_json_file(path: &Path) -> AppResult<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("SYSTEM_ERROR: failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("SEC_INVALID_INPUT: {} is not valid json: {e}", path.display()).into())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("SYSTEM_ERROR: failed to render output: {e}"))?;
    println!("{text}");
    Ok(())
}

async fn dispatch(state: &AppState, command: Command) -> Result<ExitCode, String> {
    match command {
        Command::Token { resource, scopes } => {
            let options = serde_json::json!({ "targetResource": resource, "scopes": scopes });
            let token = commands::auth::auth_get_access_token(state, options).await;
            if token.is_empty() {
                eprintln!("no access token could be obtained; see logs for details");
                return Ok(ExitCode::FAILURE);
            }
            println!("{token}");
        }
        Command::Logout => {
            commands::auth::auth_log_out(state).await;
        }
        Command::Provision {
            project,
            target_type,
            config_file,
            arm_token,
            graph_token,
        } => {
            let request = ProvisionRequest {
                project_id: project,
                target_type,
                config: read_json_file(&config_file)?,
                arm_token,
                graph_token,
            };
            let summary = commands::provision::provision_and_wait(state, request).await?;
            let succeeded = summary.outcome == "succeeded";
            print_json(&summary)?;
            if !succeeded {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Targets { project } => {
            let targets = commands::provision::publish_targets_list(state, project).await?;
            print_json(&targets)?;
        }
        Command::LuisPublish {
            bot_dir,
            name,
            environment,
            authoring_region,
            authoring_key,
            access_token,
            luis_resource,
            endpoint,
        } => {
            let request = LuisPublishRequest {
                bot_dir,
                name,
                environment,
                authoring_region,
                authoring_key,
                access_token,
                luis_resource,
                endpoint,
            };
            let published = commands::luis::luis_publish(state, request).await?;
            print_json(&published)?;
        }
        Command::HostServe { bind, csrf_token } => {
            let csrf_token = csrf_token.unwrap_or_else(|| state.config.auth.csrf_token.clone());
            commands::host::host_serve(state, bind, csrf_token).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let (app_config, data_dir) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init(&data_dir, cli.verbose);

    if let Err(err) = config::validate(&app_config) {
        tracing::error!("invalid configuration: {err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let state = match AppState::init(app_config, data_dir).await {
            Ok(state) => state,
            Err(err) => {
                tracing::error!("startup failed: {err}");
                return ExitCode::FAILURE;
            }
        };
        match dispatch(&state, cli.command).await {
            Ok(code) => code,
            Err(err) => {
                tracing::error!("{err}");
                ExitCode::FAILURE
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_token_scopes() {
        let cli = Cli::try_parse_from([
            "composer-hub",
            "token",
            "--scope",
            "a",
            "--scope",
            "b",
        ])
        .expect("parse");
        match cli.command {
            Command::Token { resource, scopes } => {
                assert_eq!(resource, None);
                assert_eq!(scopes, vec!["a", "b"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

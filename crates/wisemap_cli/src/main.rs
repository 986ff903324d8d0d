//! Command-line front end for the WiseMap document store.
//!
//! # Responsibility
//! - Drive the allow-listed command channel from a terminal.
//! - Keep output deterministic: JSON for listings, plain ids and paths otherwise.

use clap::{Parser, Subcommand};
use log::error;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Handle;
use wisemap_core::channel::allow_list::{
    COMMAND_CREATE, COMMAND_DELETE, COMMAND_EXPORT, COMMAND_GET_STORAGE_LOCATION, COMMAND_LIST,
    COMMAND_LOAD, COMMAND_OPEN_EXTERNAL, COMMAND_SAVE,
};
use wisemap_core::{
    init_logging, CommandChannel, DirectoryHost, MapId, MapPersistence, MapStore, SaveOptions,
    StorageConfig,
};

#[derive(Parser, Debug)]
#[command(name = "wisemap")]
#[command(about = "Manage locally stored WiseMapping mindmaps", long_about = None)]
struct Cli {
    /// Storage root (defaults to WISEMAP_STORAGE_DIR, then ~/Documents/WiseMapping)
    #[arg(long, global = true)]
    storage_dir: Option<String>,
    /// JSON storage config (root, atomic_writes, export_roots, list_concurrency);
    /// --storage-dir overrides its root
    #[arg(long, global = true, env = "WISEMAP_CONFIG")]
    config: Option<PathBuf>,
    /// Directory exports are written into
    #[arg(long, global = true, default_value = ".")]
    export_dir: PathBuf,
    /// Absolute directory for rolling log files; logging is off when omitted
    #[arg(long, global = true, env = "WISEMAP_LOG_DIR")]
    log_dir: Option<String>,
    /// Log level: trace|debug|info|warn|error
    #[arg(long, global = true, env = "WISEMAP_LOG_LEVEL", default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print core linkage info
    Ping,
    /// List stored mindmaps as JSON, newest first
    List,
    /// Create a mindmap and print its id
    Create { title: String },
    /// Print the stored content of one mindmap
    Show { id: String },
    /// Replace the content of one mindmap with a file's content
    Save {
        id: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Rename the central topic of one mindmap
    Retitle { id: String, title: String },
    /// Delete one mindmap
    Delete { id: String },
    /// Copy one mindmap into the export directory
    Export {
        id: String,
        /// Suggested file name without extension
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the storage root
    Location,
    /// Validate and record an http(s) or mailto link; the headless host launches nothing
    Open { url: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(log_dir) = cli.log_dir.as_deref() {
        if let Err(err) = init_logging(&cli.log_level, log_dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_command module=cli status=error error={}", message);
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if let Commands::Ping = cli.command {
        println!("wisemap_core ping={}", wisemap_core::ping());
        println!("wisemap_core version={}", wisemap_core::core_version());
        return Ok(());
    }

    let config = load_config(cli.storage_dir.as_deref(), cli.config.as_deref())?;
    let store = Arc::new(MapStore::new(config));
    let host = Arc::new(DirectoryHost::new(cli.export_dir));
    let channel = Arc::new(CommandChannel::new(store, host));

    match cli.command {
        Commands::Ping => {}
        Commands::List => {
            let listed = invoke(&channel, COMMAND_LIST, vec![]).await?;
            let rendered =
                serde_json::to_string_pretty(&listed).map_err(|err| err.to_string())?;
            println!("{rendered}");
        }
        Commands::Create { title } => {
            let id = invoke(&channel, COMMAND_CREATE, vec![json!(title)]).await?;
            println!("{}", id.as_str().unwrap_or_default());
        }
        Commands::Show { id } => {
            let content = invoke(&channel, COMMAND_LOAD, vec![json!(id)]).await?;
            println!("{}", content.as_str().unwrap_or_default());
        }
        Commands::Save { id, file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|err| format!("failed to read `{}`: {err}", file.display()))?;
            invoke(&channel, COMMAND_SAVE, vec![json!(id), json!(content)]).await?;
        }
        Commands::Retitle { id, title } => {
            let id = id
                .parse::<MapId>()
                .map_err(|_| format!("`{id}` is not a mindmap id"))?;
            let persistence = MapPersistence::unlocked(channel, Handle::current());
            let mut document = persistence
                .load_document(id)
                .await
                .map_err(|err| err.to_string())?;
            let Some(central) = document.central_topic_mut() else {
                return Err(format!("mindmap {id} has no central topic"));
            };
            central.set_attribute("text", title);
            let outcome = persistence
                .save_document(id, &document, SaveOptions::default())
                .await
                .map_err(|err| err.to_string())?;
            persistence.unlock(id);
            println!("{}", outcome.title);
        }
        Commands::Delete { id } => {
            invoke(&channel, COMMAND_DELETE, vec![json!(id)]).await?;
        }
        Commands::Export { id, name } => {
            let exported = invoke(&channel, COMMAND_EXPORT, vec![json!(id), json!(name)]).await?;
            if exported != Value::Bool(true) {
                return Err("export cancelled".to_string());
            }
        }
        Commands::Location => {
            let location = invoke(&channel, COMMAND_GET_STORAGE_LOCATION, vec![]).await?;
            println!("{}", location.as_str().unwrap_or_default());
        }
        Commands::Open { url } => {
            invoke(&channel, COMMAND_OPEN_EXTERNAL, vec![json!(url)]).await?;
        }
    }
    Ok(())
}

fn load_config(storage_dir: Option<&str>, config: Option<&Path>) -> Result<StorageConfig, String> {
    let raw = match config {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .map_err(|err| format!("failed to read config `{}`: {err}", path.display()))?,
        ),
        None => None,
    };
    StorageConfig::resolve_with_overrides(storage_dir, raw.as_deref()).map_err(|err| err.to_string())
}

async fn invoke(channel: &CommandChannel, command: &str, args: Vec<Value>) -> Result<Value, String> {
    channel
        .invoke(command, args)
        .await
        .map_err(|err| format!("{} ({})", err, err.kind()))
}

#[cfg(test)]
mod tests {
    use super::{load_config, Cli, Commands};
    use clap::{CommandFactory, Parser};
    use std::path::PathBuf;

    #[test]
    fn config_file_knobs_reach_the_store_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wisemap.json");
        std::fs::write(
            &path,
            r#"{"root":"/from/file","atomic_writes":false,"export_roots":["/exports"]}"#,
        )
        .unwrap();

        let config = load_config(Some("/from/flag"), Some(&path)).unwrap();
        assert_eq!(config.root, PathBuf::from("/from/flag"));
        assert!(!config.atomic_writes);
        assert_eq!(config.export_roots, vec![PathBuf::from("/exports")]);

        let config = load_config(None, Some(&path)).unwrap();
        assert_eq!(config.root, PathBuf::from("/from/file"));
    }

    #[test]
    fn unreadable_config_file_is_reported() {
        let err = load_config(Some("/x"), Some(PathBuf::from("/no/such/wisemap.json").as_path()))
            .unwrap_err();
        assert!(err.contains("failed to read config"));
    }

    #[test]
    fn config_flag_parses_globally() {
        let cli = Cli::try_parse_from(["wisemap", "list", "--config", "/etc/wisemap.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/wisemap.json")));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn open_help_says_nothing_is_launched() {
        let command = Cli::command();
        let open = command.find_subcommand("open").unwrap();
        let about = open.get_about().unwrap().to_string();
        assert!(about.contains("launches nothing"), "{about}");
    }
}

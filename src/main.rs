//! # TouchCode
//!
//! Command-line shell over the project store, session and preview
//! composer.
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a project and add files to it
//! touchcode create "My Site"
//! touchcode add-file <project-id> index --type html
//!
//! # Write the composed preview to a file
//! touchcode preview <project-id> --out preview.html
//!
//! # Use the remote backend for one run
//! touchcode --remote --user <user-id> list
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use touchcode_core::config::Backend;
use touchcode_core::templates::TEXT_TAG;
use touchcode_core::{Config, ProjectId, ProjectStore, RenderSurface, Session};
use touchcode_store::{configured_identity, open_store};

/// TouchCode - project storage and live preview for web code
#[derive(Parser, Debug)]
#[command(name = "touchcode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Use the remote backend regardless of config
    #[arg(long, global = true)]
    remote: bool,

    /// Signed-in user for the remote backend
    #[arg(short, long, value_name = "USER_ID", global = true)]
    user: Option<String>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List projects, most recently modified first
    List,

    /// Create an empty project
    Create {
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Add a file from its language template
    AddFile {
        project: String,

        /// File name; `.<type>` is appended when it has no extension
        name: String,

        #[arg(short = 't', long = "type", default_value = TEXT_TAG)]
        file_type: String,
    },

    /// Delete a project
    Delete { id: String },

    /// Export a project as JSON
    Export {
        id: String,

        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Import a project exported as JSON
    Import { path: PathBuf },

    /// Compose the preview document for a project
    Preview {
        id: String,

        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Follow changes to a project until interrupted
    Watch {
        id: String,

        /// Rewrite this preview file on every change
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    tracing::info!("Starting TouchCode v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let store = open_store(&config, configured_identity(&config))
        .map_err(|e| anyhow::anyhow!("Cannot open project store: {}", e))?;
    let mut session = Session::with_config(store, &config);

    run(&mut session, args.command).await
}

/// Reads the config file and applies command-line overrides.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Cannot read config {}", path.display()))?,
        None => Config::load(),
    };

    if args.remote {
        config.storage.backend = Backend::Remote;
    }
    if let Some(user) = &args.user {
        config.remote.user_id = Some(user.clone());
    }
    Ok(config)
}

async fn run(session: &mut Session<dyn ProjectStore>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List => {
            for meta in session.list_projects().await? {
                println!(
                    "{}  {}  ({} files, modified {})",
                    meta.id,
                    meta.name,
                    meta.file_count,
                    meta.last_modified.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Command::Create { name, description } => {
            let id = session.create_project(&name, description.as_deref()).await?;
            println!("{id}");
        }

        Command::AddFile {
            project,
            name,
            file_type,
        } => {
            session.open_project(&ProjectId::from(project)).await?;
            let id = session.create_file(&name, &file_type).await?;
            if let Some(file) = session.state().active_file() {
                println!("{}  {}", id, file.name);
            }
        }

        Command::Delete { id } => {
            session.delete_project(&ProjectId::from(id)).await?;
        }

        Command::Export { id, out } => {
            session.open_project(&ProjectId::from(id)).await?;
            let text = session.export_current()?;
            match out {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("Cannot write {}", path.display()))?,
                None => println!("{text}"),
            }
        }

        Command::Import { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let meta = session.import_project(&text).await?;
            println!("{}  {}", meta.id, meta.name);
        }

        Command::Preview { id, out } => {
            session.open_project(&ProjectId::from(id)).await?;
            let mut surface = DocumentSink::new(out);
            session.refresh_preview(&mut surface);
            surface.finish()?;
            if session.preview().current().is_empty() {
                tracing::warn!("Nothing to preview: add an .html or .md file");
            }
        }

        Command::Watch { id, out } => {
            session.open_project(&ProjectId::from(id)).await?;
            let mut surface = DocumentSink::new(out);
            session.refresh_preview(&mut surface);
            surface.finish()?;
            watch(session, &mut surface).await?;
        }
    }
    Ok(())
}

/// Reloads the open project on every change notice until Ctrl-C.
async fn watch(
    session: &mut Session<dyn ProjectStore>,
    surface: &mut DocumentSink,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            fired = session.wait_for_change() => {
                if !fired {
                    anyhow::bail!("Change feed closed");
                }
                if session.reload().await? {
                    if let Some(project) = session.state().project() {
                        eprintln!("Reloaded {} ({} files)", project.name, project.files.len());
                    }
                    session.refresh_preview(surface);
                    surface.finish()?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopped watching");
                return Ok(());
            }
        }
    }
}

/// Render surface that writes the document to a file, or to stdout.
struct DocumentSink {
    path: Option<PathBuf>,
    error: Option<std::io::Error>,
}

impl DocumentSink {
    fn new(path: Option<PathBuf>) -> Self {
        Self { path, error: None }
    }

    /// Reports the first write failure since the last call.
    fn finish(&mut self) -> anyhow::Result<()> {
        match self.error.take() {
            Some(err) => Err(err).context("Cannot write preview"),
            None => Ok(()),
        }
    }

    fn write(&mut self, path: &Path, document: &str) {
        if let Err(err) = std::fs::write(path, document) {
            self.error.get_or_insert(err);
        }
    }
}

impl RenderSurface for DocumentSink {
    fn clear(&mut self) {
        if let Some(path) = self.path.clone() {
            self.write(&path, "");
        }
    }

    fn render(&mut self, document: &str) {
        match self.path.clone() {
            Some(path) => self.write(&path, document),
            None => println!("{document}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["touchcode", "list"]);
        assert!(args.config.is_none());
        assert!(!args.remote);
        assert!(matches!(args.command, Command::List));
    }

    #[test]
    fn test_add_file_defaults_to_text() {
        let args = Args::parse_from(["touchcode", "add-file", "p1", "notes"]);
        match args.command {
            Command::AddFile { file_type, .. } => assert_eq!(file_type, "txt"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["touchcode", "list", "--remote", "--user", "alice", "-vv"]);
        assert!(args.remote);
        assert_eq!(args.user.as_deref(), Some("alice"));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_overrides_applied_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[remote]\nurl = \"https://example.test\"\n").unwrap();

        let args = Args::parse_from([
            "touchcode",
            "--config",
            path.to_str().unwrap(),
            "--remote",
            "--user",
            "alice",
            "list",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.storage.backend, Backend::Remote);
        assert_eq!(config.remote.user_id.as_deref(), Some("alice"));
        assert_eq!(config.remote.url, "https://example.test");
    }

    #[test]
    fn test_document_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.html");
        let mut sink = DocumentSink::new(Some(path.clone()));

        sink.clear();
        sink.render("<p>hi</p>");
        sink.finish().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>hi</p>");
    }

    #[test]
    fn test_document_sink_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DocumentSink::new(Some(dir.path().join("missing/preview.html")));

        sink.render("<p>hi</p>");
        assert!(sink.finish().is_err());
        assert!(sink.finish().is_ok());
    }
}

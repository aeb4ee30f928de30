use crate::config::Config;
use crate::evaluator::Evaluator;
use crate::extract::Extractor;
use crate::utils::{ExtractError, Logger, Result, Timer};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "static-css-extract")]
#[command(about = "Build-time constant folding for css tagged template literals")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract css from the configured entry modules
    Build {
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Output directory (overrides the config file)
        #[arg(short, long)]
        outdir: Option<String>,
        /// Entry modules, relative to the root (overrides the config file)
        #[arg(short, long)]
        entry: Vec<String>,
    },
    /// Show tool information
    Info,
}

pub struct CliHandler;

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        Logger::init();

        let cli = Cli::parse();

        match cli.command {
            Commands::Build {
                root,
                outdir,
                entry,
            } => self.handle_build_command(&root, outdir, entry).await,
            Commands::Info => self.handle_info_command().await,
        }
    }

    async fn handle_build_command(
        &self,
        root: &str,
        outdir: Option<String>,
        entries: Vec<String>,
    ) -> Result<()> {
        let mut config = Config::load(root)?;
        if let Some(outdir) = outdir {
            config.outdir = PathBuf::from(outdir);
        }
        if !entries.is_empty() {
            config.entry_points = entries;
        }
        let outdir = if config.outdir.is_absolute() {
            config.outdir.clone()
        } else {
            config.root.join(&config.outdir)
        };

        Logger::build_start(
            &config.root.display().to_string(),
            &outdir.display().to_string(),
        );
        let timer = Timer::start("extraction build");

        let evaluator = Arc::new(Evaluator::new(&config.tag_module));
        let extractor = Extractor::new(evaluator);

        tokio::fs::create_dir_all(&outdir).await?;
        let mut module_count = 0usize;
        let mut block_count = 0usize;
        for entry in &config.entry_points {
            let id = tokio::fs::canonicalize(config.root.join(entry)).await?;
            let code = tokio::fs::read_to_string(&id).await?;
            let file_name = id
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    ExtractError::config(format!("entry `{}` has no file name", entry))
                })?;
            match extractor.extract(&code, &id).await? {
                Some(output) => {
                    module_count += 1;
                    block_count += output.blocks;
                    tokio::fs::write(outdir.join(&file_name), &output.code).await?;
                    if !output.css.is_empty() {
                        let css_name = format!("{}.virtual.css", file_name);
                        tokio::fs::write(outdir.join(css_name), &output.css).await?;
                    }
                }
                None => {
                    tokio::fs::write(outdir.join(&file_name), &code).await?;
                }
            }
        }

        let stylesheet = extractor.stylesheet();
        tokio::fs::write(outdir.join(&config.stylesheet_name), &stylesheet).await?;

        Logger::build_complete(
            module_count,
            block_count,
            stylesheet.len(),
            timer.elapsed(),
            &outdir.display().to_string(),
        );
        Ok(())
    }

    async fn handle_info_command(&self) -> Result<()> {
        tracing::info!("🎨 static-css-extract v{}", env!("CARGO_PKG_VERSION"));
        tracing::info!("═══════════════════════════════════════");
        tracing::info!("Folds `css` tagged template literals to class names at build time");
        tracing::info!("");
        tracing::info!("  • Modules are evaluated once per build pass, concurrently");
        tracing::info!("  • Nested blocks marked with `&` are flattened to top-level rules");
        tracing::info!("  • Class names are derived from a hash of the block's CSS text");
        Ok(())
    }
}

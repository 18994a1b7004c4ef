use clap::{Parser, Subcommand};
use kiln::{config, output, pipeline, plugins, registry::RendererRegistry};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Static site generator driven by per-file renderer chains")]
#[command(long_about = "\
Static site generator driven by per-file renderer chains

Every file's extensions pick the renderers it runs through, in order, and
its output name. All files advance one renderer per pass, so listing pages
render only after every post they list has been read and collated.

Site structure:

  site/
  ├── config.toml                  # Optional, see 'kiln gen-config'
  ├── source/
  │   ├── _layouts/page.html       # Layouts, never written themselves
  │   ├── _partials/nav.html       # Partials, {% include \"nav.html\" %}
  │   ├── _themes/clean/           # Theme layouts, partials and assets
  │   ├── about.tex                # Textile → about.html
  │   ├── blog/post1.md            # Markdown → blog/post1.html
  │   ├── blog.tem.html            # Template → blog.html
  │   └── logo.png                 # Copied as is
  └── output/

Files start with an optional header block ending in a '###' line:

  title: First post
  tags: rust, web
  ###
  Body text.")]
#[command(version)]
struct Cli {
    /// Site directory, containing config.toml
    #[arg(long, default_value = ".", global = true)]
    dir: PathBuf,

    /// Show debug diagnostics (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render the site into the output folder
    Build {
        /// Remove the output folder first
        #[arg(long)]
        clean: bool,
    },
    /// Classify every file and show its renderer chain without rendering
    Check,
    /// List the enabled renderers with their extensions and links
    Renderers,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", error_chain(&*err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Build { clean } => {
            println!("==> Building {}", cli.dir.display());
            let site = pipeline::prepare(&cli.dir)?;
            init_thread_pool(&site.set.config.processing);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_build_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::build(site, &pipeline::BuildOptions { clean }, Some(tx));
            // The sender is dropped with the scheduler, which ends the printer.
            if printer.join().is_err() {
                tracing::warn!("progress printer panicked");
            }
            output::print_build_summary(&result?);
        }
        Command::Check => {
            println!("==> Checking {}", cli.dir.display());
            let report = pipeline::check(&cli.dir)?;
            output::print_check_output(&report);
        }
        Command::Renderers => {
            let registry = enabled_renderers(&cli.dir)?;
            output::print_renderers(&registry.describe());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }
    Ok(())
}

/// The registry a build in `dir` would use, initialised.
fn enabled_renderers(dir: &Path) -> Result<RendererRegistry, Box<dyn Error>> {
    let config = config::load_config(dir)?;
    let mut registry = RendererRegistry::new();
    plugins::register_builtins(&mut registry, &config.plugins)?;
    registry.init(&config)?;
    Ok(registry)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "kiln=debug" } else { "kiln=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// `outer: inner: innermost`, following `source()`.
fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

mod script;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use pdfedit_core::{
    DirectoryDownloads, DisplayState, EditorCommand, EditorConfig, EditorEvent,
    EditorStore, MemoryBlobRegistry, PdfEditor, UploadedFile,
};
use pdfedit_render::PdfiumRenderer;
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::script::{load_script, parse_action, run_action, Action};

#[derive(Debug, Parser)]
#[command(name = "pdfedit", version, about = "Page-level PDF editing from the command line")]
struct Args {
    /// Config file to use instead of the one in the platform config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Load the files (merging when several) and print the display state
    Info {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Merge the files in order and save the result
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory the merged document is written to
        #[arg(short = 'o', long = "output", default_value = ".")]
        output: PathBuf,
    },
    /// Replay edit actions on the loaded document, then save it
    Edit {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Action to apply, e.g. "rotate 1 90" (repeatable, runs after --script)
        #[arg(short = 'e', long = "action")]
        actions: Vec<String>,

        /// File with one action per line
        #[arg(long)]
        script: Option<PathBuf>,

        /// Directory saved and exported documents are written to
        #[arg(short = 'o', long = "output", default_value = ".")]
        output: PathBuf,
    },
    /// Render one page to a PNG file
    Render {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Page to render (1-based)
        #[arg(short = 'p', long = "page", default_value_t = 1)]
        page: usize,

        /// Zoom factor, clamped to the configured zoom range
        #[arg(long, default_value_t = 1.0)]
        scale: f32,

        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("org", "pdfedit", "pdfedit");
    let _log_guard = init_logging(project_dirs.as_ref());

    let config_path = args.config.clone().or_else(|| {
        project_dirs
            .as_ref()
            .map(|dirs| dirs.config_dir().join("config.toml"))
    });
    let config = match config_path {
        Some(path) => EditorConfig::load(&path)?,
        None => EditorConfig::default(),
    };

    match args.command {
        Cmd::Info { files, json } => {
            let store = open_store(&files, config, Path::new(".")).await?;
            print_info(&store, json)?;
        }
        Cmd::Merge { files, output } => {
            let mut store = open_store(&files, config, &output).await?;
            store.save_pdf();
            ensure_ok(&store)?;
            report_downloads(&store, &output);
        }
        Cmd::Edit {
            files,
            actions,
            script,
            output,
        } => {
            let mut steps = match script {
                Some(path) => load_script(&path)?,
                None => Vec::new(),
            };
            for raw in &actions {
                if let Some(action) =
                    parse_action(raw).with_context(|| format!("invalid action {raw:?}"))?
                {
                    steps.push(action);
                }
            }

            let mut store = open_store(&files, config, &output).await?;
            let saved_last = matches!(steps.last(), Some(Action::Save));
            for step in steps {
                let label = format!("{step:?}");
                run_action(&mut store, step)
                    .await
                    .with_context(|| format!("failed to run {label}"))?;
                ensure_ok(&store)?;
            }
            if !saved_last {
                store.save_pdf();
                ensure_ok(&store)?;
            }
            report_downloads(&store, &output);
        }
        Cmd::Render {
            files,
            page,
            scale,
            output,
        } => {
            let mut store = open_store(&files, config, Path::new(".")).await?;
            store.apply(EditorCommand::GoToPage { page });
            store.apply(EditorCommand::SetZoom { zoom: scale });
            if store.state().current_page != page {
                bail!(
                    "page {} out of range (document has {} pages)",
                    page,
                    store.state().total_pages
                );
            }

            let renderer = PdfiumRenderer::new()?;
            let rendered = store.render_current_page(&renderer)?;
            let image = image::RgbaImage::from_raw(rendered.width, rendered.height, rendered.pixels)
                .ok_or_else(|| anyhow!("renderer returned a truncated bitmap"))?;
            image
                .save(&output)
                .with_context(|| format!("failed to write {:?}", output))?;
            info!(
                page,
                width = rendered.width,
                height = rendered.height,
                "page rendered"
            );
            println!("{}", output.display());
        }
    }
    Ok(())
}

async fn open_store(files: &[PathBuf], config: EditorConfig, output: &Path) -> Result<EditorStore> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let file = UploadedFile::from_path(path)
            .await
            .with_context(|| format!("failed to open {:?}", path))?;
        uploads.push(file);
    }

    let downloads = DirectoryDownloads::new(output.to_path_buf())?;
    let mut store = EditorStore::new(
        PdfEditor::from_config(&config),
        Arc::new(MemoryBlobRegistry::new()),
        Arc::new(downloads),
        config,
    );
    store.load_multiple_pdfs(uploads).await;
    ensure_ok(&store)?;
    Ok(store)
}

fn ensure_ok(store: &EditorStore) -> Result<()> {
    match &store.state().error {
        Some(message) => Err(anyhow!("{message}")),
        None => Ok(()),
    }
}

fn report_downloads(store: &EditorStore, output: &Path) {
    for event in store.events().lock().iter() {
        if let EditorEvent::Downloaded { filename, size } = event {
            info!(filename = %filename, size, "document written");
            println!("{}", output.join(filename).display());
        }
    }
}

#[derive(Debug, Serialize)]
struct PageReport {
    number: usize,
    width: f32,
    height: f32,
    rotation: i64,
}

#[derive(Debug, Serialize)]
struct InfoReport<'a> {
    state: &'a DisplayState,
    pages: Vec<PageReport>,
}

fn print_info(store: &EditorStore, json: bool) -> Result<()> {
    let editor = store.editor();
    let mut pages = Vec::with_capacity(editor.page_count());
    for index in 0..editor.page_count() {
        let (width, height) = editor.page_size(index)?;
        pages.push(PageReport {
            number: index + 1,
            width,
            height,
            rotation: editor.page_rotation(index)?,
        });
    }
    let report = InfoReport {
        state: store.state(),
        pages,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(file) = &report.state.pdf_file {
        println!("file: {} ({} bytes)", file.name, file.size);
    }
    println!("pages: {}", report.state.total_pages);
    println!("current page: {}", report.state.current_page);
    println!("zoom: {:.1}", report.state.zoom);
    for page in &report.pages {
        println!(
            "  {:>3}: {:.2} x {:.2} pt, rotated {}",
            page.number, page.width, page.height, page.rotation
        );
    }
    Ok(())
}

/// Installs the console subscriber, plus a file layer in the platform data
/// directory when one is available.
fn init_logging(project_dirs: Option<&ProjectDirs>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_target = project_dirs.and_then(|dirs| {
        let log_dir = dirs.data_local_dir().join("logs");
        fs::create_dir_all(&log_dir).ok().map(|_| log_dir)
    });

    match file_target {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::never(log_dir, "pdfedit.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer);
            let installed = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
            if let Err(err) = installed {
                eprintln!("failed to install logging: {err}");
            }
            Some(guard)
        }
        None => {
            let installed = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
            if let Err(err) = installed {
                eprintln!("failed to install logging: {err}");
            }
            warn!("no data directory available, logging to the console only");
            None
        }
    }
}

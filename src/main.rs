use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use hrview::controller::Controller;
use hrview::model::{Model, Status};
use hrview::ui::TableUI;
use hrview::{FileSource, GridConfig, GridError, PageSize};

/// Page through HR record tables (csv, parquet, arrow) in the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Table file to show, `~` and environment variables are expanded
    path: String,

    /// Column holding the unique record id (default: row number)
    #[arg(short, long)]
    id_column: Option<String>,

    /// Rows per page, one of 10, 25, 50, 100
    #[arg(short = 'n', long, default_value_t = 10)]
    page_size: usize,

    /// Sort column for the first load, prefix with `-` for descending
    #[arg(short, long, allow_hyphen_values = true)]
    sort: Option<String>,

    #[arg(long, default_value_t = 24)]
    max_column_width: usize,

    /// Terminal event poll timeout in milliseconds
    #[arg(long, default_value_t = 100)]
    event_poll_time: u64,

    /// Write logs to this file, filtered by `HRVIEW_LOG` (default: info)
    #[arg(long)]
    log_file: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Err(e) => {
            ratatui::restore();
            error!("Exiting with error: {e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => {
            ratatui::restore();
            ExitCode::SUCCESS
        }
    }
}

fn expand_path(path: &str) -> Result<PathBuf, GridError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| GridError::PathExpansion(e.to_string()))
}

// The terminal belongs to the ui, so logs only go to a file when asked for.
fn init_logging(log_file: Option<&Path>) -> Result<(), GridError> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_env("HRVIEW_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_names(true),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: Args) -> Result<(), GridError> {
    let log_file = args.log_file.as_deref().map(expand_path).transpose()?;
    init_logging(log_file.as_deref())?;

    let mut config = GridConfig::default()
        .with_page_size(PageSize::try_from(args.page_size)?)
        .with_max_column_width(args.max_column_width)
        .with_event_poll_time(args.event_poll_time);
    if let Some(sort) = args.sort {
        config = config.with_initial_sort(sort);
    }

    let source = FileSource::new(expand_path(&args.path)?, args.id_column);
    source.check()?;
    info!("Starting hrview on {}", source.path().display());

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&config, source, size.width as usize);
    let mut ui = TableUI::new();
    let controller = Controller::new(&config);

    model.reload()?;
    while model.status != Status::QUITTING {
        model.tick();

        // Render the current view
        terminal.draw(|f| ui.draw(model.get_uidata(), f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(&model)? {
            model.update(message)?;
        };
    }

    Ok(())
}

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use row_events::InputFormat;
use tabler::{Session, TableShaper, TablerError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tabler")]
#[command(about = "Infer table layouts from event records or write records as rows")]
struct Cli {
    /// Listen for records on this TCP address instead of reading stdin.
    #[arg(short = 'l', long = "listen", value_name = "ADDR")]
    listen: Option<String>,

    /// Input format: json, heka or heka-stream.
    #[arg(long, default_value_t = InputFormat::Json)]
    format: InputFormat,

    /// Print inferred table definitions instead of writing rows.
    #[arg(long)]
    generate_tables: bool,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,

    /// Table definitions document.
    #[arg(value_name = "TABLES_JSON", required_unless_present = "generate_tables")]
    tables_json: Option<PathBuf>,

    /// Store to write into, e.g. sqlite:///tmp/rows.db or postgres://host/db.
    #[arg(value_name = "DSN", required_unless_present = "generate_tables")]
    dsn: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), TablerError> {
    let mut session = Session::default();
    session.init(cli.listen.as_deref(), cli.format).await?;

    let result = if cli.generate_tables {
        generate(&mut session).await
    } else {
        match (cli.tables_json, cli.dsn) {
            (Some(tables_json), Some(dsn)) => write(&mut session, tables_json, dsn).await,
            // clap enforces both positionals outside generate mode.
            _ => Ok(()),
        }
    };

    let closed = session.close().await;
    result.and(closed)
}

async fn generate(session: &mut Session) -> Result<(), TablerError> {
    let mut shaper = TableShaper::new();
    tokio::select! {
        result = session.generate_tables(&mut shaper) => {
            result?;
        }
        () = shutdown_signal() => {
            warn!("interrupted, emitting tables inferred so far");
        }
    }

    let exported = shaper.export()?;
    let mut stdout = std::io::stdout().lock();
    if let Err(err) = stdout.write_all(&exported).and_then(|()| writeln!(stdout)) {
        error!(error = %err, "failed to write table definitions");
    }
    Ok(())
}

async fn write(
    session: &mut Session,
    tables_json: PathBuf,
    dsn: String,
) -> Result<(), TablerError> {
    tokio::select! {
        result = session.write_rows(&tables_json, &dsn) => {
            result?;
        }
        () = shutdown_signal() => {
            info!("interrupted, closing store");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

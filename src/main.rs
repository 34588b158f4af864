use anyhow::{Context, Result};
use chrono::Utc;
use clap::CommandFactory;
use std::io;
use std::process::ExitCode;

use tokio::runtime::Builder;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use ldapper::catalog::{builtin_catalog, CatalogTree};
use ldapper::cli::{parse_args, Cli, LinePrompter};
use ldapper::directory::LdapDirectory;
use ldapper::dns::{derive_base_dn, DnsResolver};
use ldapper::error::CatalogError;
use ldapper::output::OutputSink;
use ldapper::search::{Notice, PagedSearchDriver, Projection, RecordSink, SearchQuery};
use ldapper::validation::is_catalog_address;

/// Invalid selection, underivable base DN or unusable arguments
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    // Warnings (STARTTLS fallback, loop guard) are shown unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let catalog = builtin_catalog(Utc::now()).context("Built-in catalog is inconsistent")?;
    let cli = parse_args(&catalog);

    let (filter, projection) = match select_query(&catalog, &cli) {
        Ok(selected) => selected,
        Err(CatalogError::NotFound(address)) => {
            let _ = Cli::command().after_help(catalog.render_help()).print_help();
            eprintln!(
                "\nError: You attempted to select a canned search option that is not valid: {}\n",
                address
            );
            return Ok(ExitCode::from(EXIT_USAGE));
        }
        Err(e) => {
            eprintln!("\nError: {}\n", e);
            return Ok(ExitCode::from(EXIT_USAGE));
        }
    };

    // The search session is strictly sequential, one thread is enough
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async_main(cli, filter, projection))
}

/// Picks the filter and projection from a canned search or the raw argument
///
/// Attributes given on the command line win. Otherwise a canned search's
/// own projection is used when it names more than one attribute.
fn select_query(catalog: &CatalogTree, cli: &Cli) -> Result<(String, Projection), CatalogError> {
    if !is_catalog_address(&cli.search) {
        return Ok((cli.search.clone(), Projection::new(&cli.attributes)));
    }

    let resolved = catalog.resolve(&cli.search, &cli.advanced, &mut LinePrompter::stdio())?;
    debug!("Canned search {} resolved to {}", cli.search, resolved.filter);

    let projection = if !cli.attributes.is_empty() {
        Projection::new(&cli.attributes)
    } else if resolved.projection.len() > 1 {
        Projection::new(&resolved.projection)
    } else {
        Projection::default()
    };

    Ok((resolved.filter, projection))
}

async fn async_main(cli: Cli, filter: String, projection: Projection) -> Result<ExitCode> {
    let mut sink = OutputSink::new(cli.format, io::stdout().lock(), io::stderr());

    let base = if cli.basedn.is_empty() {
        let first_server = cli.servers().into_iter().next().unwrap_or_default();
        let resolver = DnsResolver::new()?;

        match derive_base_dn(&resolver, &first_server).await {
            Some(base) => {
                info!("Derived base DN {} from {}", base, first_server);
                base
            }
            None => {
                eprintln!(
                    "\nError: You failed to provide a Base DN and we were unable to derive it from the server name. Perhaps you don't have working rDNS?\n"
                );
                return Ok(ExitCode::from(EXIT_USAGE));
            }
        }
    } else {
        cli.basedn.clone()
    };

    let directory = match LdapDirectory::connect(&cli.connect_options()).await {
        Ok(directory) => directory,
        Err(e) => {
            sink.notice(&Notice::SessionError(e.to_string()));
            return Ok(ExitCode::FAILURE);
        }
    };

    let query = SearchQuery {
        base,
        filter,
        projection,
    };
    let driver = PagedSearchDriver::new(cli.search_options());
    let outcome = driver.run(directory, &query, &mut sink).await;
    sink.finish().context("Failed to flush output")?;

    match outcome {
        Ok(summary) => {
            debug!("Session summary: {:?}", summary);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            sink.notice(&Notice::SessionError(e.to_string()));
            Ok(ExitCode::FAILURE)
        }
    }
}

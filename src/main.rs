//! Binary entry point for the `stratuslab` CLI.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use stratuslab_libcloud::catalog::{self, Catalogs};
use stratuslab_libcloud::{
    ConfigError, DriverOptions, HttpCatalogFetcher, Marketplace, MarketplaceError, UserConfig,
};

mod cli;

use cli::{Cli, Command, ImagesCommand};

const RULER: &str = "==========";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("marketplace error: {0}")]
    Marketplace(#[from] MarketplaceError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(&cli, &mut io::stdout().lock()) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn dispatch(cli: &Cli, out: &mut impl Write) -> Result<(), CliError> {
    let options = resolve_options(cli)?;
    let path = options.user_config_path();
    debug!(%path, "reading user configuration");
    let user_config = UserConfig::load(&path)?;
    let Catalogs { locations, sizes } = Catalogs::from_user_config(
        &user_config,
        catalog::default_instance_types(),
        options.default_location_override(),
    )?;

    match &cli.command {
        Command::Locations => print_entries(
            out,
            cli.json,
            locations
                .iter()
                .map(|location| (location.id.clone(), location.name.clone(), location)),
        ),
        Command::Sizes => print_entries(
            out,
            cli.json,
            sizes
                .iter()
                .map(|size| (size.id.clone(), size.name.clone(), size)),
        ),
        Command::Images(args) => {
            let location = locations.default_location();
            let config = user_config.backend_config(Some(&location.id));
            let images = Marketplace::new(catalog_fetcher(args)?).images(&config)?;
            let shown = select_last(&images, args);
            print_entries(
                out,
                cli.json,
                shown
                    .iter()
                    .map(|image| (image.id.clone(), image.name.clone(), image)),
            )
        }
    }
}

fn resolve_options(cli: &Cli) -> Result<DriverOptions, CliError> {
    let loaded = DriverOptions::load_without_cli_args()?;
    let user_config = cli.config.clone().unwrap_or(loaded.user_config);
    let default_location = cli.location.clone().or(loaded.default_location);
    Ok(DriverOptions::new(user_config).with_default_location(default_location))
}

fn catalog_fetcher(args: &ImagesCommand) -> Result<HttpCatalogFetcher, CliError> {
    let Some(seconds) = args.timeout else {
        return Ok(HttpCatalogFetcher::default());
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(seconds))
        .build()?;
    Ok(HttpCatalogFetcher::with_client(client))
}

fn select_last<'a, T>(items: &'a [T], args: &ImagesCommand) -> &'a [T] {
    let count = args.last.unwrap_or(items.len()).min(items.len());
    items
        .get(items.len().saturating_sub(count)..)
        .unwrap_or(items)
}

fn print_entries<'a, T, I>(out: &mut impl Write, json: bool, entries: I) -> Result<(), CliError>
where
    T: Serialize + 'a,
    I: Iterator<Item = (String, String, &'a T)>,
{
    if json {
        let values: Vec<&T> = entries.map(|(_, _, value)| value).collect();
        serde_json::to_writer_pretty(&mut *out, &values)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "{RULER}")?;
    for (id, name, _) in entries {
        writeln!(out, "{id} -- {name}")?;
    }
    writeln!(out, "{RULER}")?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use stratuslab_libcloud::Location;

    fn render<T: Serialize>(json: bool, entries: &[(&str, &str, T)]) -> String {
        let mut buffer = Vec::new();
        print_entries(
            &mut buffer,
            json,
            entries
                .iter()
                .map(|(id, name, value)| ((*id).to_owned(), (*name).to_owned(), value)),
        )
        .expect("writing to a buffer succeeds");
        String::from_utf8(buffer).expect("output is UTF-8")
    }

    #[test]
    fn listing_is_framed_by_rulers() {
        let output = render(
            false,
            &[
                ("siteA", "Site A", Location::new("siteA", "Site A", "fr")),
                ("siteB", "siteB", Location::new("siteB", "siteB", "unknown")),
            ],
        );
        assert_eq!(
            output,
            "==========\nsiteA -- Site A\nsiteB -- siteB\n==========\n"
        );
    }

    #[test]
    fn json_listing_serialises_values() {
        let output = render(
            true,
            &[("siteA", "Site A", Location::new("siteA", "Site A", "fr"))],
        );
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("valid JSON");
        assert_eq!(parsed[0]["country"], "fr");
    }

    #[rstest]
    #[case(None, &[1, 2, 3, 4])]
    #[case(Some(2), &[3, 4])]
    #[case(Some(10), &[1, 2, 3, 4])]
    #[case(Some(0), &[])]
    fn select_last_keeps_the_tail(#[case] last: Option<usize>, #[case] expected: &[u32]) {
        let items = [1, 2, 3, 4];
        let args = ImagesCommand {
            last,
            timeout: None,
        };
        assert_eq!(select_last(&items, &args), expected);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(5))]
    fn catalog_fetcher_accepts_a_timeout(#[case] timeout: Option<u64>) {
        let args = ImagesCommand {
            last: None,
            timeout,
        };
        assert!(catalog_fetcher(&args).is_ok());
    }

    #[test]
    fn timeout_flag_is_parsed() {
        let cli = Cli::try_parse_from(["stratuslab", "images", "--timeout", "7", "--last", "2"])
            .expect("arguments parse");
        let Command::Images(ref args) = cli.command else {
            panic!("expected images command");
        };
        assert_eq!(args.timeout, Some(7));
        assert_eq!(args.last, Some(2));
    }

    #[test]
    fn write_error_prints_message() {
        let mut buffer = Vec::new();
        write_error(
            &mut buffer,
            &CliError::Config(ConfigError::MissingDefaultSection),
        );
        assert_eq!(
            String::from_utf8(buffer).expect("utf8"),
            "configuration error: configuration file must have [default] section\n"
        );
    }
}

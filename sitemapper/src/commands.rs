use crate::CLAP_STYLING;
use clap::{arg, command};

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitemapper")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitemapper")
        .about("Generate XML sitemaps from relational data and validate published sitemap trees")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress non-essential output").required(false).global(true))
        .arg(
            arg!(-v --"verbose" "Enable debug logging (overridden by RUST_LOG)")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(--"catalog" <PATH>)
                .required(false)
                .global(true)
                .help("Location of the sitemap catalog database")
                .env("SITEMAPPER_CATALOG")
                .default_value("data/sitemap_builder.db"),
        )
        .arg(
            arg!(--"output-dir" <PATH>)
                .required(false)
                .global(true)
                .help("Root directory for locally stored sitemap files")
                .env("SITEMAPPER_OUTPUT_DIR")
                .default_value("sitemaps"),
        )
        .arg(
            arg!(--"results-dir" <PATH>)
                .required(false)
                .global(true)
                .help("Directory holding validation result logs")
                .env("SITEMAPPER_RESULTS_DIR")
                .default_value("data/validations"),
        )
        .subcommand_required(true)
        .subcommand(
            command!("init")
                .about("Creates the sitemap catalog database")
                .arg(
                    arg!(-f --"force")
                        .help("Deletes any existing catalog at the configured location first")
                        .required(false),
                ),
        )
        .subcommand(
            command!("generate")
                .about("Generates sitemap files for one index or for every index in the catalog")
                .arg(
                    arg!(-i --"index" <ID>)
                        .required(false)
                        .help("The sitemap index to generate")
                        .value_parser(clap::value_parser!(i64))
                        .conflicts_with("all"),
                )
                .arg(
                    arg!(-a --"all")
                        .required(false)
                        .help("Generate every sitemap index")
                        .action(clap::ArgAction::SetTrue)
                        .conflicts_with("index"),
                )
                .group(
                    clap::ArgGroup::new("target")
                        .args(["index", "all"])
                        .required(true),
                ),
        )
        .subcommand(
            command!("validate")
                .about("Crawls a sitemap index or URL set and checks every listed URL")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The root sitemap URL"),
                ),
        )
        .subcommand(
            command!("results")
                .about("Prints the result log of a validation job")
                .arg(
                    arg!(-j --"job" <JOB_ID>)
                        .required(true)
                        .help("The validation job id, e.g. validation_1709632800000"),
                ),
        )
        .subcommand(
            command!("serve")
                .about("Serves the generation and validation HTTP API")
                .arg(
                    arg!(-b --"bind" <ADDR>)
                        .required(false)
                        .help("Address to listen on")
                        .env("SITEMAPPER_BIND")
                        .value_parser(clap::value_parser!(std::net::SocketAddr))
                        .default_value("127.0.0.1:3000"),
                ),
        )
}

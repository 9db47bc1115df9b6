use crate::CLAP_STYLING;
use clap::{ArgAction, arg, command};

/// Default discovery limit for command-line crawls.
pub const DEFAULT_LIMIT: usize = 200;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitedig")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitedig")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug, -vvv trace)")
                .required(false)
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl a site from its base URL and report every same-origin resource \
                reachable from it.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("Base URL of the site; http:// is assumed when no scheme is given"),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async workers in the worker pool.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("16"),
                )
                .arg(
                    arg!(-l --"limit" <COUNT>)
                        .required(false)
                        .help("Stop discovering once this many resources are recorded (0 = unbounded)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("200"),
                )
                .arg(
                    arg!(--"keep-duplicates")
                        .required(false)
                        .help("Record every URL even when its content matches an earlier one")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"store-body")
                        .required(false)
                        .help("Keep response bodies in the results")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"store-headers")
                        .required(false)
                        .help("Keep response headers in the results")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(-k --"insecure")
                        .required(false)
                        .help("Skip TLS certificate verification")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"max-body-size" <BYTES>)
                        .required(false)
                        .help("Truncate response bodies to this many bytes")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5242880"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"user-agent" <USER_AGENT>)
                        .required(false)
                        .help("User-Agent header sent with every request"),
                )
                .arg(
                    arg!(--"accept" <CONTENT_TYPE>)
                        .required(false)
                        .help("Content type to process; repeat to build the list (replaces the defaults)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"ignore-status" <CODE>)
                        .required(false)
                        .help("HTTP status to skip; repeat to build the list (replaces 403 and 404)")
                        .value_parser(clap::value_parser!(u16))
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"ignore-marker" <MARKER>)
                        .required(false)
                        .help("Skip links containing this text; repeat to build the list (replaces the defaults)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: print to stdout)"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, csv")
                        .value_parser(["text", "json", "csv"])
                        .default_value("text"),
                ),
        )
}

use crate::CLAP_STYLING;
use clap::{arg, command};

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("rankcrawl")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("rankcrawl")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Log every fetch and crawler state change")
                .required(false)
                .conflicts_with("quiet"),
        )
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl outward from a URL for a fixed amount of time, then rank the pages \
                found with PageRank.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to start crawling from (http:// is assumed if omitted)"),
                )
                .arg(
                    arg!(-d --"duration" <SECONDS>)
                        .required(false)
                        .help("Total crawl time in seconds. Fetches already in flight are allowed to finish.")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async worker 'threads' in the fetch pool.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-page fetch timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"batch-size" <NUM_URLS>)
                        .required(false)
                        .help("Most URLs fetched per batch, at most --threads (default: one per worker)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"same-host")
                        .required(false)
                        .help("Only follow links on the start URL's host and its subdomains")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"damping" <FACTOR>)
                        .required(false)
                        .help("PageRank damping factor, in [0, 1)")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("0.85"),
                )
                .arg(
                    arg!(--"top" <NUM_PAGES>)
                        .required(false)
                        .help("How many top-ranked pages to list in the text report")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("20"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Where to save the ranked graph JSON (default: data/rankcrawl-<timestamp>.json)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report printed to stdout: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_crawl_defaults() {
        let matches = command_argument_builder()
            .try_get_matches_from(["rankcrawl", "crawl", "-u", "example.com"])
            .unwrap();
        let (name, crawl) = matches.subcommand().unwrap();

        assert_eq!(name, "crawl");
        assert_eq!(crawl.get_one::<u64>("duration"), Some(&30));
        assert_eq!(crawl.get_one::<usize>("threads"), Some(&10));
        assert_eq!(crawl.get_one::<f64>("damping"), Some(&0.85));
        assert_eq!(crawl.get_one::<String>("format").map(String::as_str), Some("text"));
        assert!(!crawl.get_flag("same-host"));
        assert_eq!(crawl.get_one::<usize>("batch-size"), None);
    }

    #[test]
    fn test_crawl_requires_url() {
        let result = command_argument_builder().try_get_matches_from(["rankcrawl", "crawl"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = command_argument_builder().try_get_matches_from(["rankcrawl", "-q", "-v"]);
        assert!(result.is_err());
    }
}

use clap::{crate_version, App, Arg};
use log::{error, info};
use ogham::build::{build_site, Options};
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = App::new("ogham")
        .version(crate_version!())
        .about("Prerenders a Markdown blog into static HTML")
        .arg(
            Arg::with_name("SITE_DIR")
                .help("The directory containing _config.yml")
                .default_value("."),
        )
        .arg(
            Arg::with_name("threads")
                .short("j")
                .long("threads")
                .takes_value(true)
                .value_name("N")
                .help("The number of routes to render in parallel (default: one per CPU)"),
        )
        .arg(
            Arg::with_name("theme-dir")
                .long("theme-dir")
                .takes_value(true)
                .value_name("DIR")
                .help("Overrides the theme directory from the config"),
        )
        .arg(
            Arg::with_name("keep-going")
                .short("k")
                .long("keep-going")
                .help("Render every route even after one fails, then report all failures"),
        )
        .get_matches();

    let threads = match matches.value_of("threads").map(str::parse::<usize>) {
        None => None,
        Some(Ok(threads)) => Some(threads),
        Some(Err(e)) => {
            error!("Invalid --threads value: {}", e);
            std::process::exit(2);
        }
    };
    let options = Options {
        threads,
        keep_going: matches.is_present("keep-going"),
        theme_dir: matches.value_of("theme-dir").map(PathBuf::from),
    };
    // `default_value` guarantees SITE_DIR is present
    let site_dir = PathBuf::from(matches.value_of("SITE_DIR").unwrap_or("."));

    match build_site(&site_dir, &options) {
        Ok(report) if report.is_complete() => {
            info!("Built {} routes", report.routes.len());
        }
        Ok(report) => {
            error!(
                "Built {} routes, but {} static item(s) could not be copied",
                report.routes.len(),
                report.asset_errors.len()
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

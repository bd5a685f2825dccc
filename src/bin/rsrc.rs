use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indoc::indoc;
use log::{LevelFilter, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use rsrc::{Arch, ManifestResource, RsrcSettings, validate_icon_file};

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::exit;

const DEFAULT_OUTPUT: &str = "rsrc.syso";

/// Long flags that may also be spelled with a single dash, as in `rsrc -manifest app.manifest`.
const SINGLE_DASH_FLAGS: [&str; 4] = ["manifest", "ico", "arch", "output"];

fn command() -> Command {
    Command::new("rsrc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generates a .syso object embedding a Windows application manifest")
        .long_about(indoc!(r#"
            Generates a COFF object file (.syso) with a .rsrc section holding the given
            application manifest, ready to be linked into a Windows executable.

            Icons are validated but not embedded yet.
        "#))
        .arg(
            Arg::new("manifest")
                .long("manifest")
                .short('m')
                .value_name("FILE")
                .help("Path of the manifest file to embed."),
        )
        .arg(
            Arg::new("ico")
                .long("ico")
                .value_name("FILE")
                .help("Path of an .ico file (validated only)."),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("FILE")
                .default_value(DEFAULT_OUTPUT)
                .help("Name of the output object file."),
        )
        .arg(
            Arg::new("arch")
                .long("arch")
                .value_name("ARCH")
                .default_value("386")
                .value_parser(|s: &str| s.parse::<Arch>())
                .help("Target architecture: 386, amd64, arm or arm64."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("Increase logging verbosity (-v info, -vv debug, -vvv trace)."),
        )
}

/// Rewrites `-manifest FILE` and `-manifest=FILE` style arguments to their `--` form.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            let rewritten = arg.to_str().and_then(|s| {
                let flag = s.strip_prefix('-')?;
                if flag.starts_with('-') {
                    return None;
                }
                let name = flag.split_once('=').map_or(flag, |(name, _)| name);
                SINGLE_DASH_FLAGS
                    .contains(&name)
                    .then(|| OsString::from(format!("-{}", s)))
            });
            rewritten.unwrap_or(arg)
        })
        .collect()
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(e) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn run(matches: &ArgMatches, manifest: PathBuf) -> Result<()> {
    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let arch = matches.get_one::<Arch>("arch").copied().unwrap_or_default();

    let resource = ManifestResource::from_path(&manifest)?
        .with_configuration(RsrcSettings::new().arch(arch));

    if let Some(ico) = matches.get_one::<String>("ico") {
        validate_icon_file(ico).context("Icon embedding is not supported, and validation failed")?;
    }

    let written = resource
        .write_to_path(&output)
        .with_context(|| format!("Failed to write `{}`", output.display()))?;

    info!("{} ({} bytes) done", output.display(), written);
    Ok(())
}

fn main() {
    let mut cmd = command();
    let matches = cmd
        .clone()
        .get_matches_from(normalize_args(std::env::args_os()));

    init_logging(matches.get_count("verbose"));

    let Some(manifest) = matches.get_one::<String>("manifest").map(PathBuf::from) else {
        eprintln!("{}", cmd.render_help());
        exit(1)
    };

    if let Err(e) = run(&matches, manifest) {
        eprintln!("{:#}", e);
        exit(1)
    }
}

use crate::{
    cache::Cache,
    config::{self, AppConfig},
    modinfo,
    pack::Pack,
    reconcile,
    remote::Client,
};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Placement {
    Client,
    Server,
    Both,
}

impl Placement {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(Placement::Client),
            "server" => Some(Placement::Server),
            "both" => Some(Placement::Both),
            _ => None,
        }
    }
}

enum CliCommand {
    Mods,
    Refresh,
    Place { project_id: i64, placement: Placement },
    Remove { project_id: i64 },
    Sync,
    Help,
    Version,
}

pub struct CliOptions {
    folder: Option<PathBuf>,
    ephemeral: bool,
    format: OutputFormat,
    command: CliCommand,
}

pub fn parse_args(args: &[String]) -> Result<CliOptions> {
    let mut folder = None;
    let mut ephemeral = false;
    let mut format = OutputFormat::Text;
    let mut rest = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--folder" | "-f" => {
                let Some(value) = iter.next() else {
                    bail!("--folder requires a path");
                };
                folder = Some(PathBuf::from(value));
            }
            "--ephemeral" => ephemeral = true,
            "--format" => {
                let Some(value) = iter.next() else {
                    bail!("--format requires text or json");
                };
                format = OutputFormat::parse(value)
                    .with_context(|| format!("unknown output format: {value}"))?;
            }
            "--help" | "-h" => {
                return Ok(CliOptions {
                    folder,
                    ephemeral,
                    format,
                    command: CliCommand::Help,
                });
            }
            "--version" | "-V" => {
                return Ok(CliOptions {
                    folder,
                    ephemeral,
                    format,
                    command: CliCommand::Version,
                });
            }
            other => rest.push(other.to_string()),
        }
    }

    let command = match rest.first().map(String::as_str) {
        None | Some("mods") => CliCommand::Mods,
        Some("refresh") => CliCommand::Refresh,
        Some("place") => {
            let (Some(id), Some(placement)) = (rest.get(1), rest.get(2)) else {
                bail!("usage: place <projectID> client|server|both");
            };
            let project_id = id
                .parse()
                .with_context(|| format!("invalid project id: {id}"))?;
            let placement = Placement::parse(placement)
                .with_context(|| format!("invalid placement: {placement}"))?;
            CliCommand::Place {
                project_id,
                placement,
            }
        }
        Some("remove") => {
            let Some(id) = rest.get(1) else {
                bail!("usage: remove <projectID>");
            };
            let project_id = id
                .parse()
                .with_context(|| format!("invalid project id: {id}"))?;
            CliCommand::Remove { project_id }
        }
        Some("sync") => CliCommand::Sync,
        Some(other) => bail!("unknown command: {other} (try --help)"),
    };

    Ok(CliOptions {
        folder,
        ephemeral,
        format,
        command,
    })
}

pub fn run(options: CliOptions) -> Result<()> {
    match options.command {
        CliCommand::Help => {
            print_help();
            return Ok(());
        }
        CliCommand::Version => {
            println!("packsmith {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let app_config = AppConfig::load_or_create()?;
    let store = app_config.store_cache && !options.ephemeral;
    let cache = Cache::load(&config::cache_path()?, store);
    let client = Client::new();

    let folder = options
        .folder
        .clone()
        .or_else(|| cache.last_opened_folder())
        .context("no pack folder given and none remembered; pass --folder <path>")?;
    let mut pack = Pack::load(&folder)?;
    cache.set_last_opened(&pack.folder);

    modinfo::refresh(&mut pack, &client, &cache, app_config.lookup_workers);

    match options.command {
        CliCommand::Mods | CliCommand::Refresh => print_mods(&pack, options.format),
        CliCommand::Place {
            project_id,
            placement,
        } => {
            let Some(info) = pack.mods.get_mut(&project_id) else {
                bail!("project {project_id} is not part of this pack");
            };
            match placement {
                Placement::Client => {
                    info.on_client = true;
                    info.on_server = false;
                }
                Placement::Server => {
                    info.on_client = false;
                    info.on_server = true;
                }
                Placement::Both => {
                    info.on_client = true;
                    info.on_server = true;
                }
            }
            write_back(&mut pack, &client, &cache)?;
            println!("updated placement for {project_id}");
        }
        CliCommand::Remove { project_id } => {
            if pack.mods.remove(&project_id).is_none() {
                bail!("project {project_id} is not part of this pack");
            }
            write_back(&mut pack, &client, &cache)?;
            println!("removed {project_id}");
        }
        CliCommand::Sync => {
            write_back(&mut pack, &client, &cache)?;
            println!("config files rewritten");
        }
        CliCommand::Help | CliCommand::Version => {}
    }

    Ok(())
}

fn write_back(pack: &mut Pack, client: &Client, cache: &Cache) -> Result<()> {
    reconcile::apply(pack, client, cache).context("reconcile mod lists")?;
    pack.save_config_files()?;
    cache.save();
    Ok(())
}

fn print_mods(pack: &Pack, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&pack.mods) {
            Ok(raw) => println!("{raw}"),
            Err(err) => eprintln!("could not serialize mod list: {err}"),
        },
        OutputFormat::Text => {
            for (project_id, info) in &pack.mods {
                if let Some(error) = &info.error {
                    println!("{project_id:>9}  (lookup failed: {error})");
                    continue;
                }
                let placement = match (info.on_client, info.on_server) {
                    (true, true) => "client+server",
                    (true, false) => "client",
                    (false, true) => "server",
                    (false, false) => "unplaced",
                };
                println!(
                    "{project_id:>9}  {:<40}  {placement:<13}  file {}",
                    info.name, info.file_id
                );
            }
            println!("{} mod(s)", pack.mods.len());
        }
    }
}

fn print_help() {
    println!("packsmith - modpack editor");
    println!();
    println!("Usage: packsmith [options] <command>");
    println!();
    println!("Options:");
    println!("  -f, --folder <path>   Pack folder (defaults to the last opened pack)");
    println!("      --ephemeral       Do not read or write the metadata cache snapshot");
    println!("      --format <fmt>    Output format: text or json");
    println!();
    println!("Commands:");
    println!("  mods                  List mods with their placement (default)");
    println!("  refresh               Re-fetch mod metadata and list mods");
    println!("  place <id> <where>    Move a mod to client, server or both");
    println!("  remove <id>           Remove a mod from the pack");
    println!("  sync                  Rewrite both config files from the current mapping");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_listing_mods() {
        let options = parse_args(&[]).expect("parse");
        assert!(matches!(options.command, CliCommand::Mods));
        assert!(options.folder.is_none());
        assert!(!options.ephemeral);
    }

    #[test]
    fn parses_place_command() {
        let options =
            parse_args(&args(&["--folder", "/packs/demo", "place", "42", "server"])).expect("parse");
        assert_eq!(options.folder, Some(PathBuf::from("/packs/demo")));
        let CliCommand::Place {
            project_id,
            placement,
        } = options.command
        else {
            panic!("expected place command");
        };
        assert_eq!(project_id, 42);
        assert!(placement == Placement::Server);
    }

    #[test]
    fn rejects_bad_placement() {
        assert!(parse_args(&args(&["place", "42", "sideways"])).is_err());
        assert!(parse_args(&args(&["place", "forty-two", "server"])).is_err());
    }

    #[test]
    fn rejects_unknown_command_and_format() {
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["--format", "xml", "mods"])).is_err());
    }

    #[test]
    fn ephemeral_and_json_flags_are_recognized() {
        let options =
            parse_args(&args(&["--ephemeral", "--format", "json", "refresh"])).expect("parse");
        assert!(options.ephemeral);
        assert!(options.format == OutputFormat::Json);
        assert!(matches!(options.command, CliCommand::Refresh));
    }
}

//! `zcm` command-line interface: dataset, snapshot and clone lifecycle on top
//! of the system `zfs` tool.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use zcm_core::{
    logging, CloneOptions, CreateOptions, DatasetProvider, DatasetRecord, DestroyOptions,
    DiffOptions, DiffRecord, ListOptions, SetOptions, TypeFilter, ZcmConfig,
};
use zcm_zfs::SystemZfs;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "zcm",
    version,
    about = "Manage ZFS datasets, snapshots and clones."
)]
struct Cli {
    /// Optional configuration file (TOML or YAML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a filesystem.
    Create {
        name: String,

        /// Parent dataset the name is created under.
        #[arg(long)]
        parent: Option<String>,

        #[arg(long)]
        mountpoint: Option<PathBuf>,

        /// Compression algorithm; falls back to defaults.compression.
        #[arg(long)]
        compression: Option<String>,

        /// Create missing ancestors first.
        #[arg(short = 'p', long)]
        recursive: bool,

        /// Value for the management path user property.
        #[arg(long)]
        management_path: Option<PathBuf>,
    },

    /// Clone a snapshot into a new filesystem.
    Clone {
        name: String,

        /// Source snapshot (dataset@label).
        snapshot: String,

        #[arg(long)]
        parent: Option<String>,

        #[arg(long)]
        mountpoint: Option<PathBuf>,
    },

    /// Take a snapshot of a dataset.
    Snapshot {
        dataset: String,

        label: String,

        /// Snapshot every descendant with the same label.
        #[arg(short, long)]
        recursive: bool,
    },

    /// Change properties; one tool call per option given.
    Set {
        name: String,

        #[arg(long, value_parser = parse_on_off)]
        readonly: Option<bool>,

        #[arg(long)]
        mountpoint: Option<PathBuf>,

        #[arg(long)]
        management_path: Option<PathBuf>,
    },

    /// Revert a property to the value inherited from the parent.
    Inherit { name: String, property: String },

    /// Read a single property.
    Get {
        name: String,

        property: String,

        #[arg(long)]
        json: bool,
    },

    /// Destroy a dataset or snapshot.
    Destroy {
        name: String,

        #[arg(short, long)]
        recursive: bool,

        /// Return before space is reclaimed.
        #[arg(long)]
        no_wait: bool,
    },

    /// Promote a clone so it no longer depends on its origin.
    Promote { name: String },

    Rename { old_name: String, new_name: String },

    Mount { name: String },

    Unmount { name: String },

    /// List datasets with selected properties.
    List {
        name: Option<String>,

        #[arg(short = 't', long = "type", value_parser = parse_type_filter)]
        type_filter: Option<TypeFilter>,

        #[arg(short, long)]
        recursive: bool,

        /// Comma separated properties; falls back to defaults.list_properties.
        #[arg(short = 'o', long, value_delimiter = ',')]
        properties: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Exit 0 when the dataset exists, 1 otherwise.
    Exists { name: String },

    /// Show changes since a snapshot.
    Diff {
        name: String,

        /// Snapshot to compare against; defaults to the origin.
        #[arg(long)]
        from: Option<String>,

        /// Include the file type column.
        #[arg(short = 'F', long)]
        file_types: bool,

        #[arg(short, long)]
        recursive: bool,

        #[arg(long)]
        json: bool,
    },

    /// Write a send stream for a snapshot to a file.
    Send {
        snapshot: String,

        #[arg(short, long)]
        output: PathBuf,

        /// Incremental source snapshot.
        #[arg(short = 'i', long)]
        incremental: Option<String>,
    },

    /// Validate a configuration file or emit the config schema.
    Validate {
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,

        /// Output the JSON schema instead of validating a file.
        #[arg(long)]
        schema: bool,
    },
}

/// Entry point: parse arguments and surface errors with an exit code.
fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();

    if let Commands::Validate { file, schema } = &cli.command {
        return validate(file.as_deref(), *schema);
    }

    let config = load_config(cli.config.as_deref())?;
    let zfs = SystemZfs::from_config(&config).context("initialise zfs provider")?;
    debug!("using {}", zfs.binary().display());

    match cli.command {
        Commands::Create {
            name,
            parent,
            mountpoint,
            compression,
            recursive,
            management_path,
        } => {
            let options = CreateOptions {
                parent,
                mountpoint,
                compression: compression.or_else(|| config.defaults.compression.clone()),
                recursive,
                management_path,
            };
            match zfs.create(&name, &options)? {
                Some(created) => println!("{created}"),
                None => println!("{name} is a pool root; nothing created."),
            }
        }
        Commands::Clone {
            name,
            snapshot,
            parent,
            mountpoint,
        } => {
            let options = CloneOptions { parent, mountpoint };
            println!("{}", zfs.clone_snapshot(&name, &snapshot, &options)?);
        }
        Commands::Snapshot {
            dataset,
            label,
            recursive,
        } => {
            println!("{}", zfs.snapshot(&label, &dataset, recursive)?);
        }
        Commands::Set {
            name,
            readonly,
            mountpoint,
            management_path,
        } => {
            let options = SetOptions {
                readonly,
                mountpoint,
                management_path,
            };
            if options.is_empty() {
                bail!("nothing to set; pass --readonly, --mountpoint or --management-path");
            }
            print!("{}", zfs.set(&name, &options)?);
        }
        Commands::Inherit { name, property } => zfs.inherit(&name, &property)?,
        Commands::Get {
            name,
            property,
            json,
        } => {
            let value = zfs.get(&name, &property)?;
            if json {
                println!("{}", to_string_pretty(&value)?);
            } else {
                println!("{value}");
            }
        }
        Commands::Destroy {
            name,
            recursive,
            no_wait,
        } => {
            let options = DestroyOptions {
                recursive,
                synchronous: config.defaults.destroy_synchronous && !no_wait,
            };
            zfs.destroy(&name, &options)?;
        }
        Commands::Promote { name } => zfs.promote(&name)?,
        Commands::Rename { old_name, new_name } => zfs.rename(&old_name, &new_name)?,
        Commands::Mount { name } => zfs.mount(&name)?,
        Commands::Unmount { name } => zfs.unmount(&name)?,
        Commands::List {
            name,
            type_filter,
            recursive,
            properties,
            json,
        } => {
            let properties = if properties.is_empty() {
                config.defaults.list_properties.clone()
            } else {
                properties
            };
            let options = ListOptions {
                name,
                type_filter,
                recursive,
                properties,
            };
            let records = zfs.list(&options);
            if json {
                println!("{}", to_string_pretty(&records)?);
            } else {
                print_table(&options.properties, &records);
            }
        }
        Commands::Exists { name } => {
            if !zfs.exists(&name) {
                std::process::exit(1);
            }
        }
        Commands::Diff {
            name,
            from,
            file_types,
            recursive,
            json,
        } => {
            let options = DiffOptions {
                origin_snapshot: from,
                include_file_types: file_types,
                recursive,
            };
            for record in zfs.diff(&name, &options)? {
                let record = record?;
                if json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    print_diff(&record);
                }
            }
        }
        Commands::Send {
            snapshot,
            output,
            incremental,
        } => {
            let bytes = zfs.send(&snapshot, &output, incremental.as_deref())?;
            println!("Wrote {bytes} bytes to {}.", output.display());
        }
        Commands::Validate { .. } => unreachable!("handled before provider setup"),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ZcmConfig> {
    match path {
        Some(path) => ZcmConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(ZcmConfig::default()),
    }
}

fn validate(file: Option<&Path>, schema: bool) -> Result<()> {
    if schema {
        let schema = schema_for!(ZcmConfig);
        println!("{}", to_string_pretty(&schema)?);
        return Ok(());
    }

    let Some(file) = file else {
        bail!("pass --file to validate or --schema to print the schema");
    };
    let cfg = load_config(Some(file))?;
    let issues = cfg.validate();
    if issues.is_empty() {
        println!("Configuration valid.");
    } else {
        eprintln!("Configuration validation failed:");
        for issue in issues {
            eprintln!("  - {issue}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn parse_on_off(value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(format!("expected on or off, got `{other}`")),
    }
}

fn parse_type_filter(value: &str) -> Result<TypeFilter, String> {
    value.parse().map_err(|err: zcm_core::ZcmError| err.to_string())
}

/// Render records as a left-aligned table, one column per property.
fn print_table(properties: &[String], records: &[DatasetRecord]) {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            properties
                .iter()
                .map(|p| record.get(p).map(ToString::to_string).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = properties
        .iter()
        .enumerate()
        .map(|(i, p)| {
            rows.iter()
                .map(|row| row[i].len())
                .chain(std::iter::once(p.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = properties
        .iter()
        .zip(&widths)
        .map(|(p, w)| format!("{:<w$}", p.to_uppercase(), w = *w))
        .collect();
    println!("{}", header.join("  ").trim_end());
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

fn print_diff(record: &DiffRecord) {
    let file_type = record
        .file_type
        .map(|ft| format!("{ft:?}").to_lowercase())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}\t{:?}\t{}\t{}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.change,
        file_type,
        record.path.display()
    );
}

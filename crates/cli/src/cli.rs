#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "snap")]
#[command(about = "Compile database snapshots into replayable task sequences")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a snapshot into a task sequence
    Compile {
        #[command(flatten)]
        schema: SchemaArg,
        /// Snapshot JSON (`-` for stdin)
        #[arg(long, value_name = "PATH", default_value = "-")]
        snapshot: PathBuf,
        /// Keep the snapshot's row order instead of sorting most-required rows first
        #[arg(long)]
        no_presort: bool,
    },
    /// Replay a task sequence into a database
    Replay {
        #[command(flatten)]
        db: DbArg,
        /// Task sequence JSON (`-` for stdin)
        #[arg(long, value_name = "PATH", default_value = "-")]
        tasks: PathBuf,
        #[arg(long)]
        no_transaction: bool,
    },
    /// Read a snapshot out of a database
    Extract {
        #[command(flatten)]
        schema: SchemaArg,
        #[command(flatten)]
        db: DbArg,
    },
    /// Serialize database rows through recipes
    Serialize {
        #[command(flatten)]
        recipes: RecipesArg,
        #[command(flatten)]
        db: DbArg,
        /// Tables to read; every recipe type when omitted
        #[arg(long = "type", value_name = "TYPE")]
        types: Vec<String>,
    },
    /// Write serialized operations into a database
    Deserialize {
        #[command(flatten)]
        recipes: RecipesArg,
        #[command(flatten)]
        db: DbArg,
        /// Operations JSON (`-` for stdin)
        #[arg(long, value_name = "PATH", default_value = "-")]
        ops: PathBuf,
        #[arg(long)]
        no_transaction: bool,
    },
}

#[derive(Args, Debug)]
pub struct SchemaArg {
    /// Schema JSON
    #[arg(id = "schema", long = "schema", env = "SNAP_SCHEMA", value_name = "PATH")]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct DbArg {
    /// SQLite database file
    #[arg(id = "db", long = "db", env = "SNAP_DB", value_name = "PATH")]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct RecipesArg {
    /// Recipes JSON, keyed by type
    #[arg(id = "recipes", long = "recipes", env = "SNAP_RECIPES", value_name = "PATH")]
    pub path: PathBuf,
}

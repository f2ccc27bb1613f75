use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use crate::search::SearchMode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SessionArgs {
    /// Account whose cloud library is loaded
    #[clap(short, long, default_value = "usr_1")]
    pub user: String,

    /// Access token. Uses Google Photos when given,
    /// a built-in demo library otherwise
    #[clap(long)]
    pub token: Option<String>,

    /// Also ingest images from this folder
    #[clap(short, long)]
    pub folder: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Vector search over local embeddings
    Local,
    /// Keyword expansion through the cloud model
    Cloud,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Local => SearchMode::LocalVector,
            ModeArg::Cloud => SearchMode::CloudExpansion,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the sync daemon and its HTTP API
    Daemon {
        #[command(flatten)]
        session: SessionArgs,

        /// Address to listen on, overrides config
        #[clap(long)]
        listen: Option<String>,
    },

    /// Index the library and run one search
    Search {
        query: String,

        #[clap(short, long, value_enum)]
        mode: Option<ModeArg>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Run the sync state machine until everything selected is synced
    Sync {
        /// Album to sync, can be repeated
        #[clap(short, long)]
        album: Vec<String>,

        /// Sync every album
        #[clap(long, default_value = "false")]
        all: bool,

        /// Give up after this many ticks
        #[clap(long, default_value = "1000")]
        max_ticks: usize,

        /// Don't wait between ticks
        #[clap(long, default_value = "false")]
        fast: bool,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// List the images a folder scan would ingest
    Scan {
        dir: PathBuf,

        #[clap(long, default_value = "50")]
        limit: usize,
    },

    /// Print the embedding of a text
    Embed { text: String },

    /// Print the effective configuration
    Config {},
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI для constant key-value файлов
#[derive(Parser, Debug)]
#[command(name = "cdbkit", version, about = "Constant key-value database tool")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Build a database from the text format (stdin or --input)
    ///
    /// Формат записи: +klen,dlen:key->data\n, конец: пустая строка.
    Make {
        #[arg(long)]
        path: PathBuf,
        /// Temp file to build into (default: .<name> next to --path)
        #[arg(long)]
        tmp: Option<PathBuf>,
        /// Read text from a file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Dump all records in the text format (stdout or --out)
    Dump {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Look up a key (prefix "hex:" for binary keys)
    Get {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
        /// Print every value stored under the key
        #[arg(long, default_value_t = false)]
        all: bool,
        /// Optional file to write the raw (first) value into
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify file structure (header, tables, records)
    Check {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Header/table statistics and slot distances
    Stats {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

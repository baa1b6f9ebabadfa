use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "zip4county")]
#[command(version)]
#[command(about = "Build a ZIP code to county index from USPS ZIP+4 national data", long_about = None)]
#[command(after_help = "Examples:\n  \
  zip4county files                                  list files offered by EPF\n  \
  zip4county download 5512 -o epf-zip4natl.tar      fetch a container\n  \
  zip4county counties --tar epf-zip4natl.tar > counties.csv\n  \
  zip4county counties --tar epf-zip4natl.tar --zip 02134")]
pub struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List files available for download
    Files {
        #[command(flatten)]
        epf: EpfArgs,

        /// Only list files of this product code
        #[arg(long, requires = "product_id")]
        product_code: Option<String>,

        /// Product id to pair with --product-code
        #[arg(long, requires = "product_code")]
        product_id: Option<String>,

        /// Restrict a product listing to these status codes (N, S, X, C)
        #[arg(long, value_name = "CODE", requires = "product_code")]
        status: Vec<String>,
    },

    /// Download a file by id
    Download {
        #[command(flatten)]
        epf: EpfArgs,

        #[arg(value_name = "FILE_ID")]
        file_id: String,

        /// Write to PATH instead of stdout
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Mark the file as downloaded once the transfer completes
        #[arg(long)]
        mark_complete: bool,
    },

    /// Build the ZIP to county index and print it as CSV
    Counties {
        #[command(flatten)]
        archive: ArchiveArgs,

        /// Print the counties of a single ZIP code instead
        #[arg(long, value_name = "CODE")]
        zip: Option<String>,
    },

    /// Print decoded city/state detail records as CSV
    CityState {
        #[command(flatten)]
        archive: ArchiveArgs,
    },

    /// List the entries of a container and the members of its ZIP archives
    Ls {
        /// Container file
        #[arg(long, value_name = "PATH")]
        tar: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct EpfArgs {
    /// EPF account email
    #[arg(long, env = "EPF_EMAIL", hide_env_values = true)]
    pub epf_email: String,

    /// EPF account password
    #[arg(long, env = "EPF_PASSWORD", hide_env_values = true)]
    pub epf_password: String,
}

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Container file (epf-zip4natl tar)
    #[arg(long, value_name = "PATH")]
    pub tar: PathBuf,

    /// Password of the encrypted archive members
    #[arg(long, env = "ZIP_PASSWORD", hide_env_values = true)]
    pub zip_password: String,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

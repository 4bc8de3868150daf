use clap::{Parser, Subcommand};
use anyhow::Result;
use std::path::PathBuf;
use log::debug;

/// Rhino Plugin Registry
#[derive(Parser, Debug)]
#[command(name = "rhino-plugins")]
#[command(about = "Catalogue, add, package and synchronize Rhino automation plugins")]
#[command(version)]
pub struct Args {
    /// Root directory holding the plugin package directories
    #[arg(short = 'r', long = "root", value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Verbose output (debug level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log file path for file output
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Configuration section name
    #[arg(long, value_name = "SECTION", global = true)]
    pub config_name: Option<String>,

    /// Disable coloured output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Registry operations
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every registered action
    List {
        /// Render as a table instead of tab separated lines
        #[arg(long)]
        table: bool,
    },
    /// Show one action by key (case-insensitive)
    Get {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Add the specifications in FILE (separated by `>>>` lines)
    Add {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Write into the private package, encrypted
        #[arg(long)]
        private: bool,
    },
    /// Delete the file backing an action
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Delete every plugin package directory
    DeleteAll,
    /// Upload a gzip tar archive as package ID
    Submit {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
    /// Rebuild the plugin cache from storage
    Sync,
    /// Write all plugin packages to a gzip tar archive
    Export {
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Show registry status
    Status,
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    let args = Args::parse();
    debug!("Parsed CLI arguments: {:?}", args);
    args
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    let log_flags_count = [args.verbose, args.quiet, args.debug]
        .iter()
        .filter(|&&flag| flag)
        .count();

    if log_flags_count > 1 {
        return Err(anyhow::anyhow!(
            "Only one of --verbose, --quiet, or --debug can be specified"
        ));
    }

    if args.log_file_level.is_some() && args.log_file.is_none() {
        return Err(anyhow::anyhow!("--log-file-level requires --log-file to be specified"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_list_with_table() {
        let args = parse(&["rhino-plugins", "list", "--table"]);
        assert_eq!(args.command, Command::List { table: true });
        assert!(args.root.is_none());
        assert_eq!(args.log_format, "text");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["rhino-plugins", "get", "ClickButton", "--root", "/srv/Plugins", "-v"]);
        assert_eq!(args.command, Command::Get { id: "ClickButton".to_string() });
        assert_eq!(args.root, Some(PathBuf::from("/srv/Plugins")));
        assert!(args.verbose);
    }

    #[test]
    fn test_add_and_submit() {
        let args = parse(&["rhino-plugins", "add", "specs.rhino", "--private"]);
        assert_eq!(
            args.command,
            Command::Add { file: PathBuf::from("specs.rhino"), private: true }
        );

        let args = parse(&["rhino-plugins", "submit", "Sample", "sample.tar.gz"]);
        assert_eq!(
            args.command,
            Command::Submit { id: "Sample".to_string(), archive: PathBuf::from("sample.tar.gz") }
        );
    }

    #[test]
    fn test_delete_all_is_kebab_case() {
        let args = parse(&["rhino-plugins", "delete-all"]);
        assert_eq!(args.command, Command::DeleteAll);
    }

    #[test]
    fn test_command_is_required() {
        assert!(Args::try_parse_from(["rhino-plugins"]).is_err());
    }

    #[test]
    fn test_conflicting_log_flags() {
        let args = parse(&["rhino-plugins", "-v", "-q", "sync"]);
        assert!(validate_args(&args).is_err());

        let args = parse(&["rhino-plugins", "--debug", "sync"]);
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_file_level_requires_file() {
        let args = parse(&["rhino-plugins", "--log-file-level", "debug", "status"]);
        assert!(validate_args(&args).is_err());

        let args = parse(&["rhino-plugins", "--log-file", "r.log", "--log-file-level", "debug", "status"]);
        assert!(validate_args(&args).is_ok());
    }
}

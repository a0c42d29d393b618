//! Command-line options.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Debug, Parser)]
#[command(name = "relational-indexer")]
#[command(about = "Index rows from MySQL databases into OpenSearch", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Use the development defaults
    #[arg(short, long)]
    pub development: bool,

    /// File of `host user secret` lines, one per MySQL connection
    #[arg(short = 'c', long)]
    pub db_connections: Option<PathBuf>,

    /// MySQL schema name
    #[arg(short = 'b', long)]
    pub db_name: Option<String>,

    /// Number of pooled MySQL connections (1-8)
    #[arg(short = 'q', long)]
    pub db_queue_size: Option<usize>,

    /// File of `scheme host port` lines, one per OpenSearch node
    #[arg(short = 'e', long)]
    pub es_connections: Option<PathBuf>,

    /// OpenSearch index name
    #[arg(short = 'n', long)]
    pub es_index: Option<String>,

    /// Document type stamped on every document
    #[arg(short = 'y', long)]
    pub es_type: Option<String>,

    /// Run a single worker on the main task
    #[arg(short = 's', long)]
    pub single_process: bool,

    /// Number of concurrent workers (1-16)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Start each worker as soon as it is created
    #[arg(long)]
    pub eager: bool,

    /// Number of primary keys claimed per batch
    #[arg(short = 'r', long)]
    pub read_buffer: Option<usize>,

    /// Number of documents per bulk request
    #[arg(short = 'w', long)]
    pub write_buffer: Option<usize>,

    /// Maximum number of documents to index (0 for no limit)
    #[arg(short = 'l', long)]
    pub limit: Option<u64>,

    /// JSON file describing the primary table and its relationships
    #[arg(long)]
    pub relationships: Option<PathBuf>,

    /// SQL predicate selecting the primary rows to index
    #[arg(long = "where")]
    pub selection: Option<String>,

    /// Documents between progress lines
    #[arg(long)]
    pub report_every: Option<u64>,

    /// Documents between index refreshes
    #[arg(long)]
    pub refresh_every: Option<u64>,

    /// Leave the index settings untouched during the load
    #[arg(long)]
    pub no_tuning: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_options() {
        let cli = Cli::try_parse_from([
            "relational-indexer",
            "-vv",
            "-b",
            "dmoz",
            "-q",
            "2",
            "-t",
            "4",
            "-r",
            "50",
            "-l",
            "30",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.db_name.as_deref(), Some("dmoz"));
        assert_eq!(cli.db_queue_size, Some(2));
        assert_eq!(cli.threads, Some(4));
        assert_eq!(cli.read_buffer, Some(50));
        assert_eq!(cli.limit, Some(30));
        assert!(!cli.single_process);
    }

    #[test]
    fn test_selection_flag() {
        let cli =
            Cli::try_parse_from(["relational-indexer", "--where", "parent_id IS NULL"]).unwrap();
        assert_eq!(cli.selection.as_deref(), Some("parent_id IS NULL"));
    }
}

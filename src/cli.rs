use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser)]
#[command(name = "haystack-directory")]
#[command(about = "Photo directory for a Haystack-style object store", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the values loaded from `HAYSTACK_*` variables.
#[derive(Args)]
pub struct StoreArgs {
    /// Table server base URL; repeat for several. None means an in-process table.
    #[arg(long = "store-endpoint", global = true)]
    pub store_endpoints: Vec<String>,

    #[arg(long, global = true)]
    pub keyspace: Option<String>,

    #[arg(long, global = true)]
    pub replication_factor: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the directory HTTP service
    Serve {
        #[arg(long, env = "HAYSTACK_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Provision a volume at start-up as `<id>:<capacity_bytes>`; existing ids are left alone
        #[arg(long = "volume", value_parser = parse_volume_seed)]
        volumes: Vec<(u32, u64)>,
    },

    /// Run a table server holding directory rows
    TableServer {
        #[arg(long, env = "HAYSTACK_TABLE_BIND", default_value = "127.0.0.1:9090")]
        bind: SocketAddr,
    },

    /// Create the keyspace and tables, then exit
    Bootstrap,
}

fn parse_volume_seed(raw: &str) -> Result<(u32, u64), String> {
    let (id, capacity) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected <id>:<capacity_bytes>, got '{}'", raw))?;
    let id = id
        .trim()
        .parse()
        .map_err(|e| format!("invalid volume id '{}': {}", id, e))?;
    let capacity = capacity
        .trim()
        .parse()
        .map_err(|e| format!("invalid capacity '{}': {}", capacity, e))?;
    Ok((id, capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volume_seed() {
        assert_eq!(parse_volume_seed("3:1073741824"), Ok((3, 1_073_741_824)));
        assert!(parse_volume_seed("3").is_err());
        assert!(parse_volume_seed("x:10").is_err());
        assert!(parse_volume_seed("3:-1").is_err());
    }

    #[test]
    fn test_serve_arguments() {
        let cli = Cli::parse_from([
            "haystack-directory",
            "serve",
            "--bind",
            "0.0.0.0:8000",
            "--volume",
            "1:100",
            "--volume",
            "2:200",
            "--store-endpoint",
            "http://10.0.0.1:9090",
        ]);

        assert_eq!(cli.store.store_endpoints, vec!["http://10.0.0.1:9090".to_string()]);
        match cli.command {
            Commands::Serve { bind, volumes } => {
                assert_eq!(bind.port(), 8000);
                assert_eq!(volumes, vec![(1, 100), (2, 200)]);
            }
            _ => panic!("expected serve"),
        }
    }
}

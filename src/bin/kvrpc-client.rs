use std::process::exit;
use std::time::Duration;

use clap::{Parser, Subcommand};

use kvrpc::{Handle, KvsClient, Result};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 4000;

#[derive(Parser)]
#[command(name = "kvrpc-client", version, about = "A kvrpc client")]
struct Cli {
    /// Server host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Per-call deadline in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a database and print its handle
    Open {
        /// Database path on the server
        path: String,
    },
    /// Release one open of a handle
    Close {
        /// The handle
        handle: u64,
    },
    /// Print the value of a key
    Get {
        /// The handle
        handle: u64,
        /// The key
        key: String,
    },
    /// Set the value of a key
    Put {
        /// The handle
        handle: u64,
        /// The key
        key: String,
        /// The value
        value: String,
    },
    /// Print the values of several keys, one per line
    #[command(name = "multiget")]
    MultiGet {
        /// The handle
        handle: u64,
        /// The keys
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Open a database, write hello=world, read it back and close it
    Demo {
        /// Database path on the server
        path: String,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut client = KvsClient::connect(&cli.host, cli.port)?;
    client.set_timeout(cli.timeout_ms.map(Duration::from_millis))?;

    match cli.command {
        Commands::Open { path } => {
            let handle = client.open(&path)?;
            println!("{}", handle);
        }
        Commands::Close { handle } => client.close(Handle::new(handle))?,
        Commands::Get { handle, key } => match client.get(Handle::new(handle), key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("Key not found"),
        },
        Commands::Put { handle, key, value } => {
            client.put(Handle::new(handle), key.as_bytes(), value.as_bytes())?
        }
        Commands::MultiGet { handle, keys } => {
            let keys: Vec<Vec<u8>> = keys.into_iter().map(String::into_bytes).collect();
            for value in client.multi_get(Handle::new(handle), &keys)? {
                match value {
                    Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                    None => println!("Key not found"),
                }
            }
        }
        Commands::Demo { path } => {
            let handle = client.open(&path)?;
            client.put(handle, b"hello", b"world")?;
            let value = client.get(handle, b"hello")?.unwrap_or_default();
            println!("Value for hello = {}", String::from_utf8_lossy(&value));
            client.close(handle)?;
        }
    }

    Ok(())
}

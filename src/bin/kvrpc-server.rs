use std::process::exit;

use clap::{Parser, ValueEnum};
use log::{error, info};

use kvrpc::{
    BindAddr, KvsServer, KvsService, RayonThreadPool, Result, SharedQueueThreadPool, SledEngine,
    ThreadPool,
};

#[derive(Clone, Copy, ValueEnum)]
enum Pool {
    /// Workers sharing one job queue
    Shared,
    /// rayon's work-stealing pool
    Rayon,
}

#[derive(Parser)]
#[command(
    name = "kvrpc-server",
    version,
    about = "Serves sled databases to kvrpc clients by handle",
    after_help = "ADDRESS may be '*' to bind to all local addresses.\n\
                  :PORT may be omitted to choose a port automatically.\n\
                  The address format \"unix:/path/to/socket\" opens a unix domain socket."
)]
struct Cli {
    /// Address to bind: ADDRESS[:PORT] or unix:PATH
    #[arg(value_name = "ADDRESS")]
    addr: String,

    /// Number of worker threads [default: number of CPUs]
    #[arg(long, value_name = "N")]
    threads: Option<u32>,

    /// Thread pool implementation
    #[arg(long, value_enum, default_value = "shared")]
    pool: Pool,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let addr = BindAddr::parse(&cli.addr)?;
    let threads = cli.threads.unwrap_or_else(|| num_cpus::get() as u32);

    info!("kvrpc-server {}", env!("CARGO_PKG_VERSION"));
    info!("Worker threads: {}", threads);

    match cli.pool {
        Pool::Shared => run_with_pool(SharedQueueThreadPool::new(threads)?, &addr),
        Pool::Rayon => run_with_pool(RayonThreadPool::new(threads)?, &addr),
    }
}

fn run_with_pool<P: ThreadPool>(pool: P, addr: &BindAddr) -> Result<()> {
    let server = KvsServer::new(KvsService::<SledEngine>::new(), pool);
    let listener = server.bind(addr)?;
    println!("Listening on {}...", listener);
    server.serve(listener)
}

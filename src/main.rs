use clap::Parser;
use client::Client;
use log::{error, info};
use server::Server;
use shared::config::{self, Mode, DEFAULT_HOST, DEFAULT_MAX_FRAME_LEN, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Socket chat room", long_about = None)]
struct Args {
    /// Display name; `server` starts the relay server instead
    #[arg(short, long)]
    name: String,

    /// Host to bind (server) or connect to (client)
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// TCP port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Largest accepted message payload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let addr = config::socket_addr(&args.host, args.port);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        match Mode::from_name(&args.name) {
            Mode::Server => run_server(&addr, args.max_frame_len).await,
            Mode::Client { name } => run_client(&addr, &name, args.max_frame_len).await,
        }
    });

    // A pending stdin read holds a blocking thread that would otherwise keep us alive
    runtime.shutdown_background();
    result
}

async fn run_server(addr: &str, max_frame_len: usize) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = match Server::new(addr, max_frame_len).await {
        Ok(server) => server,
        Err(e) => {
            error!("[SERVER]: Failed to listen on {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    });

    server.run(tokio::io::stdin()).await?;
    Ok(())
}

async fn run_client(
    addr: &str,
    name: &str,
    max_frame_len: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = match Client::connect(addr, name, max_frame_len).await {
        Ok(client) => client,
        Err(e) => {
            error!("[LOCAL]: {}", e);
            std::process::exit(1);
        }
    };

    let handle = client.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    client.run(tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}

use clap::Parser;
use client::input::spawn_stdin_reader;
use client::network::{Client, Credentials};
use log::info;
use shared::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Connect using this account
    #[arg(short = 'u', long)]
    user_id: String,

    /// Your password
    #[arg(short = 'p', long)]
    password: String,

    /// Connect to the server on this port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Register a new account on the server
    #[arg(long)]
    register: bool,

    /// Connect to this machine
    host: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let credentials = Credentials {
        user_id: args.user_id,
        password: args.password,
    };

    info!("Starting client...");
    info!("Connecting to: {}:{}", args.host, args.port);

    let mut client = Client::connect(&args.host, args.port).await?;
    client.send(credentials.request(args.register))?;

    if !args.register {
        info!("Controls: w/s to walk, a/d to strafe, arrow_left/arrow_right to turn");
        info!("Type an event name per line; add -up to release, e.g. w-up");
    }

    let exit = client.run(spawn_stdin_reader()).await?;
    info!("Session ended: {:?}", exit);

    Ok(())
}

use clap::{Parser, Subcommand};
use srcquery::{ClientConfig, QueryClient};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "srcquery",
    about = "Query and administer Source engine game servers"
)]
struct Args {
    /// Server address (host:port)
    #[arg(long, short)]
    addr: SocketAddr,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Server name, map, and player counts
    Info,
    /// Connected player list
    Players,
    /// Server cvar map
    Rules,
    /// Authenticate and run a console command
    Rcon {
        #[arg(long, short)]
        password: String,
        /// Command line to execute
        command: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = ClientConfig {
        read_timeout: Duration::from_millis(args.timeout_ms),
        ..ClientConfig::default()
    };

    let client = match QueryClient::with_config(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to start client: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&client, &args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(client: &QueryClient, args: &Args) -> srcquery::Result<()> {
    match &args.command {
        Command::Info => {
            let info = client.query_info(args.addr)?.wait()?;
            println!("{} ({}/{} players)", info.name, info.players, info.max_players);
            println!("map: {}  game: {}  version: {}", info.map, info.game, info.version);
        }
        Command::Players => {
            let players = client.query_players(args.addr)?.wait()?;
            for p in players {
                println!("{:24} score {:6}  {:.0}s", p.name, p.score, p.duration);
            }
        }
        Command::Rules => {
            let rules = client.query_rules(args.addr)?.wait()?;
            let mut rules: Vec<_> = rules.into_iter().collect();
            rules.sort();
            for (key, value) in rules {
                println!("{key} = {value}");
            }
        }
        Command::Rcon { password, command } => {
            if !client.rcon_authenticate(args.addr, password)?.wait()? {
                eprintln!("Authentication rejected");
                std::process::exit(2);
            }
            let output = client.rcon_execute(args.addr, &command.join(" "))?.wait()?;
            print!("{output}");
        }
    }
    Ok(())
}

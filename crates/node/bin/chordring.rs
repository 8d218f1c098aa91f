use std::sync::Arc;
use std::time::Duration;

use chordring_core::dht::ChordNode;
use chordring_core::dht::Dht;
use chordring_core::dht::KadNode;
use chordring_core::rpc::RemoteNode;
use chordring_core::transport::TransportConfig;
use chordring_node::config;
use chordring_node::config::Routing;
use chordring_node::error::Error;
use chordring_node::logging::init_logging;
use chordring_node::logging::LogLevel;
use chordring_node::stress;
use chordring_node::stress::StressConfig;
use chordring_node::util::build_version;
use clap::Args;
use clap::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Writes a default configuration file.")]
    Init(InitCommand),
    #[command(about = "Starts a node, creating a ring or joining an existing one.")]
    Run(RunCommand),
    #[command(about = "Stores a value on the ring.")]
    Put(PutCommand),
    #[command(about = "Reads a value from the ring.")]
    Get(KeyCommand),
    #[command(about = "Removes a value from the ring.")]
    Delete(KeyCommand),
    #[command(
        about = "Show information of a node. Include successors, predecessor, finger table and storage."
    )]
    Inspect(InspectCommand),
    #[command(about = "Boots a ring in process and runs random traffic and departures against it.")]
    Stress(StressCommand),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(
        long,
        short = 'c',
        env,
        default_value = config::DEFAULT_CONFIG_PATH,
        help = "Config file location"
    )]
    pub config: String,
}

#[derive(Args, Debug)]
struct InitCommand {
    #[arg(
        long,
        default_value = config::DEFAULT_CONFIG_PATH,
        help = "The location of config file"
    )]
    pub location: String,

    #[arg(long, default_value = config::DEFAULT_LISTEN_ADDR, help = "Listen address of the node")]
    pub listen_addr: String,

    #[arg(long, help = "Member to join through. If not provided, the node creates a ring")]
    pub bootstrap: Option<String>,
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(
        long,
        short = 'l',
        help = "Listen address. If not provided, use listen_addr in config file or 127.0.0.1:50000",
        env
    )]
    pub listen_addr: Option<String>,

    #[arg(
        long,
        short = 'b',
        help = "Member to join through. If not provided, use bootstrap in config file or create a ring",
        env
    )]
    pub bootstrap: Option<String>,

    #[arg(
        long,
        help = "Stabilize interval in ms. If not provided, use stabilize_interval in config file",
        env
    )]
    pub stabilize_interval: Option<u64>,

    #[arg(
        long,
        value_enum,
        help = "Routing of the node. If not provided, use routing in config file or chord",
        env
    )]
    pub routing: Option<Routing>,

    #[command(flatten)]
    config_args: ConfigArgs,
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[arg(
        long,
        short = 'n',
        default_value = config::DEFAULT_LISTEN_ADDR,
        help = "Address of any ring member",
        env = "CHORDRING_NODE"
    )]
    node: String,

    #[arg(long, default_value = "10000", help = "Request timeout in ms")]
    timeout: u64,
}

impl ClientArgs {
    fn new_client(&self) -> RemoteNode {
        RemoteNode::new(self.node.as_str(), TransportConfig {
            rpc_timeout: Duration::from_millis(self.timeout),
            ..Default::default()
        })
    }
}

#[derive(Args, Debug)]
struct PutCommand {
    #[command(flatten)]
    client_args: ClientArgs,
    key: String,
    value: String,
}

#[derive(Args, Debug)]
struct KeyCommand {
    #[command(flatten)]
    client_args: ClientArgs,
    key: String,
}

#[derive(Args, Debug)]
struct InspectCommand {
    #[command(flatten)]
    client_args: ClientArgs,
}

#[derive(Args, Debug)]
struct StressCommand {
    #[arg(long, default_value = "10", help = "Members of the ring")]
    nodes: usize,

    #[arg(long, default_value = "5", help = "Members leaving after the insertion phase")]
    quits: usize,

    #[arg(long, default_value = "200", help = "Puts issued by each worker")]
    inserts: usize,

    #[arg(long, default_value = "4", help = "Concurrent client workers")]
    workers: usize,

    #[arg(long, default_value = "128", help = "Distinct keys per worker")]
    key_space: usize,

    #[arg(long, default_value = "600", help = "Pause after every join and departure, in ms")]
    settle: u64,

    #[arg(long, default_value = "0", help = "Highest tolerated share of failed checks")]
    max_fail_rate: f64,

    #[arg(long, help = "Seed of the random traffic. If not provided, a random one is used")]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = Routing::Chord, help = "Routing of the members")]
    routing: Routing,
}

fn get_value<V>(value: Option<V>, default_value: V) -> V {
    value.unwrap_or(default_value)
}

fn load_config(path: &str) -> anyhow::Result<config::Config> {
    match config::Config::read_fs(path) {
        Ok(c) => Ok(c),
        Err(Error::OpenFileError(e)) => {
            tracing::warn!("Config {} not loaded ({}), using defaults", path, e);
            Ok(config::Config::default())
        }
        Err(e) => Err(e.into()),
    }
}

async fn daemon_run(args: RunCommand) -> anyhow::Result<()> {
    let mut c = load_config(&args.config_args.config)?;
    c.listen_addr = get_value(args.listen_addr, c.listen_addr);
    c.bootstrap = args.bootstrap.or(c.bootstrap);
    c.stabilize_interval = get_value(args.stabilize_interval, c.stabilize_interval);
    c.routing = get_value(args.routing, c.routing);

    match c.routing {
        Routing::Chord => {
            let node = Arc::new(ChordNode::new(&c.listen_addr, (&c).into()));
            println!("Did: {}", node.did);
            serve(node, c.bootstrap.as_deref()).await
        }
        Routing::Kad => {
            let node = Arc::new(KadNode::new(&c.listen_addr, (&c).into()));
            println!("Did: {}", node.did);
            serve(node, c.bootstrap.as_deref()).await
        }
    }
}

async fn serve<D: Dht>(node: Arc<D>, bootstrap: Option<&str>) -> anyhow::Result<()> {
    node.run().await.map_err(Error::StartNode)?;
    match bootstrap {
        Some(bootstrap) => {
            if !node.join(bootstrap).await {
                return Err(Error::JoinFailed(bootstrap.to_string()).into());
            }
        }
        None => node.create().await,
    }
    tracing::info!("chordring {} serving on {}", build_version(), node.addr());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Leaving the network");
    node.quit().await;
    Ok(())
}

async fn stress_run(args: StressCommand) -> anyhow::Result<()> {
    let config = StressConfig {
        nodes: args.nodes,
        quits: args.quits,
        inserts: args.inserts,
        workers: args.workers,
        key_space: args.key_space,
        settle: Duration::from_millis(args.settle),
        max_fail_rate: args.max_fail_rate,
        seed: get_value(args.seed, rand::random()),
        routing: args.routing,
        ..Default::default()
    };
    let report = stress::run(config).await?;
    println!("{}", report);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Command::Init(args) => {
            let mut c = config::Config::new(&args.listen_addr);
            c.bootstrap = args.bootstrap;
            let p = c.write_fs(args.location.as_str())?;
            println!("Your config file has saved to: {}", p);
            Ok(())
        }
        Command::Run(args) => daemon_run(args).await,
        Command::Put(args) => {
            args.client_args
                .new_client()
                .put(&args.key, &args.value)
                .await?;
            println!("ok");
            Ok(())
        }
        Command::Get(args) => {
            let value = args.client_args.new_client().get(&args.key).await?;
            println!("{}", value);
            Ok(())
        }
        Command::Delete(args) => {
            args.client_args.new_client().delete(&args.key).await?;
            println!("ok");
            Ok(())
        }
        Command::Inspect(args) => {
            let inspect = args.client_args.new_client().inspect().await?;
            println!("{}", serde_json::to_string_pretty(&inspect)?);
            Ok(())
        }
        Command::Stress(args) => stress_run(args).await,
    }
}

use clap::{Args, Parser, Subcommand};
use log::error;

use migrate::command::MigrateCommand;
use migrate::options::DataMigrateOptions;

#[derive(Debug, Parser)]
#[clap(
    name = "datamigrate",
    about = "Reads TSM files into InfluxDB line protocol format and writes them into openGemini",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Migrate TSM data to the destination
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Influxdb data storage path. See your influxdb config item: data.dir
    #[clap(short = 'f', long = "from", default_value = "/var/lib/influxdb/data")]
    from: String,

    /// Destination host to write data to
    #[clap(short = 't', long = "to", default_value = "127.0.0.1:8086")]
    to: String,

    /// Optional: The username to connect to the openGemini cluster
    #[clap(short = 'u', long = "username", default_value = "")]
    username: String,

    /// Optional: The password to connect to the openGemini cluster
    #[clap(short = 'p', long = "password", default_value = "")]
    password: String,

    /// Optional: the database to read
    #[clap(long = "database", default_value = "")]
    database: String,

    /// Optional: the database to write
    #[clap(long = "dest_database", default_value = "")]
    dest_database: String,

    /// Optional: the retention policy to read (requires --database)
    #[clap(long = "retention", default_value = "")]
    retention: String,

    /// Optional: the start time to read (RFC3339 format)
    #[clap(long = "start", default_value = "")]
    start: String,

    /// Optional: the end time to read (RFC3339 format)
    #[clap(long = "end", default_value = "")]
    end: String,

    /// Optional: specify batch size for inserting lines
    #[clap(long = "batch", default_value_t = 1000)]
    batch: usize,

    /// Optional: use https for requests
    #[clap(long = "ssl")]
    ssl: bool,

    /// Optional: skip ssl verification when connecting over https
    #[clap(long = "unsafeSsl")]
    unsafe_ssl: bool,

    /// Optional: whether to enable debug log or not
    #[clap(long = "debug")]
    debug: bool,

    /// Optional: seconds to wait between write retries
    #[clap(long = "retry_interval", default_value_t = 3)]
    retry_interval: u64,

    /// Optional: give up a batch after this many write attempts (0 retries forever)
    #[clap(long = "max_retries", default_value_t = 0)]
    max_retries: usize,
}

impl From<RunArgs> for DataMigrateOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            data_dir: args.from,
            out: args.to,
            username: args.username,
            password: args.password,
            database: args.database,
            dest_database: args.dest_database,
            retention_policy: args.retention,
            start: args.start,
            end: args.end,
            batch_size: args.batch,
            ssl: args.ssl,
            unsafe_ssl: args.unsafe_ssl,
            debug: args.debug,
            retry_interval_secs: args.retry_interval,
            max_write_retries: args.max_retries,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let Command::Run(args) = cli.command;

    if let Err(e) = run(args).await {
        error!("dataMigrate: {}", e);
        eprintln!("dataMigrate: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let opts = DataMigrateOptions::from(args);
    migrate::logging::init(opts.debug)?;
    migrate::diag::start(migrate::diag::DIAG_PORT);

    let cmd = MigrateCommand::new(opts)?;
    cmd.run().await
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use dmlc_yarn::config::{
    resolve_hadoop_binary, resolve_java_binary, JobConfig, SupportArtifacts, AUTO_JOB_NAME,
    DEFAULT_NAME_NODE,
};
use dmlc_yarn::launch::LaunchSpec;
use dmlc_yarn::process::TokioRunner;
use dmlc_yarn::shutdown::install_shutdown_handler;
use dmlc_yarn::staging::LocalFs;
use dmlc_yarn::tracker::{guess_host_ip, ExternalTracker, DEFAULT_TRACKER_PORT};
use dmlc_yarn::{Orchestrator, Result};

#[derive(Parser, Debug)]
#[command(name = "dmlc-yarn")]
#[command(version)]
#[command(about = "Submit DMLC jobs to Hadoop YARN")]
struct Args {
    /// Number of worker processes to launch
    #[arg(short = 'n', long = "nworker", value_parser = clap::value_parser!(u32).range(1..))]
    nworker: u32,

    /// Number of server processes to launch
    #[arg(short = 's', long = "server-nodes", default_value = "0")]
    server_nodes: u32,

    /// Job name shown by YARN ("auto" derives one from the command)
    #[arg(long, default_value = AUTO_JOB_NAME)]
    jobname: String,

    /// YARN queue to submit to
    #[arg(short = 'q', long, default_value = "default")]
    queue: String,

    /// HDFS directory for intermediate results
    #[arg(long, default_value = "/tmp")]
    tempdir: String,

    /// Virtual cores per container, raise for multi-threaded jobs
    #[arg(long, default_value = "1")]
    vcores: u32,

    /// Memory per container in MB
    #[arg(short = 'm', long = "memory-mb", default_value = "1024")]
    memory_mb: u64,

    /// JVM options passed to libhdfs in each container
    #[arg(long = "libhdfs-opts", default_value = "-Xmx128m", allow_hyphen_values = true)]
    libhdfs_opts: String,

    /// HDFS namenode libhdfs should connect to
    #[arg(long = "name-node", default_value = DEFAULT_NAME_NODE)]
    name_node: String,

    /// Print the launch command and enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Cache files that appear in the command and rewrite them to ./<name> (0 or 1)
    #[arg(long = "auto-file-cache", default_value = "1", value_parser = clap::value_parser!(u8).range(0..=1))]
    auto_file_cache: u8,

    /// Additional files to cache, '#'-separated; may be repeated
    #[arg(short = 'f', long = "files")]
    files: Vec<String>,

    /// Path to the hadoop binary
    #[arg(long = "hadoop-binary")]
    hadoop_binary: Option<PathBuf>,

    /// Hadoop installation used when --hadoop-binary is not given
    #[arg(long = "hadoop-home", env = "HADOOP_HOME")]
    hadoop_home: Option<PathBuf>,

    /// Java binary that runs the YARN client (default: $JAVA_HOME/bin/java)
    #[arg(long)]
    java: Option<PathBuf>,

    /// Directory holding dmlc-yarn.jar and run_hdfs_prog.py
    #[arg(long = "yarn-dir", env = "DMLC_YARN_DIR")]
    yarn_dir: Option<PathBuf>,

    /// Tracker host handed to workers ("auto" guesses this machine's address)
    #[arg(long = "host-ip", default_value = "auto")]
    host_ip: String,

    /// Tracker port handed to workers
    #[arg(long = "tracker-port", default_value_t = DEFAULT_TRACKER_PORT)]
    tracker_port: u16,

    /// Probe hadoop and print the launch instead of submitting
    #[arg(long)]
    dry_run: bool,

    /// Output format for --dry-run
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    /// Program to run followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &Args) -> Result<JobConfig> {
    let hadoop_binary = resolve_hadoop_binary(args.hadoop_binary.clone(), args.hadoop_home.clone())?;
    let java_binary = resolve_java_binary(
        args.java.clone(),
        std::env::var_os("JAVA_HOME").map(PathBuf::from),
    );
    let support = SupportArtifacts::locate(args.yarn_dir.clone())?;

    JobConfig {
        num_workers: args.nworker,
        num_servers: args.server_nodes,
        hadoop_binary,
        java_binary,
        job_name: args.jobname.clone(),
        queue: args.queue.clone(),
        temp_dir: args.tempdir.clone(),
        vcores: args.vcores,
        memory_mb: args.memory_mb,
        hdfs_opts: args.libhdfs_opts.clone(),
        name_node: args.name_node.clone(),
        verbose: args.verbose,
        files: args.files.clone(),
        auto_file_cache: args.auto_file_cache != 0,
        command: args.command.clone(),
        support,
    }
    .resolve()
}

fn tracker_host(host_ip: &str) -> String {
    if host_ip != "auto" {
        return host_ip.to_string();
    }
    match guess_host_ip() {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot guess host address, pass --host-ip");
            "127.0.0.1".to_string()
        }
    }
}

fn print_dry_run(spec: &LaunchSpec, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(spec)?);
        }
        OutputFormat::Table => {
            println!("Command:");
            println!("  {}", spec.command.display());
            println!();
            println!("Cached files:");
            for file in spec.command.staged_files() {
                println!("  {}", file);
            }
            println!();
            println!("Environment:");
            for (key, value) in &spec.overrides {
                println!("  {}={}", key, value);
            }
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;
    tracing::info!(
        job_name = %config.job_name,
        nworker = config.num_workers,
        nserver = config.num_servers,
        queue = %config.queue,
        hadoop = %config.hadoop_binary.display(),
        "Resolved job configuration"
    );

    let tracker = ExternalTracker::new(tracker_host(&args.host_ip), args.tracker_port)
        .with_shutdown(install_shutdown_handler()?);
    let orchestrator =
        Orchestrator::new(config, Arc::new(TokioRunner), Arc::new(LocalFs::new()?))?;

    if args.dry_run {
        let mut orchestrator = orchestrator.without_client_build();
        orchestrator.check_version().await?;
        let spec = orchestrator.prepare(&tracker.rendezvous_env());
        return print_dry_run(&spec, &args.output);
    }

    orchestrator.run(&tracker).await
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "dmlc-yarn failed");
        return Err(e.into());
    }
    Ok(())
}

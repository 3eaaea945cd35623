use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use fuser::MountOption;
use tracing_subscriber::EnvFilter;

use jvmfs::fs::Vfs;
use jvmfs::fuse::JvmFuse;
use jvmfs_jdwp::JdwpClient;

/// Mount a live JVM's debug surface as a filesystem.
///
/// The JVM must be started with a JDWP socket transport, e.g.
/// `-agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address=5005`.
#[derive(Debug, Parser)]
#[command(name = "jvmfs", version, about)]
struct Cli {
    /// Host of the debugged JVM process.
    #[arg(long)]
    host: String,

    /// JDWP port of the debugged JVM process.
    #[arg(long)]
    port: u16,

    /// Allow other users to access the mount.
    #[arg(long)]
    allow_other: bool,

    /// Log filter, e.g. `jvmfs=debug` (overrides `RUST_LOG`).
    #[arg(long)]
    log: Option<String>,

    /// Where to mount the JVM view.
    mountpoint: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Symlink targets are compared against this absolute root, so pin it
    // down before the mount exists.
    let mountpoint = cli
        .mountpoint
        .canonicalize()
        .with_context(|| format!("mountpoint {} is not accessible", cli.mountpoint.display()))?;
    if !mountpoint.is_dir() {
        bail!("mountpoint {} is not a directory", mountpoint.display());
    }

    let addr = (cli.host.as_str(), cli.port)
        .to_socket_addrs()
        .with_context(|| format!("unable to resolve {}:{}", cli.host, cli.port))?
        .next()
        .with_context(|| format!("{}:{} has no usable address", cli.host, cli.port))?;

    let runtime = tokio::runtime::Runtime::new().context("unable to start runtime")?;
    let client = runtime
        .block_on(JdwpClient::connect(addr))
        .with_context(|| format!("unable to attach to JVM at {}:{}", cli.host, cli.port))?;

    tracing::info!(
        target: "jvmfs",
        host = %cli.host,
        port = cli.port,
        mountpoint = %mountpoint.display(),
        "attached, mounting"
    );

    let vfs = Arc::new(Vfs::new(
        client.clone(),
        cli.host.clone(),
        cli.port,
        mountpoint.clone(),
    ));

    let mut options = vec![
        MountOption::FSName("jvmfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if cli.allow_other {
        options.push(MountOption::AllowOther);
    }

    let adapter = JvmFuse::new(vfs.clone(), runtime.handle().clone());
    let mounted = fuser::mount2(adapter, &mountpoint, &options)
        .with_context(|| format!("mount at {} failed", mountpoint.display()));

    // The session has ended (unmount or mount failure); active
    // subscriptions must not outlive the tree that declared them.
    runtime.block_on(vfs.event_manager().shutdown());
    client.shutdown();

    mounted?;
    tracing::info!(target: "jvmfs", "unmounted");
    Ok(())
}

use clap::Parser;

#[derive(Parser)]
#[command(name = "milena", version, about = "Partitioned-log cluster control plane.")]
struct Args {
    /// Location of the config file.
    #[arg(long, value_name = "PATH", default_value = "Config.toml")]
    config: std::path::PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let shutdown = tokio::sync::broadcast::channel(1);
    let tx = shutdown.0.clone();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(milena::milena(args.config, shutdown))?;
    Ok(())
}

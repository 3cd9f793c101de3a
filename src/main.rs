mod cli;

use clap::Parser;
use cli::{Cli, Commands, GetArgs, ResolveCertArgs};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use panelfetch::WebClientBuilder;
use panelfetch::certs::{CertificateResolver, DirAnchorStore, candidate_anchor_names};
use panelfetch::config::Config;
use panelfetch::queue::JobRequest;
use panelfetch::{observability, server};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    observability::init_tracing("info");

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run => run(config).await?,
        Commands::Get(args) => get(config, args).await?,
        Commands::ResolveCert(args) => resolve_cert(config, args),
    }

    Ok(())
}

async fn run(config: Config) -> Result<(), AnyError> {
    let (client, worker) = WebClientBuilder::from_config(&config).spawn()?;

    for registration in config.registrations()? {
        let url = registration.url.clone();
        match client.register(registration) {
            Ok(outcome) => info!(url = %url, ?outcome, "Resource registered"),
            Err(e) => warn!(url = %url, error = %e, "Resource rejected"),
        }
    }

    let served = server::serve(config.status.bind_addr, client, server::shutdown_signal()).await;
    worker.shutdown().await;
    served
}

async fn get(config: Config, args: GetArgs) -> Result<(), AnyError> {
    let mut worker_config = config.worker_config();
    // Interactive use; no reason to wait out the boot quiet period.
    worker_config.startup_delay = Duration::ZERO;
    worker_config.tick = Duration::from_millis(50);

    let (client, worker) = WebClientBuilder::from_config(&config)
        .worker_config(worker_config)
        .spawn()?;

    let mut request = JobRequest::get(&args.url);
    request.headers = args.headers;
    let reply = client.fetch(request).await;
    worker.shutdown().await;

    let reply = reply?;
    info!(status = reply.status, size = reply.body.len(), "Request finished");
    std::io::stdout().write_all(&reply.body)?;
    if !(200..300).contains(&reply.status) {
        return Err(format!("server answered with status {}", reply.status).into());
    }
    Ok(())
}

fn resolve_cert(config: Config, args: ResolveCertArgs) {
    let cert_dir = args.cert_dir.unwrap_or(config.tls.cert_dir);
    let resolver = CertificateResolver::new(
        Arc::new(DirAnchorStore::new(&cert_dir)),
        config.tls.allow_insecure,
    );

    println!("candidates: {}", candidate_anchor_names(&args.host).join(", "));
    match resolver.resolve_filename(&args.host) {
        Some(name) => println!("anchor: {}", cert_dir.join(name).display()),
        None if config.tls.allow_insecure => println!("anchor: none (insecure fallback)"),
        None => println!("anchor: none (connections will fail)"),
    }
}

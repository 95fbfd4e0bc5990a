//! Thin CLI wiring (`SPEC_FULL.md` §4.12): parse arguments, load
//! configuration, perform the startup replay, and run the server until
//! shutdown. No business logic lives here.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;

use sparrowdb::aof::{self, Aof};
use sparrowdb::command::Context;
use sparrowdb::config::Config;
use sparrowdb::pubsub::Pubsub;
use sparrowdb::rdb::Rdb;
use sparrowdb::stats::Stats;
use sparrowdb::store::Containers;
use sparrowdb::Server;

#[derive(Parser, Debug)]
#[command(name = "sparrowdb", about = "An in-memory, RESP-speaking key-value store")]
struct Args {
    /// Path to a TOML configuration file.
    config: Option<PathBuf>,

    /// Override the listen address from the config file / defaults.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).unwrap_or_else(|error| {
        tracing::error!(%error, "failed to load configuration");
        std::process::exit(1);
    });
    if let Some(listen) = args.listen {
        config.server.addr = listen;
    }

    let containers = Arc::new(Containers::default());
    let pubsub = Arc::new(Pubsub::new());
    let stats = Arc::new(Stats::new());
    let rdb = Arc::new(Rdb::new(config.persistence.rdb.filename.clone()));

    // Startup replay order (`SPEC_FULL.md` §4.6): RDB first, then AOF on
    // top of it, since the AOF is the more recent authority.
    if config.persistence.rdb.enabled {
        match rdb.load(&containers) {
            Ok(true) => tracing::info!("loaded RDB snapshot"),
            Ok(false) => tracing::info!("no RDB snapshot found"),
            Err(error) => tracing::warn!(%error, "failed to load RDB snapshot"),
        }
    }

    let aof = if config.persistence.aof.enabled {
        let aof = Arc::new(Aof::open(config.persistence.aof.filename.clone())?);
        aof.set_replaying(true);
        let replay_ctx = Context {
            containers: Arc::clone(&containers),
            pubsub: Arc::clone(&pubsub),
            aof: Some(Arc::clone(&aof)),
            rdb: Arc::clone(&rdb),
            stats: Arc::clone(&stats),
            auth_secret: config.auth.secret.clone(),
        };
        match Aof::load(config.persistence.aof.filename.clone(), |name, args| {
            let _ = sparrowdb::command::dispatch_replay(&replay_ctx, name, args);
        }) {
            Ok(count) => tracing::info!(count, "replayed AOF"),
            Err(error) => tracing::warn!(%error, "failed to replay AOF"),
        }
        aof.set_replaying(false);
        Some(aof)
    } else {
        None
    };

    let ctx = Context {
        containers: Arc::clone(&containers),
        pubsub,
        aof: aof.clone(),
        rdb: Arc::clone(&rdb),
        stats,
        auth_secret: config.auth.secret.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = containers.spawn_expiration_tickers(&config.datastructure.expiration, shutdown_rx.clone());

    if let Some(aof) = aof.clone() {
        let containers = Arc::clone(&containers);
        let mut rewrite_shutdown = shutdown_rx.clone();
        let interval = Duration::from_secs(config.persistence.aof.rewrite_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let entries = aof::rewrite_entries(&containers);
                        if let Err(error) = aof.rewrite(entries) {
                            tracing::warn!(%error, "AOF rewrite failed");
                        } else {
                            tracing::info!("AOF rewrite complete");
                        }
                    }
                    _ = rewrite_shutdown.changed() => {
                        if *rewrite_shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        }));
    }

    let listener = TcpListener::bind(config.server.addr.as_str()).await?;
    tracing::info!(addr = %config.server.addr, "listening");

    let server = Arc::new(Server::new(
        ctx,
        Duration::from_secs(config.server.read_timeout_secs),
        Duration::from_secs(config.server.write_timeout_secs),
    ));
    let server_task = tokio::spawn(Arc::clone(&server).run(listener, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let shutdown_deadline = Duration::from_secs(config.server.shutdown_timeout_secs);

    if timeout(shutdown_deadline, async {
        for task in tasks {
            let _ = task.await;
        }
    })
    .await
    .is_err()
    {
        tracing::warn!("shutdown deadline elapsed with background tickers still running");
    }
    let _ = timeout(shutdown_deadline, server_task).await;
    server.join_connections(shutdown_deadline).await;

    if config.persistence.rdb.enabled {
        if let Err(error) = rdb.save(&containers) {
            tracing::warn!(%error, "final RDB snapshot failed");
        } else {
            tracing::info!("final RDB snapshot written");
        }
    }

    Ok(())
}

// ABOUTME: Live-session server binary serving WebSocket rooms and session reminders
// ABOUTME: Loads env config, migrates legacy references, then serves until Ctrl-C
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # FitPro Live Server Binary
//!
//! Startup order: configuration, logging, store (optionally seeded with demo
//! data), reference migration, scheduler, then the HTTP listener.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use fitpro_live::{
    auth::JwtAuthenticator,
    config::LiveConfig,
    email::{EmailSender, LogEmailSender, WebhookEmailSender},
    logging,
    service::LiveService,
    store::{seed::seed_demo_data, InMemorySessionStore},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fitpro-live-server")]
#[command(about = "FitPro live-session notifications and realtime connections")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Skip demo data seeding regardless of `SEED_DEMO_DATA`
    #[arg(long)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = LiveConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if args.no_seed {
        config.seed_demo_data = false;
    }

    logging::init_from_env()?;
    info!("Starting FitPro Live Server");
    info!("{}", config.summary());

    let store = Arc::new(InMemorySessionStore::new());
    if config.seed_demo_data {
        seed_demo_data(&store, Utc::now()).await;
    }

    let email: Arc<dyn EmailSender> = match &config.email_webhook_url {
        Some(url) => Arc::new(
            WebhookEmailSender::new(url.as_str()).context("Failed to build email webhook client")?,
        ),
        None => Arc::new(LogEmailSender),
    };
    let authenticator = Arc::new(JwtAuthenticator::new(config.jwt_secret.as_bytes()));
    let http_port = config.http_port;

    let service = Arc::new(LiveService::new(config, store, authenticator, email));
    let report = match service.start().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Startup migration failed; refusing to serve");
            return Err(e.into());
        }
    };
    info!(
        migrated = report.migrated,
        orphaned = report.orphaned.len(),
        "Reference migration finished"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    let served = axum::serve(listener, service.router())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.stop().await;
    served.context("HTTP server error")?;
    info!("FitPro Live Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

mod api;
mod cli;
mod config;
mod coordinator;
mod error;
mod prelude;
mod publisher;
mod quantity;
mod sensor;
mod snapshot;
mod tables;

use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command},
    prelude::*,
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::Watch(args) => args.run().await?,
        Command::Poll(args) => args.run().await?,
        Command::Profiles(args) => args.run().await?,
    }

    info!("done!");
    Ok(())
}

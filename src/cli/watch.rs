use clap::Parser;
use tokio::{signal, task::JoinSet};

use crate::{
    cli::{HomeAssistantArgs, InstanceArgs, TimingArgs, new_coordinator},
    prelude::*,
    publisher::{LogPublisher, Publisher},
};

#[derive(Parser)]
pub struct WatchArgs {
    #[clap(flatten)]
    pub instance: InstanceArgs,

    #[clap(flatten)]
    pub timing: TimingArgs,

    #[clap(flatten)]
    pub home_assistant: HomeAssistantArgs,
}

impl WatchArgs {
    /// Run every instance in its own task until interrupted.
    ///
    /// Fails only when all the instances have stopped.
    pub async fn run(self) -> Result {
        let instances = self.instance.instances()?;
        let n_instances = instances.len();

        let mut tasks = JoinSet::new();
        for instance in &instances {
            let mut publishers: Vec<Box<dyn Publisher>> = vec![Box::new(LogPublisher)];
            if let Some(home_assistant) = self.home_assistant.try_new_publisher()? {
                publishers.push(Box::new(home_assistant));
            }
            let coordinator = new_coordinator(&self.instance, instance, &self.timing, publishers)?;
            info!(instance = coordinator.name(), "starting…");
            tasks.spawn(coordinator.run(*self.timing.interval));
        }

        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    result.context("failed to listen for Ctrl-C")?;
                    info!("interrupted, stopping…");
                    return Ok(());
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => {
                        // The error is already logged by the instance.
                        let _ = joined.context("instance task failed")?;
                    }
                    None => break,
                },
            }
        }

        bail!("all {n_instances} instances have stopped")
    }
}

use clap::Parser;

use crate::{
    cli::{InstanceArgs, TimingArgs, new_coordinator},
    prelude::*,
    tables::build_sensors_table,
};

#[derive(Parser)]
pub struct PollArgs {
    #[clap(flatten)]
    pub instance: InstanceArgs,

    #[clap(flatten)]
    pub timing: TimingArgs,
}

impl PollArgs {
    pub async fn run(self) -> Result {
        let mut n_failed = 0_usize;
        for instance in self.instance.instances()? {
            let mut coordinator = new_coordinator(&self.instance, &instance, &self.timing, Vec::new())?;
            let result = match coordinator.setup().await {
                Ok(()) => coordinator.poll().await,
                Err(error) => Err(error),
            };
            if let Err(error) = result {
                error!(instance = %instance.name, "poll failed: {error}");
                n_failed += 1;
            }
            println!("{}", build_sensors_table(coordinator.sensors()));
        }
        ensure!(n_failed == 0, "{n_failed} poll(s) failed");
        Ok(())
    }
}

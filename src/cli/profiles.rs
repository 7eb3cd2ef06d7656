use clap::Parser;

use crate::{cli::InstanceArgs, prelude::*, tables::build_profiles_table};

#[derive(Parser)]
pub struct ProfilesArgs {
    #[clap(flatten)]
    pub instance: InstanceArgs,
}

impl ProfilesArgs {
    pub async fn run(self) -> Result {
        for instance in self.instance.instances()? {
            let profiles = self.instance.new_api(&instance)?.get_profiles().await?;
            println!("{}", build_profiles_table(&profiles));
        }
        Ok(())
    }
}

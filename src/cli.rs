mod poll;
mod profiles;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Url;

pub use self::{poll::PollArgs, profiles::ProfilesArgs, watch::WatchArgs};
use crate::{
    api::{Api, DEFAULT_BASE_URL},
    config::{self, InstanceConfig, RawInstance},
    coordinator::{Coordinator, DEFAULT_POLL_TIMEOUT},
    prelude::*,
    publisher::{Publisher, home_assistant::HomeAssistant},
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: poll the portal every interval until interrupted.
    #[clap(name = "watch")]
    Watch(Box<WatchArgs>),

    /// Poll once and print the sensors.
    #[clap(name = "poll")]
    Poll(Box<PollArgs>),

    /// List the contracts of the account.
    #[clap(name = "profiles")]
    Profiles(Box<ProfilesArgs>),
}

#[derive(Parser)]
pub struct InstanceArgs {
    /// TOML file with `[[instances]]` tables, for polling several accounts or contracts.
    #[clap(long = "instances", env = "GREENCHOICE_INSTANCES")]
    pub instances_path: Option<PathBuf>,

    #[clap(long, env = "GREENCHOICE_EMAIL")]
    pub email: Option<String>,

    /// Deprecated: use `--email`.
    #[clap(long, env = "GREENCHOICE_USERNAME")]
    pub username: Option<String>,

    #[clap(long, env = "GREENCHOICE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Sensor name prefix.
    #[clap(long, env = "GREENCHOICE_NAME")]
    pub name: Option<String>,

    /// Customer number of the contract to poll, defaults to the preferred contract.
    #[clap(long, env = "GREENCHOICE_CUSTOMER_NUMBER")]
    pub customer_number: Option<u64>,

    /// Agreement ID of the contract to poll, defaults to the preferred contract.
    #[clap(long, env = "GREENCHOICE_AGREEMENT_ID")]
    pub agreement_id: Option<u64>,

    #[clap(long, env = "GREENCHOICE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: Url,
}

impl InstanceArgs {
    /// Validated instances from the instances file and the flags.
    ///
    /// The flags make an instance on their own unless the instances file is given
    /// and no login is set on the command line.
    pub fn instances(&self) -> Result<Vec<InstanceConfig>> {
        let mut instances = match &self.instances_path {
            Some(path) => config::read_instances(path)?,
            None => Vec::new(),
        };
        if self.instances_path.is_none() || self.email.is_some() || self.username.is_some() {
            instances.push(RawInstance {
                email: self.email.clone(),
                username: self.username.clone(),
                password: self.password.clone(),
                name: self.name.clone(),
                customer_number: self.customer_number,
                agreement_id: self.agreement_id,
            });
        }
        config::validate(instances)
    }

    pub fn new_api(&self, instance: &InstanceConfig) -> Result<Api> {
        Api::try_new(self.base_url.clone(), instance.credentials.clone(), instance.selector)
    }
}

#[derive(Parser)]
pub struct TimingArgs {
    #[clap(long, env = "GREENCHOICE_INTERVAL", default_value = "1h")]
    pub interval: humantime::Duration,

    /// Abandon a poll that takes longer.
    #[clap(long, env = "GREENCHOICE_POLL_TIMEOUT", default_value = "2m")]
    pub poll_timeout: humantime::Duration,
}

#[derive(Parser)]
pub struct HomeAssistantArgs {
    /// Home Assistant API access token.
    #[clap(
        long = "home-assistant-access-token",
        env = "HOME_ASSISTANT_ACCESS_TOKEN",
        hide_env_values = true,
        requires = "api_base_url"
    )]
    pub access_token: Option<String>,

    /// Home Assistant API base URL. For example: `http://localhost:8123/api`.
    #[clap(
        long = "home-assistant-api-base-url",
        env = "HOME_ASSISTANT_API_BASE_URL",
        requires = "access_token"
    )]
    pub api_base_url: Option<Url>,
}

impl HomeAssistantArgs {
    pub fn try_new_publisher(&self) -> Result<Option<HomeAssistant>> {
        match (&self.access_token, &self.api_base_url) {
            (Some(access_token), Some(api_base_url)) => {
                Ok(Some(HomeAssistant::try_new(access_token, api_base_url.clone())?))
            }
            (None, None) => Ok(None),
            _ => bail!("both Home Assistant access token and base URL are required"),
        }
    }
}

fn new_coordinator(
    instance_args: &InstanceArgs,
    instance: &InstanceConfig,
    timing: &TimingArgs,
    publishers: Vec<Box<dyn Publisher>>,
) -> Result<Coordinator<Api>> {
    Ok(Coordinator::builder()
        .name(instance.name.clone())
        .source(instance_args.new_api(instance)?)
        .publishers(publishers)
        .poll_timeout(*timing.poll_timeout)
        .build())
}

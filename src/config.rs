//! Instance configuration.
//!
//! Both the command-line flags and the instances file end up as [`RawInstance`]s,
//! which are validated exactly once into immutable [`InstanceConfig`]s.

use std::{
    collections::HashSet,
    fmt::{Debug, Display, Formatter},
    fs,
    path::Path,
};

use serde::Deserialize;

use crate::{prelude::*, sensor::slugify};

pub const DEFAULT_NAME: &str = "Greenchoice";

#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Account email, or the username of legacy setups.
    pub login: String,

    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("login", &self.login).finish_non_exhaustive()
    }
}

/// Customer number and agreement ID of one of the account's contracts.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ContractSelector {
    pub customer_number: u64,
    pub agreement_id: u64,
}

impl Display for ContractSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.customer_number, self.agreement_id)
    }
}

#[must_use]
#[derive(Clone, Debug)]
pub struct InstanceConfig {
    /// Sensor name prefix.
    pub name: String,

    pub credentials: Credentials,

    /// Falls back to the account's preferred contract when absent.
    pub selector: Option<ContractSelector>,
}

/// Unvalidated instance as it comes from the flags or the instances file.
#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInstance {
    pub email: Option<String>,

    /// Legacy login name.
    pub username: Option<String>,

    pub password: Option<String>,

    pub name: Option<String>,

    /// Legacy setups used `0` for «not set».
    pub customer_number: Option<u64>,

    /// Legacy setups used `0` for «not set».
    pub agreement_id: Option<u64>,
}

impl RawInstance {
    pub fn validate(self) -> Result<InstanceConfig> {
        let name = self.name.filter(|name| !name.trim().is_empty());
        let name = name.unwrap_or_else(|| DEFAULT_NAME.to_string());

        let login = match (non_empty(self.email), non_empty(self.username)) {
            (Some(email), None) => email,
            (Some(email), Some(_)) => {
                warn!(instance = %name, "both email and username are set, using the email");
                email
            }
            (None, Some(username)) => {
                warn!(instance = %name, "username is deprecated, use email instead");
                username
            }
            (None, None) => bail!("`{name}`: an email is required"),
        };
        let Some(password) = non_empty(self.password) else {
            bail!("`{name}`: a password is required");
        };

        let selector = match (
            self.customer_number.filter(|number| *number != 0),
            self.agreement_id.filter(|id| *id != 0),
        ) {
            (Some(customer_number), Some(agreement_id)) => {
                Some(ContractSelector { customer_number, agreement_id })
            }
            (None, None) => None,
            (Some(_), None) => bail!("`{name}`: customer number is set, but agreement ID is not"),
            (None, Some(_)) => bail!("`{name}`: agreement ID is set, but customer number is not"),
        };

        Ok(InstanceConfig { name, credentials: Credentials { login, password }, selector })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InstancesFile {
    instances: Vec<RawInstance>,
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_instances(path: &Path) -> Result<Vec<RawInstance>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    let file: InstancesFile =
        toml::from_str(&contents).with_context(|| format!("failed to parse `{}`", path.display()))?;
    info!(n_instances = file.instances.len(), "read the instances");
    Ok(file.instances)
}

/// Validate all the instances at once.
///
/// Instance names prefix the entity IDs, so they must be unique.
pub fn validate(instances: Vec<RawInstance>) -> Result<Vec<InstanceConfig>> {
    ensure!(!instances.is_empty(), "no instances are configured");
    let instances = instances.into_iter().map(RawInstance::validate).collect::<Result<Vec<_>>>()?;
    let mut names = HashSet::new();
    for instance in &instances {
        let slug = slugify(&instance.name);
        ensure!(!slug.is_empty(), "instance name `{}` has no letters or digits", instance.name);
        ensure!(
            names.insert(slug),
            "instance name `{}` is used more than once",
            instance.name,
        );
    }
    Ok(instances)
}

//! Module identity.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// The `remote/owner/name` triple identifying a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleFullName {
    remote: String,
    owner: String,
    name: String,
}

impl ModuleFullName {
    /// Creates a module name, rejecting empty or slash-containing components
    pub fn new(remote: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let module = Self {
            remote: remote.into(),
            owner: owner.into(),
            name: name.into(),
        };
        let valid = [&module.remote, &module.owner, &module.name]
            .iter()
            .all(|part| !part.is_empty() && !part.contains('/'));
        if !valid {
            return Err(Error::InvalidModuleFullName {
                name: module.to_string(),
            });
        }
        Ok(module)
    }

    /// The registry host, e.g. `buf.build`
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// The owning user or organization
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The module name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModuleFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.remote, self.owner, self.name)
    }
}

impl FromStr for ModuleFullName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(remote), Some(owner), Some(name), None) => Self::new(remote, owner, name),
            _ => Err(Error::InvalidModuleFullName { name: s.to_string() }),
        }
    }
}

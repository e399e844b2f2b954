use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("{0} is not a valid id: {1}")]
    Invalid(&'static str, String),
}

/// Guild-wide role ids the team module wires into permission overlays. Loaded
/// once at startup; the mentor override is optional.
#[derive(Debug, Clone)]
pub struct RoleConfig {
    pub moderator_role_id: u64,
    pub mentor_role_id: Option<u64>,
    pub team_leader_role_id: u64,
}

fn required(name: &'static str) -> Result<u64, ConfigError> {
    let raw = std::env::var(name).map_err(|_| ConfigError::Missing(name))?;
    raw.parse().map_err(|_| ConfigError::Invalid(name, raw))
}

fn optional(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(None),
    }
}

impl RoleConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            moderator_role_id: required("MODERATOR_ROLE_ID")?,
            mentor_role_id: optional("MENTOR_ROLE_ID")?,
            team_leader_role_id: required("TEAM_LEADER_ROLE_ID")?,
        })
    }
}

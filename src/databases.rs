use crate::database::Database;
use crate::modules::team::database::TeamDatabase;

#[derive(Debug)]
pub struct Databases {
    pub teams: Database<TeamDatabase>,
}

impl Databases {
    pub async fn default() -> Result<Self, crate::database::DbError> {
        Ok(Self {
            teams: Database::new("data/teams.db").await?,
        })
    }
}

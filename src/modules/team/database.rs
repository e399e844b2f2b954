use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::database::{Database, DbError};

pub const TEAM_SIZE: usize = 4;

/// A guild user the registry has seen participate in a team. Rows are
/// upserted on first participation and never removed; a disband only orphans
/// them so they can join another team later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub leader_id: u64,
    /// Exactly [`TEAM_SIZE`] distinct ids, leader included.
    pub member_ids: Vec<u64>,
    pub role_id: u64,
    pub category_id: u64,
}

#[derive(Default, Serialize, Deserialize, Clone, Debug)]
pub struct TeamDatabase {
    /// Keyed by team name; names are globally unique.
    pub teams: HashMap<String, Team>,
    pub members: HashMap<u64, Member>,
}

impl TeamDatabase {
    pub fn team_of(&self, user_id: u64) -> Option<&Team> {
        self.teams.values().find(|t| t.member_ids.contains(&user_id))
    }
}

/// Commit-time failures. Uniqueness is re-validated inside the write closure,
/// so these fire even when a racing writer slipped past the orchestrator's
/// earlier validation pass.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("team name {0} is already taken")]
    NameTaken(String),
    #[error("member {member_id} already belongs to team {team}")]
    MemberTaken { member_id: u64, team: String },
    #[error(transparent)]
    Store(#[from] DbError),
}

pub type TeamHandler = Database<TeamDatabase>;

impl TeamHandler {
    pub async fn find_member(&self, user_id: u64) -> Option<Member> {
        self.read(|db| db.members.get(&user_id).cloned()).await
    }

    pub async fn find_team_by_name(&self, name: &str) -> Option<Team> {
        self.read(|db| db.teams.get(name).cloned()).await
    }

    pub async fn find_team_by_member(&self, user_id: u64) -> Option<Team> {
        self.read(|db| db.team_of(user_id).cloned()).await
    }

    /// Upserts every participant row and inserts the team in one write, so a
    /// team never points at members the registry does not know. Name and
    /// membership uniqueness are checked again here; the in-memory state and
    /// the file stay untouched when either check fails.
    pub async fn insert_team(&self, team: Team, members: Vec<Member>) -> Result<(), RegistryError> {
        let outcome = self
            .write(|db| {
                if db.teams.contains_key(&team.name) {
                    return Ok(Some(RegistryError::NameTaken(team.name.clone())));
                }
                for id in &team.member_ids {
                    if let Some(existing) = db.team_of(*id) {
                        return Ok(Some(RegistryError::MemberTaken {
                            member_id: *id,
                            team: existing.name.clone(),
                        }));
                    }
                }
                for member in members {
                    db.members.entry(member.id).or_insert(member);
                }
                db.teams.insert(team.name.clone(), team);
                Ok(None)
            })
            .await?;

        match outcome {
            Some(conflict) => Err(conflict),
            None => Ok(()),
        }
    }

    pub async fn delete_team(&self, name: &str) -> Result<Option<Team>, RegistryError> {
        let removed = self
            .write(|db| Ok(db.teams.remove(name)))
            .await?;
        Ok(removed)
    }
}

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::RoleConfig;
use crate::modules::team::database::{Member, RegistryError, Team, TeamHandler, TEAM_SIZE};
use crate::modules::team::provision::{
    ChannelKind, GuildDirectory, Overlay, OverlayActor, ProvisionError, Provisioner,
};
use poise::serenity_prelude::Permissions;

/// A participant that could not join because it already belongs to a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamConflict {
    pub member_id: u64,
    pub team: String,
}

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("one or more members are not in the server")]
    ParticipantNotFound,
    #[error("a team needs {TEAM_SIZE} unique members")]
    DuplicateParticipants,
    #[error("requester is already in team {0}")]
    RequesterAlreadyTeamed(String),
    #[error("{0:?} already belong to a team")]
    ParticipantsAlreadyTeamed(Vec<TeamConflict>),
    #[error("the team name {0} is already taken")]
    NameTaken(String),
    #[error("resource provisioning failed: {0}")]
    ResourceProvisioningFailed(#[from] ProvisionError),
    #[error("registry write failed: {0}")]
    RegistryWriteFailed(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("not in a team")]
    NotInTeam { target_is_requester: bool },
    #[error("team {0} does not exist")]
    TeamNotFound(String),
    #[error("this operation is only available inside a server")]
    GuildContextMissing,
}

/// What a successful create or view hands back: the leader first, then the
/// remaining members in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSummary {
    pub name: String,
    pub leader_id: u64,
    pub member_ids: Vec<u64>,
}

impl TeamSummary {
    fn from_team(team: &Team) -> Self {
        Self {
            name: team.name.clone(),
            leader_id: team.leader_id,
            member_ids: team
                .member_ids
                .iter()
                .copied()
                .filter(|id| *id != team.leader_id)
                .collect(),
        }
    }
}

/// Sequences one team operation across the guild directory, the platform
/// provisioner and the registry. Each operation is one strictly ordered unit
/// of work; create and disband additionally serialize through `gate` so two
/// racing mutations cannot interleave their validation and commit phases.
pub struct TeamOrchestrator<'a, D, P> {
    guild_id: u64,
    directory: &'a D,
    provisioner: &'a P,
    registry: &'a TeamHandler,
    roles: &'a RoleConfig,
    gate: &'a Mutex<()>,
}

impl<'a, D: GuildDirectory, P: Provisioner> TeamOrchestrator<'a, D, P> {
    pub fn new(
        guild_id: u64,
        directory: &'a D,
        provisioner: &'a P,
        registry: &'a TeamHandler,
        roles: &'a RoleConfig,
        gate: &'a Mutex<()>,
    ) -> Self {
        Self {
            guild_id,
            directory,
            provisioner,
            registry,
            roles,
            gate,
        }
    }

    pub async fn create(
        &self,
        requester_id: u64,
        team_name: &str,
        other_ids: [u64; TEAM_SIZE - 1],
    ) -> Result<TeamSummary, TeamError> {
        let mut participant_ids = vec![requester_id];
        participant_ids.extend_from_slice(&other_ids);

        let mut participants = Vec::with_capacity(TEAM_SIZE);
        for id in &participant_ids {
            match self.directory.resolve_member(*id).await {
                Some(member) => participants.push(member),
                None => return Err(TeamError::ParticipantNotFound),
            }
        }

        let distinct: HashSet<u64> = participant_ids.iter().copied().collect();
        if distinct.len() != participant_ids.len() {
            return Err(TeamError::DuplicateParticipants);
        }

        let _guard = self.gate.lock().await;

        if let Some(team) = self.registry.find_team_by_member(requester_id).await {
            return Err(TeamError::RequesterAlreadyTeamed(team.name));
        }

        if self.registry.find_team_by_name(team_name).await.is_some() {
            return Err(TeamError::NameTaken(team_name.to_string()));
        }

        // Every already-teamed participant is reported, not just the first.
        let mut conflicts = Vec::new();
        for id in &participant_ids {
            if let Some(team) = self.registry.find_team_by_member(*id).await {
                conflicts.push(TeamConflict {
                    member_id: *id,
                    team: team.name,
                });
            }
        }
        if !conflicts.is_empty() {
            return Err(TeamError::ParticipantsAlreadyTeamed(conflicts));
        }

        let role_id = self.provisioner.create_role(team_name).await?;

        let provisioned = self
            .provision_after_role(team_name, requester_id, &participant_ids, role_id)
            .await;
        let category_id = match provisioned {
            Ok(category_id) => category_id,
            Err(e) => {
                // Chosen policy for the half-provisioned state: compensate by
                // removing the role and the leader privilege before surfacing
                // the failure. Revoking a never-granted role is a no-op.
                if let Err(cleanup) = self.provisioner.delete_role(role_id).await {
                    warn!(
                        guild_id = self.guild_id,
                        role_id, "failed to clean up team role after aborted create: {cleanup}"
                    );
                }
                if let Err(cleanup) = self
                    .provisioner
                    .revoke_privilege(requester_id, self.roles.team_leader_role_id)
                    .await
                {
                    warn!(
                        guild_id = self.guild_id,
                        leader = requester_id,
                        "failed to remove leader role after aborted create: {cleanup}"
                    );
                }
                return Err(TeamError::ResourceProvisioningFailed(e));
            }
        };

        let team = Team {
            name: team_name.to_string(),
            leader_id: requester_id,
            member_ids: participant_ids,
            role_id,
            category_id,
        };
        let members = participants
            .into_iter()
            .map(|m| Member {
                id: m.id,
                username: m.username,
            })
            .collect();

        match self.registry.insert_team(team.clone(), members).await {
            Ok(()) => {}
            // A racing create slipped past validation; the registry's own
            // uniqueness checks are the backstop. Resources provisioned for
            // the loser are orphaned and logged for operator follow-up.
            Err(RegistryError::NameTaken(name)) => {
                warn!(
                    guild_id = self.guild_id,
                    role_id, category_id, "create lost a race on team name {name}"
                );
                return Err(TeamError::NameTaken(name));
            }
            Err(RegistryError::MemberTaken { member_id, team }) => {
                warn!(
                    guild_id = self.guild_id,
                    role_id, category_id, "create lost a race on member {member_id}"
                );
                return Err(TeamError::ParticipantsAlreadyTeamed(vec![TeamConflict {
                    member_id,
                    team,
                }]));
            }
            Err(RegistryError::Store(e)) => {
                // Role and category now exist without a registry row. Left in
                // place for operator follow-up.
                error!(
                    guild_id = self.guild_id,
                    role_id, category_id, "registry write failed after provisioning: {e}"
                );
                return Err(TeamError::RegistryWriteFailed(e.to_string()));
            }
        }

        info!(
            guild_id = self.guild_id,
            team = team_name,
            leader = requester_id,
            "team created"
        );
        Ok(TeamSummary::from_team(&team))
    }

    /// Everything between role creation and the registry write. A failure
    /// anywhere here bubbles up to `create`, which owns the role cleanup.
    async fn provision_after_role(
        &self,
        team_name: &str,
        leader_id: u64,
        participant_ids: &[u64],
        role_id: u64,
    ) -> Result<u64, ProvisionError> {
        for id in participant_ids {
            self.provisioner.assign_role(role_id, *id).await?;
        }
        self.provisioner
            .grant_privilege(leader_id, self.roles.team_leader_role_id)
            .await?;

        let overlays = self.category_overlays(leader_id, role_id);
        let category_id = self
            .provisioner
            .create_channel_group(team_name, &overlays)
            .await?;
        self.provisioner
            .create_channel(category_id, team_name, ChannelKind::Text)
            .await?;
        self.provisioner
            .create_channel(category_id, team_name, ChannelKind::Voice)
            .await?;
        Ok(category_id)
    }

    fn category_overlays(&self, leader_id: u64, team_role_id: u64) -> Vec<Overlay> {
        let mut overlays = vec![Overlay {
            actor: OverlayActor::Role(self.roles.moderator_role_id),
            allow: Permissions::MANAGE_CHANNELS
                | Permissions::MANAGE_ROLES
                | Permissions::VIEW_CHANNEL
                | Permissions::MANAGE_MESSAGES
                | Permissions::MENTION_EVERYONE
                | Permissions::MANAGE_THREADS,
            deny: Permissions::empty(),
        }];

        if let Some(mentor_role_id) = self.roles.mentor_role_id {
            overlays.push(Overlay {
                actor: OverlayActor::Role(mentor_role_id),
                allow: Permissions::VIEW_CHANNEL
                    | Permissions::MENTION_EVERYONE
                    | Permissions::MANAGE_THREADS,
                deny: Permissions::empty(),
            });
        }

        overlays.push(Overlay {
            actor: OverlayActor::Member(leader_id),
            allow: Permissions::MANAGE_CHANNELS
                | Permissions::VIEW_CHANNEL
                | Permissions::USE_EMBEDDED_ACTIVITIES
                | Permissions::READ_MESSAGE_HISTORY
                | Permissions::MENTION_EVERYONE
                | Permissions::MANAGE_THREADS
                | Permissions::CREATE_PUBLIC_THREADS
                | Permissions::CREATE_PRIVATE_THREADS,
            deny: Permissions::CREATE_INSTANT_INVITE
                | Permissions::USE_EXTERNAL_EMOJIS
                | Permissions::USE_EXTERNAL_STICKERS,
        });

        overlays.push(Overlay {
            actor: OverlayActor::Role(team_role_id),
            allow: Permissions::VIEW_CHANNEL
                | Permissions::USE_EMBEDDED_ACTIVITIES
                | Permissions::READ_MESSAGE_HISTORY
                | Permissions::CREATE_PUBLIC_THREADS
                | Permissions::CREATE_PRIVATE_THREADS,
            deny: Permissions::CREATE_INSTANT_INVITE
                | Permissions::USE_EXTERNAL_EMOJIS
                | Permissions::USE_EXTERNAL_STICKERS
                | Permissions::MENTION_EVERYONE,
        });

        // @everyone shares the guild's id.
        overlays.push(Overlay {
            actor: OverlayActor::Role(self.guild_id),
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL | Permissions::MENTION_EVERYONE,
        });

        overlays
    }

    pub async fn view(
        &self,
        requester_id: u64,
        target_id: Option<u64>,
    ) -> Result<TeamSummary, TeamError> {
        let target_id = target_id.unwrap_or(requester_id);
        let target_is_requester = target_id == requester_id;

        if !target_is_requester && !self.directory.has_manage_guild(requester_id).await {
            return Err(TeamError::PermissionDenied);
        }

        match self.registry.find_team_by_member(target_id).await {
            Some(team) => Ok(TeamSummary::from_team(&team)),
            None => Err(TeamError::NotInTeam {
                target_is_requester,
            }),
        }
    }

    pub async fn disband(&self, requester_id: u64, team_name: &str) -> Result<(), TeamError> {
        if !self.directory.has_manage_guild(requester_id).await {
            return Err(TeamError::PermissionDenied);
        }

        let _guard = self.gate.lock().await;

        let team = self
            .registry
            .find_team_by_name(team_name)
            .await
            .ok_or_else(|| TeamError::TeamNotFound(team_name.to_string()))?;

        // The registry decides whether the team exists; missing platform
        // resources are tolerated so a half-torn-down team can still be
        // disbanded.
        for channel_id in self
            .directory
            .channel_group_children(team.category_id)
            .await
        {
            if let Err(e) = self.provisioner.delete_channel(channel_id).await {
                warn!(team = team_name, channel_id, "failed to delete channel: {e}");
            }
        }
        if let Err(e) = self.provisioner.delete_channel_group(team.category_id).await {
            warn!(
                team = team_name,
                category_id = team.category_id,
                "failed to delete category: {e}"
            );
        }
        if let Err(e) = self.provisioner.delete_role(team.role_id).await {
            warn!(
                team = team_name,
                role_id = team.role_id,
                "failed to delete role: {e}"
            );
        }
        if let Err(e) = self
            .provisioner
            .revoke_privilege(team.leader_id, self.roles.team_leader_role_id)
            .await
        {
            warn!(
                team = team_name,
                leader = team.leader_id,
                "failed to remove leader role: {e}"
            );
        }

        match self.registry.delete_team(team_name).await {
            Ok(_) => {
                info!(guild_id = self.guild_id, team = team_name, "team disbanded");
                Ok(())
            }
            Err(e) => {
                // Resources are already gone; the stale row needs operator
                // attention, not a retry.
                error!(
                    guild_id = self.guild_id,
                    team = team_name,
                    "registry delete failed after resource teardown: {e}"
                );
                Err(TeamError::RegistryWriteFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::modules::team::provision::ResolvedMember;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    const GUILD: u64 = 500;
    const LEADER: u64 = 1;
    const OTHERS: [u64; 3] = [2, 3, 4];
    const ADMIN: u64 = 99;

    #[derive(Default)]
    struct PlatformState {
        next_id: u64,
        roles: HashMap<u64, String>,
        role_members: HashMap<u64, Vec<u64>>,
        groups: HashMap<u64, String>,
        channels: HashMap<u64, (u64, ChannelKind)>,
        privileges: Vec<(u64, u64)>,
    }

    /// In-memory stand-in for both the guild directory and the platform
    /// provisioner, with switches to make individual calls fail.
    struct FakePlatform {
        members: HashMap<u64, String>,
        managers: Vec<u64>,
        state: StdMutex<PlatformState>,
        fail_create_role: AtomicBool,
        fail_create_group: AtomicBool,
        fail_delete_role: AtomicBool,
    }

    impl FakePlatform {
        fn new() -> Self {
            let mut members = HashMap::new();
            for id in [LEADER, OTHERS[0], OTHERS[1], OTHERS[2], ADMIN, 5, 6, 7] {
                members.insert(id, format!("user{id}"));
            }
            Self {
                members,
                managers: vec![ADMIN],
                state: StdMutex::new(PlatformState::default()),
                fail_create_role: AtomicBool::new(false),
                fail_create_group: AtomicBool::new(false),
                fail_delete_role: AtomicBool::new(false),
            }
        }

        fn role_count(&self) -> usize {
            self.state.lock().unwrap().roles.len()
        }

        fn group_count(&self) -> usize {
            self.state.lock().unwrap().groups.len()
        }

        fn channel_count(&self) -> usize {
            self.state.lock().unwrap().channels.len()
        }

        fn has_privilege(&self, user_id: u64, role_id: u64) -> bool {
            self.state
                .lock()
                .unwrap()
                .privileges
                .contains(&(user_id, role_id))
        }

        fn members_of_role(&self, role_id: u64) -> Vec<u64> {
            self.state
                .lock()
                .unwrap()
                .role_members
                .get(&role_id)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Provisioner for FakePlatform {
        async fn create_role(&self, name: &str) -> Result<u64, ProvisionError> {
            if self.fail_create_role.load(Ordering::SeqCst) {
                return Err(ProvisionError("role creation refused".into()));
            }
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = state.next_id;
            state.roles.insert(id, name.to_string());
            Ok(id)
        }

        async fn assign_role(&self, role_id: u64, user_id: u64) -> Result<(), ProvisionError> {
            let mut state = self.state.lock().unwrap();
            if !state.roles.contains_key(&role_id) {
                return Err(ProvisionError("unknown role".into()));
            }
            state.role_members.entry(role_id).or_default().push(user_id);
            Ok(())
        }

        async fn grant_privilege(&self, user_id: u64, role_id: u64) -> Result<(), ProvisionError> {
            self.state.lock().unwrap().privileges.push((user_id, role_id));
            Ok(())
        }

        async fn revoke_privilege(&self, user_id: u64, role_id: u64) -> Result<(), ProvisionError> {
            self.state
                .lock()
                .unwrap()
                .privileges
                .retain(|entry| *entry != (user_id, role_id));
            Ok(())
        }

        async fn create_channel_group(
            &self,
            name: &str,
            _overlays: &[Overlay],
        ) -> Result<u64, ProvisionError> {
            if self.fail_create_group.load(Ordering::SeqCst) {
                return Err(ProvisionError("category creation refused".into()));
            }
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = state.next_id;
            state.groups.insert(id, name.to_string());
            Ok(id)
        }

        async fn create_channel(
            &self,
            group_id: u64,
            _name: &str,
            kind: ChannelKind,
        ) -> Result<u64, ProvisionError> {
            let mut state = self.state.lock().unwrap();
            if !state.groups.contains_key(&group_id) {
                return Err(ProvisionError("unknown category".into()));
            }
            state.next_id += 1;
            let id = state.next_id;
            state.channels.insert(id, (group_id, kind));
            Ok(id)
        }

        async fn delete_channel(&self, channel_id: u64) -> Result<(), ProvisionError> {
            match self.state.lock().unwrap().channels.remove(&channel_id) {
                Some(_) => Ok(()),
                None => Err(ProvisionError("unknown channel".into())),
            }
        }

        async fn delete_channel_group(&self, group_id: u64) -> Result<(), ProvisionError> {
            match self.state.lock().unwrap().groups.remove(&group_id) {
                Some(_) => Ok(()),
                None => Err(ProvisionError("unknown category".into())),
            }
        }

        async fn delete_role(&self, role_id: u64) -> Result<(), ProvisionError> {
            if self.fail_delete_role.load(Ordering::SeqCst) {
                return Err(ProvisionError("role deletion refused".into()));
            }
            let mut state = self.state.lock().unwrap();
            state.role_members.remove(&role_id);
            match state.roles.remove(&role_id) {
                Some(_) => Ok(()),
                None => Err(ProvisionError("unknown role".into())),
            }
        }
    }

    #[async_trait]
    impl GuildDirectory for FakePlatform {
        async fn resolve_member(&self, user_id: u64) -> Option<ResolvedMember> {
            self.members.get(&user_id).map(|username| ResolvedMember {
                id: user_id,
                username: username.clone(),
            })
        }

        async fn has_manage_guild(&self, user_id: u64) -> bool {
            self.managers.contains(&user_id)
        }

        async fn channel_group_children(&self, group_id: u64) -> Vec<u64> {
            self.state
                .lock()
                .unwrap()
                .channels
                .iter()
                .filter(|(_, (parent, _))| *parent == group_id)
                .map(|(id, _)| *id)
                .collect()
        }
    }

    async fn fresh_registry(tag: &str) -> TeamHandler {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let path = std::env::temp_dir().join(format!(
            "teambot-test-{}-{}-{}.db",
            std::process::id(),
            tag,
            SEQ.fetch_add(1, Ordering::SeqCst),
        ));
        let _ = std::fs::remove_file(&path);
        Database::new(path.to_string_lossy().into_owned())
            .await
            .unwrap()
    }

    fn roles() -> RoleConfig {
        RoleConfig {
            moderator_role_id: 9001,
            mentor_role_id: Some(9002),
            team_leader_role_id: 9003,
        }
    }

    fn orchestrator<'a>(
        platform: &'a FakePlatform,
        registry: &'a TeamHandler,
        roles: &'a RoleConfig,
        gate: &'a Mutex<()>,
    ) -> TeamOrchestrator<'a, FakePlatform, FakePlatform> {
        TeamOrchestrator::new(GUILD, platform, platform, registry, roles, gate)
    }

    #[tokio::test]
    async fn create_provisions_everything_and_is_viewable_by_all_members() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("create-ok").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        let summary = orch.create(LEADER, "rustaceans", OTHERS).await.unwrap();
        assert_eq!(summary.name, "rustaceans");
        assert_eq!(summary.leader_id, LEADER);
        assert_eq!(summary.member_ids, OTHERS.to_vec());

        let team = registry.find_team_by_name("rustaceans").await.unwrap();
        assert_eq!(team.member_ids.len(), TEAM_SIZE);
        for id in &team.member_ids {
            let row = registry.find_member(*id).await.unwrap();
            assert_eq!(row.username, format!("user{id}"));
        }
        assert_eq!(platform.members_of_role(team.role_id).len(), TEAM_SIZE);
        assert!(platform.has_privilege(LEADER, roles.team_leader_role_id));
        assert_eq!(platform.group_count(), 1);
        // One text and one voice channel under the category.
        let children = platform.channel_group_children(team.category_id).await;
        assert_eq!(children.len(), 2);

        for id in [LEADER, OTHERS[0], OTHERS[1], OTHERS[2]] {
            let view = orch.view(id, None).await.unwrap();
            assert_eq!(view.name, "rustaceans");
            assert_eq!(view.leader_id, LEADER);
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_participants() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("unknown").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        let err = orch.create(LEADER, "ghosts", [2, 3, 12345]).await.unwrap_err();
        assert!(matches!(err, TeamError::ParticipantNotFound));
        assert_eq!(platform.role_count(), 0);
    }

    #[tokio::test]
    async fn create_rejects_duplicates_anywhere_in_the_roster() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("dups").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        for dup in [[LEADER, 3, 4], [2, 2, 4], [2, 3, 3], [2, 3, 2]] {
            let err = orch.create(LEADER, "dups", dup).await.unwrap_err();
            assert!(matches!(err, TeamError::DuplicateParticipants));
        }
        assert_eq!(platform.role_count(), 0);
    }

    #[tokio::test]
    async fn create_reports_requester_conflict_and_taken_name() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("conflicts").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        orch.create(LEADER, "first", OTHERS).await.unwrap();

        let err = orch.create(LEADER, "second", [5, 6, 7]).await.unwrap_err();
        match err {
            TeamError::RequesterAlreadyTeamed(name) => assert_eq!(name, "first"),
            other => panic!("unexpected {other:?}"),
        }

        let err = orch.create(5, "first", [6, 7, ADMIN]).await.unwrap_err();
        match err {
            TeamError::NameTaken(name) => assert_eq!(name, "first"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_lists_every_already_teamed_participant() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("teamed").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        orch.create(LEADER, "first", OTHERS).await.unwrap();

        // 2 and 4 are both taken; both must appear in the failure.
        let err = orch.create(5, "second", [2, 6, 4]).await.unwrap_err();
        match err {
            TeamError::ParticipantsAlreadyTeamed(conflicts) => {
                let ids: Vec<u64> = conflicts.iter().map(|c| c.member_id).collect();
                assert_eq!(ids, vec![2, 4]);
                assert!(conflicts.iter().all(|c| c.team == "first"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_aborts_cleanly_when_role_creation_fails() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("role-fail").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        platform.fail_create_role.store(true, Ordering::SeqCst);
        let err = orch.create(LEADER, "doomed", OTHERS).await.unwrap_err();
        assert!(matches!(err, TeamError::ResourceProvisioningFailed(_)));

        assert!(registry.find_team_by_name("doomed").await.is_none());
        assert_eq!(platform.role_count(), 0);
        assert_eq!(platform.group_count(), 0);
    }

    #[tokio::test]
    async fn create_compensates_the_role_when_category_creation_fails() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("group-fail").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        platform.fail_create_group.store(true, Ordering::SeqCst);
        let err = orch.create(LEADER, "doomed", OTHERS).await.unwrap_err();
        assert!(matches!(err, TeamError::ResourceProvisioningFailed(_)));

        assert!(registry.find_team_by_name("doomed").await.is_none());
        assert_eq!(platform.role_count(), 0);
        assert_eq!(platform.group_count(), 0);
        assert!(!platform.has_privilege(LEADER, roles.team_leader_role_id));
    }

    #[tokio::test]
    async fn failed_compensation_still_surfaces_the_original_error() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("comp-fail").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        platform.fail_create_group.store(true, Ordering::SeqCst);
        platform.fail_delete_role.store(true, Ordering::SeqCst);
        let err = orch.create(LEADER, "doomed", OTHERS).await.unwrap_err();
        assert!(matches!(err, TeamError::ResourceProvisioningFailed(_)));

        // The orphaned role stays behind; only the registry is guaranteed clean.
        assert_eq!(platform.role_count(), 1);
        assert!(registry.find_team_by_name("doomed").await.is_none());
    }

    #[tokio::test]
    async fn view_distinguishes_self_other_and_privilege() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("view").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        orch.create(LEADER, "viewers", OTHERS).await.unwrap();

        let err = orch.view(5, None).await.unwrap_err();
        assert!(matches!(
            err,
            TeamError::NotInTeam {
                target_is_requester: true
            }
        ));

        // Peeking at someone else needs the management privilege, teamed or not.
        let err = orch.view(5, Some(LEADER)).await.unwrap_err();
        assert!(matches!(err, TeamError::PermissionDenied));
        let err = orch.view(5, Some(6)).await.unwrap_err();
        assert!(matches!(err, TeamError::PermissionDenied));

        let view = orch.view(ADMIN, Some(OTHERS[1])).await.unwrap();
        assert_eq!(view.name, "viewers");

        let err = orch.view(ADMIN, Some(5)).await.unwrap_err();
        assert!(matches!(
            err,
            TeamError::NotInTeam {
                target_is_requester: false
            }
        ));
    }

    #[tokio::test]
    async fn disband_requires_privilege_and_an_existing_team() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("disband-auth").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        orch.create(LEADER, "squad", OTHERS).await.unwrap();

        let err = orch.disband(LEADER, "squad").await.unwrap_err();
        assert!(matches!(err, TeamError::PermissionDenied));

        let err = orch.disband(ADMIN, "nosuch").await.unwrap_err();
        match err {
            TeamError::TeamNotFound(name) => assert_eq!(name, "nosuch"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn disband_tears_down_resources_and_frees_members() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("disband-ok").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        orch.create(LEADER, "squad", OTHERS).await.unwrap();
        orch.disband(ADMIN, "squad").await.unwrap();

        assert!(registry.find_team_by_name("squad").await.is_none());
        assert_eq!(platform.role_count(), 0);
        assert_eq!(platform.group_count(), 0);
        assert_eq!(platform.channel_count(), 0);
        assert!(!platform.has_privilege(LEADER, roles.team_leader_role_id));

        // All four are immediately free to regroup.
        orch.create(OTHERS[0], "squad", [LEADER, OTHERS[1], OTHERS[2]])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disband_twice_reports_team_not_found() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("disband-twice").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        orch.create(LEADER, "squad", OTHERS).await.unwrap();
        orch.disband(ADMIN, "squad").await.unwrap();

        let err = orch.disband(ADMIN, "squad").await.unwrap_err();
        assert!(matches!(err, TeamError::TeamNotFound(_)));
    }

    #[tokio::test]
    async fn disband_tolerates_already_deleted_resources() {
        let platform = FakePlatform::new();
        let registry = fresh_registry("disband-gone").await;
        let roles = roles();
        let gate = Mutex::new(());
        let orch = orchestrator(&platform, &registry, &roles, &gate);

        orch.create(LEADER, "squad", OTHERS).await.unwrap();
        let team = registry.find_team_by_name("squad").await.unwrap();

        // Someone deleted the role and category out from under us.
        platform.delete_role(team.role_id).await.unwrap();
        for channel_id in platform.channel_group_children(team.category_id).await {
            platform.delete_channel(channel_id).await.unwrap();
        }
        platform.delete_channel_group(team.category_id).await.unwrap();

        orch.disband(ADMIN, "squad").await.unwrap();
        assert!(registry.find_team_by_name("squad").await.is_none());
    }
}

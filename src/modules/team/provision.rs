use async_trait::async_trait;
use poise::serenity_prelude::{
    ChannelType, CreateChannel, EditRole, GuildId, Http, Permissions, PermissionOverwrite,
    PermissionOverwriteType, RoleId, UserId,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("platform request failed: {0}")]
pub struct ProvisionError(pub String);

impl From<poise::serenity_prelude::Error> for ProvisionError {
    fn from(e: poise::serenity_prelude::Error) -> Self {
        ProvisionError(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayActor {
    Role(u64),
    Member(u64),
}

/// One permission overwrite on the team category: an actor plus the flags it
/// is granted or denied there.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub actor: OverlayActor,
    pub allow: Permissions,
    pub deny: Permissions,
}

/// Platform-side resource lifecycle for a team: one role, one category with
/// overlays, channels inside it. Every call can fail independently; retry and
/// rollback policy live with the caller.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_role(&self, name: &str) -> Result<u64, ProvisionError>;
    async fn assign_role(&self, role_id: u64, user_id: u64) -> Result<(), ProvisionError>;
    async fn grant_privilege(&self, user_id: u64, role_id: u64) -> Result<(), ProvisionError>;
    async fn revoke_privilege(&self, user_id: u64, role_id: u64) -> Result<(), ProvisionError>;
    async fn create_channel_group(
        &self,
        name: &str,
        overlays: &[Overlay],
    ) -> Result<u64, ProvisionError>;
    async fn create_channel(
        &self,
        group_id: u64,
        name: &str,
        kind: ChannelKind,
    ) -> Result<u64, ProvisionError>;
    async fn delete_channel(&self, channel_id: u64) -> Result<(), ProvisionError>;
    async fn delete_channel_group(&self, group_id: u64) -> Result<(), ProvisionError>;
    async fn delete_role(&self, role_id: u64) -> Result<(), ProvisionError>;
}

/// Guild-membership queries the orchestrator needs: presence, the broad
/// management privilege, and the live children of a category.
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    async fn resolve_member(&self, user_id: u64) -> Option<ResolvedMember>;
    async fn has_manage_guild(&self, user_id: u64) -> bool;
    async fn channel_group_children(&self, group_id: u64) -> Vec<u64>;
}

#[derive(Debug, Clone)]
pub struct ResolvedMember {
    pub id: u64,
    pub username: String,
}

pub struct DiscordProvisioner {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl DiscordProvisioner {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Self {
        Self { http, guild_id }
    }
}

fn to_overwrite(overlay: &Overlay) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: overlay.allow,
        deny: overlay.deny,
        kind: match overlay.actor {
            OverlayActor::Role(id) => PermissionOverwriteType::Role(RoleId::new(id)),
            OverlayActor::Member(id) => PermissionOverwriteType::Member(UserId::new(id)),
        },
    }
}

#[async_trait]
impl Provisioner for DiscordProvisioner {
    async fn create_role(&self, name: &str) -> Result<u64, ProvisionError> {
        let role = self
            .guild_id
            .create_role(&self.http, EditRole::new().name(name).mentionable(true))
            .await?;
        Ok(role.id.get())
    }

    async fn assign_role(&self, role_id: u64, user_id: u64) -> Result<(), ProvisionError> {
        self.http
            .add_member_role(
                self.guild_id,
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("team membership"),
            )
            .await?;
        Ok(())
    }

    async fn grant_privilege(&self, user_id: u64, role_id: u64) -> Result<(), ProvisionError> {
        self.http
            .add_member_role(
                self.guild_id,
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("team leadership"),
            )
            .await?;
        Ok(())
    }

    async fn revoke_privilege(&self, user_id: u64, role_id: u64) -> Result<(), ProvisionError> {
        self.http
            .remove_member_role(
                self.guild_id,
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("team disbanded"),
            )
            .await?;
        Ok(())
    }

    async fn create_channel_group(
        &self,
        name: &str,
        overlays: &[Overlay],
    ) -> Result<u64, ProvisionError> {
        let overwrites: Vec<_> = overlays.iter().map(to_overwrite).collect();
        let category = self
            .guild_id
            .create_channel(
                &self.http,
                CreateChannel::new(name)
                    .kind(ChannelType::Category)
                    .permissions(overwrites),
            )
            .await?;
        Ok(category.id.get())
    }

    async fn create_channel(
        &self,
        group_id: u64,
        name: &str,
        kind: ChannelKind,
    ) -> Result<u64, ProvisionError> {
        let kind = match kind {
            ChannelKind::Text => ChannelType::Text,
            ChannelKind::Voice => ChannelType::Voice,
        };
        let channel = self
            .guild_id
            .create_channel(
                &self.http,
                CreateChannel::new(name).kind(kind).category(group_id),
            )
            .await?;
        Ok(channel.id.get())
    }

    async fn delete_channel(&self, channel_id: u64) -> Result<(), ProvisionError> {
        self.http
            .delete_channel(channel_id.into(), Some("team disbanded"))
            .await?;
        Ok(())
    }

    async fn delete_channel_group(&self, group_id: u64) -> Result<(), ProvisionError> {
        self.http
            .delete_channel(group_id.into(), Some("team disbanded"))
            .await?;
        Ok(())
    }

    async fn delete_role(&self, role_id: u64) -> Result<(), ProvisionError> {
        self.guild_id
            .delete_role(&self.http, RoleId::new(role_id))
            .await?;
        Ok(())
    }
}

pub struct DiscordDirectory {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl DiscordDirectory {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Self {
        Self { http, guild_id }
    }
}

#[async_trait]
impl GuildDirectory for DiscordDirectory {
    async fn resolve_member(&self, user_id: u64) -> Option<ResolvedMember> {
        let member = self
            .guild_id
            .member(&self.http, UserId::new(user_id))
            .await
            .ok()?;
        Some(ResolvedMember {
            id: member.user.id.get(),
            username: member.user.name.clone(),
        })
    }

    async fn has_manage_guild(&self, user_id: u64) -> bool {
        let Ok(guild) = self.guild_id.to_partial_guild(&self.http).await else {
            return false;
        };
        if guild.owner_id.get() == user_id {
            return true;
        }
        let Ok(member) = guild.member(&self.http, UserId::new(user_id)).await else {
            return false;
        };

        // @everyone plus the member's roles, computed from the role table so
        // we do not depend on gateway cache state.
        let mut permissions = guild
            .roles
            .get(&RoleId::new(guild.id.get()))
            .map(|role| role.permissions)
            .unwrap_or_default();
        for role_id in &member.roles {
            if let Some(role) = guild.roles.get(role_id) {
                permissions |= role.permissions;
            }
        }
        permissions.administrator() || permissions.manage_guild()
    }

    async fn channel_group_children(&self, group_id: u64) -> Vec<u64> {
        let Ok(channels) = self.guild_id.channels(&self.http).await else {
            return Vec::new();
        };
        channels
            .values()
            .filter(|channel| channel.parent_id.map(|id| id.get()) == Some(group_id))
            .map(|channel| channel.id.get())
            .collect()
    }
}

use crate::modules::team::orchestrator::{TeamError, TeamOrchestrator, TeamSummary};
use crate::modules::team::provision::{DiscordDirectory, DiscordProvisioner};
use crate::{Context, Error};
use poise::{
    command,
    serenity_prelude::{Colour, CreateEmbed, User},
    CreateReply,
};

#[command(slash_command, guild_only)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Name of the team"] name: String,
    #[description = "2nd member of the team"] second: User,
    #[description = "3rd member of the team"] third: User,
    #[description = "4th member of the team"] fourth: User,
) -> Result<(), Error> {
    ctx.defer().await?;

    let Some(guild_id) = ctx.guild_id() else {
        return reply_error(ctx, &TeamError::GuildContextMissing).await;
    };

    let http = ctx.serenity_context().http.clone();
    let directory = DiscordDirectory::new(http.clone(), guild_id);
    let provisioner = DiscordProvisioner::new(http, guild_id);
    let data = ctx.data();
    let orchestrator = TeamOrchestrator::new(
        guild_id.get(),
        &directory,
        &provisioner,
        &data.dbs.teams,
        &data.roles,
        &data.team_gate,
    );

    let outcome = orchestrator
        .create(
            ctx.author().id.get(),
            &name,
            [second.id.get(), third.id.get(), fourth.id.get()],
        )
        .await;

    match outcome {
        Ok(summary) => {
            let embed = CreateEmbed::new()
                .colour(Colour::DARK_GREEN)
                .title("Team Created")
                .description(format!(
                    "Your team **{}** has been created!\n{}\n\nA private category with a \
                     text and voice channel is ready. As the team leader, you can manage \
                     the channels there.",
                    summary.name,
                    roster_lines(&summary),
                ));
            ctx.send(CreateReply::default().embed(embed)).await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

#[command(slash_command, guild_only)]
pub async fn view(
    ctx: Context<'_>,
    #[description = "Member to view the team of (default: yourself)"] member: Option<User>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return reply_error(ctx, &TeamError::GuildContextMissing).await;
    };

    let http = ctx.serenity_context().http.clone();
    let directory = DiscordDirectory::new(http.clone(), guild_id);
    let provisioner = DiscordProvisioner::new(http, guild_id);
    let data = ctx.data();
    let orchestrator = TeamOrchestrator::new(
        guild_id.get(),
        &directory,
        &provisioner,
        &data.dbs.teams,
        &data.roles,
        &data.team_gate,
    );

    let target = member.map(|user| user.id.get());
    match orchestrator.view(ctx.author().id.get(), target).await {
        Ok(summary) => {
            let embed = CreateEmbed::new()
                .colour(Colour::BLUE)
                .title("Team Information")
                .description(format!(
                    "Team name: **{}**\n{}",
                    summary.name,
                    roster_lines(&summary)
                ));
            ctx.send(CreateReply::default().embed(embed)).await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

#[command(slash_command, guild_only)]
pub async fn disband(
    ctx: Context<'_>,
    #[description = "Name of the team to disband"] name: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let Some(guild_id) = ctx.guild_id() else {
        return reply_error(ctx, &TeamError::GuildContextMissing).await;
    };

    let http = ctx.serenity_context().http.clone();
    let directory = DiscordDirectory::new(http.clone(), guild_id);
    let provisioner = DiscordProvisioner::new(http, guild_id);
    let data = ctx.data();
    let orchestrator = TeamOrchestrator::new(
        guild_id.get(),
        &directory,
        &provisioner,
        &data.dbs.teams,
        &data.roles,
        &data.team_gate,
    );

    match orchestrator.disband(ctx.author().id.get(), &name).await {
        Ok(()) => {
            let embed = CreateEmbed::new()
                .colour(Colour::DARK_GREEN)
                .title("Team Disbanded")
                .description(format!("The team **{name}** has been disbanded."));
            ctx.send(CreateReply::default().embed(embed)).await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

fn roster_lines(summary: &TeamSummary) -> String {
    let mut lines = vec![format!("- <@{}> (Leader)", summary.leader_id)];
    lines.extend(summary.member_ids.iter().map(|id| format!("- <@{id}>")));
    format!("Members:\n{}", lines.join("\n"))
}

async fn reply_error(ctx: Context<'_>, error: &TeamError) -> Result<(), Error> {
    let (title, description) = describe(error);
    let embed = CreateEmbed::new()
        .colour(Colour::RED)
        .title(title)
        .description(description);
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn describe(error: &TeamError) -> (&'static str, String) {
    match error {
        TeamError::ParticipantNotFound => (
            "Member Not Found",
            "One or more members are not in the server. Please ensure all members are in \
             the server."
                .into(),
        ),
        TeamError::DuplicateParticipants => (
            "Duplicate Members",
            "You cannot create a team with duplicate members. You need 4 unique members \
             to create a team. (You are the 1st member.)"
                .into(),
        ),
        TeamError::RequesterAlreadyTeamed(team) => (
            "You Are Already in a Team",
            format!("You are already in a team: **{team}**."),
        ),
        TeamError::ParticipantsAlreadyTeamed(conflicts) => (
            "Members Already in a Team",
            format!(
                "The following members are already in a team:\n{}",
                conflicts
                    .iter()
                    .map(|c| format!("- <@{}> (Team: **{}**)", c.member_id, c.team))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        ),
        TeamError::NameTaken(name) => (
            "Team Name Already Taken",
            format!("The team name **{name}** is already taken. Please choose a different name."),
        ),
        TeamError::ResourceProvisioningFailed(_) => (
            "Error Creating Team Resources",
            "An error occurred while setting up the team's role or channels. Please try \
             again later."
                .into(),
        ),
        TeamError::RegistryWriteFailed(_) => (
            "Storage Error",
            "The team registry could not be updated. Please contact a moderator.".into(),
        ),
        TeamError::PermissionDenied => (
            "Permission Denied",
            "You do not have permission to do that.".into(),
        ),
        TeamError::NotInTeam {
            target_is_requester,
        } => (
            "No Team Found",
            if *target_is_requester {
                "You are not in a team.".into()
            } else {
                "That member is not in a team.".into()
            },
        ),
        TeamError::TeamNotFound(name) => (
            "Team Not Found",
            format!("The team **{name}** does not exist."),
        ),
        TeamError::GuildContextMissing => (
            "Server Only",
            "This command can only be used in a server.".into(),
        ),
    }
}

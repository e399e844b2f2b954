pub mod commands;
pub mod database;
pub mod orchestrator;
pub mod provision;

use poise::command;

/// 👥 Four-person team management
#[command(
    slash_command,
    subcommands("commands::create", "commands::view", "commands::disband"),
    guild_only
)]
pub async fn team(_ctx: crate::Context<'_>) -> Result<(), crate::Error> {
    Ok(())
}

// Discord side of AutoMod.

pub mod annotation_commands;
pub mod commands;
pub mod discord_gateway;
pub mod formatter;
pub mod gateway_events;

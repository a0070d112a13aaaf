//! Gateway module - request pipeline, cooldowns, single-flight gate and runtime control

pub mod control;
pub mod cooldown;
pub mod gate;
pub mod orchestrator;
pub mod request;

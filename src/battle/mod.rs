pub mod action_stack;
pub mod calculators;
pub mod commands;
pub mod conditions;
pub mod engine;
pub mod field;
pub mod session;
pub mod state;
pub mod stats;
pub mod talents;

#[cfg(test)]
mod tests;

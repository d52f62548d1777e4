mod bot;
mod estimate;
mod history;

pub(crate) use bot::{cmd_run, cmd_serve};
pub(crate) use estimate::cmd_estimate;
pub(crate) use history::cmd_history;

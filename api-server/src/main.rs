#[macro_use]
extern crate rocket;

mod api;
mod models;

use models::config::Config;
use models::context::Context;
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::sync::Arc;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    TermLogger::init(
        config.level_filter()?,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let context = Arc::new(Context::new(config));
    context.start_sweeper().await;

    let result = api::build(context.clone()).launch().await;

    context.stop_sweeper().await;
    result?;
    Ok(())
}

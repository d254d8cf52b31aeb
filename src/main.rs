use anyhow::Error;
use clap::Parser;
use log::{error, info};
use tokio::task::JoinHandle;

use dashboard_bot::telegram_bot::run_bot;
use dashboard_http::app::run_app;
use dashboard_lib::{
    config::Config,
    context::AppContext,
    dashboard_cli_opts::{DashboardActions, DashboardCliOpts},
};

/// Wait on the http server; the bot stopping early is logged at once and the
/// http server keeps running.
async fn supervise(
    mut http: JoinHandle<Result<(), Error>>,
    bot: JoinHandle<Result<(), Error>>,
) -> Result<(), Error> {
    tokio::select! {
        result = &mut http => return result?,
        result = bot => match result? {
            Ok(()) => info!("telegram bot stopped"),
            Err(e) => error!("telegram bot gave up: {e}"),
        },
    }
    http.await?
}

async fn run_services(ctx: AppContext) -> Result<(), Error> {
    let http = tokio::spawn({
        let ctx = ctx.clone();
        async move { run_app(ctx).await.map_err(Error::from) }
    });
    let bot = tokio::spawn(async move { run_bot(ctx).await });
    supervise(http, bot).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let action = DashboardCliOpts::parse().action();
    let config = Config::init_config()?;
    let ctx = AppContext::new(config).await?;

    if action == DashboardActions::Run {
        info!("starting household dashboard");
        return run_services(ctx).await;
    }
    for line in action.process(&ctx).await? {
        println!("{line}");
    }
    Ok(())
}

use anyhow::Error;

use dashboard_bot::telegram_bot::run_bot;
use dashboard_lib::{config::Config, context::AppContext};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let config = Config::init_config()?;
    let ctx = AppContext::new(config).await?;
    run_bot(ctx).await
}

use anyhow::Error;

use dashboard_http::app::start_app;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    start_app().await?;
    Ok(())
}

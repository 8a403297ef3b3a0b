use anyhow::Result;
use eav_router::cli::{actions, start};

#[tokio::main]
async fn main() -> Result<()> {
    let action = start()?;
    actions::run::handle(action).await
}

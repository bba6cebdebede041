use anyhow::bail;
use tracing::info;

use crate::App;

pub async fn run(app: App) -> anyhow::Result<()> {
    if !app.database.is_available().await {
        bail!("database is unavailable");
    }
    info!("database is available");
    Ok(())
}

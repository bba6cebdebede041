use crate::App;

pub async fn run(app: App) -> anyhow::Result<()> {
    app.database.migrate().await
}

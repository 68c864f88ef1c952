use std::sync::Arc;

use resourcehub::orm::{self, Db};
use resourcehub::router::{self, AppState, Router};
use resourcehub::settings::Settings;
use resourcehub::template;
use resourcehub::urls::{self, Urls};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info,sqlx=warn");
    env_logger::Builder::from_env(env).init();

    let settings = Settings::from_env()?;
    template::set_display_logs(settings.template.debug);

    let db = Arc::new(Db::connect(&settings.database_url).await?);
    orm::auto_migrate(db.clone()).await?;
    if let Some(dir) = &settings.migrations_dir {
        let applied = orm::apply_migration_files(db.clone(), dir).await?;
        log::info!("Applied {} migration file(s) from {}", applied, dir);
    }

    let mut router = Router::new();
    router.set_app_state(AppState {
        db,
        settings: settings.clone(),
    });
    router.add_middleware(router::request_timer());
    router.add_post_middleware(router::request_logger());
    urls::register(&mut router, &Urls::new(&settings.mount_prefix));

    router.run(settings).await
}

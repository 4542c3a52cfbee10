use uptimecore::db::Db;
use uptimecore::{rollup, scheduler};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "uptimecore.db".into());
    let db = Db::new(&db_path).expect("failed to initialize database");

    let tick_interval_secs = env_u64("SCHEDULER_TICK_INTERVAL_SECS", 60);
    let scheduler_lease_secs = env_i64("SCHEDULER_LEASE_SECS", 55);
    let rollup_lease_secs = env_i64("ROLLUP_LEASE_SECS", 600);
    let retention_days = env_i64("RETENTION_CHECK_RESULTS_DAYS", 90);

    let client = reqwest::Client::new();

    println!("uptimecore: starting, tick_interval={tick_interval_secs}s db={db_path}");

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(tick_interval_secs));
    let mut last_rollup_day = None;

    loop {
        ticker.tick().await;

        match scheduler::run_tick(&db, &client, scheduler_lease_secs).await {
            Ok(true) => {}
            Ok(false) => println!("uptimecore: tick skipped, lease held elsewhere"),
            Err(e) => eprintln!("uptimecore: tick failed: {e}"),
        }

        let now = scheduler::unix_now();
        let today = now / 86_400;
        if last_rollup_day != Some(today) {
            match rollup::run(&db, now, rollup_lease_secs, retention_days).await {
                Ok(Some(summary)) => {
                    println!(
                        "uptimecore: rollup complete day_start={} monitors={}",
                        summary.day_start, summary.monitors_rolled
                    );
                    last_rollup_day = Some(today);
                }
                Ok(None) => {}
                Err(e) => eprintln!("uptimecore: rollup failed: {e}"),
            }
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

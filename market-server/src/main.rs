use market_server::core::TaskKind;
use market_server::stock::ReservationSweeper;
use market_server::{BackgroundTasks, Config, ServerState, api, init_logger_with_file};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_logger_with_file(
        &config.log_level,
        !config.is_development(),
        config.log_dir.as_deref(),
    )?;

    tracing::info!(
        environment = %config.environment,
        stock_hold_mode = ?config.stock_hold_mode,
        verification_fallback = ?config.verification_fallback,
        "Market server starting"
    );

    let state = ServerState::initialize(&config).await?;

    let mut tasks = BackgroundTasks::new();
    let sweeper = ReservationSweeper::new(
        state.stock.clone(),
        config.sweep_interval(),
        tasks.shutdown_token(),
    );
    tasks.spawn("reservation_sweeper", TaskKind::Periodic, sweeper.run());

    let reconciler = state.reconciler();
    tasks.spawn(
        "order_reconciler",
        TaskKind::Periodic,
        reconciler.run(config.reconcile_interval(), tasks.shutdown_token()),
    );
    tasks.spawn(
        "checkout_outcome_eviction",
        TaskKind::Periodic,
        state.checkouts.clone().run_eviction(
            config.sweep_interval(),
            config.checkout_outcome_ttl(),
            tasks.shutdown_token(),
        ),
    );
    tasks.log_summary();

    let app = api::build_app(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Market server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await?;

    tasks.shutdown().await;
    Ok(())
}

use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig};
use rdkafka::config::ClientConfig;
use rdkafka::producer::FutureProducer;
use resilience::circuit_breaker::CircuitBreaker;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transactional_outbox::metrics::OutboxMetrics;

use notification_service::config::Config;
use notification_service::services::{
    self, event_handler::run_consumer, fanout::FanoutSelector, monitor::run_monitor,
    notification_service::NotificationService, preferences::PreferencesRepository,
    scheduler::run_scheduler, stampede::StampedeGuard,
    worker_pool::{run_pool as run_worker_pool, GatewayBreakers},
    APNsClient, DeviceRegistry, EventHandler, FCMClient, FcmServiceAccountKey, IdempotencyStore,
    InboxReader, JwtAuthMiddleware, JwtKeys,
};
use notification_service::{handlers, metrics};

use idempotent_consumer::IdempotencyGuard;
use nova_cache::NovaCache;

/// `config::CircuitBreakerConfig` (env-shaped, flat f64/u64 fields) and
/// `resilience::CircuitBreakerConfig` (the library's own shape) model the
/// same knobs under different names; `half_open_success_threshold` maps to
/// `success_threshold`, and the library's `failure_threshold` (a
/// consecutive-failure trip independent of the error-rate window) has no
/// dedicated knob in our env surface, so it reuses `minimum_requests`.
fn resolve_breaker_config(cfg: &notification_service::config::CircuitBreakerConfig) -> resilience::circuit_breaker::CircuitBreakerConfig {
    resilience::circuit_breaker::CircuitBreakerConfig {
        failure_threshold: cfg.minimum_requests,
        success_threshold: cfg.half_open_success_threshold,
        timeout: cfg.open_timeout(),
        error_rate_threshold: cfg.error_threshold,
        window_duration: cfg.window_duration(),
        error_duration: cfg.error_duration(),
        minimum_requests: cfg.minimum_requests,
        half_open_max_requests: cfg.half_open_max_requests,
    }
}

fn init_tracing(app_env: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=debug,sqlx=warn".into());

    if app_env.eq_ignore_ascii_case("production") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn build_fcm_client(config: &Config) -> Option<Arc<FCMClient>> {
    let path = config.gateways.fcm_credentials_path.as_ref()?;
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, path, "gateway-not-configured: failed to read FCM credentials");
            return None;
        }
    };
    match serde_json::from_str::<FcmServiceAccountKey>(&json) {
        Ok(key) => {
            let project_id = key.project_id.clone();
            tracing::info!(project_id, "FCM client initialized");
            Some(Arc::new(FCMClient::new(project_id, key)))
        }
        Err(e) => {
            tracing::warn!(error = %e, path, "gateway-not-configured: failed to parse FCM credentials");
            None
        }
    }
}

fn build_apns_client(config: &Config) -> Option<Arc<APNsClient>> {
    let cert_path = config.gateways.apns_certificate_path.clone()?;
    let (Some(key_id), Some(team_id)) = (
        config.gateways.apns_key_id.clone(),
        config.gateways.apns_team_id.clone(),
    ) else {
        tracing::warn!("gateway-not-configured: APNS_KEY_ID or APNS_TEAM_ID missing");
        return None;
    };
    tracing::info!(production = config.gateways.apns_production, "APNs client initialized");
    Some(Arc::new(APNsClient::new(
        cert_path,
        String::new(),
        team_id,
        key_id,
        config.gateways.apns_production,
    )))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(io::Error::other)?;
    init_tracing(&config.app.env);

    tracing::info!(env = %config.app.env, "starting notification-service");

    let mut db_cfg = DbPoolConfig::for_service("notification-service");
    db_cfg.database_url = config.database.url.clone();
    db_cfg.max_connections = config.database.max_connections;
    db_cfg.min_connections = config.database.min_connections;
    db_cfg.idle_timeout_secs = config.database.idle_timeout_secs;
    let pool = create_pg_pool(db_cfg)
        .await
        .map_err(|e| io::Error::other(format!("failed to connect to database: {e}")))?;
    tracing::info!("connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| io::Error::other(format!("failed to run migrations: {e}")))?;
    tracing::info!("migrations applied");

    let redis_pool = redis_utils::RedisPool::connect(&config.redis.url, None)
        .await
        .map_err(|e| io::Error::other(format!("failed to connect to redis: {e}")))?;
    let cache = NovaCache::new(redis_pool.manager());
    tracing::info!("connected to redis");

    let fcm_client = build_fcm_client(&config).await;
    let apns_client = build_apns_client(&config);

    let breaker_config = resolve_breaker_config(&config.circuit_breaker);
    let breakers = Arc::new(GatewayBreakers {
        fcm: CircuitBreaker::new(breaker_config.clone()),
        apns: CircuitBreaker::new(breaker_config),
    });

    let device_registry = DeviceRegistry::new(pool.clone());
    let preferences = PreferencesRepository::new(pool.clone());
    let notifications = NotificationService::new(pool.clone());
    let inbox = InboxReader::new(
        pool.clone(),
        cache.clone(),
        config.cache_ttls.unread_count_secs,
        config.cache_ttls.group_read_days,
    );

    let idempotency_guard = IdempotencyGuard::new(pool.clone(), Duration::from_secs(config.redis.dedup_ttl_secs));
    let idempotency = IdempotencyStore::new(cache.clone(), idempotency_guard.clone());

    let stampede = Arc::new(StampedeGuard::new(cache.clone()));
    let fanout = FanoutSelector::new(
        cache.clone(),
        stampede,
        None,
        config.fanout.high_reach_threshold,
        config.fanout.topic_push_threshold,
    );

    let event_handler = Arc::new(EventHandler::new(
        pool.clone(),
        notifications,
        preferences,
        idempotency,
        fanout,
    ));

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &config.broker.bootstrap_servers)
        .set("message.timeout.ms", "30000")
        .create()
        .map_err(|e| io::Error::other(format!("failed to create kafka producer: {e}")))?;
    let outbox_metrics = OutboxMetrics::new("notification-service");
    let outbox_processor = Arc::new(services::outbox::build_processor(
        &config,
        pool.clone(),
        producer,
        outbox_metrics,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut background_tasks = tokio::task::JoinSet::new();

    background_tasks.spawn(run_worker_pool(
        pool.clone(),
        fcm_client.clone(),
        apns_client.clone(),
        breakers.clone(),
        config.workers.clone(),
        shutdown_rx.clone(),
    ));

    {
        let outbox_processor = outbox_processor.clone();
        background_tasks.spawn(async move {
            if let Err(e) = outbox_processor.start().await {
                tracing::error!(error = %e, "outbox processor stopped");
            }
        });
    }

    background_tasks.spawn(run_consumer(
        config.broker.bootstrap_servers.clone(),
        config.broker.events_topic.clone(),
        config.broker.consumer_group.clone(),
        event_handler.clone(),
        shutdown_rx.clone(),
    ));

    background_tasks.spawn(run_scheduler(
        pool.clone(),
        config.workers.clone(),
        false,
        idempotency_guard.clone(),
        shutdown_rx.clone(),
    ));

    background_tasks.spawn(run_monitor(pool.clone(), Some(breakers.clone()), shutdown_rx.clone()));

    let jwt_keys = JwtKeys {
        primary: config.auth.jwt_primary_key.clone(),
        previous: config.auth.jwt_previous_key.clone(),
    };
    let cache_data = web::Data::new(cache.clone());
    let auth_middleware = JwtAuthMiddleware::with_cache(jwt_keys, Arc::new(cache.clone()));

    let http_port = config.app.port;
    let device_registry_data = web::Data::new(device_registry);
    let preferences_data = web::Data::new(preferences);
    let notifications_data = web::Data::new(notifications);
    let inbox_data = web::Data::new(inbox);
    let pool_data = web::Data::new(pool.clone());

    tracing::info!(port = http_port, "starting HTTP server");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(device_registry_data.clone())
            .app_data(preferences_data.clone())
            .app_data(notifications_data.clone())
            .app_data(inbox_data.clone())
            .app_data(pool_data.clone())
            .app_data(cache_data.clone())
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(handlers::health::liveness))
            .route("/health/live", web::get().to(handlers::health::liveness))
            .route("/health/ready", web::get().to(handlers::health::readiness))
            .route("/health/detailed", web::get().to(handlers::health::detailed))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::devices::register_routes)
            .configure(handlers::preferences::register_routes)
            .service(
                web::scope("/notifications")
                    .wrap(auth_middleware.clone())
                    .configure(|cfg| {
                        cfg.route("", web::get().to(handlers::notifications::list_notifications))
                            .route(
                                "/unread-count",
                                web::get().to(handlers::notifications::unread_count),
                            )
                            .route(
                                "/read-batch",
                                web::post().to(handlers::notifications::mark_read_batch),
                            )
                            .route(
                                "/{id}/read",
                                web::post().to(handlers::notifications::mark_read),
                            );
                    }),
            )
    })
    .bind(("0.0.0.0", http_port))?
    .run();

    let server_handle = server.handle();
    let http_task = tokio::spawn(server);

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping background workers");
    let _ = shutdown_tx.send(true);
    server_handle.stop(true).await;

    let shutdown_timeout = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_timeout, async {
        while background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        tracing::warn!("background workers did not shut down within timeout, exiting anyway");
    }

    let _ = http_task.await;
    tracing::info!("notification-service stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// src/main.rs
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpServer,
};
use actix_web_httpauth::middleware::HttpAuthentication;
use anyhow::Context;
use sqlx::{
    migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

mod auth;
mod auth_handlers;
mod codes;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod monitoring;
mod po_handlers;
mod product_handlers;
mod qc_handlers;
mod receipt_handlers;
mod stock_handlers;
mod stock_lot_handlers;
mod supplier_handlers;
#[cfg(test)]
mod test_support;
mod warehouse_handlers;
mod watcher;

use auth::{jwt_middleware, AuthService};
use config::Config;
use monitoring::{Metrics, RequestLogger};
use watcher::StockWatcher;

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub stock_watcher: StockWatcher,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    setup_logging(&config);
    config.print_startup_info();

    if config.is_production() {
        validate_production_config(&config)?;
    }

    setup_database(&config.database.url).await?;
    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let auth_service = Arc::new(AuthService::new(
        &config.auth.jwt_secret,
        config.auth.token_expiration_hours,
        config.auth.bcrypt_cost,
    ));

    let stock_watcher = StockWatcher::new();
    stock_watcher.spawn(pool.clone(), config.watcher.clone());

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
        stock_watcher,
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let metrics_arc = Arc::new(Metrics::new());
    let metrics = web::Data::from(metrics_arc.clone());
    let workers = config.server.workers;

    let mut server = HttpServer::new(move || {
        let cors = setup_cors(&config.security.allowed_origins, config.is_production());
        let auth_middleware = HttpAuthentication::bearer(jwt_middleware);

        App::new()
            .wrap(cors)
            .wrap(security_headers())
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(metrics.clone())
            // Health and metrics (no auth)
            .service(
                web::scope("/health")
                    .route("", web::get().to(monitoring::health_check))
                    .route("/ready", web::get().to(monitoring::readiness_check))
                    .route("/metrics", web::get().to(monitoring::metrics_endpoint)),
            )
            // Profile needs a token, so it is registered before the open
            // auth scope claims the /api/auth prefix
            .service(
                web::resource("/api/auth/profile")
                    .wrap(HttpAuthentication::bearer(jwt_middleware))
                    .route(web::get().to(auth_handlers::get_profile)),
            )
            // Auth endpoints (no authentication required)
            .service(
                web::scope("/api/auth")
                    .route("/login", web::post().to(auth_handlers::login))
                    .route("/register", web::post().to(auth_handlers::register)),
            )
            // Protected API
            .service(
                web::scope("/api")
                    .wrap(auth_middleware)
                    .route(
                        "/dashboard/stats",
                        web::get().to(handlers::get_dashboard_stats),
                    )
                    .service(
                        web::scope("/suppliers")
                            .route("", web::get().to(supplier_handlers::get_suppliers))
                            .route("", web::post().to(supplier_handlers::create_supplier))
                            .route("/{id}", web::get().to(supplier_handlers::get_supplier))
                            .route("/{id}", web::put().to(supplier_handlers::update_supplier))
                            .route("/{id}", web::delete().to(supplier_handlers::delete_supplier)),
                    )
                    .service(
                        web::scope("/warehouses")
                            .route("", web::get().to(warehouse_handlers::get_warehouses))
                            .route("", web::post().to(warehouse_handlers::create_warehouse))
                            .route("/{id}", web::get().to(warehouse_handlers::get_warehouse))
                            .route("/{id}", web::put().to(warehouse_handlers::update_warehouse))
                            .route(
                                "/{id}",
                                web::delete().to(warehouse_handlers::delete_warehouse),
                            ),
                    )
                    .service(
                        web::scope("/products")
                            .route("", web::get().to(product_handlers::get_products))
                            .route("", web::post().to(product_handlers::create_product))
                            .route("/{id}", web::get().to(product_handlers::get_product))
                            .route("/{id}", web::put().to(product_handlers::update_product))
                            .route("/{id}", web::delete().to(product_handlers::delete_product)),
                    )
                    .service(
                        web::scope("/purchase-orders")
                            .route("", web::get().to(po_handlers::get_purchase_orders))
                            .route("", web::post().to(po_handlers::create_purchase_order))
                            .route(
                                "/summary",
                                web::get().to(po_handlers::get_purchase_order_summary),
                            )
                            .route("/{id}", web::get().to(po_handlers::get_purchase_order))
                            .route(
                                "/{id}/confirm",
                                web::put().to(po_handlers::confirm_purchase_order),
                            )
                            .route(
                                "/{id}/return",
                                web::put().to(po_handlers::return_purchase_order),
                            )
                            .route(
                                "/{id}/return-item",
                                web::put().to(po_handlers::return_purchase_order_item),
                            )
                            .route(
                                "/{id}/cancel",
                                web::put().to(po_handlers::cancel_purchase_order),
                            ),
                    )
                    .service(
                        web::scope("/qc")
                            .route("", web::post().to(qc_handlers::create_qc_record))
                            .route(
                                "/batch/{batch_number}",
                                web::get().to(qc_handlers::get_qc_records_by_batch),
                            )
                            .route(
                                "/purchase-orders/{id}/status",
                                web::put().to(qc_handlers::resolve_purchase_order_qc),
                            )
                            .route("/{id}", web::put().to(qc_handlers::update_qc_record))
                            .route("/{id}", web::delete().to(qc_handlers::delete_qc_record)),
                    )
                    .service(
                        web::scope("/stock-lots")
                            .route("", web::get().to(stock_lot_handlers::get_stock_lots))
                            .route(
                                "/filter",
                                web::get().to(stock_lot_handlers::filter_stock_lots),
                            )
                            .route(
                                "/barcode/{barcode}",
                                web::get().to(stock_lot_handlers::get_stock_lots_by_barcode),
                            )
                            .route(
                                "/{id}/expiry",
                                web::put().to(stock_lot_handlers::update_lot_expiry),
                            )
                            .route(
                                "/{id}/qc",
                                web::put().to(stock_lot_handlers::update_lot_qc),
                            )
                            .route(
                                "/{id}/close",
                                web::put().to(stock_lot_handlers::close_lot),
                            ),
                    )
                    .service(
                        web::scope("/stocks")
                            .route("", web::get().to(stock_handlers::get_stocks))
                            .route("/events", web::get().to(watcher::stock_events))
                            .route(
                                "/product/{product_id}",
                                web::get().to(stock_handlers::get_stocks_by_product),
                            )
                            .route(
                                "/barcode/{barcode}",
                                web::get().to(stock_handlers::get_stock_by_barcode),
                            )
                            .route(
                                "/barcode/{barcode}",
                                web::put().to(stock_handlers::update_stock_by_barcode),
                            )
                            .route(
                                "/barcode/{barcode}/return",
                                web::put().to(stock_handlers::return_stock_by_barcode),
                            )
                            .route(
                                "/barcode/{barcode}",
                                web::delete().to(stock_handlers::delete_stock_by_barcode),
                            ),
                    )
                    .service(
                        web::scope("/receipts")
                            .route("", web::get().to(receipt_handlers::get_receipts))
                            .route(
                                "/summary",
                                web::get().to(receipt_handlers::get_receipt_summary),
                            )
                            .route(
                                "/{payment_id}",
                                web::get().to(receipt_handlers::get_receipt_by_payment),
                            )
                            .route(
                                "/{payment_id}",
                                web::delete().to(receipt_handlers::delete_receipt),
                            ),
                    ),
            )
    })
    .keep_alive(Duration::from_secs(30))
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind to {}", bind_address))?;

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.run().await.context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

fn setup_logging(config: &Config) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.logging.level),
    );
    if !config.logging.console_enabled {
        builder.format(|_, _| Ok(()));
    } else {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.auth.jwt_secret.len() < 32 {
        anyhow::bail!("Insecure JWT secret in production! Must be at least 32 characters.");
    }
    if config
        .security
        .allowed_origins
        .contains(&"*".to_string())
    {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }
    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(
    db_config: &config::DatabaseConfig,
) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .idle_timeout(Duration::from_secs(db_config.idle_timeout))
        .connect(&db_config.url)
        .await
        .context("Failed to create database pool")?;
    Ok(pool)
}

fn setup_cors(allowed_origins: &[String], is_production: bool) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .max_age(3600);

    if allowed_origins.contains(&"*".to_string()) {
        if is_production {
            // validate_production_config rejects this before we get here
            log::error!("Wildcard CORS origin is not allowed in production");
        } else {
            log::warn!("Using wildcard CORS in development mode");
            cors = cors.allow_any_origin().allow_any_header().allow_any_method();
        }
    } else {
        for origin in allowed_origins {
            if origin.is_empty() {
                continue;
            }
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}

fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
}

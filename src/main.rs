use actix_web::{App, HttpServer, middleware::Logger, web};
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use chrono::Local;  // timestamp in log lines
use std::sync::Arc;

use coupon_claim_backend::{
    config::Config,
    database::{CouponStore, MemoryCouponStore, SeaOrmCouponStore, create_pool, run_migrations},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 创建JWT服务
    let jwt_service = JwtService::new(&config.jwt.secret, config.jwt.expires_in);

    // 选择存储: DATABASE_URL=memory 时不连接数据库, 管理员账号不可用
    let (store, auth_service): (Arc<dyn CouponStore>, Option<AuthService>) =
        if config.uses_memory_store() {
            log::warn!("Using in-memory coupon store; data is lost on restart");
            (Arc::new(MemoryCouponStore::new()), None)
        } else {
            // 创建数据库连接池
            let pool = create_pool(&config.database)
                .await
                .expect("Failed to create database connection pool");

            // 运行数据库迁移
            run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            let auth_service = AuthService::new(pool.clone(), jwt_service.clone());
            match auth_service.ensure_bootstrap_admin(&config.admin).await {
                Ok(true) => log::info!("Bootstrap admin account is ready"),
                Ok(false) => {}
                Err(e) => log::error!("Failed to create bootstrap admin: {}", e),
            }

            (Arc::new(SeaOrmCouponStore::new(pool)), Some(auth_service))
        };

    // 创建服务
    let claim_service = ClaimService::new(store.clone());
    let coupon_service = CouponService::new(store);
    let rate_limiter = ClaimRateLimiter::new(&config.rate_limit);

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let bind_addr = (config.server.host.clone(), config.server.port);
    HttpServer::new(move || {
        let mut app = App::new()
            .wrap(Logger::default())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .wrap(create_cors(&config.cors))
            .app_data(web::Data::new(claim_service.clone()))
            .app_data(web::Data::new(coupon_service.clone()))
            .app_data(web::Data::new(rate_limiter.clone()))
            .app_data(web::Data::new(config.session.clone()))
            .app_data(web::Data::new(config.claim.clone()))
            .app_data(web::Data::new(config.admin.clone()));

        if let Some(auth_service) = &auth_service {
            app = app.app_data(web::Data::new(auth_service.clone()));
        }

        app.configure(swagger_config).service(
            web::scope("/api/v1")
                .configure(handlers::coupon_config)
                .configure(handlers::auth_config)
                .configure(handlers::admin_config),
        )
    })
    .bind(bind_addr)?
    .run()
    .await
}

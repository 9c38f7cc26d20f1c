//! QAHA 高可用控制面服务
//!
//! 集成功能：
//! 1. 健康检查与自动故障转移
//! 2. 复制延迟监控
//! 3. 管理 HTTP API 与 Prometheus 指标
//!
//! 运行: cargo run --bin qaha-server -- --config config/ha.toml --http 0.0.0.0:8095

use std::sync::Arc;

use anyhow::Context;
use qaha::service::http::HttpServer;
use qaha::service::HaService;
use qaha::utils::config::HaConfig;

/// 命令行参数
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<String>,
    http_address: Option<String>,
}

fn parse_args() -> CliArgs {
    let mut cli = CliArgs::default();
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    cli.config_path = Some(args[i + 1].clone());
                }
            }
            "--http" | "-h" => {
                if i + 1 < args.len() {
                    cli.http_address = Some(args[i + 1].clone());
                }
            }
            _ => {}
        }
    }
    cli
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    // 1. 加载配置文件（显式指定的路径必须存在）
    let (config, load_warning) = match cli.config_path {
        Some(ref path) => (
            HaConfig::load_from_file(path).with_context(|| format!("loading {}", path))?,
            None,
        ),
        None => match HaConfig::load_default() {
            Ok(cfg) => (cfg, None),
            Err(e) => (HaConfig::default(), Some(e)),
        },
    };

    // 初始化日志
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.service.log_level.as_str()),
    )
    .init();

    if let Some(e) = load_warning {
        log::warn!("Failed to load config file: {}, using defaults", e);
    }

    let bind_address = cli
        .http_address
        .unwrap_or_else(|| config.http.bind_address());

    log::info!("Configuration loaded");
    log::info!("  Service: {} ({})", config.service.name, config.service.environment);
    log::info!("  Strategy: {}", config.strategy.kind.as_str());
    log::info!("  Load balancer nodes: {}", config.load_balancer.len());
    log::info!("  Cluster nodes: {}", config.cluster.len());

    // 2. 启动控制面
    let ha = Arc::new(HaService::from_config(config).context("building HA service")?);
    ha.check_health_now().await;
    ha.start();

    let mut events = ha.subscribe("server-log");
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log::info!("[{}] {}", event.name(), event.to_json());
        }
    });

    // 3. 管理接口
    HttpServer::new(ha.clone(), bind_address)
        .run()
        .await
        .context("running HTTP server")?;

    ha.shutdown();
    Ok(())
}

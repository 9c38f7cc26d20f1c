//! HTTP API 路由配置

use actix_web::web;

use super::handlers;

/// 配置所有路由
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // 健康检查
        .route("/health", web::get().to(handlers::health_check))

        // Prometheus
        .route("/metrics", web::get().to(handlers::prometheus_metrics))

        // 高可用管理
        .service(
            web::scope("/api/ha")
                .route("/metrics", web::get().to(handlers::get_metrics))
                .route("/nodes", web::get().to(handlers::get_nodes))
                .route("/nodes/{node_id}/metrics", web::post().to(handlers::update_node_metrics))
                .route("/state", web::get().to(handlers::get_state))
                .route("/failover/history", web::get().to(handlers::get_failover_history))
                .route("/failover/test", web::post().to(handlers::test_failover))
                .route("/replicas/{node_id}/report", web::post().to(handlers::report_replica))
                .route("/replicas/{node_id}/failed", web::post().to(handlers::mark_cluster_node_failed))
        );
}

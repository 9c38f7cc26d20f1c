//! HTTP API 请求处理器

use actix_web::{web, HttpResponse, Result};
use std::sync::Arc;

use super::models::*;
use crate::replication::ReplicaReport;
use crate::service::ha::HaService;
use crate::HaError;

/// 应用状态
pub struct AppState {
    pub ha: Arc<HaService>,
}

fn error_response(e: HaError) -> HttpResponse {
    match e {
        HaError::NodeNotFound(_) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error(404, e.to_string()))
        }
        HaError::InvalidParameter(_) => {
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, e.to_string()))
        }
        _ => HttpResponse::InternalServerError().json(ApiResponse::<()>::error(500, e.to_string())),
    }
}

/// 健康检查
pub async fn health_check(state: web::Data<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": state.ha.config().service.name,
    }))
}

/// 高可用指标
pub async fn get_metrics(state: web::Data<Arc<AppState>>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(state.ha.get_metrics())))
}

/// 节点清单
pub async fn get_nodes(state: web::Data<Arc<AppState>>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(state.ha.get_nodes())))
}

/// 故障转移历史（新 → 旧）
pub async fn get_failover_history(
    query: web::Query<HistoryQuery>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    let history = state.ha.get_failover_history(query.limit);
    Ok(HttpResponse::Ok().json(ApiResponse::success(history)))
}

/// 人工触发故障转移
pub async fn test_failover(state: web::Data<Arc<AppState>>) -> Result<HttpResponse> {
    let success = state.ha.test_failover().await;
    let body = FailoverTestResponse {
        success,
        master: state.ha.current_master(),
    };

    if success {
        Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
    } else {
        log::warn!("Manual failover via admin API did not complete");
        Ok(HttpResponse::Conflict().json(ApiResponse::<FailoverTestResponse>::error(
            409,
            "Failover did not complete, see logs and failover:failed events".to_string(),
        )))
    }
}

/// 更新节点指标
pub async fn update_node_metrics(
    node_id: web::Path<String>,
    req: web::Json<NodeMetricsRequest>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    match state
        .ha
        .update_node_metrics(&node_id, req.response_time_ms, req.error_rate)
    {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            serde_json::json!({ "node_id": node_id.as_str() }),
        ))),
        Err(e) => {
            log::debug!("Rejected metrics update for {}: {}", node_id, e);
            Ok(error_response(e))
        }
    }
}

/// 副本心跳
pub async fn report_replica(
    node_id: web::Path<String>,
    req: web::Json<ReplicaReportRequest>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let mut report = ReplicaReport::new(req.lag_ms);
    if let Some(consistency) = req.consistency {
        report = report.with_consistency(consistency);
    }
    report.data_version = req.data_version;

    match state.ha.report_replica(&node_id, report) {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            serde_json::json!({ "node_id": node_id.as_str() }),
        ))),
        Err(e) => Ok(error_response(e)),
    }
}

/// 标记副本集成员失效
pub async fn mark_cluster_node_failed(
    node_id: web::Path<String>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse> {
    match state.ha.mark_cluster_node_failed(&node_id) {
        Ok(()) => {
            log::warn!("Cluster node {} marked failed via admin API", node_id);
            Ok(HttpResponse::Ok().json(ApiResponse::success(
                serde_json::json!({ "node_id": node_id.as_str() }),
            )))
        }
        Err(e) => Ok(error_response(e)),
    }
}

/// 状态机快照
pub async fn get_state(state: web::Data<Arc<AppState>>) -> Result<HttpResponse> {
    let body = StateResponse {
        state: state.ha.state(),
        master: state.ha.current_master(),
        stats: state.ha.failover_stats(),
    };
    Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
}

/// Prometheus 文本格式
pub async fn prometheus_metrics(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let Some(prom) = state.ha.prometheus() else {
        return HttpResponse::NotFound().body("prometheus export disabled");
    };

    // 导出前刷新一次 gauge
    state.ha.get_metrics();

    match prom.render() {
        Ok(text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(text),
        Err(e) => {
            log::error!("Failed to render prometheus metrics: {}", e);
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

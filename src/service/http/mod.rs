//! HTTP API 服务模块
//!
//! 提供高可用控制面的管理接口：指标、节点清单、故障转移历史与人工切换

pub mod handlers;
pub mod models;
pub mod routes;

use actix_web::{middleware, web, App, HttpServer as ActixHttpServer};
use std::io;
use std::sync::Arc;

use crate::service::ha::HaService;
use handlers::AppState;

/// HTTP 服务器
pub struct HttpServer {
    /// 应用状态
    app_state: Arc<AppState>,

    /// 监听地址
    bind_address: String,
}

impl HttpServer {
    pub fn new(ha: Arc<HaService>, bind_address: String) -> Self {
        Self {
            app_state: Arc::new(AppState { ha }),
            bind_address,
        }
    }

    /// 启动 HTTP 服务器
    pub async fn run(self) -> io::Result<()> {
        log::info!("Starting HTTP server at {}", self.bind_address);

        let app_state = self.app_state.clone();

        ActixHttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(app_state.clone()))
                .wrap(middleware::Logger::default())
                .wrap(middleware::Compress::default())
                .configure(routes::configure)
        })
        .bind(&self.bind_address)?
        .run()
        .await
    }
}

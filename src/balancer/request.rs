//! 路由请求

use std::net::SocketAddr;

/// 选择引擎需要的请求信息
#[derive(Debug, Clone, Default)]
pub struct RoutingRequest {
    /// 请求路径（consistent-hash 使用）
    pub path: String,
    /// X-Forwarded-For 头
    pub forwarded_for: Option<String>,
    /// 对端地址
    pub remote_addr: Option<SocketAddr>,
}

impl RoutingRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_forwarded_for(mut self, header: impl Into<String>) -> Self {
        self.forwarded_for = Some(header.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// 客户端身份：X-Forwarded-For 的第一跳，否则对端 IP
    pub fn client_identity(&self) -> String {
        if let Some(first) = self
            .forwarded_for
            .as_deref()
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return first.to_string();
        }

        self.remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_identity() {
        let addr: SocketAddr = "10.0.0.7:51234".parse().unwrap();

        let req = RoutingRequest::new("/").with_remote_addr(addr);
        assert_eq!(req.client_identity(), "10.0.0.7");

        let req = req.with_forwarded_for("203.0.113.9, 10.0.0.1");
        assert_eq!(req.client_identity(), "203.0.113.9");

        let req = RoutingRequest::new("/").with_forwarded_for("  ");
        assert_eq!(req.client_identity(), "unknown");
    }
}

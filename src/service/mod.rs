//! 对外服务层
//!
//! - `ha`: 进程内调用的高可用服务
//! - `http`: 管理接口 (actix-web)

pub mod ha;
pub mod http;

pub use ha::HaService;

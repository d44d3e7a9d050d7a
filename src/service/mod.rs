// 业务服务层模块
pub mod account_service;

pub use account_service::{AccountService, PasswordResetTicket};

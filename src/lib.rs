pub mod auth;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod infra;
pub mod logging;
pub mod service;

pub use auth::{
    AccessClaims, JwtService, ResetTokenManager, SessionKey, SessionManager, SessionStatus,
    SessionTokens,
};
pub use config::AuthConfig;
pub use directory::{DirectoryUser, InMemoryUserDirectory, UserDirectory};
pub use error::{AuthError, ErrorCode, ErrorResponse, Result, StoreError};
pub use infra::{connect_store, KvStore, MemoryStore, RedisStore};
pub use service::{AccountService, PasswordResetTicket};
